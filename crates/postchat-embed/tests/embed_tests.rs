use postchat_core::config::EmbeddingSettings;
use postchat_core::similarity::cosine_similarity;
use postchat_embed::{get_default_embedder, FakeEmbedder, FAKE_DIM};

#[tokio::test]
async fn fake_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { use_fake: true, ..Default::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    let v1 = embedder.embed("hello world").await.expect("embed");
    let v2 = embedder.embed("hello world").await.expect("embed");

    assert_eq!(v1.len(), FAKE_DIM, "embedding dim is {}", FAKE_DIM);
    assert_eq!(embedder.dim(), FAKE_DIM);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn fake_embedder_respects_configured_dimension() {
    let fake = FakeEmbedder::new(64);
    assert_eq!(fake.embed_sync("a b c").len(), 64);
    assert_eq!(FakeEmbedder::new(0).embed_sync("x").len(), 1, "dimension is at least one");
}

#[test]
fn fake_embedder_overlap_scores_higher() {
    let fake = FakeEmbedder::new(256);
    let q = fake.embed_sync("dogs are loyal");
    let same = fake.embed_sync("dogs are loyal");
    let other = fake.embed_sync("quantum chromodynamics lattice");
    assert!(cosine_similarity(&q, &same) > cosine_similarity(&q, &other));
}

#[test]
fn empty_text_gives_zero_vector() {
    let v = FakeEmbedder::new(8).embed_sync("   ");
    assert!(v.iter().all(|x| *x == 0.0));
}
