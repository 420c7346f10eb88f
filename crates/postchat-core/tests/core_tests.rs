use std::fs;
use std::io::Write;
use tempfile::TempDir;
use uuid::Uuid;

use postchat_core::config::{ChunkingSettings, Config};
use postchat_core::data_processor::DataProcessor;
use postchat_core::Error;

#[test]
fn load_text_posts_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let mut f = fs::File::create(dir.join("a.txt")).unwrap();
    writeln!(f, "Short text").unwrap();

    let author = Uuid::new_v4();
    let processor = DataProcessor::new();
    let posts = processor.load_text_posts(dir, author).expect("load");

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "a");
    assert_eq!(posts[0].author_id, author);
    assert!(!posts[0].chat_enabled && !posts[0].embeddings_ready);

    let chunks = processor.chunk_post(&posts[0]);
    assert_eq!(chunks.len(), 1, "one small paragraph becomes one chunk");
    assert_eq!(chunks[0].content, "Short text");
}

#[test]
fn load_text_posts_walks_subdirs_sorted_and_skips_other_files() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir(dir.join("nested")).unwrap();
    fs::write(dir.join("b.txt"), "bravo").unwrap();
    fs::write(dir.join("a.txt"), "alpha").unwrap();
    fs::write(dir.join("nested").join("c.txt"), "charlie").unwrap();
    fs::write(dir.join("notes.md"), "ignored").unwrap();

    let posts = DataProcessor::new().load_text_posts(dir, Uuid::new_v4()).expect("load");
    let titles: Vec<&str> = posts.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["a", "b", "c"]);
}

#[test]
fn empty_directory_yields_no_posts() {
    let tmp = TempDir::new().unwrap();
    let posts = DataProcessor::new().load_text_posts(tmp.path(), Uuid::new_v4()).expect("load");
    assert!(posts.is_empty());
}

#[test]
fn invalid_utf8_is_read_lossily() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("bin.txt"), [b'o', b'k', 0xff, b'!']).unwrap();
    let posts = DataProcessor::new().load_text_posts(tmp.path(), Uuid::new_v4()).expect("load");
    assert!(posts[0].content.starts_with("ok"));
}

#[test]
fn chunks_respect_configured_cap() {
    let processor = DataProcessor::with_settings(ChunkingSettings { max_tokens: 12, overlap_percent: 0.25 });
    let sentence = (0..50).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
    let text = format!("Intro line.\n\n{}\n\nOutro.", sentence);
    let chunks = processor.chunk_text(&text);
    assert_eq!(chunks.first().map(String::as_str), Some("Intro line."));
    assert_eq!(chunks.last().map(String::as_str), Some("Outro."));
    for c in &chunks {
        assert!(c.split_whitespace().count() <= 9, "chunk over cap: {}", c);
    }
}

#[test]
fn config_layers_env_file_over_base_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(
        dir.join("config.toml"),
        "[retrieval]\ntop_k = 5\n\n[generation]\nmodel = \"base-model\"\n\n[data]\nraw_txt_dir = \"posts\"\n",
    )
    .unwrap();
    fs::write(dir.join("config.test.toml"), "[retrieval]\ntop_k = 7\n").unwrap();

    let config = Config::load_from(dir, "test").expect("load");
    let settings = config.settings().expect("settings");
    assert_eq!(settings.retrieval.top_k, 7);
    assert_eq!(settings.generation.model, "base-model");
    assert_eq!(settings.chunking.max_tokens, 200, "untouched sections keep defaults");
    assert_eq!(config.get::<String>("data.raw_txt_dir").expect("raw dir"), "posts");
}

#[test]
fn config_rejects_invalid_values() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("config.toml"), "[queue]\nworkers = 0\n").unwrap();
    assert!(matches!(Config::load_from(tmp.path(), "test"), Err(Error::InvalidConfig(_))));
}
