mod fake;
mod http;

use std::sync::Arc;

use postchat_core::config::EmbeddingSettings;
use postchat_core::traits::Embedder;
use postchat_core::Result;
use tracing::info;

pub use fake::FakeEmbedder;
pub use http::HttpEmbedder;

/// Dimension of the fake embedder when none is configured.
pub const FAKE_DIM: usize = 1024;

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let use_fake = settings.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
    if use_fake {
        info!("using fake embedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dimension.unwrap_or(FAKE_DIM))));
    }
    let embedder = HttpEmbedder::from_settings(settings)?;
    info!(model = %settings.model, host = %settings.host, "using http embedder");
    Ok(Arc::new(embedder))
}
