use crate::engine::EngineHandle;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use worth_core::ReferenceGallery;

/// Process-wide state shared by every request.
///
/// Built once in `main` before the server starts and never mutated. Dropping
/// the last copy drops the engine handle, which stops the engine thread.
pub struct AppState {
    pub engine: EngineHandle,
    pub gallery: Arc<ReferenceGallery>,
    pub top_k: usize,
    pub model_version: String,
    pub loaded_at: DateTime<Utc>,
    pub max_upload_bytes: usize,
    pub request_timeout: Duration,
}

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub gallery_entries: usize,
    pub embedding_dim: usize,
    pub gallery_fingerprint: String,
    pub drifted_embeddings: usize,
    pub top_k: usize,
    pub model_version: String,
    pub loaded_at: DateTime<Utc>,
}

impl AppState {
    pub fn status(&self) -> StatusReport {
        StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            gallery_entries: self.gallery.len(),
            embedding_dim: self.gallery.dim(),
            gallery_fingerprint: self.gallery.fingerprint().to_string(),
            drifted_embeddings: self.gallery.norm_stats().drifted,
            top_k: self.top_k,
            model_version: self.model_version.clone(),
            loaded_at: self.loaded_at,
        }
    }
}
