//! TTS backend implementations.

mod command;
mod http;

pub use command::CommandTts;
pub use http::HttpTts;

use std::sync::Arc;

use redub_config::{TtsBackendKind, TtsConfig};
use redub_core::TtsBackend;
use redub_media::MediaTool;

/// Construct the configured backend.
pub fn create_backend(cfg: &TtsConfig, media: MediaTool) -> Arc<dyn TtsBackend> {
    match cfg.backend {
        TtsBackendKind::Http => Arc::new(HttpTts::new(
            cfg.server_url.clone(),
            std::time::Duration::from_secs(cfg.timeout_secs),
            media,
        )),
        TtsBackendKind::Command => Arc::new(CommandTts::new(cfg.command.clone(), media)),
    }
}
