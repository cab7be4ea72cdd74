//! Infrastructure traits, used for DI on higher levels

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend answered with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Sampling parameters sent along with a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub num_ctx: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// A text completion backend.
///
/// Implementations block the calling thread until the full completion is
/// available, so they must only be called from an offload worker.
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, BackendError>;
}
