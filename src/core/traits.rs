//! DI "Interfaces"

use crate::core::client::InferenceError;
use crate::core::offload::OffloadError;
use crate::core::prompts::Intent;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    #[error(transparent)]
    Offload(#[from] OffloadError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[async_trait]
pub trait TutorService: Send + Sync {
    /// Answers a student's question with the tutor prompt.
    ///
    /// Returns `Err` if the backend failed or the call could not be run on
    /// the offload bridge.
    async fn answer_question(&self, question: String) -> Result<String, TutorError>;

    /// Classifies what kind of question the student asked.
    async fn classify_intent(&self, question: String) -> Result<Intent, TutorError>;
}
