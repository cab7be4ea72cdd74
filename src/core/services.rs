//! Implementations for the service the app needs.
//!

use crate::core::client::InferenceClient;
use crate::core::offload::OffloadBridge;
use crate::core::prompts::{Intent, Role};
use crate::core::traits::{TutorError, TutorService};
use async_trait::async_trait;
use di::{Ref, injectable};
use log::info;

#[injectable(TutorService)]
pub struct MyTutorService {
    bridge: Ref<OffloadBridge>,
    client: Ref<InferenceClient>,
}

#[async_trait]
impl TutorService for MyTutorService {
    async fn answer_question(&self, question: String) -> Result<String, TutorError> {
        let client = self.client.clone();
        let answer = self
            .bridge
            .run_fallible(move || client.respond(Role::Tutor, &question))
            .await??;

        info!("Response sent: {answer}");
        Ok(answer)
    }

    async fn classify_intent(&self, question: String) -> Result<Intent, TutorError> {
        let client = self.client.clone();
        let intent = self
            .bridge
            .run_fallible(move || client.classify(&question))
            .await??;

        info!("Classified question as {intent:?}");
        Ok(intent)
    }
}
