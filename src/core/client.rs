//! Inference client: renders a role prompt and asks the language model.
//!
//! Everything here is synchronous and may block for as long as the backend
//! takes, so it is only ever called through the offload bridge.

use crate::core::prompts::{Intent, PromptBook, PromptError, Role};
use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{BackendError, GenerationOptions, LanguageModel};
use di::{Ref, inject, injectable};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct InferenceClient {
    prompts: PromptBook,
    model: Ref<dyn LanguageModel>,
    context_size: u32,
}

#[injectable]
impl InferenceClient {
    #[inject]
    pub fn create(model: Ref<dyn LanguageModel>, settings: Ref<Settings>) -> InferenceClient {
        InferenceClient::new(model, settings.context_size)
    }
}

impl InferenceClient {
    pub fn new(model: Ref<dyn LanguageModel>, context_size: u32) -> Self {
        Self {
            prompts: PromptBook::new(),
            model,
            context_size,
        }
    }

    pub fn options(&self, role: Role) -> GenerationOptions {
        let preset = role.preset();
        GenerationOptions {
            temperature: preset.temperature,
            num_ctx: self.context_size,
            num_predict: preset.max_tokens,
        }
    }

    pub fn respond(&self, role: Role, question: &str) -> Result<String, InferenceError> {
        let prompt = self.prompts.render(role, question)?;
        debug!("sending {} prompt ({} chars)", role, prompt.len());

        Ok(self.model.generate(&prompt, &self.options(role))?)
    }

    pub fn classify(&self, question: &str) -> Result<Intent, InferenceError> {
        let reply = self.respond(Role::IntentClassifier, question)?;
        Ok(Intent::from_reply(&reply))
    }
}
