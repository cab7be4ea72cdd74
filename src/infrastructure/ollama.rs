//! Ollama completion backend

use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{BackendError, GenerationOptions, LanguageModel};
use di::{Ref, inject, injectable};
use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

#[derive(Serialize, Debug)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerationOptions,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    response: String,
}

/// Talks to a local Ollama server over its `/api/generate` endpoint.
pub struct OllamaBackend {
    endpoint: String,
    model: String,
    // Built on first use so it is created on a worker thread, never on the runtime.
    client: OnceLock<Client>,
}

#[injectable(LanguageModel)]
impl OllamaBackend {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> OllamaBackend {
        OllamaBackend::new(&settings.ollama_url, &settings.model)
    }
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_owned(),
            client: OnceLock::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn client(&self) -> Result<&Client, BackendError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }

        // No client-side timeout; generation can legitimately take minutes.
        let client = Client::builder().timeout(None::<Duration>).build()?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl LanguageModel for OllamaBackend {
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, BackendError> {
        let started = Instant::now();

        let response = self
            .client()?
            .post(&self.endpoint)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let completion: GenerateResponse = response.json()?;
        debug!(
            "{} generated {} chars in {:.2}s",
            self.model,
            completion.response.len(),
            started.elapsed().as_secs_f32()
        );

        Ok(completion.response)
    }
}
