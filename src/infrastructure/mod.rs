pub mod ollama;
pub mod settings;
pub mod traits;
