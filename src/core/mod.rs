pub mod client;
pub mod offload;
pub mod prompts;
pub mod services;
pub mod traits;
