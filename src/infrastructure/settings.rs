//! Process configuration, read from the environment

use crate::core::offload::{DEFAULT_WORKERS, OffloadPolicy};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3:8b";
pub const DEFAULT_CONTEXT_SIZE: u32 = 2048;
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173";

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid value {value:?} for {key}")]
pub struct SettingsError {
    key: &'static str,
    value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_address: SocketAddr,
    pub ollama_url: String,
    pub model: String,
    pub context_size: u32,
    pub offload: OffloadPolicy,
    pub cors_origins: Vec<String>,
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_address = parse_value(
            "BIND_ADDRESS",
            get("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_owned()),
        )?;
        let context_size =
            parse("CONTEXT_SIZE", get("CONTEXT_SIZE"))?.unwrap_or(DEFAULT_CONTEXT_SIZE);
        let workers = parse("OFFLOAD_WORKERS", get("OFFLOAD_WORKERS"))?.unwrap_or(DEFAULT_WORKERS);
        let timeout = match get("OFFLOAD_TIMEOUT_SECS") {
            Some(value) => match parse_value::<u64>("OFFLOAD_TIMEOUT_SECS", value.clone())? {
                0 => {
                    return Err(SettingsError {
                        key: "OFFLOAD_TIMEOUT_SECS",
                        value,
                    });
                }
                secs => Some(Duration::from_secs(secs)),
            },
            None => None,
        };

        let cors_origins = get("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_owned())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Settings {
            bind_address,
            ollama_url: get("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_owned())
                .trim_end_matches('/')
                .to_owned(),
            model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            context_size,
            offload: OffloadPolicy { workers, timeout },
            cors_origins,
        })
    }
}

fn parse<T: FromStr>(key: &'static str, value: Option<String>) -> Result<Option<T>, SettingsError> {
    value.map(|value| parse_value(key, value)).transpose()
}

fn parse_value<T: FromStr>(key: &'static str, value: String) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError { key, value })
}
