//! Runtime settings for the intake server.
//!
//! Values come from the process environment (after `.env` is loaded by the
//! binary). `ENV=prod` switches the defaults to the production profile.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::net::TcpListener;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.fireworks.ai/inference/v1";

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const PROD_CORS_ORIGINS: &[&str] = &[
    "https://platform.neutrinoapp.com",
    "https://www.neutrinoapp.com",
];

const DEFAULT_CLASSIFICATION_MODELS: &[&str] = &[
    "accounts/fireworks/models/llama-v3p2-11b-vision-instruct",
    "accounts/fireworks/models/llama-v3p2-90b-vision-instruct",
];

const DEFAULT_EXTRACTION_MODELS: &[&str] = &[
    "accounts/fireworks/models/llama-v3p2-90b-vision-instruct",
    "accounts/fireworks/models/llama-v3p2-11b-vision-instruct",
];

/// Deployment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            _ => Self::Dev,
        }
    }
}

/// Which origins may call the API from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

impl CorsOrigins {
    fn parse(raw: &str) -> Self {
        let origins: Vec<String> = split_list(raw);
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            Self::Any
        } else {
            Self::List(origins)
        }
    }
}

/// Settings for the HTTP server, storage and the vision model.
#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub host: String,
    pub port: u16,
    pub cors_origins: CorsOrigins,
    /// Base URL clients use to reach this server; image URLs are built from it.
    pub public_base_url: String,
    pub data_dir: PathBuf,
    /// Write a JSON snapshot of document records under `data_dir`.
    pub persist_documents: bool,
    pub max_upload_bytes: usize,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub classification_models: Vec<String>,
    pub extraction_models: Vec<String>,
}

impl Settings {
    /// Read settings from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = lookup("ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Dev);

        let port = match lookup("API_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("API_PORT is not a valid port: {raw}"))?,
            None => DEFAULT_PORT,
        };

        let host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let cors_origins = match (lookup("CORS_ORIGIN_WHITELIST"), env) {
            (Some(raw), _) => CorsOrigins::parse(&raw),
            (None, Environment::Prod) => {
                CorsOrigins::List(PROD_CORS_ORIGINS.iter().map(|s| s.to_string()).collect())
            }
            (None, Environment::Dev) => CorsOrigins::Any,
        };

        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "data".to_string()));

        let persist_documents = match lookup("PERSIST_DOCUMENTS") {
            Some(raw) => parse_bool(&raw)
                .with_context(|| format!("PERSIST_DOCUMENTS is not a boolean: {raw}"))?,
            None => true,
        };

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("MAX_UPLOAD_BYTES is not a number: {raw}"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let api_key = lookup("FIREWORKS_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .context("FIREWORKS_API_KEY environment variable not set")?;

        let llm = LlmSettings {
            base_url: lookup("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            classification_models: models_or_default(
                lookup("CLASSIFICATION_MODELS"),
                DEFAULT_CLASSIFICATION_MODELS,
            ),
            extraction_models: models_or_default(
                lookup("EXTRACTION_MODELS"),
                DEFAULT_EXTRACTION_MODELS,
            ),
        };

        Ok(Self {
            env,
            host,
            port,
            cors_origins,
            public_base_url,
            data_dir,
            persist_documents,
            max_upload_bytes,
            llm,
        })
    }

    /// Bind the server socket. `host` may be an IP address or a hostname.
    pub async fn listen(&self) -> Result<TcpListener> {
        TcpListener::bind((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", self.host, self.port))
    }

    pub fn documents_snapshot_path(&self) -> Option<PathBuf> {
        self.persist_documents
            .then(|| self.data_dir.join("documents.json"))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn models_or_default(raw: Option<String>, defaults: &[&str]) -> Vec<String> {
    let models = raw.map(|r| split_list(&r)).unwrap_or_default();
    if models.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        models
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
