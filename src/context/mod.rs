// src/context/mod.rs

use std::time::Duration;
use thiserror::Error;

pub const API_KEY_VAR: &str = "HUGGINGFACE_API_KEY";
pub const MODEL_URL_VAR: &str = "TASKPILOT_MODEL_URL";
pub const FALLBACK_URL_VAR: &str = "TASKPILOT_FALLBACK_URL";
pub const REQUEST_TIMEOUT_VAR: &str = "TASKPILOT_REQUEST_TIMEOUT_SECS";
pub const EXEC_TIMEOUT_VAR: &str = "TASKPILOT_EXEC_TIMEOUT_SECS";

pub const DEFAULT_MODEL_URL: &str =
    "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.2";
pub const DEFAULT_FALLBACK_URL: &str =
    "https://api-inference.huggingface.co/models/TinyLlama/TinyLlama-1.1B-Chat-v1.0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("HUGGINGFACE_API_KEY is not set; export it or add it to a .env file")]
    MissingApiKey,

    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Shell flavour the generated commands are rewritten for and run under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetShell {
    Windows,
    Posix,
}

impl TargetShell {
    pub fn host() -> Self {
        if cfg!(windows) {
            TargetShell::Windows
        } else {
            TargetShell::Posix
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TargetShell::Windows => "Windows",
            TargetShell::Posix => "POSIX",
        }
    }
}

/// Runtime configuration for a taskpilot session: endpoints, credentials and limits.
#[derive(Clone, Debug)]
pub struct Context {
    pub api_key: String,
    pub model_url: String,
    pub fallback_url: String,
    pub request_timeout: Duration,
    pub exec_timeout: Duration,
    pub target: TargetShell,
    pub dry_run: bool,
}

impl Context {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.into(),
            model_url: DEFAULT_MODEL_URL.into(),
            fallback_url: DEFAULT_FALLBACK_URL.into(),
            request_timeout: Duration::from_secs(30),
            exec_timeout: Duration::from_secs(30),
            target: TargetShell::host(),
            dry_run: false,
        }
    }

    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a context from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let mut context = Self::new(&api_key);

        if let Some(url) = non_blank(lookup(MODEL_URL_VAR)) {
            context.model_url = url;
        }
        if let Some(url) = non_blank(lookup(FALLBACK_URL_VAR)) {
            context.fallback_url = url;
        }
        if let Some(raw) = non_blank(lookup(REQUEST_TIMEOUT_VAR)) {
            context.request_timeout = parse_secs(REQUEST_TIMEOUT_VAR, &raw)?;
        }
        if let Some(raw) = non_blank(lookup(EXEC_TIMEOUT_VAR)) {
            context.exec_timeout = parse_secs(EXEC_TIMEOUT_VAR, &raw)?;
        }

        Ok(context)
    }

    pub fn with_model_url(mut self, url: &str) -> Self {
        self.model_url = url.into();
        self
    }

    pub fn with_fallback_url(mut self, url: &str) -> Self {
        self.fallback_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    pub fn with_target(mut self, target: TargetShell) -> Self {
        self.target = target;
        self
    }

    pub fn enable_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_secs(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}
