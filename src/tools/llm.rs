// src/tools/llm.rs

use crate::context::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("rate limit reached")]
    RateLimited,

    #[error("inference endpoint returned HTTP {0}")]
    Status(u16),

    #[error("unexpected response format: {0}")]
    MalformedResponse(String),
}

/// Status line and body of an HTTP reply.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// The HTTP seam: posts a JSON body with bearer auth.
pub trait Transport {
    fn post_json(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<HttpReply, ClientError>;
}

/// Blocking reqwest transport.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ReqwestTransport {
    fn post_json(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<HttpReply, ClientError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(body)
            .timeout(timeout)
            .send()
            .map_err(|err| ClientError::Network(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| ClientError::Network(err.to_string()))?;
        Ok(HttpReply { status, body })
    }
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct GenerationParams {
    pub max_length: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub return_full_text: bool,
}

impl GenerationParams {
    pub fn plan() -> Self {
        Self {
            max_length: 800,
            temperature: 0.1,
            top_p: 0.9,
            return_full_text: false,
        }
    }

    pub fn script() -> Self {
        Self {
            max_length: 1000,
            ..Self::plan()
        }
    }
}

/// Fixed-delay retry settings for readiness probes and rate limits.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub rate_limit_delay: Duration,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            rate_limit_delay: Duration::from_secs(10),
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            rate_limit_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
        }
    }
}

#[derive(Deserialize)]
struct Generation {
    generated_text: String,
}

/// Client for a text-generation inference endpoint with a fallback model.
pub struct LLMClient<T: Transport = ReqwestTransport> {
    transport: T,
    api_key: String,
    url: String,
    fallback_url: String,
    timeout: Duration,
    policy: RetryPolicy,
}

impl LLMClient<ReqwestTransport> {
    pub fn from_context(context: &Context) -> Self {
        Self::with_transport(ReqwestTransport::new(), context)
    }
}

impl<T: Transport> LLMClient<T> {
    pub fn with_transport(transport: T, context: &Context) -> Self {
        Self {
            transport,
            api_key: context.api_key.clone(),
            url: context.model_url.clone(),
            fallback_url: context.fallback_url.clone(),
            timeout: context.request_timeout,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// URL requests currently go to; changes once the fallback model is engaged.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn using_fallback(&self) -> bool {
        self.url == self.fallback_url
    }

    /// Probes the endpoint until it answers 200. After the configured number
    /// of failed probes the client switches to the fallback model for good.
    pub fn ensure_ready(&mut self) {
        if self.using_fallback() {
            return;
        }
        let probe = json!({ "inputs": "test", "parameters": { "max_length": 10 } });

        for attempt in 1..=self.policy.attempts {
            match self
                .transport
                .post_json(&self.url, &self.api_key, &probe, self.timeout)
            {
                Ok(reply) if reply.status == 200 => {
                    debug!(url = %self.url, attempt, "model ready");
                    return;
                }
                Ok(reply) if reply.status == 429 => {
                    warn!(
                        attempt,
                        delay = ?self.policy.rate_limit_delay,
                        "rate limit reached while probing model"
                    );
                    thread::sleep(self.policy.rate_limit_delay);
                }
                Ok(reply) => {
                    warn!(attempt, status = reply.status, "model not ready");
                    thread::sleep(self.policy.retry_delay);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "error checking model status");
                    thread::sleep(self.policy.retry_delay);
                }
            }
        }

        info!(fallback = %self.fallback_url, "primary model unavailable, switching to fallback model");
        self.url = self.fallback_url.clone();
    }

    /// Sends one generation request and returns the generated text.
    pub fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String, ClientError> {
        let payload = json!({
            "inputs": prompt,
            "parameters": params,
        });

        debug!(url = %self.url, prompt_len = prompt.len(), "sending generation request");
        let reply = self
            .transport
            .post_json(&self.url, &self.api_key, &payload, self.timeout)?;

        match reply.status {
            429 => return Err(ClientError::RateLimited),
            200..=299 => {}
            status => return Err(ClientError::Status(status)),
        }

        let generations: Vec<Generation> = serde_json::from_str(&reply.body)
            .map_err(|err| ClientError::MalformedResponse(err.to_string()))?;
        generations
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| ClientError::MalformedResponse("empty generation list".into()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned replies in order and records every request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: RefCell<VecDeque<Result<HttpReply, ClientError>>>,
        pub requests: RefCell<Vec<(String, Value)>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, status: u16, body: &str) -> Self {
            self.replies.borrow_mut().push_back(Ok(HttpReply {
                status,
                body: body.to_string(),
            }));
            self
        }

        pub fn fail(self, error: ClientError) -> Self {
            self.replies.borrow_mut().push_back(Err(error));
            self
        }

        pub fn urls(&self) -> Vec<String> {
            self.requests
                .borrow()
                .iter()
                .map(|(url, _)| url.clone())
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn post_json(
            &self,
            url: &str,
            _api_key: &str,
            body: &Value,
            _timeout: Duration,
        ) -> Result<HttpReply, ClientError> {
            self.requests
                .borrow_mut()
                .push((url.to_string(), body.clone()));
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::Network("no scripted reply".into())))
        }
    }

    pub fn generated(text: &str) -> String {
        json!([{ "generated_text": text }]).to_string()
    }
}
