// Mnemo Engine — OpenAI-Compatible Completion Backend
//
// POST {base_url}/chat/completions with a system + user message pair.
// Works against OpenAI, Ollama (/v1), OpenRouter, and any other server
// speaking the same wire format. Failures map to BackendUnavailable so
// callers degrade instead of aborting the turn.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::CompletionBackend;
use crate::atoms::types::CompletionConfig;

const COMPLETION_TIMEOUT_SECS: u64 = 60;

pub struct OpenAiCompatibleBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: &CompletionConfig) -> Self {
        OpenAiCompatibleBackend {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleBackend {
    async fn complete(&self, system_prompt: &str, prompt: &str) -> EngineResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": prompt },
            ],
        });

        let mut request = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(COMPLETION_TIMEOUT_SECS));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let resp = request.send().await.map_err(|e| {
            EngineError::backend("completion", format!("not reachable at {} — {}", self.base_url, e))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(EngineError::backend("completion", format!("{} — {}", status, text)));
        }

        let v: Value = resp.json().await?;
        let content = v["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| EngineError::backend("completion", "no choices[0].message.content"))?;

        Ok(content.trim().to_string())
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_is_backend_unavailable() {
        let backend = OpenAiCompatibleBackend::new(&CompletionConfig {
            base_url: "http://127.0.0.1:1/v1".into(),
            ..Default::default()
        });
        let err = backend.complete("system", "hello").await.unwrap_err();
        assert!(matches!(err, EngineError::BackendUnavailable { .. }));
    }
}
