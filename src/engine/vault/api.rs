// Mnemo Engine — API Vault Transport
//
// Bearer-token HTTP client for a locally-reachable vault API (the wire
// contract mirrors community REST plugins):
//
//   GET  /vault/              — availability probe
//   GET  /vault/notes         — [{path, modified?}]
//   GET  /vault/note?path=P   — {content} | 404
//   POST /vault/create        — {path, content}
//   POST /vault/update        — {path, content}
//   POST /vault/rename        — {from, to}
//   GET  /vault/search?query=Q — [{path, snippet}]
//
// Pure outbound HTTP with bounded timeouts; identical logical semantics to
// the filesystem transport.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::atoms::constants::{VAULT_API_PROBE_TIMEOUT_SECS, VAULT_API_REQUEST_TIMEOUT_SECS};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::VaultTransport;
use crate::atoms::types::{NoteMatch, NoteSummary, TransportKind, VaultConfig, VaultNote};
use crate::engine::vault::note_from_content;

pub struct ApiTransport {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiTransport {
    pub fn new(config: &VaultConfig) -> Self {
        ApiTransport {
            client: Client::new(),
            base_url: format!("http://{}:{}", config.api_host, config.api_port),
            token: config.api_token.clone(),
        }
    }

    /// One-shot availability probe with a short timeout. Run once at
    /// startup to pick the transport for the session.
    pub async fn probe(&self) -> bool {
        let url = format!("{}/vault/", self.base_url);
        let ok = match self
            .request(reqwest::Method::GET, &url)
            .timeout(Duration::from_secs(VAULT_API_PROBE_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("[vault] api probe failed: {}", e);
                false
            }
        };
        ok
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .timeout(Duration::from_secs(VAULT_API_REQUEST_TIMEOUT_SECS))
    }

    async fn post_ok(&self, endpoint: &str, body: Value) -> EngineResult<()> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::VaultUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(EngineError::VaultUnavailable(format!("{} {} — {}", endpoint, status, text)));
        }
        Ok(())
    }
}

#[async_trait]
impl VaultTransport for ApiTransport {
    async fn list_notes(&self) -> EngineResult<Vec<NoteSummary>> {
        let url = format!("{}/vault/notes", self.base_url);
        let resp = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| EngineError::VaultUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(EngineError::VaultUnavailable(format!("list_notes {}", resp.status())));
        }
        let notes: Vec<NoteSummary> = resp.json().await?;
        Ok(notes)
    }

    async fn get_note(&self, path: &str) -> EngineResult<Option<VaultNote>> {
        let url = format!("{}/vault/note", self.base_url);
        let resp = self
            .request(reqwest::Method::GET, &url)
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| EngineError::VaultUnavailable(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(EngineError::VaultUnavailable(format!("get_note {}", resp.status())));
        }

        let v: Value = resp.json().await?;
        let content = v["content"]
            .as_str()
            .ok_or_else(|| EngineError::malformed(path, "no 'content' field in API response"))?;
        Ok(Some(note_from_content(path, content.to_string(), None)))
    }

    async fn create_note(&self, path: &str, content: &str) -> EngineResult<()> {
        self.post_ok("/vault/create", json!({ "path": path, "content": content })).await
    }

    async fn update_note(&self, path: &str, content: &str) -> EngineResult<()> {
        self.post_ok("/vault/update", json!({ "path": path, "content": content })).await
    }

    async fn search_notes(&self, query: &str) -> EngineResult<Vec<NoteMatch>> {
        let url = format!("{}/vault/search", self.base_url);
        let resp = self
            .request(reqwest::Method::GET, &url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| EngineError::VaultUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(EngineError::VaultUnavailable(format!("search_notes {}", resp.status())));
        }
        let matches: Vec<NoteMatch> = resp.json().await?;
        Ok(matches)
    }

    async fn rename_note(&self, from: &str, to: &str) -> EngineResult<()> {
        self.post_ok("/vault/rename", json!({ "from": from, "to": to })).await
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Api
    }
}
