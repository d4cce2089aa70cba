//! REST implementation of [`AgentProvider`].
//!
//! `RestAgentClient` wraps a `reqwest::Client` and translates the two
//! trait methods into HTTP calls against the agent API. Failures are not
//! retried here: a non-2xx response surfaces its status and body, a
//! transport error surfaces as unreachable, and the caller decides what
//! to do with either.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use uuid::Uuid;

use cm_domain::config::AgentConfig;
use cm_domain::error::{Error, Result};
use cm_domain::trace::TraceEvent;

use crate::provider::AgentProvider;
use crate::types::{ChatRequest, CreateSessionRequest, CreateSessionResponse};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST-based client for the analysis agent.
///
/// Created once and reused for the lifetime of the monitor process; the
/// underlying `reqwest::Client` maintains a connection pool.
#[derive(Debug, Clone)]
pub struct RestAgentClient {
    http: Client,
    base_url: String,
}

impl RestAgentClient {
    /// Build a new client from the shared [`AgentConfig`].
    pub fn new(cfg: &AgentConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::AgentUnreachable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decorate a request with the standard headers.
    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("Accept", "application/json")
            .header("X-Trace-Id", Uuid::new_v4().to_string())
    }

    /// Send one request, trace it, and map the response into the shared
    /// error taxonomy. Returns the raw body text on 2xx.
    async fn execute(&self, endpoint: &str, rb: RequestBuilder) -> Result<String> {
        let start = Instant::now();
        let result = self.decorate(rb).send().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(resp) => {
                let status = resp.status();
                TraceEvent::AgentCall {
                    endpoint: endpoint.to_owned(),
                    status: status.as_u16(),
                    duration_ms,
                }
                .emit();

                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(Error::AgentRejected {
                        status: status.as_u16(),
                        body,
                    });
                }

                read_body(resp).await
            }
            Err(e) => {
                TraceEvent::AgentCall {
                    endpoint: endpoint.to_owned(),
                    status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    duration_ms,
                }
                .emit();

                Err(Error::AgentUnreachable(e.to_string()))
            }
        }
    }
}

async fn read_body(resp: Response) -> Result<String> {
    resp.text()
        .await
        .map_err(|e| Error::AgentUnreachable(e.to_string()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl AgentProvider for RestAgentClient {
    async fn create_session(&self, owner: &str, description: &str) -> Result<String> {
        let req = CreateSessionRequest {
            owner: owner.to_owned(),
            description: description.to_owned(),
            enhance_prompt: false,
        };

        let url = self.url("/createSession");
        let body = self
            .execute("POST /createSession", self.http.post(&url).json(&req))
            .await?;

        let parsed: CreateSessionResponse = serde_json::from_str(&body).map_err(|e| {
            Error::Other(format!("failed to parse createSession response: {e}: {body}"))
        })?;
        Ok(parsed.session_id)
    }

    async fn chat(&self, session_id: &str, message: &str) -> Result<String> {
        let req = ChatRequest {
            session_id: session_id.to_owned(),
            message: message.to_owned(),
        };

        let url = self.url("/chat");
        self.execute("POST /chat", self.http.post(&url).json(&req))
            .await
    }
}
