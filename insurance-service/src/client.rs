use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::InsurerError;
use crate::models::{BatchAck, BatchPayload, ClaimPayload, RemoteStatus, SubmissionAck};

/// Insurer API contract
///
/// Every transport failure, timeout and non-2xx answer comes back as an
/// [`InsurerError`]; implementations never panic on a bad response.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InsurerClient: Send + Sync {
    /// `POST /claims/submit`
    async fn submit_claim(&self, payload: &ClaimPayload) -> Result<SubmissionAck, InsurerError>;

    /// `POST /claims/batch-submit`
    async fn submit_batch(&self, payload: &BatchPayload) -> Result<BatchAck, InsurerError>;

    /// `GET /claims/status/:reference`
    async fn claim_status(&self, reference: &str) -> Result<RemoteStatus, InsurerError>;

    /// `GET /claims/batch-status/:batch_number`
    async fn batch_status(&self, batch_number: &str) -> Result<BatchAck, InsurerError>;
}

/// Connection settings for the insurer API
#[derive(Debug, Clone)]
pub struct InsurerSettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub provider_code: String,
    pub timeout: Duration,
}

/// reqwest-backed insurer client
pub struct HttpInsurerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    provider_code: String,
    timeout: Duration,
}

impl HttpInsurerClient {
    pub fn new(settings: InsurerSettings) -> Result<Self, InsurerError> {
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(InsurerError::Config("insurer base URL is empty".into()));
        }
        if settings.provider_code.trim().is_empty() {
            return Err(InsurerError::Config("provider code is empty".into()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key,
            provider_code: settings.provider_code,
            timeout: settings.timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(self.api_key.expose_secret())
            .header("X-Provider-Code", &self.provider_code)
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Value, InsurerError> {
        let response = self.authorized(request).send().await.map_err(|e| {
            if e.is_timeout() {
                InsurerError::Timeout(self.timeout)
            } else {
                InsurerError::Network(e)
            }
        })?;
        self.handle_response(response, what).await
    }

    /// Turn an HTTP answer into a JSON body or the matching error
    async fn handle_response(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<Value, InsurerError> {
        match response.status() {
            status if status.is_success() => {
                let text = response.text().await?;
                if text.trim().is_empty() {
                    return Err(InsurerError::MalformedResponse(format!(
                        "empty body for {what}"
                    )));
                }
                Ok(serde_json::from_str(&text)?)
            }
            reqwest::StatusCode::NOT_FOUND => Err(InsurerError::NotFound(what.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(InsurerError::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl InsurerClient for HttpInsurerClient {
    async fn submit_claim(&self, payload: &ClaimPayload) -> Result<SubmissionAck, InsurerError> {
        let request = self.client.post(self.url("claims/submit")).json(payload);
        let body = self
            .send(request, &format!("claim {}", payload.claim_number))
            .await?;
        SubmissionAck::from_body(body)
    }

    async fn submit_batch(&self, payload: &BatchPayload) -> Result<BatchAck, InsurerError> {
        let request = self.client.post(self.url("claims/batch-submit")).json(payload);
        let body = self
            .send(request, &format!("batch {}", payload.batch_number))
            .await?;
        BatchAck::from_body(body)
    }

    async fn claim_status(&self, reference: &str) -> Result<RemoteStatus, InsurerError> {
        let request = self
            .client
            .get(self.url(&format!("claims/status/{reference}")));
        let body = self.send(request, &format!("claim {reference}")).await?;
        RemoteStatus::from_body(body)
    }

    async fn batch_status(&self, batch_number: &str) -> Result<BatchAck, InsurerError> {
        let request = self
            .client
            .get(self.url(&format!("claims/batch-status/{batch_number}")));
        let body = self.send(request, &format!("batch {batch_number}")).await?;
        BatchAck::from_body(body)
    }
}

// ============================================================================
// SCRIPTED CLIENT
// ============================================================================

/// Next answer of a [`ScriptedInsurerClient`] submission call
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Answer 2xx with this body
    Accept(Value),
    /// Answer with a non-2xx status
    Reject { status: u16, body: String },
    /// Never answer; the caller's timeout decides
    Hang,
}

/// In-process insurer used by tests and local runs without network access
///
/// Submissions consume queued [`ScriptedReply`]s; with an empty queue every
/// submission is accepted with a generated reference. Status lookups answer
/// from the records registered with [`set_claim_status`](Self::set_claim_status)
/// and [`set_batch_status`](Self::set_batch_status), and `NotFound` otherwise.
#[derive(Debug, Default)]
pub struct ScriptedInsurerClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    claim_statuses: Mutex<HashMap<String, Value>>,
    batch_statuses: Mutex<HashMap<String, Value>>,
    received: Mutex<Vec<Value>>,
    issued: AtomicU64,
    status_outage: AtomicBool,
}

impl ScriptedInsurerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        self.replies.lock().push_back(reply);
    }

    /// Register the body returned for `GET /claims/status/:key`
    pub fn set_claim_status(&self, key: impl Into<String>, body: Value) {
        self.claim_statuses.lock().insert(key.into(), body);
    }

    /// Register the body returned for `GET /claims/batch-status/:batch_number`
    pub fn set_batch_status(&self, batch_number: impl Into<String>, body: Value) {
        self.batch_statuses.lock().insert(batch_number.into(), body);
    }

    /// While set, status lookups answer 503 as an unreachable insurer would
    pub fn set_status_outage(&self, down: bool) {
        self.status_outage.store(down, Ordering::SeqCst);
    }

    fn check_outage(&self) -> Result<(), InsurerError> {
        if self.status_outage.load(Ordering::SeqCst) {
            return Err(InsurerError::Rejected {
                status: 503,
                body: "service unavailable".into(),
            });
        }
        Ok(())
    }

    /// Submission payloads received so far, oldest first
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    fn next_reference(&self, prefix: &str) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n:08}")
    }

    async fn reply(&self, payload: Value, default: impl FnOnce() -> Value) -> Result<Value, InsurerError> {
        self.received.lock().push(payload);
        let next = self.replies.lock().pop_front();
        match next {
            None => Ok(default()),
            Some(ScriptedReply::Accept(body)) => Ok(body),
            Some(ScriptedReply::Reject { status, body }) => {
                Err(InsurerError::Rejected { status, body })
            }
            Some(ScriptedReply::Hang) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl InsurerClient for ScriptedInsurerClient {
    async fn submit_claim(&self, payload: &ClaimPayload) -> Result<SubmissionAck, InsurerError> {
        let body = self
            .reply(serde_json::to_value(payload)?, || {
                serde_json::json!({ "reference": self.next_reference("SHA") })
            })
            .await?;
        SubmissionAck::from_body(body)
    }

    async fn submit_batch(&self, payload: &BatchPayload) -> Result<BatchAck, InsurerError> {
        let body = self
            .reply(serde_json::to_value(payload)?, || {
                let claims: Vec<Value> = payload
                    .claims
                    .iter()
                    .map(|claim| {
                        serde_json::json!({
                            "claim_number": claim.claim_number,
                            "reference": self.next_reference("SHA"),
                        })
                    })
                    .collect();
                serde_json::json!({
                    "batch_reference": self.next_reference("SHA-B"),
                    "claims": claims,
                })
            })
            .await?;
        BatchAck::from_body(body)
    }

    async fn claim_status(&self, reference: &str) -> Result<RemoteStatus, InsurerError> {
        self.check_outage()?;
        let body = self.claim_statuses.lock().get(reference).cloned();
        match body {
            Some(body) => RemoteStatus::from_body(body),
            None => Err(InsurerError::NotFound(format!("claim {reference}"))),
        }
    }

    async fn batch_status(&self, batch_number: &str) -> Result<BatchAck, InsurerError> {
        self.check_outage()?;
        let body = self.batch_statuses.lock().get(batch_number).cloned();
        match body {
            Some(body) => BatchAck::from_body(body),
            None => Err(InsurerError::NotFound(format!("batch {batch_number}"))),
        }
    }
}
