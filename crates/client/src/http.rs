//! [`LockTransport`] over the `editlock-api` HTTP surface, using [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use editlock_core::conflict::{SaveAttempt, SaveOutcome};
use editlock_core::lock::{AcquireOutcome, LockStatus, RefreshOutcome, ReleaseOutcome};
use editlock_core::protocol::{lock_path, save_path, DataResponse, ErrorBody, SaveRequest};
use editlock_core::types::RecordId;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::transport::{LockTransport, ReleaseMode, TransportError};

/// Upper bound on a fire-and-forget release.
const BEST_EFFORT_RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP client bound to one record and one bearer token.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
    record_id: RecordId,
}

impl HttpTransport {
    /// * `base_url` - Server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, record_id: RecordId) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token, record_id)
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling across
    /// sessions).
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        record_id: RecordId,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            record_id,
        }
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    fn lock_url(&self, action: Option<&str>) -> String {
        format!("{}{}", self.base_url, lock_path(&self.record_id, action))
    }

    // ---- private helpers ----

    /// Decode `{ "data": T }` from a success response or from one of the
    /// statuses the endpoint uses for protocol outcomes (409, 404). Anything
    /// else becomes [`TransportError::Server`].
    async fn read_data<T: DeserializeOwned>(
        response: reqwest::Response,
        outcome_statuses: &[StatusCode],
    ) -> Result<T, TransportError> {
        let status = response.status();
        let bytes = response.bytes().await?;

        match serde_json::from_slice::<DataResponse<T>>(&bytes) {
            Ok(body) if status.is_success() || outcome_statuses.contains(&status) => Ok(body.data),
            Err(e) if status.is_success() => Err(TransportError::Decode(e)),
            _ => Err(Self::server_error(status, &bytes)),
        }
    }

    fn server_error(status: StatusCode, body: &[u8]) -> TransportError {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(err) => TransportError::Server {
                status: status.as_u16(),
                code: err.code,
                message: err.error,
            },
            Err(_) => TransportError::Server {
                status: status.as_u16(),
                code: "UNKNOWN".to_string(),
                message: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }
}

#[async_trait]
impl LockTransport for HttpTransport {
    async fn acquire(&self) -> Result<AcquireOutcome, TransportError> {
        let response = self
            .client
            .post(self.lock_url(Some("acquire")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::read_data(response, &[]).await
    }

    async fn refresh(&self) -> Result<RefreshOutcome, TransportError> {
        let response = self
            .client
            .post(self.lock_url(Some("refresh")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::read_data(response, &[StatusCode::CONFLICT, StatusCode::NOT_FOUND]).await
    }

    async fn release(&self, mode: ReleaseMode) -> Result<ReleaseOutcome, TransportError> {
        let mut request = self
            .client
            .post(self.lock_url(Some("release")))
            .bearer_auth(&self.token);
        if mode == ReleaseMode::BestEffort {
            request = request.timeout(BEST_EFFORT_RELEASE_TIMEOUT);
        }

        let response = request.send().await?;
        Self::read_data(response, &[]).await
    }

    async fn inspect(&self) -> Result<LockStatus, TransportError> {
        let response = self
            .client
            .get(self.lock_url(None))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::read_data(response, &[]).await
    }

    async fn save(
        &self,
        attempt: &SaveAttempt,
        force: bool,
    ) -> Result<SaveOutcome, TransportError> {
        let body = SaveRequest {
            attempt: attempt.clone(),
            force,
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, save_path(&self.record_id)))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        Self::read_data(response, &[StatusCode::CONFLICT]).await
    }
}
