//! Upstream chat platform adapter.
//!
//! Wraps the platform's private JSONP/HTTP endpoints: identity lookup, the
//! bootstrap pipeline, activity ping and presence report. The adapter keeps
//! no state of its own beyond the HTTP client and endpoint configuration.
//!
//! # Security
//!
//! - The session cookie is only ever exposed when building the `Cookie`
//!   header; it is skipped in every span
//! - Every request is bounded by the configured timeout
//! - Upstream failures are mapped to `PkError` variants and never panic

use crate::config::{BrowserHeaders, Config, UpstreamEndpoints};
use crate::errors::PkError;
use crate::models::ExternalIdentity;
use crate::observability::metrics::record_upstream_request;
use crate::services::bootstrap::{
    run_pipeline, BootstrapPipeline, BootstrapStep, JoinOutcome, StepContext, StepExecutor,
    StepMethod,
};
use async_trait::async_trait;
use chrono::Utc;
use common::jsonp::{callback_name, parse_jsonp, Envelope};
use common::secret::{ExposeSecret, SecretString};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Connect timeout for upstream requests.
const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations the session controller needs from the upstream platform.
#[async_trait]
pub trait PresenceAdapter: Send + Sync {
    /// Resolve the account behind `credential`.
    async fn lookup_identity(&self, credential: &SecretString)
        -> Result<ExternalIdentity, PkError>;

    /// Run the bootstrap pipeline for `room_id`.
    async fn join_room(
        &self,
        room_id: &str,
        credential: &SecretString,
        identity: &ExternalIdentity,
    ) -> Result<JoinOutcome, PkError>;

    /// Activity ping. `Ok(false)` means the upstream reported the session
    /// as expired.
    async fn ping(&self, room_id: &str, credential: &SecretString) -> Result<bool, PkError>;

    /// Presence report. `Ok(false)` means the upstream did not accept it.
    async fn report(&self, room_id: &str, user_id: &str) -> Result<bool, PkError>;
}

/// reqwest-backed adapter.
#[derive(Clone)]
pub struct HttpPresenceAdapter {
    client: Client,
    endpoints: UpstreamEndpoints,
    pipeline: BootstrapPipeline,
}

impl HttpPresenceAdapter {
    /// Create an adapter from service configuration.
    ///
    /// # Errors
    ///
    /// Returns `PkError::Internal` if a browser header value is not a valid
    /// header or the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, PkError> {
        let client = Client::builder()
            .default_headers(browser_header_map(&config.browser)?)
            .timeout(config.upstream_timeout())
            .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                error!(target: "pk.upstream", error = %e, "Failed to build HTTP client");
                PkError::Internal
            })?;

        Ok(Self {
            client,
            endpoints: config.endpoints.clone(),
            pipeline: config.pipeline.clone(),
        })
    }

    /// Adds `callback` and `_` cache-buster parameters.
    fn with_jsonp_params(request: RequestBuilder) -> RequestBuilder {
        let now = Utc::now().timestamp_millis();
        request.query(&[("callback", callback_name(now)), ("_", now.to_string())])
    }

    fn with_cookie(request: RequestBuilder, credential: &SecretString) -> RequestBuilder {
        request.header(header::COOKIE, credential.expose_secret())
    }

    /// Send a request and read its body, recording upstream metrics.
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(StatusCode, String), PkError> {
        let start = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let status = if e.is_timeout() { "timeout" } else { "network_error" };
                record_upstream_request(operation, status, start.elapsed());
                warn!(target: "pk.upstream", operation, error = %e, "Upstream request failed");
                return Err(e.into());
            }
        };

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            record_upstream_request(operation, "network_error", start.elapsed());
            warn!(target: "pk.upstream", operation, error = %e, "Failed to read upstream body");
            PkError::from(e)
        })?;

        record_upstream_request(operation, categorize_status(status), start.elapsed());
        debug!(target: "pk.upstream", operation, status = %status, "Upstream responded");

        Ok((status, body))
    }
}

#[async_trait]
impl PresenceAdapter for HttpPresenceAdapter {
    #[instrument(skip_all, name = "pk.upstream.lookup_identity")]
    async fn lookup_identity(
        &self,
        credential: &SecretString,
    ) -> Result<ExternalIdentity, PkError> {
        let request = Self::with_jsonp_params(self.client.get(&self.endpoints.identity_url));
        let request = Self::with_cookie(request, credential);

        let (status, body) = self.send("lookup_identity", request).await?;
        ensure_success(status)?;

        let payload = decode_envelope(&body)?;
        identity_from_payload(&payload)
    }

    #[instrument(skip(self, credential, identity), name = "pk.upstream.join_room")]
    async fn join_room(
        &self,
        room_id: &str,
        credential: &SecretString,
        identity: &ExternalIdentity,
    ) -> Result<JoinOutcome, PkError> {
        let ctx = StepContext {
            room_id,
            credential,
            identity,
        };
        run_pipeline(&self.pipeline, self, &ctx).await
    }

    #[instrument(skip(self, credential), name = "pk.upstream.ping")]
    async fn ping(&self, room_id: &str, credential: &SecretString) -> Result<bool, PkError> {
        let request = self
            .client
            .get(&self.endpoints.activity_url)
            .query(&[("cid", room_id), ("from", "1")]);
        let request = Self::with_cookie(Self::with_jsonp_params(request), credential);

        let (status, body) = self.send("ping", request).await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(target: "pk.upstream", status = %status, "Activity ping rejected, session expired");
            return Ok(false);
        }
        ensure_success(status)?;

        // Bodies that are not JSONP still count as a live session.
        match parse_jsonp(&body) {
            Ok(value) => {
                let envelope = Envelope::from_value(&value);
                if !envelope.is_success() {
                    warn!(
                        target: "pk.upstream",
                        code = envelope.code,
                        message = ?envelope.message,
                        "Activity ping reported expired session"
                    );
                }
                Ok(envelope.is_success())
            }
            Err(_) => Ok(true),
        }
    }

    #[instrument(skip(self), name = "pk.upstream.report")]
    async fn report(&self, room_id: &str, user_id: &str) -> Result<bool, PkError> {
        let request = Self::with_jsonp_params(self.client.post(&self.endpoints.report_url))
            .form(&[("cid", room_id), ("uid", user_id)]);

        let (status, body) = self.send("report", request).await?;

        if !status.is_success() {
            warn!(target: "pk.upstream", status = %status, "Presence report not accepted");
            return Ok(false);
        }

        Ok(parse_jsonp(&body)
            .map(|value| Envelope::from_value(&value).is_success())
            .unwrap_or(true))
    }
}

#[async_trait]
impl StepExecutor for HttpPresenceAdapter {
    async fn execute_step(
        &self,
        step: &BootstrapStep,
        ctx: &StepContext<'_>,
        inputs: &[(String, String)],
    ) -> Result<Value, PkError> {
        let mut params: Vec<(String, String)> = vec![
            ("cid".to_string(), ctx.room_id.to_string()),
            ("uid".to_string(), ctx.identity.user_id.clone()),
        ];
        params.extend_from_slice(inputs);

        let request = match step.method {
            StepMethod::Get => Self::with_jsonp_params(self.client.get(&step.url)).query(&params),
            StepMethod::Post => Self::with_jsonp_params(self.client.post(&step.url)).form(&params),
        };
        let request = Self::with_cookie(request, ctx.credential);

        let (status, body) = self.send("bootstrap_step", request).await?;
        ensure_success(status)?;

        decode_envelope(&body)
    }
}

/// Build the default header map sent with every upstream request.
fn browser_header_map(browser: &BrowserHeaders) -> Result<HeaderMap, PkError> {
    let value = |name: &str, raw: &str| {
        HeaderValue::from_str(raw).map_err(|e| {
            error!(target: "pk.upstream", header = name, error = %e, "Invalid browser header value");
            PkError::Internal
        })
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, value("user-agent", &browser.user_agent)?);
    headers.insert(header::REFERER, value("referer", &browser.referer)?);
    headers.insert(header::ORIGIN, value("origin", &browser.origin)?);
    headers.insert(
        header::ACCEPT_LANGUAGE,
        value("accept-language", &browser.accept_language)?,
    );
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    Ok(headers)
}

fn ensure_success(status: StatusCode) -> Result<(), PkError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(PkError::Remote {
            code: i64::from(status.as_u16()),
            message: format!("upstream returned HTTP {}", status.as_u16()),
        })
    }
}

fn categorize_status(status: StatusCode) -> &'static str {
    if status.is_success() {
        "success"
    } else {
        "http_error"
    }
}

/// Decode a JSONP body and reject non-zero application codes.
pub fn decode_envelope(body: &str) -> Result<Value, PkError> {
    let value = parse_jsonp(body)?;
    let envelope = Envelope::from_value(&value);

    if envelope.is_success() {
        Ok(value)
    } else {
        Err(PkError::Remote {
            code: envelope.code,
            message: envelope
                .message
                .unwrap_or_else(|| "upstream reported an error".to_string()),
        })
    }
}

/// Read the identity from an identity lookup payload.
///
/// Accepts `data` as a list (first entry used) or a single object, and
/// `uid` as a string or number.
pub fn identity_from_payload(payload: &Value) -> Result<ExternalIdentity, PkError> {
    let entry = match payload.get("data") {
        Some(Value::Array(items)) => items.first(),
        Some(obj @ Value::Object(_)) => Some(obj),
        _ => None,
    }
    .ok_or_else(|| PkError::Remote {
        code: 0,
        message: "identity lookup returned no user".to_string(),
    })?;

    let user_id = match entry.get("uid") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(PkError::Parse("identity entry has no uid".to_string())),
    };

    let display_name = entry
        .get("nickname")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| user_id.clone());

    Ok(ExternalIdentity {
        user_id,
        display_name,
    })
}

/// Mock adapter module for testing.
///
/// Provides a scriptable [`PresenceAdapter`] with call counters.
pub mod mock {
    use super::*;
    use crate::services::bootstrap::{REPORT_STEP, TOKEN_SLOT};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Mock adapter for unit and integration tests.
    pub struct MockPresenceAdapter {
        identity: Mutex<Result<ExternalIdentity, PkError>>,
        join: Mutex<Result<(), PkError>>,
        join_delay: Mutex<Duration>,
        /// Queued ping results, consumed before falling back to `ping_default`.
        ping_queue: Mutex<VecDeque<Result<bool, PkError>>>,
        ping_default: Mutex<Result<bool, PkError>>,
        report: Mutex<Result<bool, PkError>>,
        lookup_calls: AtomicUsize,
        join_calls: AtomicUsize,
        ping_calls: AtomicUsize,
        report_calls: AtomicUsize,
    }

    impl MockPresenceAdapter {
        /// Create a mock where every operation succeeds.
        pub fn succeeding() -> Self {
            Self {
                identity: Mutex::new(Ok(ExternalIdentity {
                    user_id: "10001".to_string(),
                    display_name: "tester".to_string(),
                })),
                join: Mutex::new(Ok(())),
                join_delay: Mutex::new(Duration::ZERO),
                ping_queue: Mutex::new(VecDeque::new()),
                ping_default: Mutex::new(Ok(true)),
                report: Mutex::new(Ok(true)),
                lookup_calls: AtomicUsize::new(0),
                join_calls: AtomicUsize::new(0),
                ping_calls: AtomicUsize::new(0),
                report_calls: AtomicUsize::new(0),
            }
        }

        /// Create a mock whose identity lookup is rejected.
        pub fn rejecting_identity(message: &str) -> Self {
            Self::succeeding().with_identity_result(Err(PkError::Remote {
                code: 401,
                message: message.to_string(),
            }))
        }

        pub fn with_identity_result(mut self, result: Result<ExternalIdentity, PkError>) -> Self {
            *self.identity.get_mut() = result;
            self
        }

        pub fn with_join_result(mut self, result: Result<(), PkError>) -> Self {
            *self.join.get_mut() = result;
            self
        }

        pub fn with_join_delay(mut self, delay: Duration) -> Self {
            *self.join_delay.get_mut() = delay;
            self
        }

        pub async fn set_identity_result(&self, result: Result<ExternalIdentity, PkError>) {
            *self.identity.lock().await = result;
        }

        pub async fn set_join_result(&self, result: Result<(), PkError>) {
            *self.join.lock().await = result;
        }

        pub async fn set_join_delay(&self, delay: Duration) {
            *self.join_delay.lock().await = delay;
        }

        /// Queue ping results returned before the default.
        pub async fn push_ping_results(&self, results: Vec<Result<bool, PkError>>) {
            self.ping_queue.lock().await.extend(results);
        }

        pub async fn set_ping_default(&self, result: Result<bool, PkError>) {
            *self.ping_default.lock().await = result;
        }

        pub async fn set_report_result(&self, result: Result<bool, PkError>) {
            *self.report.lock().await = result;
        }

        pub fn lookup_count(&self) -> usize {
            self.lookup_calls.load(Ordering::SeqCst)
        }

        pub fn join_count(&self) -> usize {
            self.join_calls.load(Ordering::SeqCst)
        }

        pub fn ping_count(&self) -> usize {
            self.ping_calls.load(Ordering::SeqCst)
        }

        pub fn report_count(&self) -> usize {
            self.report_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PresenceAdapter for MockPresenceAdapter {
        async fn lookup_identity(
            &self,
            _credential: &SecretString,
        ) -> Result<ExternalIdentity, PkError> {
            self.lookup_calls.fetch_add(1, Ordering::SeqCst);
            self.identity.lock().await.clone()
        }

        async fn join_room(
            &self,
            _room_id: &str,
            _credential: &SecretString,
            _identity: &ExternalIdentity,
        ) -> Result<JoinOutcome, PkError> {
            self.join_calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.join_delay.lock().await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.join.lock().await.clone()?;

            Ok(JoinOutcome {
                values: [(TOKEN_SLOT.to_string(), "mock-token".to_string())]
                    .into_iter()
                    .collect(),
                completed_steps: vec!["issue_token".to_string(), REPORT_STEP.to_string()],
                failed_steps: Vec::new(),
            })
        }

        async fn ping(&self, _room_id: &str, _credential: &SecretString) -> Result<bool, PkError> {
            self.ping_calls.fetch_add(1, Ordering::SeqCst);

            if let Some(result) = self.ping_queue.lock().await.pop_front() {
                return result;
            }
            self.ping_default.lock().await.clone()
        }

        async fn report(&self, _room_id: &str, _user_id: &str) -> Result<bool, PkError> {
            self.report_calls.fetch_add(1, Ordering::SeqCst);
            self.report.lock().await.clone()
        }
    }

}
