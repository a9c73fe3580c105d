//! Resilient execution of a single backend call.
//!
//! [`RequestExecutor::execute`] attaches the managed credential and runs a
//! bounded retry loop:
//!
//! - transport failure: give up immediately with [`Outcome::Unreachable`]
//!   (a request that cannot be built is a configuration error instead)
//! - 2xx: decode JSON or return the binary body
//! - 429: sleep for `retry-after` seconds, then retry
//! - any other status: refresh the credential, then retry
//!
//! Retries are shared between the last two branches and capped by
//! [`RetryConfig::max_retries`]; once spent the last status is returned as
//! [`ClientError::RetriesExhausted`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use qbtable_common::{Config, Credential, Outcome, RetryConfig};

use crate::error::{ClientError, Result};
use crate::token::TokenManager;

/// Header naming the realm on every request.
pub const REALM_HEADER: &str = "QB-Realm-Hostname";

/// Builds the HTTP client shared by the executor and credential sources.
///
/// # Errors
///
/// Returns an error if the underlying HTTP client fails to build.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    let client = match config.timeout_seconds {
        Some(timeout) => reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?,
        None => reqwest::Client::builder().build()?,
    };
    Ok(client)
}

/// A decoded successful response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body declared as `application/json`. An empty body decodes to `null`.
    Json(serde_json::Value),
    /// Any other body, with its declared content type.
    Binary {
        /// The `Content-Type` header, or `application/octet-stream`.
        content_type: String,
        /// Raw body bytes.
        bytes: Vec<u8>,
    },
}

impl Payload {
    /// Deserializes a JSON payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is binary or does not match `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Json(value) => Ok(serde_json::from_value(value)?),
            Self::Binary { content_type, .. } => Err(ClientError::InvalidResponse(format!(
                "expected a JSON body, got '{content_type}'"
            ))),
        }
    }
}

/// One logical backend operation.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    endpoint: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    cancel: Option<CancellationToken>,
}

impl ApiRequest {
    /// A request without a body.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: None,
            cancel: None,
        }
    }

    /// A `GET` request.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// A `POST` request carrying `body` as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn post(endpoint: impl Into<String>, body: &impl Serialize) -> Result<Self> {
        Self::new(Method::POST, endpoint).with_body(body)
    }

    /// A `DELETE` request carrying `body` as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn delete(endpoint: impl Into<String>, body: &impl Serialize) -> Result<Self> {
        Self::new(Method::DELETE, endpoint).with_body(body)
    }

    /// Sets the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn with_body(mut self, body: &impl Serialize) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Appends a query-string parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Appends a query-string parameter when `value` is present.
    #[must_use]
    pub fn with_optional_query(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.with_query(key, value),
            None => self,
        }
    }

    /// Attaches a cancellation token honoured while sending and backing off.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Option<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Endpoint path relative to the API base URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Issues backend calls with credential handling and bounded retries.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    http: reqwest::Client,
    base_url: String,
    realm_host: String,
    user_agent: String,
    tokens: Arc<TokenManager>,
    retry: RetryConfig,
}

impl RequestExecutor {
    /// Creates an executor for the realm and base URL in `config`.
    #[must_use]
    pub fn new(config: &Config, http: reqwest::Client, tokens: Arc<TokenManager>) -> Self {
        Self {
            http,
            base_url: config.base_url().to_string(),
            realm_host: config.realm_host.clone(),
            user_agent: config.user_agent.clone(),
            tokens,
            retry: config.retry_config.clone(),
        }
    }

    /// The token manager whose credential this executor attaches.
    #[must_use]
    pub const fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Executes `request`, retrying per the configured budget.
    ///
    /// # Returns
    ///
    /// The decoded body, or [`Outcome::Unreachable`] if the backend could not
    /// be contacted.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The endpoint does not form a valid URL
    /// - The request cannot be built, e.g. a header value is invalid
    /// - The backend keeps rejecting the request after every retry
    /// - A JSON body cannot be decoded
    /// - The request is cancelled
    pub async fn execute(&self, request: &ApiRequest) -> Result<Outcome<Payload>> {
        let url = self.url_for(request.endpoint())?;
        let body = request.body.as_ref().map(serde_json::to_vec).transpose()?;
        let cancel = request.cancel.as_ref();
        let max_attempts = self.retry.max_attempts();

        self.tokens.ensure_token().await;

        let mut attempt: u32 = 1;
        loop {
            let snapshot = self.tokens.snapshot().await;
            debug!(
                "{} {} (attempt {attempt}/{max_attempts})",
                request.method, request.endpoint
            );

            let mut builder = self
                .http
                .request(request.method.clone(), url.clone())
                .query(&request.query)
                .header(REALM_HEADER, &self.realm_host)
                .header(USER_AGENT, &self.user_agent)
                .header(CONTENT_TYPE, "application/json");
            if let Some(credential) = snapshot.credential.as_ref() {
                builder = builder.header(AUTHORIZATION, Credential::authorization(credential));
            }
            if let Some(body) = &body {
                builder = builder.body(body.clone());
            }

            let response = match cancellable(cancel, builder.send()).await? {
                Ok(response) => response,
                Err(e) if e.is_builder() => {
                    return Err(ClientError::ConfigurationError(format!(
                        "invalid request for {}: {e}",
                        request.endpoint
                    )));
                }
                Err(e) => {
                    warn!("Backend unreachable for {}: {e}", request.endpoint);
                    return Ok(Outcome::Unreachable);
                }
            };

            let status = response.status();
            if status.is_success() {
                return decode(response, cancel).await;
            }

            if attempt >= max_attempts {
                error!(
                    "{} {} failed with status {} after {attempt} attempt(s)",
                    request.method,
                    request.endpoint,
                    status.as_u16()
                );
                return Err(ClientError::RetriesExhausted {
                    status: status.as_u16(),
                    attempts: attempt,
                });
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let delay = self.retry_after(response.headers());
                warn!("Rate limited on {}; retrying in {delay:?}", request.endpoint);
                cancellable(cancel, tokio::time::sleep(delay)).await?;
            } else {
                warn!(
                    "{} rejected with status {}; refreshing credential",
                    request.endpoint,
                    status.as_u16()
                );
                self.tokens.refresh(snapshot.generation).await;
            }

            attempt += 1;
        }
    }

    fn url_for(&self, endpoint: &str) -> Result<Url> {
        let url = if endpoint.starts_with('/') {
            format!("{}{endpoint}", self.base_url)
        } else {
            format!("{}/{endpoint}", self.base_url)
        };
        Url::parse(&url)
            .map_err(|e| ClientError::ConfigurationError(format!("Invalid URL '{url}': {e}")))
    }

    fn retry_after(&self, headers: &HeaderMap) -> Duration {
        let parsed = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        if parsed.is_none() {
            debug!("No usable retry-after header; using default backoff");
        }
        self.retry
            .clamp(parsed.unwrap_or(self.retry.default_retry_after))
    }
}

/// Parses a `retry-after` value given in (possibly fractional) seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    value.parse::<u64>().map(Duration::from_secs).ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    })
}

/// Runs `future` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: Option<&CancellationToken>, future: F) -> Result<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!("Request cancelled");
                Err(ClientError::Cancelled)
            }
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

async fn decode(
    response: reqwest::Response,
    cancel: Option<&CancellationToken>,
) -> Result<Outcome<Payload>> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let bytes = match cancellable(cancel, response.bytes()).await? {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Connection dropped while reading response body: {e}");
            return Ok(Outcome::Unreachable);
        }
    };

    if content_type.contains("application/json") {
        if bytes.is_empty() {
            return Ok(Outcome::Data(Payload::Json(serde_json::Value::Null)));
        }
        let value = serde_json::from_slice(&bytes)?;
        return Ok(Outcome::Data(Payload::Json(value)));
    }

    Ok(Outcome::Data(Payload::Binary {
        content_type,
        bytes: bytes.to_vec(),
    }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use async_trait::async_trait;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::credentials::CredentialSource;

    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn acquire(&self) -> Option<Credential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Some(Credential::external(SecretString::new(
                format!("QB-USER-TOKEN token-{n}").into(),
            )))
        }
    }

    fn executor(base_url: &str) -> (RequestExecutor, Arc<AtomicUsize>) {
        let config = Config::new("bqtable", "realm.quickbase.com").with_base_url(base_url);
        let calls = Arc::new(AtomicUsize::new(0));
        let source: Arc<dyn CredentialSource> = Arc::new(CountingSource {
            calls: Arc::clone(&calls),
        });
        let tokens = Arc::new(TokenManager::new(source, false));
        let executor = RequestExecutor::new(&config, reqwest::Client::new(), tokens);
        (executor, calls)
    }

    #[tokio::test]
    async fn test_success_returns_json_with_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/records/query"))
            .and(header("QB-Realm-Hostname", "realm.quickbase.com"))
            .and(header("authorization", "QB-USER-TOKEN token-1"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (executor, calls) = executor(&mock_server.uri());
        let request = ApiRequest::post("/records/query", &json!({"from": "bqtable"})).unwrap();

        let outcome = executor.execute(&request).await.unwrap();
        assert_eq!(outcome, Outcome::Data(Payload::Json(json!({"data": []}))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_returns_binary_for_non_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/files/bqtable/1/6/0"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("aGVsbG8=", "image/png"))
            .mount(&mock_server)
            .await;

        let (executor, _) = executor(&mock_server.uri());
        let outcome = executor
            .execute(&ApiRequest::get("/files/bqtable/1/6/0"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Data(Payload::Binary {
                content_type: "image/png".to_string(),
                bytes: b"aGVsbG8=".to_vec(),
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_soft_fails() {
        let (executor, _) = executor("http://127.0.0.1:9");
        let outcome = executor.execute(&ApiRequest::get("/fields")).await.unwrap();
        assert!(outcome.is_unreachable());
    }

    #[tokio::test]
    async fn test_rate_limit_waits_then_succeeds() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/fields"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fields"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (executor, calls) = executor(&mock_server.uri());
        let started = Instant::now();
        let outcome = executor.execute(&ApiRequest::get("/fields")).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(outcome, Outcome::Data(Payload::Json(json!([]))));
        // rate limiting does not touch the credential
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_is_not_exceeded() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/fields"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fields"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&mock_server)
            .await;

        let (executor, _) = executor(&mock_server.uri());
        let err = executor
            .execute(&ApiRequest::get("/fields"))
            .await
            .unwrap_err();

        assert!(err.is_retries_exhausted());
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn test_auth_failure_refreshes_token_once() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/fields"))
            .and(header("authorization", "QB-USER-TOKEN token-1"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fields"))
            .and(header("authorization", "QB-USER-TOKEN token-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (executor, calls) = executor(&mock_server.uri());
        let outcome = executor.execute(&ApiRequest::get("/fields")).await.unwrap();

        assert!(outcome.is_data());
        // one initial acquisition plus exactly one refresh between attempts
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_rejection_carries_last_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/records"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&mock_server)
            .await;

        let (executor, _) = executor(&mock_server.uri());
        let request = ApiRequest::delete("/records", &json!({"from": "bqtable"})).unwrap();
        let err = executor.execute(&request).await.unwrap_err();

        assert!(matches!(
            err,
            ClientError::RetriesExhausted {
                status: 401,
                attempts: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/fields"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
            .mount(&mock_server)
            .await;

        let (executor, _) = executor(&mock_server.uri());
        let cancel = CancellationToken::new();
        let request = ApiRequest::get("/fields").with_cancellation(Some(cancel.clone()));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = executor.execute(&request).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_pending_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/fields"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(20)),
            )
            .mount(&mock_server)
            .await;

        let (executor, _) = executor(&mock_server.uri());
        let cancel = CancellationToken::new();
        let request = ApiRequest::get("/fields").with_cancellation(Some(cancel.clone()));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = executor.execute(&request).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unbuildable_request_is_a_configuration_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/fields"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&mock_server)
            .await;

        let config =
            Config::new("bqtable", "realm.quickbase.com\nX-Injected: 1").with_base_url(mock_server.uri());
        let source: Arc<dyn CredentialSource> = Arc::new(CountingSource {
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let tokens = Arc::new(TokenManager::new(source, false));
        let executor = RequestExecutor::new(&config, reqwest::Client::new(), tokens);

        let err = executor.execute(&ApiRequest::get("/fields")).await.unwrap_err();
        assert!(matches!(err, ClientError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/fields"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&mock_server)
            .await;

        let (executor, _) = executor(&mock_server.uri());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = ApiRequest::get("/fields").with_cancellation(Some(cancel));

        assert!(executor.execute(&request).await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_query_parameters_are_sent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/reports/7/run"))
            .and(wiremock::matchers::query_param("tableId", "bqtable"))
            .and(wiremock::matchers::query_param("top", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (executor, _) = executor(&mock_server.uri());
        let request = ApiRequest::get("/reports/7/run")
            .with_query("tableId", "bqtable")
            .with_optional_query("top", Some(10))
            .with_optional_query("skip", None::<u32>);

        assert!(executor.execute(&request).await.unwrap().is_data());
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_payload_into_json_rejects_binary() {
        let payload = Payload::Binary {
            content_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert!(payload.into_json::<serde_json::Value>().is_err());
    }
}
