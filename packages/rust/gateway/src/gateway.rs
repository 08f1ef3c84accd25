//! Bounded-concurrency request execution with retry and auth injection.
//!
//! Every request goes through one process-wide semaphore. A permit is held for a
//! single attempt (the network round trip) and released before any backoff sleep.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

use kwplanner_shared::{AppConfig, KwPlannerError, RequestError, Result};

use crate::auth::{AuthStrategy, NoAuth, auth_from_config};
use crate::retry::{RetryPolicy, retry_with};

/// User-Agent string for outgoing requests.
const USER_AGENT: &str = concat!("kwplanner/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// GatewayOptions
// ---------------------------------------------------------------------------

/// Runtime gateway settings, derived from the config file.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub base_url: Url,
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl GatewayOptions {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            max_concurrent: 5,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl TryFrom<&AppConfig> for GatewayOptions {
    type Error = KwPlannerError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(&config.gateway.base_url).map_err(|e| {
            KwPlannerError::config(format!(
                "invalid gateway.base_url '{}': {e}",
                config.gateway.base_url
            ))
        })?;
        Ok(Self {
            base_url,
            max_concurrent: config.gateway.max_concurrent.max(1),
            timeout: Duration::from_secs(config.gateway.timeout_secs),
            retry: RetryPolicy::from(config),
        })
    }
}

// ---------------------------------------------------------------------------
// RequestGateway
// ---------------------------------------------------------------------------

/// Executes JSON requests against one API host.
#[derive(Debug, Clone)]
pub struct RequestGateway {
    client: Client,
    base_url: Url,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    retry: RetryPolicy,
    auth: Arc<dyn AuthStrategy>,
}

impl RequestGateway {
    /// Create a gateway with the given options and default credentials.
    pub fn new(options: GatewayOptions, auth: Arc<dyn AuthStrategy>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| KwPlannerError::config(format!("failed to build HTTP client: {e}")))?;

        let max_concurrent = options.max_concurrent.max(1);
        Ok(Self {
            client,
            base_url: with_trailing_slash(options.base_url),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            retry: options.retry,
            auth,
        })
    }

    /// Build a gateway from the config file, reading credentials from the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let options = GatewayOptions::try_from(config)?;
        let auth = auth_from_config(&config.gateway)?;
        Self::new(options, auth)
    }

    /// Gateway without credentials.
    pub fn unauthenticated(options: GatewayOptions) -> Result<Self> {
        Self::new(options, Arc::new(NoAuth))
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Execute a request, retrying transient failures.
    ///
    /// `target` is resolved against the base URL. `auth` overrides the gateway's
    /// default credentials for this call only.
    pub async fn execute(
        &self,
        method: Method,
        target: &str,
        payload: Option<&Value>,
        auth: Option<&dyn AuthStrategy>,
    ) -> std::result::Result<Value, RequestError> {
        let url = self
            .base_url
            .join(target.trim_start_matches('/'))
            .map_err(|e| RequestError::permanent(format!("invalid target '{target}': {e}"), None))?;
        let auth = auth.unwrap_or(self.auth.as_ref());

        retry_with(&self.retry, target, |attempt| {
            self.send_once(method.clone(), &url, payload, auth, attempt)
        })
        .await
    }

    /// One attempt: acquire a permit, send, classify the outcome.
    async fn send_once(
        &self,
        method: Method,
        url: &Url,
        payload: Option<&Value>,
        auth: &dyn AuthStrategy,
        attempt: u32,
    ) -> std::result::Result<Value, RequestError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| RequestError::permanent("request gateway is shut down", None))?;

        debug!(%url, %method, attempt, auth = auth.name(), "sending request");

        let mut request = auth.apply(self.client.request(method, url.as_str()));
        if let Some(body) = payload {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_send_error)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(RequestError::RateLimited { retry_after });
        }

        let body = response.text().await.map_err(classify_send_error)?;

        if status.is_server_error() {
            return Err(RequestError::transient(
                format!("{url} returned {status}"),
                Some(status.as_u16()),
            ));
        }
        if !status.is_success() {
            let reason = match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "authentication failed",
                _ => "request rejected",
            };
            return Err(RequestError::permanent(
                format!("{url}: {reason} ({})", truncate(&body, 200)),
                Some(status.as_u16()),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            RequestError::permanent(
                format!("{url} returned a non-JSON body: {e}"),
                Some(status.as_u16()),
            )
        })
    }
}

fn classify_send_error(err: reqwest::Error) -> RequestError {
    if err.is_builder() {
        RequestError::permanent(err.to_string(), None)
    } else {
        // Timeouts, connection failures and broken bodies are worth retrying.
        RequestError::transient(err.to_string(), err.status().map(|s| s.as_u16()))
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
