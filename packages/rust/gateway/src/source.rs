//! Keyword suggestion and metrics sources.
//!
//! [`KeywordDataSource`] is the seam the pipeline depends on. [`HttpKeywordSource`]
//! implements it over the [`RequestGateway`] using a task envelope: the request body is
//! a one-element array of tasks and the response carries `tasks[].result[]`.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use kwplanner_shared::{
    AppConfig, EndpointsConfig, KeywordSuggestion, KwPlannerError, MAX_TERMS_PER_REQUEST, Platform,
    RequestError, Result, normalize_term,
};

use crate::gateway::RequestGateway;

/// Status code the API reports for a successful task.
const TASK_OK: u32 = 20000;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Ask for terms related to a set of seed terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionRequest {
    #[serde(skip)]
    pub platform: Platform,
    pub keywords: Vec<String>,
    pub location_code: u32,
    pub language_code: String,
}

impl SuggestionRequest {
    pub fn new(
        platform: Platform,
        seed_terms: Vec<String>,
        location_code: u32,
        language_code: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            platform,
            keywords: checked_terms(seed_terms)?,
            location_code,
            language_code: language_code.into(),
        })
    }
}

/// Ask for volume, cpc and competition of specific terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRequest {
    #[serde(skip)]
    pub platform: Platform,
    pub keywords: Vec<String>,
    pub location_code: u32,
    pub language_code: String,
}

impl MetricsRequest {
    pub fn new(
        platform: Platform,
        terms: Vec<String>,
        location_code: u32,
        language_code: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            platform,
            keywords: checked_terms(terms)?,
            location_code,
            language_code: language_code.into(),
        })
    }
}

fn checked_terms(terms: Vec<String>) -> Result<Vec<String>> {
    if terms.is_empty() {
        return Err(KwPlannerError::validation("request needs at least one term"));
    }
    if terms.len() > MAX_TERMS_PER_REQUEST {
        return Err(KwPlannerError::validation(format!(
            "request carries {} terms, maximum is {MAX_TERMS_PER_REQUEST}",
            terms.len()
        )));
    }
    if terms.iter().any(|t| t.trim().is_empty()) {
        return Err(KwPlannerError::validation("request terms must not be empty"));
    }
    Ok(terms)
}

// ---------------------------------------------------------------------------
// KeywordDataSource
// ---------------------------------------------------------------------------

/// External keyword data, one call per request.
#[async_trait]
pub trait KeywordDataSource: Send + Sync {
    /// Terms related to the request's seeds.
    async fn suggest(
        &self,
        request: &SuggestionRequest,
    ) -> std::result::Result<Vec<KeywordSuggestion>, RequestError>;

    /// Metrics for exactly the requested terms (missing terms are simply absent).
    async fn metrics(
        &self,
        request: &MetricsRequest,
    ) -> std::result::Result<Vec<KeywordSuggestion>, RequestError>;
}

// ---------------------------------------------------------------------------
// HttpKeywordSource
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    #[serde(default)]
    status_code: Option<u32>,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    tasks: Vec<TaskResult>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    #[serde(default)]
    status_code: Option<u32>,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    result: Option<Vec<Value>>,
}

/// [`KeywordDataSource`] backed by the HTTP gateway.
#[derive(Debug, Clone)]
pub struct HttpKeywordSource {
    gateway: RequestGateway,
    endpoints: EndpointsConfig,
}

impl HttpKeywordSource {
    pub fn new(gateway: RequestGateway, endpoints: EndpointsConfig) -> Self {
        Self { gateway, endpoints }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            RequestGateway::from_config(config)?,
            config.gateway.endpoints.clone(),
        ))
    }

    async fn post_task<T: Serialize>(
        &self,
        endpoint: &str,
        task: &T,
    ) -> std::result::Result<Vec<KeywordSuggestion>, RequestError> {
        let payload = serde_json::to_value([task])
            .map_err(|e| RequestError::permanent(format!("failed to encode request: {e}"), None))?;
        let body = self
            .gateway
            .execute(Method::POST, endpoint, Some(&payload), None)
            .await?;
        parse_task_response(body)
    }
}

#[async_trait]
impl KeywordDataSource for HttpKeywordSource {
    async fn suggest(
        &self,
        request: &SuggestionRequest,
    ) -> std::result::Result<Vec<KeywordSuggestion>, RequestError> {
        let endpoint = self.endpoints.suggestions_path(request.platform);
        self.post_task(&endpoint, request).await
    }

    async fn metrics(
        &self,
        request: &MetricsRequest,
    ) -> std::result::Result<Vec<KeywordSuggestion>, RequestError> {
        let endpoint = self.endpoints.metrics_path(request.platform);
        self.post_task(&endpoint, request).await
    }
}

/// Flatten `tasks[].result[]` into suggestion records.
///
/// A failed envelope or task is a permanent error. Individual result items that do
/// not look like keyword records are skipped.
pub fn parse_task_response(body: Value) -> std::result::Result<Vec<KeywordSuggestion>, RequestError> {
    let envelope: TaskEnvelope = serde_json::from_value(body).map_err(|e| {
        RequestError::permanent(format!("unexpected response shape: {e}"), None)
    })?;

    if let Some(code) = envelope.status_code.filter(|c| *c != TASK_OK) {
        return Err(RequestError::permanent(
            envelope
                .status_message
                .unwrap_or_else(|| format!("request failed with status {code}")),
            None,
        ));
    }

    let mut suggestions = Vec::new();
    for task in envelope.tasks {
        if let Some(code) = task.status_code.filter(|c| *c != TASK_OK) {
            return Err(RequestError::permanent(
                task.status_message
                    .unwrap_or_else(|| format!("task failed with status {code}")),
                None,
            ));
        }
        for item in task.result.unwrap_or_default() {
            match serde_json::from_value::<KeywordSuggestion>(item) {
                Ok(mut suggestion) => {
                    suggestion.keyword = normalize_term(&suggestion.keyword);
                    if !suggestion.keyword.is_empty() {
                        suggestions.push(suggestion);
                    }
                }
                Err(e) => debug!(error = %e, "skipping malformed result item"),
            }
        }
    }
    Ok(suggestions)
}
