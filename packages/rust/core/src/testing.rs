//! In-memory keyword source for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use kwplanner_gateway::{KeywordDataSource, MetricsRequest, SuggestionRequest};
use kwplanner_shared::{KeywordSuggestion, RequestError};

#[derive(Debug, Default)]
pub(crate) struct StubSource {
    suggestions: HashMap<String, Vec<KeywordSuggestion>>,
    metrics: HashMap<String, KeywordSuggestion>,
    failing: HashSet<String>,
    permanent: bool,
    suggest_calls: AtomicUsize,
    metrics_requests: Mutex<Vec<Vec<String>>>,
}

pub(crate) fn suggestion(term: &str, volume: u64, cpc: Option<f64>, competition: Option<f64>) -> KeywordSuggestion {
    KeywordSuggestion {
        keyword: term.into(),
        search_volume: Some(volume),
        competition,
        cpc,
    }
}

impl StubSource {
    pub(crate) fn with_suggestions(mut self, seed: &str, items: Vec<KeywordSuggestion>) -> Self {
        self.suggestions.insert(seed.into(), items);
        self
    }

    pub(crate) fn with_metrics(mut self, item: KeywordSuggestion) -> Self {
        self.metrics.insert(item.keyword.clone(), item);
        self
    }

    /// Any request carrying `term` fails.
    pub(crate) fn failing_on(mut self, term: &str) -> Self {
        self.failing.insert(term.into());
        self
    }

    /// Failures are reported as permanent instead of exhausted retries.
    pub(crate) fn permanent_failures(mut self) -> Self {
        self.permanent = true;
        self
    }

    pub(crate) fn suggest_calls(&self) -> usize {
        self.suggest_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn metrics_requests(&self) -> Vec<Vec<String>> {
        self.metrics_requests.lock().unwrap().clone()
    }

    fn check(&self, terms: &[String]) -> Result<(), RequestError> {
        match terms.iter().find(|t| self.failing.contains(t.as_str())) {
            Some(term) if self.permanent => Err(RequestError::permanent(
                format!("rejected '{term}'"),
                Some(401),
            )),
            Some(_) => Err(RequestError::RetryExhausted {
                attempts: 3,
                last: "server error (HTTP 503)".into(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KeywordDataSource for StubSource {
    async fn suggest(&self, request: &SuggestionRequest) -> Result<Vec<KeywordSuggestion>, RequestError> {
        self.suggest_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&request.keywords)?;
        Ok(request
            .keywords
            .iter()
            .flat_map(|seed| self.suggestions.get(seed).cloned().unwrap_or_default())
            .collect())
    }

    async fn metrics(&self, request: &MetricsRequest) -> Result<Vec<KeywordSuggestion>, RequestError> {
        self.metrics_requests
            .lock()
            .unwrap()
            .push(request.keywords.clone());
        self.check(&request.keywords)?;
        Ok(request
            .keywords
            .iter()
            .filter_map(|term| self.metrics.get(term).cloned())
            .collect())
    }
}
