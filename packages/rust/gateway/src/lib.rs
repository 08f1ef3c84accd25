//! Outbound request plumbing for keyword data.
//!
//! This crate provides:
//! - [`RequestGateway`]: bounded-concurrency JSON requests with retry and auth injection
//! - [`retry`]: the [`RetryPolicy`] value and the [`retry_with`] combinator
//! - [`auth`]: pluggable [`AuthStrategy`] implementations
//! - [`source`]: the [`KeywordDataSource`] seam and its HTTP implementation

pub mod auth;
pub mod gateway;
pub mod retry;
pub mod source;

pub use auth::{ApiKeyHeader, AuthStrategy, BasicAuth, BearerToken, NoAuth, auth_from_config};
pub use gateway::{GatewayOptions, RequestGateway};
pub use retry::{RetryPolicy, RetryStrategy, retry_strategy, retry_with};
pub use kwplanner_shared::MAX_TERMS_PER_REQUEST;
pub use source::{
    HttpKeywordSource, KeywordDataSource, MetricsRequest, SuggestionRequest, parse_task_response,
};

// Re-exported so callers can name methods without depending on reqwest directly.
pub use reqwest::Method;
