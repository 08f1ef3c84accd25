//! Authentication strategies injected into the gateway.

use std::fmt;
use std::sync::Arc;

use reqwest::RequestBuilder;

use kwplanner_shared::{AuthMode, GatewayConfig, KwPlannerError, Result};

/// Attaches credentials to an outgoing request.
pub trait AuthStrategy: Send + Sync + fmt::Debug {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Sends requests without credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthStrategy for NoAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// HTTP basic authentication.
#[derive(Clone)]
pub struct BasicAuth {
    login: String,
    password: String,
}

impl BasicAuth {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AuthStrategy for BasicAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.login, Some(&self.password))
    }

    fn name(&self) -> &'static str {
        "basic"
    }
}

/// `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken").field("token", &"<redacted>").finish()
    }
}

impl AuthStrategy for BearerToken {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    fn name(&self) -> &'static str {
        "bearer"
    }
}

/// API key sent in a custom header.
#[derive(Clone)]
pub struct ApiKeyHeader {
    header: String,
    key: String,
}

impl ApiKeyHeader {
    pub fn new(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            key: key.into(),
        }
    }
}

impl fmt::Debug for ApiKeyHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyHeader")
            .field("header", &self.header)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl AuthStrategy for ApiKeyHeader {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(self.header.as_str(), self.key.as_str())
    }

    fn name(&self) -> &'static str {
        "api_key"
    }
}

/// Build the configured strategy, reading secrets from the named env vars.
pub fn auth_from_config(config: &GatewayConfig) -> Result<Arc<dyn AuthStrategy>> {
    let strategy: Arc<dyn AuthStrategy> = match config.auth {
        AuthMode::None => Arc::new(NoAuth),
        AuthMode::Basic => Arc::new(BasicAuth::new(
            read_env(&config.login_env)?,
            read_env(&config.password_env)?,
        )),
        AuthMode::Bearer => Arc::new(BearerToken::new(read_env(&config.token_env)?)),
        AuthMode::ApiKey => Arc::new(ApiKeyHeader::new(
            config.api_key_header.clone(),
            read_env(&config.token_env)?,
        )),
    };
    Ok(strategy)
}

fn read_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(KwPlannerError::config(format!(
            "credentials not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_secrets() {
        let basic = format!("{:?}", BasicAuth::new("user", "hunter2"));
        assert!(basic.contains("user"));
        assert!(!basic.contains("hunter2"));

        let bearer = format!("{:?}", BearerToken::new("tok-123"));
        assert!(!bearer.contains("tok-123"));

        let key = format!("{:?}", ApiKeyHeader::new("X-API-Key", "k-456"));
        assert!(key.contains("X-API-Key"));
        assert!(!key.contains("k-456"));
    }

    #[test]
    fn missing_env_var_is_config_error() {
        let config = GatewayConfig {
            auth: AuthMode::Bearer,
            token_env: "KW_TEST_AUTH_MISSING_TOKEN_98765".into(),
            ..GatewayConfig::default()
        };
        let err = auth_from_config(&config).unwrap_err();
        assert!(matches!(err, KwPlannerError::Config { .. }));
        assert!(err.to_string().contains("KW_TEST_AUTH_MISSING_TOKEN_98765"));
    }

    #[test]
    fn none_mode_needs_no_credentials() {
        let config = GatewayConfig {
            auth: AuthMode::None,
            ..GatewayConfig::default()
        };
        let auth = auth_from_config(&config).expect("no credentials needed");
        assert_eq!(auth.name(), "none");
    }
}
