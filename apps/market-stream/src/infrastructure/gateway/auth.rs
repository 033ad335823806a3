//! Gateway Authentication
//!
//! REST client for the gateway's auth endpoints. Exchanges a username and
//! API key for a bearer session token (`POST /api/Auth/loginKey`) and lists
//! active tradable accounts (`POST /api/Account/search`).
//!
//! The streaming client consumes the token as an opaque string for the
//! connection's lifetime; no mid-session refresh is performed.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request timeout for auth calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Type
// =============================================================================

/// Errors from the gateway auth API. All are fatal to the run: without a
/// token no streaming is attempted.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required credential is empty.
    #[error("credential {0} cannot be empty")]
    EmptyCredential(&'static str),

    /// Network or protocol failure talking to the gateway.
    #[error("gateway request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The gateway answered with a non-success HTTP status.
    #[error("gateway returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// The gateway rejected the login.
    #[error("login rejected: {0}")]
    LoginRejected(String),

    /// The gateway reported success but returned no token.
    #[error("login succeeded but no token was returned")]
    MissingToken,
}

// =============================================================================
// Credentials and Token
// =============================================================================

/// Gateway API credentials.
///
/// The `Debug` implementation redacts the key for safe logging.
#[derive(Clone)]
pub struct GatewayCredentials {
    username: String,
    api_key: String,
}

impl GatewayCredentials {
    /// Create credentials, rejecting empty values.
    pub fn new(
        username: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let username = username.into();
        let api_key = api_key.into();
        if username.is_empty() {
            return Err(AuthError::EmptyCredential("username"));
        }
        if api_key.is_empty() {
            return Err(AuthError::EmptyCredential("api key"));
        }
        Ok(Self { username, api_key })
    }

    /// The account username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("username", &self.username)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// An opaque bearer session token.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw token string.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// The raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the raw token.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionToken([REDACTED])")
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user_name: &'a str,
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountSearchRequest {
    only_active_accounts: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountSearchResponse {
    #[serde(default)]
    accounts: Vec<Account>,
}

/// One tradable account as reported by the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account identifier.
    pub id: i64,
    /// Account display name.
    #[serde(default)]
    pub name: String,
    /// Current balance, when reported.
    #[serde(default)]
    pub balance: Option<Decimal>,
    /// Whether the account may trade.
    #[serde(default)]
    pub can_trade: bool,
}

// =============================================================================
// Auth Client
// =============================================================================

/// REST client for the gateway auth API.
#[derive(Debug, Clone)]
pub struct GatewayAuthClient {
    http: reqwest::Client,
    base_url: String,
    credentials: GatewayCredentials,
}

impl GatewayAuthClient {
    /// Create a new auth client.
    pub fn new(
        base_url: impl Into<String>,
        credentials: GatewayCredentials,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    /// Exchange credentials for a bearer session token.
    pub async fn login(&self) -> Result<SessionToken, AuthError> {
        let url = format!("{}/api/Auth/loginKey", self.base_url);
        let request = LoginRequest {
            user_name: self.credentials.username(),
            api_key: &self.credentials.api_key,
        };

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let login: LoginResponse = response.json().await?;
        if !login.success {
            return Err(AuthError::LoginRejected(
                login
                    .error_message
                    .unwrap_or_else(|| "no error message".to_owned()),
            ));
        }

        let token = login.token.ok_or(AuthError::MissingToken)?;
        tracing::info!(username = %self.credentials.username(), "gateway login succeeded");
        Ok(SessionToken::new(token))
    }

    /// List active tradable accounts for the session.
    pub async fn search_active_accounts(
        &self,
        token: &SessionToken,
    ) -> Result<Vec<Account>, AuthError> {
        let url = format!("{}/api/Account/search", self.base_url);
        let request = AccountSearchRequest {
            only_active_accounts: true,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(token.as_str())
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let search: AccountSearchResponse = response.json().await?;
        tracing::debug!(count = search.accounts.len(), "active accounts fetched");
        Ok(search.accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_reject_empty_values() {
        assert!(GatewayCredentials::new("", "key").is_err());
        assert!(GatewayCredentials::new("user", "").is_err());
        assert!(GatewayCredentials::new("user", "key").is_ok());
    }

    #[test]
    fn credentials_debug_redacts_key() {
        let creds = GatewayCredentials::new("trader", "super-secret").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("trader"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = SessionToken::new("jwt-value".to_owned());
        assert_eq!(format!("{token:?}"), "SessionToken([REDACTED])");
        assert_eq!(token.as_str(), "jwt-value");
    }

    #[test]
    fn login_request_uses_gateway_field_names() {
        let request = LoginRequest {
            user_name: "trader",
            api_key: "key123",
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""userName":"trader""#));
        assert!(json.contains(r#""apiKey":"key123""#));
    }

    #[test]
    fn login_response_parses_success() {
        let json = r#"{"success":true,"token":"jwt","errorCode":0,"errorMessage":null}"#;
        let login: LoginResponse = serde_json::from_str(json).unwrap();
        assert!(login.success);
        assert_eq!(login.token.as_deref(), Some("jwt"));
    }

    #[test]
    fn login_response_parses_rejection() {
        let json = r#"{"success":false,"errorMessage":"invalid api key"}"#;
        let login: LoginResponse = serde_json::from_str(json).unwrap();
        assert!(!login.success);
        assert_eq!(login.error_message.as_deref(), Some("invalid api key"));
    }

    #[test]
    fn account_search_response_parses_accounts() {
        let json = r#"{"accounts":[{"id":42,"name":"PRACTICE-1","balance":50000.0,"canTrade":true}]}"#;
        let search: AccountSearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(search.accounts.len(), 1);
        assert_eq!(search.accounts[0].id, 42);
        assert!(search.accounts[0].can_trade);
    }
}
