use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::features::auth::model::CheckResult;

#[derive(Debug, Error)]
pub enum AuthClientError {
    /// The session service does not know the token (expired or never existed)
    #[error("session expired or not found")]
    SessionNotFound,

    #[error("session service request failed: {0}")]
    Transport(String),

    #[error("session service error: HTTP {status} - {body}")]
    Remote { status: u16, body: String },
}

/// Exchanges a session token for the user behind it
#[async_trait]
pub trait AuthChecker: Send + Sync {
    async fn check(&self, token: &str) -> Result<CheckResult, AuthClientError>;
}

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    token: &'a str,
}

/// HTTP client for the session service
pub struct SessionClient {
    check_url: String,
    http_client: reqwest::Client,
}

impl SessionClient {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self, AuthClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthClientError::Transport(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            check_url: format!("{}/api/1/auth/check", service_url.trim_end_matches('/')),
            http_client,
        })
    }
}

#[async_trait]
impl AuthChecker for SessionClient {
    async fn check(&self, token: &str) -> Result<CheckResult, AuthClientError> {
        let response = self
            .http_client
            .post(&self.check_url)
            .json(&CheckRequest { token })
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach session service: {}", e);
                AuthClientError::Transport(e.to_string())
            })?;

        let status = response.status();

        if status.is_success() {
            return response.json::<CheckResult>().await.map_err(|e| {
                tracing::error!("Failed to parse session check response: {}", e);
                AuthClientError::Transport(format!("Failed to parse response: {}", e))
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("Session service reported no such session");
            return Err(AuthClientError::SessionNotFound);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!("Session service error: HTTP {} - {}", status, body);
        Err(AuthClientError::Remote {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_url_normalization() {
        let client = SessionClient::new("http://auth.local:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.check_url, "http://auth.local:8000/api/1/auth/check");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let client = SessionClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();

        let err = client.check("whatever").await.unwrap_err();
        assert!(matches!(err, AuthClientError::Transport(_)));
    }
}
