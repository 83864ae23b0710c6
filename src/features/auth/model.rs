use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User type with administrative rights in the session service
pub const USER_TYPE_ADMIN: &str = "admin";

/// Header carrying a signed integration token
pub const INTEGRATIONS_TOKEN_HEADER: &str = "x-integrations-token";

/// Cookie consulted when no `Authorization` header is present
pub const AUTH_COOKIE_NAME: &str = "auth_token";

/// Owner id recorded for files uploaded by integrations
pub const INTEGRATION_OWNER_ID: i64 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: i64,
    #[serde(rename = "type")]
    pub user_type: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// End of the session validity window
    pub until: DateTime<Utc>,
    #[serde(rename = "IP", default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Session service answer; either part may be missing in a malformed session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    #[serde(default)]
    pub user: Option<SessionUser>,
    #[serde(default)]
    pub session: Option<Session>,
}

/// End user with a complete, valid session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user: SessionUser,
    pub session: Session,
}

impl AuthenticatedUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn display_name(&self) -> &str {
        &self.user.display_name
    }

    pub fn user_type(&self) -> &str {
        &self.user.user_type
    }

    pub fn is_admin(&self) -> bool {
        self.user.user_type == USER_TYPE_ADMIN
    }
}

/// Who is calling: a trusted integration or an end user with a session
#[derive(Debug, Clone, PartialEq)]
pub enum Caller {
    Integration,
    EndUser(AuthenticatedUser),
}

impl Caller {
    /// Owner id under which the caller's files are stored
    pub fn owner_id(&self) -> i64 {
        match self {
            Caller::Integration => INTEGRATION_OWNER_ID,
            Caller::EndUser(user) => user.id(),
        }
    }
}

/// Raw credentials presented with a request, not yet verified
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub bearer_token: Option<String>,
    pub integration_token: Option<String>,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            integration_token: None,
        }
    }

    pub fn integration(token: impl Into<String>) -> Self {
        Self {
            bearer_token: None,
            integration_token: Some(token.into()),
        }
    }

    /// Read the bearer token from `Authorization`, falling back to the auth cookie
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let bearer_token = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| cookie_value(headers, AUTH_COOKIE_NAME));

        let integration_token = headers
            .get(INTEGRATIONS_TOKEN_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Self {
            bearer_token,
            integration_token,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.bearer_token.is_none() && self.integration_token.is_none()
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| {
            urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
        .filter(|v| !v.is_empty())
}
