use std::sync::Arc;
use std::time::Instant;

use crate::core::error::{AppError, Result};
use crate::core::metrics;
use crate::features::auth::clients::{AuthChecker, AuthClientError};
use crate::features::auth::integration::IntegrationTokens;
use crate::features::auth::model::{AuthenticatedUser, Caller, Credentials};

const ACCESS_DENIED: &str = "Access denied";
const SESSION_EXPIRED: &str = "Session expired or not found";
const SESSION_UNKNOWN: &str = "Session is unknown";

/// Authentication gate: turns request credentials into a [`Caller`]
pub struct Authenticator {
    checker: Arc<dyn AuthChecker>,
    integrations: IntegrationTokens,
}

impl Authenticator {
    pub fn new(checker: Arc<dyn AuthChecker>, integrations: IntegrationTokens) -> Self {
        Self {
            checker,
            integrations,
        }
    }

    /// A verified integration token wins; the session service is not consulted for it
    pub fn is_integration(&self, credentials: &Credentials) -> bool {
        match credentials.integration_token.as_deref() {
            Some(token) => match self.integrations.verify(token) {
                Some(name) => {
                    tracing::debug!("Integration caller: {}", name);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Caller> {
        if self.is_integration(credentials) {
            return Ok(Caller::Integration);
        }

        self.user(credentials).await.map(Caller::EndUser)
    }

    /// Resolve the end user behind the bearer token
    pub async fn user(&self, credentials: &Credentials) -> Result<AuthenticatedUser> {
        let token = credentials
            .bearer_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized(ACCESS_DENIED.to_string()))?;

        let started = Instant::now();
        let check = self.checker.check(token).await;
        metrics::record_session_check(
            started,
            match &check {
                Ok(_) => "ok",
                Err(AuthClientError::SessionNotFound) => "not_found",
                Err(_) => "error",
            },
        );

        let check = check.map_err(|e| match e {
            AuthClientError::SessionNotFound => AppError::Unauthorized(SESSION_EXPIRED.to_string()),
            other => AppError::Internal(other.to_string()),
        })?;

        match (check.user, check.session) {
            (Some(user), Some(session)) => {
                let user = AuthenticatedUser { user, session };
                tracing::debug!(
                    "Session verified: id={}, name={}, type={}, admin={}",
                    user.id(),
                    user.display_name(),
                    user.user_type(),
                    user.is_admin()
                );
                Ok(user)
            }
            _ => Err(AppError::Unauthorized(SESSION_UNKNOWN.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::model::{CheckResult, Session, SessionUser};
    use crate::shared::test_helpers::ScriptedAuthChecker;
    use chrono::{Duration, Utc};

    fn check_result(id: i64, user_type: &str, with_session: bool) -> CheckResult {
        CheckResult {
            user: Some(SessionUser {
                id,
                user_type: user_type.to_string(),
                display_name: format!("user {}", id),
                email: Some(format!("{}@nonexistent.test", user_type)),
                phone: None,
            }),
            session: with_session.then(|| Session {
                until: Utc::now() + Duration::hours(24),
                ip: Some("10.0.0.10".to_string()),
                user_agent: Some("Test User-Agent".to_string()),
                device_id: None,
            }),
        }
    }

    fn authenticator(checker: ScriptedAuthChecker) -> Authenticator {
        Authenticator::new(Arc::new(checker), IntegrationTokens::new("shared-secret"))
    }

    #[tokio::test]
    async fn test_user_table() {
        struct Case {
            name: &'static str,
            token: &'static str,
            checker: ScriptedAuthChecker,
            expect: fn(&Result<AuthenticatedUser>) -> bool,
        }

        let cases = vec![
            Case {
                name: "admin",
                token: "let0me0in",
                checker: ScriptedAuthChecker::new(|token| {
                    if token != "let0me0in" {
                        return Err(AuthClientError::SessionNotFound);
                    }
                    Ok(check_result(1, "admin", true))
                }),
                expect: |r| matches!(r, Ok(u) if u.id() == 1 && u.is_admin()),
            },
            Case {
                name: "dispatcher",
                token: "i0am0dispatcher",
                checker: ScriptedAuthChecker::new(|_| Ok(check_result(2, "dispatcher", true))),
                expect: |r| matches!(r, Ok(u) if u.id() == 2 && !u.is_admin()),
            },
            Case {
                name: "unauthorized",
                token: "nonexistent",
                checker: ScriptedAuthChecker::new(|_| Err(AuthClientError::SessionNotFound)),
                expect: |r| matches!(r, Err(AppError::Unauthorized(_))),
            },
            Case {
                name: "internal_error",
                token: "nonexistent",
                checker: ScriptedAuthChecker::new(|_| {
                    Err(AuthClientError::Transport("connection refused".to_string()))
                }),
                expect: |r| matches!(r, Err(AppError::Internal(_))),
            },
            Case {
                name: "remote_error",
                token: "nonexistent",
                checker: ScriptedAuthChecker::new(|_| {
                    Err(AuthClientError::Remote {
                        status: 503,
                        body: "unavailable".to_string(),
                    })
                }),
                expect: |r| matches!(r, Err(AppError::Internal(_))),
            },
            Case {
                name: "empty_session",
                token: "dont0matter",
                checker: ScriptedAuthChecker::new(|_| Ok(check_result(3, "driver", false))),
                expect: |r| matches!(r, Err(AppError::Unauthorized(_))),
            },
            Case {
                name: "empty_user",
                token: "dont0matter",
                checker: ScriptedAuthChecker::new(|_| Ok(CheckResult::default())),
                expect: |r| matches!(r, Err(AppError::Unauthorized(_))),
            },
        ];

        for case in cases {
            let gate = authenticator(case.checker);
            let result = gate.user(&Credentials::bearer(case.token)).await;
            assert!((case.expect)(&result), "case {}: {:?}", case.name, result);
        }
    }

    #[tokio::test]
    async fn test_missing_token_skips_session_service() {
        let checker = ScriptedAuthChecker::new(|_| Ok(check_result(1, "admin", true)));
        let calls = checker.calls();
        let gate = authenticator(checker);

        let result = gate.authenticate(&Credentials::default()).await;

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_integration_short_circuits() {
        let checker = ScriptedAuthChecker::new(|_| Err(AuthClientError::SessionNotFound));
        let calls = checker.calls();
        let gate = authenticator(checker);
        let token = IntegrationTokens::new("shared-secret")
            .issue("billing")
            .unwrap();

        let caller = gate
            .authenticate(&Credentials::integration(token))
            .await
            .unwrap();

        assert_eq!(caller, Caller::Integration);
        assert_eq!(caller.owner_id(), 0);
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_forged_integration_falls_back_to_session() {
        let checker = ScriptedAuthChecker::new(|_| Ok(check_result(5, "dispatcher", true)));
        let gate = authenticator(checker);
        let forged = IntegrationTokens::new("wrong-secret").issue("evil").unwrap();

        let credentials = Credentials {
            bearer_token: Some("valid".to_string()),
            integration_token: Some(forged),
        };
        let caller = gate.authenticate(&credentials).await.unwrap();

        assert_eq!(caller.owner_id(), 5);
    }
}
