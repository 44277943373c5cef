/// Refresh Coordinator
///
/// Validates an offered refresh token against the session store and
/// atomically rotates it to a new access+refresh pair. Reuse of an
/// already-rotated or revoked token is the canonical theft signal, so the
/// response is not "reject this call" but "revoke the subject's whole
/// session family and force re-login".
///
/// Client contract: callers must coordinate so that only one refresh is
/// in flight per session. Two concurrent refreshes with the same token
/// race the rotation; exactly one wins, and the loser is handled as a
/// replay of a rotated token (which revokes the family).

use std::sync::Arc;

use crate::auth::claims::{Claims, TokenPurpose};
use crate::auth::issuer::{generate_session_id, TokenPair};
use crate::auth::jwt::{decode_token, decode_token_ignoring_expiry, encode_token};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::store::{RefreshRecord, SessionStore, UserStore};

pub struct RefreshCoordinator {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    config: JwtSettings,
}

impl RefreshCoordinator {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        config: JwtSettings,
    ) -> Self {
        Self {
            users,
            sessions,
            config,
        }
    }

    /// Rotate `offered_token` into a fresh pair for the subject behind
    /// `email`.
    ///
    /// Either the full rotation commits or nothing does; no partial state
    /// survives a rejection.
    pub async fn refresh(
        &self,
        email: &str,
        offered_token: &str,
    ) -> Result<TokenPair, AppError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UnknownSubject)?;

        // Signature first. An expired token still names its session, and
        // that record must be checked for replay before the expiry
        // rejection goes out: a stolen token replayed after its TTL ran
        // out is still theft evidence.
        let (claims, token_expired) =
            match decode_token(offered_token, TokenPurpose::Refresh, &self.config) {
                Ok(claims) => (claims, false),
                Err(AuthError::TokenExpired) => {
                    let claims = decode_token_ignoring_expiry(
                        offered_token,
                        TokenPurpose::Refresh,
                        &self.config,
                    )
                    .map_err(|_| AuthError::BadRefreshToken)?;
                    (claims, true)
                }
                Err(_) => return Err(AuthError::BadRefreshToken.into()),
            };

        let token_id = claims.jti.ok_or(AuthError::BadRefreshToken)?;

        let record = self
            .sessions
            .find(&token_id)
            .await?
            .ok_or(AuthError::BadRefreshToken)?;

        // A token of one subject offered under another subject's email
        // is never rotated.
        if record.subject_id != user.id {
            return Err(AuthError::BadRefreshToken.into());
        }

        if !record.is_active() {
            return self.escalate_replay(user.id, &token_id).await;
        }

        if token_expired || record.is_expired(chrono::Utc::now()) {
            return Err(AuthError::RefreshTokenExpired { compromised: false }.into());
        }

        let new_token_id = generate_session_id();
        let replacement = RefreshRecord::new(
            new_token_id.clone(),
            user.id,
            self.config.refresh_token_expiry,
        );

        use crate::store::RotateOutcome;
        match self.sessions.rotate(&token_id, replacement).await? {
            RotateOutcome::Rotated => {}
            // Lost a race against a concurrent refresh: the record was
            // active a moment ago and is superseded now. Same treatment
            // as any other replay.
            RotateOutcome::NotActive => {
                return self.escalate_replay(user.id, &token_id).await;
            }
            RotateOutcome::Missing => return Err(AuthError::BadRefreshToken.into()),
        }

        let access_claims = Claims::access(
            user.id,
            user.role,
            self.config.access_token_expiry,
            self.config.issuer.clone(),
        );
        let refresh_claims = Claims::refresh(
            user.id,
            user.role,
            new_token_id,
            self.config.refresh_token_expiry,
            self.config.issuer.clone(),
        );

        tracing::info!(user_id = %user.id, "Refresh token rotated");

        Ok(TokenPair {
            access_token: encode_token(&access_claims, &self.config)?,
            refresh_token: encode_token(&refresh_claims, &self.config)?,
        })
    }

    /// Revoke the identified session chain. Signing out an already-revoked
    /// or expired session is not an error.
    pub async fn sign_out(&self, offered_token: &str) -> Result<(), AppError> {
        let claims = match decode_token(offered_token, TokenPurpose::Refresh, &self.config) {
            Ok(claims) => claims,
            // An expired token still names its record; revoke it so the
            // persisted state never keeps a dead chain's link active.
            Err(AuthError::TokenExpired) => {
                decode_token_ignoring_expiry(offered_token, TokenPurpose::Refresh, &self.config)
                    .map_err(|_| AuthError::BadRefreshToken)?
            }
            Err(_) => return Err(AuthError::BadRefreshToken.into()),
        };

        let token_id = claims.jti.ok_or(AuthError::BadRefreshToken)?;
        self.sessions.revoke(&token_id).await?;

        tracing::info!(subject = %claims.sub, "Session signed out");
        Ok(())
    }

    /// Revoke every session of a subject (account deletion, administrative
    /// lockout).
    pub async fn revoke_subject(&self, subject_id: uuid::Uuid) -> Result<(), AppError> {
        self.sessions.revoke_all_for_subject(subject_id).await
    }

    async fn escalate_replay(
        &self,
        subject_id: uuid::Uuid,
        token_id: &str,
    ) -> Result<TokenPair, AppError> {
        tracing::warn!(
            subject_id = %subject_id,
            token_id = %token_id,
            "Rotated or revoked refresh token replayed; revoking session family"
        );
        self.sessions.revoke_all_for_subject(subject_id).await?;
        Err(AuthError::RefreshTokenExpired { compromised: true }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::issuer::TokenIssuer;
    use crate::policy::Role;
    use crate::store::{MemorySessionStore, MemoryUserStore, NewUser, User};

    fn test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            leeway_seconds: 5,
            issuer: "portal-test".to_string(),
        }
    }

    struct Fixture {
        users: Arc<MemoryUserStore>,
        sessions: Arc<MemorySessionStore>,
        issuer: TokenIssuer,
        coordinator: RefreshCoordinator,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(MemoryUserStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let config = test_config();
        Fixture {
            users: users.clone(),
            sessions: sessions.clone(),
            issuer: TokenIssuer::new(sessions.clone(), config.clone()),
            coordinator: RefreshCoordinator::new(users, sessions, config),
        }
    }

    async fn signed_in_user(fx: &Fixture, email: &str) -> (User, TokenPair) {
        let user = fx
            .users
            .create(NewUser {
                name: "Test".to_string(),
                email: email.to_string(),
                password_hash: "$2b$12$hash".to_string(),
                role: Role::User,
            })
            .await
            .unwrap();
        let pair = fx.issuer.issue(&user).await.unwrap();
        (user, pair)
    }

    fn auth_err(result: Result<TokenPair, AppError>) -> AuthError {
        match result {
            Err(AppError::Auth(e)) => e,
            other => panic!("Expected auth error, got {:?}", other.map(|_| "TokenPair")),
        }
    }

    #[tokio::test]
    async fn happy_path_rotates_to_a_fresh_pair() {
        let fx = fixture();
        let (_, pair) = signed_in_user(&fx, "ann@example.com").await;

        let rotated = fx
            .coordinator
            .refresh("ann@example.com", &pair.refresh_token)
            .await
            .expect("rotation should succeed");

        assert_ne!(rotated.refresh_token, pair.refresh_token);

        // The new token is immediately usable.
        fx.coordinator
            .refresh("ann@example.com", &rotated.refresh_token)
            .await
            .expect("rotated token should be active");
    }

    #[tokio::test]
    async fn unknown_email_is_rejected() {
        let fx = fixture();
        let (_, pair) = signed_in_user(&fx, "ann@example.com").await;

        let err = auth_err(
            fx.coordinator
                .refresh("nobody@example.com", &pair.refresh_token)
                .await,
        );
        assert_eq!(err, AuthError::UnknownSubject);
    }

    #[tokio::test]
    async fn malformed_token_is_rejected() {
        let fx = fixture();
        signed_in_user(&fx, "ann@example.com").await;

        let err = auth_err(
            fx.coordinator
                .refresh("ann@example.com", "garbage.token.here")
                .await,
        );
        assert_eq!(err, AuthError::BadRefreshToken);
    }

    #[tokio::test]
    async fn access_token_is_not_a_refresh_token() {
        let fx = fixture();
        let (_, pair) = signed_in_user(&fx, "ann@example.com").await;

        let err = auth_err(
            fx.coordinator
                .refresh("ann@example.com", &pair.access_token)
                .await,
        );
        assert_eq!(err, AuthError::BadRefreshToken);
    }

    #[tokio::test]
    async fn anothers_token_under_my_email_is_rejected() {
        let fx = fixture();
        let (_, ann_pair) = signed_in_user(&fx, "ann@example.com").await;
        signed_in_user(&fx, "bob@example.com").await;

        let err = auth_err(
            fx.coordinator
                .refresh("bob@example.com", &ann_pair.refresh_token)
                .await,
        );
        assert_eq!(err, AuthError::BadRefreshToken);
    }

    #[tokio::test]
    async fn replay_revokes_the_whole_family() {
        let fx = fixture();
        let (user, pair) = signed_in_user(&fx, "ann@example.com").await;

        let rotated = fx
            .coordinator
            .refresh("ann@example.com", &pair.refresh_token)
            .await
            .unwrap();

        // Replaying the superseded token flags compromise...
        let err = auth_err(
            fx.coordinator
                .refresh("ann@example.com", &pair.refresh_token)
                .await,
        );
        assert_eq!(err, AuthError::RefreshTokenExpired { compromised: true });

        // ...and poisons the newest token too.
        let err = auth_err(
            fx.coordinator
                .refresh("ann@example.com", &rotated.refresh_token)
                .await,
        );
        assert_eq!(err, AuthError::RefreshTokenExpired { compromised: true });

        // Every record of the subject is revoked.
        let claims =
            decode_token(&rotated.refresh_token, TokenPurpose::Refresh, &test_config()).unwrap();
        let record = fx
            .sessions
            .find(&claims.jti.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(record.revoked);
        assert_eq!(record.subject_id, user.id);
    }

    #[tokio::test]
    async fn signed_out_token_cannot_refresh() {
        let fx = fixture();
        let (_, pair) = signed_in_user(&fx, "ann@example.com").await;

        fx.coordinator.sign_out(&pair.refresh_token).await.unwrap();
        // Idempotent.
        fx.coordinator.sign_out(&pair.refresh_token).await.unwrap();

        let err = auth_err(
            fx.coordinator
                .refresh("ann@example.com", &pair.refresh_token)
                .await,
        );
        assert_eq!(err, AuthError::RefreshTokenExpired { compromised: true });
    }

    #[tokio::test]
    async fn expired_refresh_token_is_expired_without_compromise_flag() {
        let fx = fixture();
        let users = fx.users.clone();
        let user = users
            .create(NewUser {
                name: "Test".to_string(),
                email: "ann@example.com".to_string(),
                password_hash: "$2b$12$hash".to_string(),
                role: Role::User,
            })
            .await
            .unwrap();

        // Issue against a config whose refresh TTL is already in the past.
        let mut expired_config = test_config();
        expired_config.refresh_token_expiry = -120;
        let issuer = TokenIssuer::new(fx.sessions.clone(), expired_config);
        let pair = issuer.issue(&user).await.unwrap();

        let err = auth_err(
            fx.coordinator
                .refresh("ann@example.com", &pair.refresh_token)
                .await,
        );
        assert_eq!(err, AuthError::RefreshTokenExpired { compromised: false });
    }

    #[tokio::test]
    async fn replay_of_a_rotated_token_escalates_even_after_its_expiry() {
        let fx = fixture();
        let (user, pair) = signed_in_user(&fx, "ann@example.com").await;

        let rotated = fx
            .coordinator
            .refresh("ann@example.com", &pair.refresh_token)
            .await
            .unwrap();

        // The superseded token, replayed as if its TTL had since run out.
        let old_claims =
            decode_token(&pair.refresh_token, TokenPurpose::Refresh, &test_config()).unwrap();
        let stale_claims = Claims::refresh(
            user.id,
            user.role,
            old_claims.jti.unwrap(),
            -120,
            test_config().issuer,
        );
        let stale_token = encode_token(&stale_claims, &test_config()).unwrap();

        let err = auth_err(fx.coordinator.refresh("ann@example.com", &stale_token).await);
        assert_eq!(err, AuthError::RefreshTokenExpired { compromised: true });

        // The family revocation reached the chain's newest link.
        let newest_claims =
            decode_token(&rotated.refresh_token, TokenPurpose::Refresh, &test_config()).unwrap();
        let record = fx
            .sessions
            .find(&newest_claims.jti.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(record.revoked);
    }

    #[tokio::test]
    async fn sign_out_of_an_expired_token_still_revokes_its_record() {
        let fx = fixture();
        let (user, pair) = signed_in_user(&fx, "ann@example.com").await;
        let token_id = decode_token(&pair.refresh_token, TokenPurpose::Refresh, &test_config())
            .unwrap()
            .jti
            .unwrap();

        let stale_claims = Claims::refresh(
            user.id,
            user.role,
            token_id.clone(),
            -120,
            test_config().issuer,
        );
        let stale_token = encode_token(&stale_claims, &test_config()).unwrap();

        fx.coordinator.sign_out(&stale_token).await.unwrap();

        let record = fx.sessions.find(&token_id).await.unwrap().unwrap();
        assert!(record.revoked);
    }

    #[tokio::test]
    async fn concurrent_refreshes_succeed_exactly_once() {
        let fx = fixture();
        let (_, pair) = signed_in_user(&fx, "ann@example.com").await;

        let coordinator = Arc::new(fx.coordinator);
        let first = {
            let coordinator = coordinator.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { coordinator.refresh("ann@example.com", &token).await })
        };
        let second = {
            let coordinator = coordinator.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { coordinator.refresh("ann@example.com", &token).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();

        assert_eq!(successes, 1, "exactly one racing refresh may win");
        for result in results {
            if let Err(AppError::Auth(e)) = result {
                assert!(matches!(
                    e,
                    AuthError::RefreshTokenExpired { compromised: true }
                        | AuthError::BadRefreshToken
                ));
            }
        }
    }
}
