/// Token Issuer
///
/// Creates a fresh access+refresh pair for an already-authenticated user
/// and registers the refresh token in the session store. This is the only
/// place a new session chain is rooted; rotation of an existing chain
/// lives in the refresh coordinator.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::sync::Arc;

use crate::auth::claims::Claims;
use crate::auth::jwt::encode_token;
use crate::configuration::JwtSettings;
use crate::error::AppError;
use crate::store::{RefreshRecord, SessionStore, User};

/// The pair handed to the client on sign-in, registration, and refresh
#[derive(Debug, Clone, serde::Serialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Generate an unguessable session id (64 alphanumeric characters,
/// ~380 bits of entropy)
pub fn generate_session_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

pub struct TokenIssuer {
    sessions: Arc<dyn SessionStore>,
    config: JwtSettings,
}

impl TokenIssuer {
    pub fn new(sessions: Arc<dyn SessionStore>, config: JwtSettings) -> Self {
        Self { sessions, config }
    }

    /// Root a new session chain for `user` and encode both tokens.
    ///
    /// Precondition: the caller has already verified the user's
    /// credentials (or just registered them).
    pub async fn issue(&self, user: &User) -> Result<TokenPair, AppError> {
        let token_id = generate_session_id();

        let record = RefreshRecord::new(
            token_id.clone(),
            user.id,
            self.config.refresh_token_expiry,
        );
        self.sessions.insert(record).await?;

        let access_claims = Claims::access(
            user.id,
            user.role,
            self.config.access_token_expiry,
            self.config.issuer.clone(),
        );
        let refresh_claims = Claims::refresh(
            user.id,
            user.role,
            token_id,
            self.config.refresh_token_expiry,
            self.config.issuer.clone(),
        );

        Ok(TokenPair {
            access_token: encode_token(&access_claims, &self.config)?,
            refresh_token: encode_token(&refresh_claims, &self.config)?,
        })
    }
}
