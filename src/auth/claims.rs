/// Token claims structure
///
/// Access and refresh tokens share one signed payload (RFC 7519 fields
/// plus the portal's role/purpose extensions); they differ in TTL, in the
/// `purpose` flag, and in the presence of `jti` — only refresh tokens name
/// the session record they belong to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;
use crate::policy::Role;

/// Distinguishes what a token may be used for. Checked on every decode so
/// an access token can never stand in for a refresh token or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Subject's role at issue time
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
    pub purpose: TokenPurpose,
    /// Session id, present on refresh tokens only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims {
    /// Claims for a short-lived access token
    pub fn access(user_id: Uuid, role: Role, expiry_seconds: i64, issuer: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            role,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            purpose: TokenPurpose::Access,
            jti: None,
        }
    }

    /// Claims for a long-lived refresh token bound to session `token_id`
    pub fn refresh(
        user_id: Uuid,
        role: Role,
        token_id: String,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            role,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            purpose: TokenPurpose::Refresh,
            jti: Some(token_id),
        }
    }

    /// Extract the subject's user id
    ///
    /// # Errors
    /// A non-UUID subject means the token did not come from this issuer.
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::TokenInvalid)
    }

    /// Request-scoped identity derived from validated claims
    pub fn identity(&self) -> Result<IdentityContext, AuthError> {
        Ok(IdentityContext {
            subject_id: self.user_id()?,
            role: self.role,
        })
    }
}

/// Identity of the current request's subject. Produced by the token
/// validator, passed by value to handlers and the policy engine; never
/// cached or shared across requests.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub subject_id: Uuid,
    pub role: Role,
}
