/// Token Codec
///
/// Stateless signing and verification of the portal's compact claims.
/// Signature is verified before any claim is inspected; expiry honors a
/// configurable leeway so the validator never assumes its clock matches
/// the issuer's to the millisecond.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::{Claims, TokenPurpose};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Sign claims into a tamper-evident token string
///
/// # Errors
/// Returns error if serialization or signing fails
pub fn encode_token(claims: &Claims, config: &JwtSettings) -> Result<String, AppError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
}

/// Verify a token and extract its claims
///
/// Rejections are distinct: a past-expiry token with a valid signature is
/// `TokenExpired`; any signature, structure, issuer, or purpose mismatch is
/// `TokenInvalid`. Callers use the distinction to decide between "try a
/// refresh" and "re-login".
pub fn decode_token(
    token: &str,
    expected_purpose: TokenPurpose,
    config: &JwtSettings,
) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.leeway = config.leeway_seconds;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid,
    })?;

    if claims.purpose != expected_purpose {
        return Err(AuthError::TokenInvalid);
    }

    Ok(claims)
}

/// Decode a token whose signature must verify but whose expiry is not
/// enforced.
///
/// The refresh path uses this to identify the session behind an expired
/// token: a superseded token replayed after its TTL ran out must still
/// trigger its family's revocation, and sign-out of an expired token must
/// still revoke its record. Every failure here is `TokenInvalid`.
pub fn decode_token_ignoring_expiry(
    token: &str,
    expected_purpose: TokenPurpose,
    config: &JwtSettings,
) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.validate_exp = false;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::TokenInvalid)?;

    if claims.purpose != expected_purpose {
        return Err(AuthError::TokenInvalid);
    }

    Ok(claims)
}
