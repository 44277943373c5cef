/// Password Hashing and Verification
///
/// bcrypt with a per-call random salt embedded in the output. The cost
/// factor makes hashing deliberately expensive; verification is
/// constant-time with respect to the candidate password.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, AuthError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if:
/// - Password fails strength validation (too short, weak, etc.)
/// - Bcrypt hashing fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its stored hash
///
/// A mismatch is `Ok(false)`. A stored hash bcrypt cannot parse is
/// `CorruptCredential` — an operator problem, never silently treated as a
/// wrong password.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    verify(password, stored_hash).map_err(|e| {
        tracing::error!(error = %e, "Stored password hash failed to parse");
        AppError::Auth(AuthError::CorruptCredential)
    })
}

/// Validate password strength requirements
///
/// Requirements:
/// - 8 to 128 characters
/// - At least one digit, one lowercase letter, one uppercase letter
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    // Upper bound guards against bcrypt truncation and oversized input
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}
