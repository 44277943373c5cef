/// Authentication Routes
///
/// Sign-in, sign-out, and refresh-token rotation. Wire shapes are the
/// portal's camelCase contract: token pairs as `{accessToken,
/// refreshToken}`, refresh requests as `{email, oldRefreshToken}`.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::{verify_password, RefreshCoordinator, TokenIssuer};
use crate::error::{AppError, AuthError};
use crate::store::UserStore;
use crate::validators::is_valid_email;

#[derive(Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignoutRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub email: String,
    #[serde(rename = "oldRefreshToken")]
    pub old_refresh_token: String,
}

/// POST /signin
///
/// Verify credentials and root a new session chain. Unknown email and
/// wrong password produce the same 401 body, so responses never reveal
/// which emails are registered.
pub async fn signin(
    form: web::Json<SigninRequest>,
    users: web::Data<dyn UserStore>,
    issuer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;

    let user = users
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::BadCredentials)?;

    if !verify_password(&form.password, &user.password_hash)? {
        return Err(AuthError::BadCredentials.into());
    }

    let pair = issuer.issue(&user).await?;

    tracing::info!(user_id = %user.id, "User signed in");
    Ok(HttpResponse::Ok().json(pair))
}

/// POST /signout
///
/// Revoke the session named by the refresh token. Idempotent: signing out
/// an already-revoked session succeeds.
pub async fn signout(
    form: web::Json<SignoutRequest>,
    coordinator: web::Data<RefreshCoordinator>,
) -> Result<HttpResponse, AppError> {
    coordinator.sign_out(&form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "description": "Signed out"
    })))
}

/// POST /refresh-tokens
///
/// Rotate an offered refresh token into a new pair. Rejections carry the
/// `badRefreshToken` / `refreshTokenExpired` flags the client keys on;
/// a replay-triggered rejection additionally sets `compromised` after the
/// whole session family has been revoked.
pub async fn refresh_tokens(
    form: web::Json<RefreshRequest>,
    coordinator: web::Data<RefreshCoordinator>,
) -> Result<HttpResponse, AppError> {
    let pair = coordinator
        .refresh(&form.email, &form.old_refresh_token)
        .await?;

    Ok(HttpResponse::Ok().json(pair))
}
