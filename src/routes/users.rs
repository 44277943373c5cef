/// User Routes
///
/// Registration plus the protected profile/role/post routes. Every access
/// check goes through the policy table; handlers supply the resource
/// owner id (here the path user id) and never compare roles themselves.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{hash_password, IdentityContext, RefreshCoordinator, TokenIssuer};
use crate::error::{AppError, DatabaseError, ValidationError};
use crate::policy::{authorize, Action, Role};
use crate::store::{NewUser, ProfilePatch, UserStore};
use crate::validators::is_valid_email;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

/// Owner- and admin-facing profile view
#[derive(Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// What anonymous and non-owner readers get
#[derive(Serialize)]
pub struct PublicProfileResponse {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

/// POST /users
///
/// Registration. New accounts always start with role `user`; elevation
/// goes through the change-role route. Returns a fresh token pair so the
/// client is signed in immediately.
pub async fn register(
    form: web::Json<RegisterRequest>,
    users: web::Data<dyn UserStore>,
    issuer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    let name = form.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()).into());
    }

    let password_hash = hash_password(&form.password)?;

    let user = users
        .create(NewUser {
            name: name.to_string(),
            email,
            password_hash,
            role: Role::User,
        })
        .await?;

    let pair = issuer.issue(&user).await?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok(HttpResponse::Created().json(pair))
}

/// GET /users/{id}
///
/// Public profile read. No identity required; the policy table marks it
/// public.
pub async fn get_user(
    path: web::Path<Uuid>,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    authorize(None, Some(user_id), Action::ReadPublic).into_result()?;

    let user = users.find_by_id(user_id).await?.ok_or_else(|| {
        AppError::Database(DatabaseError::NotFound(format!("User {}", user_id)))
    })?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": PublicProfileResponse {
            id: user.id,
            name: user.name,
            role: user.role,
        }
    })))
}

/// GET /users/{id}/posts
///
/// Ownership-switched listing: owners and admin roles see private posts
/// too, everyone else sees public ones. The policy decision picks the
/// switch; a Deny here narrows the view instead of rejecting the request.
pub async fn list_posts(
    path: web::Path<Uuid>,
    identity: web::ReqData<IdentityContext>,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse, AppError> {
    let owner_id = path.into_inner();
    let include_private =
        authorize(Some(&identity), Some(owner_id), Action::ListOwnerPosts).is_allow();

    let posts = users.posts_for(owner_id, include_private).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": posts
    })))
}

/// PATCH /users/{id}
///
/// Profile update for the owner or an admin role. The plaintext password
/// field, when present, is replaced by its hash before anything is stored.
pub async fn update_profile(
    path: web::Path<Uuid>,
    identity: web::ReqData<IdentityContext>,
    form: web::Json<UpdateProfileRequest>,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    authorize(Some(&identity), Some(user_id), Action::EditProfile).into_result()?;

    let patch = ProfilePatch {
        name: form.name.as_deref().map(|n| n.trim().to_string()),
        email: form.email.as_deref().map(is_valid_email).transpose()?,
        password_hash: form
            .password
            .as_deref()
            .map(hash_password)
            .transpose()?,
    };

    let user = users.update_profile(user_id, patch).await?;

    tracing::info!(user_id = %user.id, "Profile updated");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": ProfileResponse {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    })))
}

/// DELETE /users/{id}
///
/// Remove the account and revoke every session it holds.
pub async fn delete_profile(
    path: web::Path<Uuid>,
    identity: web::ReqData<IdentityContext>,
    users: web::Data<dyn UserStore>,
    coordinator: web::Data<RefreshCoordinator>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    authorize(Some(&identity), Some(user_id), Action::DeleteProfile).into_result()?;

    users.delete(user_id).await?;
    coordinator.revoke_subject(user_id).await?;

    tracing::info!(user_id = %user_id, deleted_by = %identity.subject_id, "User removed");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "description": format!("User #{} was removed", user_id)
    })))
}

/// POST /users/{id}/change-role
///
/// Superuser only — the policy table denies it even for other admin
/// roles.
pub async fn change_role(
    path: web::Path<Uuid>,
    identity: web::ReqData<IdentityContext>,
    form: web::Json<ChangeRoleRequest>,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    authorize(Some(&identity), Some(user_id), Action::ChangeUserRole).into_result()?;

    let role: Role = form
        .role
        .parse()
        .map_err(|_| ValidationError::InvalidFormat("role".to_string()))?;

    users.set_role(user_id, role).await?;

    tracing::info!(user_id = %user_id, role = %role, changed_by = %identity.subject_id, "Role changed");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "description": format!("User #{} role set to {}", user_id, role)
    })))
}
