//! User handlers.  Credentials and token issuance live with the identity
//! service; these endpoints manage the platform profile only.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{self, Principal};
use crate::errors::{AppError, Result};
use crate::store::users::{self, NewUser};
use crate::validate::{self, Validator};

use super::ApiState;

#[derive(Debug, Deserialize)]
pub struct SignupBody {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateUserBody {
    pub username: Option<String>,
    pub email: Option<String>,
    /// Admin-only field.
    pub role: Option<String>,
    /// Admin-only field.
    pub activated: Option<bool>,
}

/// `POST /v1/users/signup`: public self-registration.  New accounts start
/// deactivated; activation arrives through the identity service.
pub async fn signup(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<SignupBody>,
) -> Result<impl IntoResponse> {
    let mut v = Validator::new();
    validate::check_username(&mut v, &body.username);
    validate::check_email(&mut v, &body.email);
    v.finish()?;

    let user = users::insert(
        &state.pool,
        NewUser {
            username: body.username,
            email: body.email,
            role: "backer".to_string(),
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created successfully",
            "user": user,
        })),
    ))
}

/// `GET /v1/users/me`
pub async fn me(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
) -> Result<impl IntoResponse> {
    let user = users::get(&state.pool, principal.user_id).await?;
    Ok(Json(json!({
        "message": "User returned successfully",
        "user": user,
    })))
}

/// `GET /v1/users/:id`
pub async fn get_one(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    auth::require_permission(&state, &principal, "users:read").await?;
    let user = users::get(&state.pool, user_id).await?;
    Ok(Json(json!({
        "message": "User returned successfully",
        "user": user,
    })))
}

/// `PATCH /v1/users/:id`: profile update; role and activation flips are
/// reserved to admins.
pub async fn update(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(user_id): Path<i64>,
    Json(body): Json<UpdateUserBody>,
) -> Result<impl IntoResponse> {
    auth::require_account_owner(&state, user_id, &principal).await?;
    if (body.role.is_some() || body.activated.is_some()) && !principal.is_admin() {
        return Err(AppError::forbidden());
    }

    let mut user = users::get(&state.pool, user_id).await?;
    if let Some(username) = body.username {
        user.username = username;
    }
    if let Some(email) = body.email {
        user.email = email;
    }
    if let Some(role) = body.role {
        user.role = role;
    }
    if let Some(activated) = body.activated {
        user.activated = activated;
    }

    let mut v = Validator::new();
    validate::check_username(&mut v, &user.username);
    validate::check_email(&mut v, &user.email);
    v.finish()?;

    let updated = users::update(&state.pool, &user).await?;
    Ok(Json(json!({
        "message": "User updated successfully",
        "user": updated,
    })))
}

/// `DELETE /v1/users/:id`
pub async fn delete(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    auth::require_permission(&state, &principal, "users:delete").await?;
    users::delete(&state.pool, user_id).await?;
    Ok(Json(json!({ "message": "User deleted successfully" })))
}
