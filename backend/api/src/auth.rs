//! Authentication and authorization adapters.
//!
//! Token issuance and credential checks belong to the external identity
//! service; this module only resolves presented bearer tokens and consults
//! the permission table it maintains for us.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use sqlx::SqlitePool;

use crate::api::ApiState;
use crate::db::{self, with_timeout};
use crate::errors::{AppError, Result};
use crate::store::{projects, users};

/// The authenticated caller, resolved once per request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: i64,
    pub email: String,
    pub role: String,
    pub activated: bool,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

// ─────────────────────────────────────────────────────────
// Collaborator seams
// ─────────────────────────────────────────────────────────

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a bearer token to its principal, or None when the token is
    /// unknown or expired.
    async fn verify(&self, token: &str) -> Result<Option<Principal>>;
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn allows(&self, user_id: i64, code: &str) -> Result<bool>;
}

/// Verifier backed by the token table the identity service writes.
pub struct DbTokenVerifier {
    pub pool: SqlitePool,
}

#[async_trait]
impl TokenVerifier for DbTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Option<Principal>> {
        let now = db::now();
        with_timeout(async {
            let row: Option<(i64, String, String, bool)> = sqlx::query_as(
                "SELECT u.user_id, u.email, u.role, u.activated \
                 FROM tokens t \
                 INNER JOIN users u ON u.user_id = t.user_id \
                 WHERE t.token = ?1 AND t.scope = 'authentication' AND t.expiry > ?2",
            )
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(user_id, email, role, activated)| Principal {
                user_id,
                email,
                role,
                activated,
            }))
        })
        .await
    }
}

pub struct DbPermissionChecker {
    pub pool: SqlitePool,
}

#[async_trait]
impl PermissionChecker for DbPermissionChecker {
    async fn allows(&self, user_id: i64, code: &str) -> Result<bool> {
        with_timeout(async {
            let row: Option<(i64,)> = sqlx::query_as(
                "SELECT 1 \
                 FROM users_permissions up \
                 INNER JOIN permissions p ON p.permission_id = up.permission_id \
                 WHERE up.user_id = ?1 AND p.code = ?2",
            )
            .bind(user_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.is_some())
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────
// Request extraction
// ─────────────────────────────────────────────────────────

#[axum::async_trait]
impl FromRequestParts<Arc<ApiState>> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ApiState>) -> Result<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthorized)?;
        state
            .verifier
            .verify(token)
            .await?
            .ok_or(AppError::Unauthorized)
    }
}

// ─────────────────────────────────────────────────────────
// Handler guards
// ─────────────────────────────────────────────────────────

/// Fail unless the caller's account is activated.
pub fn require_activated(p: &Principal) -> Result<()> {
    if p.activated {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "your user account must be activated to access this resource".to_string(),
        ))
    }
}

/// Fail unless the caller is activated and holds the permission code.
/// The admin role holds every code implicitly.
pub async fn require_permission(state: &ApiState, p: &Principal, code: &str) -> Result<()> {
    require_activated(p)?;
    if p.is_admin() {
        return Ok(());
    }
    if state.perms.allows(p.user_id, code).await? {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

/// Fail unless the caller owns the project.  Admins bypass.
pub async fn require_project_owner(
    state: &ApiState,
    project_id: i64,
    p: &Principal,
) -> Result<()> {
    if p.is_admin() {
        return Ok(());
    }
    projects::get(&state.pool, project_id).await?;
    if projects::is_owner(&state.pool, project_id, p.user_id).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You don't have ownership over this resource".to_string(),
        ))
    }
}

/// Fail unless the caller is the account's owner.  Admins bypass.
pub async fn require_account_owner(state: &ApiState, user_id: i64, p: &Principal) -> Result<()> {
    if p.is_admin() {
        return Ok(());
    }
    users::get(&state.pool, user_id).await?;
    if p.user_id == user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You don't have ownership over this resource".to_string(),
        ))
    }
}

/// Fail when the caller owns the project.  Creators cannot back their own
/// campaigns.
pub async fn forbid_project_owner(
    state: &ApiState,
    project_id: i64,
    p: &Principal,
) -> Result<()> {
    projects::get(&state.pool, project_id).await?;
    if projects::is_owner(&state.pool, project_id, p.user_id).await? {
        Err(AppError::Forbidden("You can't back yourself".to_string()))
    } else {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
