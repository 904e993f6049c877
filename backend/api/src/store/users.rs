//! Platform users.  Credentials live with the external identity service;
//! this table only carries the profile the platform itself needs.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::{self, with_timeout};
use crate::errors::{is_unique_violation, AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub activated: bool,
    pub version: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: String,
}

const USER_COLUMNS: &str = "user_id, username, email, role, activated, version, created_at";

pub async fn insert(pool: &SqlitePool, new: NewUser) -> Result<User> {
    let now = db::now();
    with_timeout(async {
        let sql = format!(
            "INSERT INTO users (username, email, role, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.role)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::validation("email", "a user with this email address already exists")
                } else {
                    AppError::Database(e)
                }
            })?;
        Ok(user)
    })
    .await
}

pub async fn get(pool: &SqlitePool, user_id: i64) -> Result<User> {
    with_timeout(async {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
        user.ok_or_else(AppError::not_found)
    })
    .await
}

/// Conditional profile update; the version check mirrors the other
/// aggregates.
pub async fn update(pool: &SqlitePool, user: &User) -> Result<User> {
    with_timeout(async {
        let sql = format!(
            "UPDATE users \
             SET username = ?1, email = ?2, role = ?3, activated = ?4, \
                 version = version + 1 \
             WHERE user_id = ?5 AND version = ?6 \
             RETURNING {USER_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.role)
            .bind(user.activated)
            .bind(user.user_id)
            .bind(user.version)
            .fetch_optional(pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::validation("email", "a user with this email address already exists")
                } else {
                    AppError::Database(e)
                }
            })?;
        updated.ok_or(AppError::EditConflict)
    })
    .await
}

pub async fn delete(pool: &SqlitePool, user_id: i64) -> Result<()> {
    with_timeout(async {
        let affected = sqlx::query("DELETE FROM users WHERE user_id = ?1")
            .bind(user_id)
            .execute(pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    })
    .await
}
