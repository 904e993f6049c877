//! Dispute rows and their resolution notes.
//!
//! A dispute reports a resource in one of three contexts; the reported id
//! lands in the column matching the context and the other two stay NULL.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::db::{self, with_timeout};
use crate::errors::{AppError, Result};

/// Contexts a dispute may be filed under.
pub const CONTEXTS: &[&str] = &["project", "user", "comment"];

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_RESOLVED: &str = "resolved";
pub const STATUS_REJECTED: &str = "rejected";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dispute {
    pub dispute_id: i64,
    pub status: String,
    pub dispute_type: String,
    pub description: String,
    pub context: String,
    pub project_id: Option<i64>,
    pub user_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub evidences: Json<Vec<String>>,
    pub version: i64,
    pub reporter_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub resolved_at: Option<i64>,
}

impl Dispute {
    /// The reported id, whichever context column holds it.
    pub fn reported_resource_id(&self) -> Option<i64> {
        self.project_id.or(self.user_id).or(self.comment_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewDispute {
    pub dispute_type: String,
    pub description: String,
    pub context: String,
    pub resource_id: i64,
    pub evidences: Vec<String>,
    pub reporter_id: i64,
}

const DISPUTE_COLUMNS: &str = "dispute_id, status, dispute_type, description, context, \
     project_id, user_id, comment_id, evidences, version, reporter_id, created_at, \
     updated_at, resolved_at";

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

pub async fn insert(pool: &SqlitePool, new: NewDispute) -> Result<Dispute> {
    // The resource column is part of the statement, so the context must be
    // one of the known values before it gets anywhere near the SQL.
    let resource_column = match new.context.as_str() {
        "project" => "project_id",
        "user" => "user_id",
        "comment" => "comment_id",
        _ => return Err(AppError::validation("context", "must be project, user or comment")),
    };

    let now = db::now();
    with_timeout(async {
        let sql = format!(
            "INSERT INTO disputes \
                 (dispute_type, description, context, {resource_column}, evidences, \
                  reporter_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
             RETURNING {DISPUTE_COLUMNS}"
        );
        let dispute = sqlx::query_as::<_, Dispute>(&sql)
            .bind(&new.dispute_type)
            .bind(&new.description)
            .bind(&new.context)
            .bind(new.resource_id)
            .bind(Json(new.evidences.clone()))
            .bind(new.reporter_id)
            .bind(now)
            .fetch_one(pool)
            .await?;
        Ok(dispute)
    })
    .await
}

/// Move a pending dispute to its final status and record the resolution
/// note, in one transaction.  The version check plus the pending guard make
/// a dispute resolvable exactly once.
pub async fn resolve(
    pool: &SqlitePool,
    dispute_id: i64,
    version: i64,
    status: &str,
    note: &str,
) -> Result<Dispute> {
    let now = db::now();
    with_timeout(async {
        let mut tx = pool.begin().await?;

        let sql = format!(
            "UPDATE disputes \
             SET status = ?1, resolved_at = ?2, updated_at = ?2, version = version + 1 \
             WHERE dispute_id = ?3 AND version = ?4 AND status = 'pending' \
             RETURNING {DISPUTE_COLUMNS}"
        );
        let dispute = sqlx::query_as::<_, Dispute>(&sql)
            .bind(status)
            .bind(now)
            .bind(dispute_id)
            .bind(version)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::EditConflict)?;

        sqlx::query(
            "INSERT INTO dispute_resolutions (dispute_id, note, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(dispute_id)
        .bind(note)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(dispute)
    })
    .await
}

pub async fn delete(pool: &SqlitePool, dispute_id: i64) -> Result<()> {
    with_timeout(async {
        let affected = sqlx::query("DELETE FROM disputes WHERE dispute_id = ?1")
            .bind(dispute_id)
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

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn get(pool: &SqlitePool, dispute_id: i64) -> Result<Dispute> {
    with_timeout(async {
        let sql = format!("SELECT {DISPUTE_COLUMNS} FROM disputes WHERE dispute_id = ?1");
        let dispute = sqlx::query_as::<_, Dispute>(&sql)
            .bind(dispute_id)
            .fetch_optional(pool)
            .await?;
        dispute.ok_or_else(AppError::not_found)
    })
    .await
}
