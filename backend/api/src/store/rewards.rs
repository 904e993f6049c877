//! Reward tiers and their attachment to backings.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::db::{self, with_timeout};
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reward {
    pub reward_id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: String,
    /// Pledge threshold in minor currency units.
    pub amount: i64,
    pub estimated_delivery: Option<i64>,
    pub image_url: Option<String>,
    pub is_available: bool,
    pub includes: Json<Vec<String>>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReward {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: i64,
    #[serde(default)]
    pub estimated_delivery: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_available")]
    pub is_available: bool,
    #[serde(default)]
    pub includes: Vec<String>,
}

fn default_available() -> bool {
    true
}

const REWARD_COLUMNS: &str = "reward_id, project_id, title, description, amount, \
     estimated_delivery, image_url, is_available, includes, version, created_at, updated_at";

// ─────────────────────────────────────────────────────────
// Owner bulk CRUD
// ─────────────────────────────────────────────────────────

/// Replace a project's entire reward set in one transaction.  Existing
/// attachment rows go with the deleted rewards.
pub async fn replace_all(
    pool: &SqlitePool,
    project_id: i64,
    rewards: &[NewReward],
) -> Result<Vec<Reward>> {
    let now = db::now();
    with_timeout(async {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM rewards WHERE project_id = ?1")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = Vec::with_capacity(rewards.len());
        for reward in rewards {
            let sql = format!(
                "INSERT INTO rewards \
                     (project_id, title, description, amount, estimated_delivery, \
                      image_url, is_available, includes, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
                 RETURNING {REWARD_COLUMNS}"
            );
            let row = sqlx::query_as::<_, Reward>(&sql)
                .bind(project_id)
                .bind(&reward.title)
                .bind(&reward.description)
                .bind(reward.amount)
                .bind(reward.estimated_delivery)
                .bind(&reward.image_url)
                .bind(reward.is_available)
                .bind(Json(reward.includes.clone()))
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
            inserted.push(row);
        }

        tx.commit().await?;
        Ok(inserted)
    })
    .await
}

// ─────────────────────────────────────────────────────────
// Backing attachments
// ─────────────────────────────────────────────────────────

pub async fn get(pool: &SqlitePool, reward_id: i64) -> Result<Reward> {
    with_timeout(async {
        let sql = format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE reward_id = ?1");
        let reward = sqlx::query_as::<_, Reward>(&sql)
            .bind(reward_id)
            .fetch_optional(pool)
            .await?;
        reward.ok_or_else(AppError::not_found)
    })
    .await
}

/// Link a reward to a backing.  Repeating an id in one request is a no-op.
pub async fn attach_to_backing(pool: &SqlitePool, backing_id: i64, reward_id: i64) -> Result<()> {
    with_timeout(async {
        sqlx::query(
            "INSERT OR IGNORE INTO backing_rewards (backing_id, reward_id) VALUES (?1, ?2)",
        )
        .bind(backing_id)
        .bind(reward_id)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

pub async fn backing_has_rewards(pool: &SqlitePool, backing_id: i64) -> Result<bool> {
    with_timeout(async {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM backing_rewards WHERE backing_id = ?1 LIMIT 1")
                .bind(backing_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.is_some())
    })
    .await
}

/// Remove every reward link a backing holds.  Only the refund path calls
/// this.
pub async fn detach_all(pool: &SqlitePool, backing_id: i64) -> Result<()> {
    with_timeout(async {
        sqlx::query("DELETE FROM backing_rewards WHERE backing_id = ?1")
            .bind(backing_id)
            .execute(pool)
            .await?;
        Ok(())
    })
    .await
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn list_for_project(pool: &SqlitePool, project_id: i64) -> Result<Vec<Reward>> {
    with_timeout(async {
        let sql = format!(
            "SELECT {REWARD_COLUMNS} FROM rewards \
             WHERE project_id = ?1 ORDER BY amount ASC, reward_id ASC"
        );
        let rewards = sqlx::query_as::<_, Reward>(&sql)
            .bind(project_id)
            .fetch_all(pool)
            .await?;
        Ok(rewards)
    })
    .await
}

pub async fn list_for_backing(pool: &SqlitePool, backing_id: i64) -> Result<Vec<Reward>> {
    with_timeout(async {
        let rewards = sqlx::query_as::<_, Reward>(
            "SELECT r.reward_id, r.project_id, r.title, r.description, r.amount, \
                    r.estimated_delivery, r.image_url, r.is_available, r.includes, \
                    r.version, r.created_at, r.updated_at \
             FROM rewards r \
             INNER JOIN backing_rewards br ON br.reward_id = r.reward_id \
             WHERE br.backing_id = ?1 \
             ORDER BY r.amount ASC, r.reward_id ASC",
        )
        .bind(backing_id)
        .fetch_all(pool)
        .await?;
        Ok(rewards)
    })
    .await
}
