//! Expert profiles and their project assessments.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::db::{self, with_timeout};
use crate::errors::{is_unique_violation, AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Expert {
    pub expert_id: i64,
    pub user_id: i64,
    pub expertise_fields: Json<Vec<String>>,
    pub expertise_level: f64,
    pub qualification: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExpert {
    pub user_id: i64,
    #[serde(default)]
    pub expertise_fields: Vec<String>,
    pub expertise_level: f64,
    #[serde(default)]
    pub qualification: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Weighted recommendation, each component 0.0..=1.0 in steps of 0.1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub highly_not_recommended: f64,
    pub not_recommended: f64,
    pub recommended: f64,
    pub highly_recommended: f64,
}

impl Vote {
    pub fn weights(&self) -> [f64; 4] {
        [
            self.highly_not_recommended,
            self.not_recommended,
            self.recommended,
            self.highly_recommended,
        ]
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExpertReview {
    pub review_id: i64,
    pub vote: Json<Vote>,
    pub comment: Option<String>,
    pub project_id: i64,
    pub expert_id: i64,
    pub reviewed_at: i64,
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

pub async fn insert(pool: &SqlitePool, new: NewExpert) -> Result<Expert> {
    with_timeout(async {
        let expert = sqlx::query_as::<_, Expert>(
            "INSERT INTO experts \
                 (user_id, expertise_fields, expertise_level, qualification, is_active) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             RETURNING expert_id, user_id, expertise_fields, expertise_level, \
                       qualification, is_active",
        )
        .bind(new.user_id)
        .bind(Json(new.expertise_fields.clone()))
        .bind(new.expertise_level)
        .bind(&new.qualification)
        .bind(new.is_active)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::validation("user_id", "is already registered as an expert")
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(expert)
    })
    .await
}

/// Record an expert's vote on a project.  The unique (project, expert)
/// constraint turns a repeat vote into the distinguished duplicate-vote
/// error; the first row stands untouched.
pub async fn assess(
    pool: &SqlitePool,
    project_id: i64,
    expert_id: i64,
    vote: &Vote,
    comment: Option<&str>,
) -> Result<ExpertReview> {
    let now = db::now();
    with_timeout(async {
        let review = sqlx::query_as::<_, ExpertReview>(
            "INSERT INTO expert_reviews (vote, comment, project_id, expert_id, reviewed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             RETURNING review_id, vote, comment, project_id, expert_id, reviewed_at",
        )
        .bind(Json(vote.clone()))
        .bind(comment)
        .bind(project_id)
        .bind(expert_id)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::VotedTwice
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(review)
    })
    .await
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

/// The expert profile behind a platform user, if any.
pub async fn get_by_user(pool: &SqlitePool, user_id: i64) -> Result<Expert> {
    with_timeout(async {
        let expert = sqlx::query_as::<_, Expert>(
            "SELECT expert_id, user_id, expertise_fields, expertise_level, \
                    qualification, is_active \
             FROM experts WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        expert.ok_or_else(AppError::not_found)
    })
    .await
}

pub async fn list_reviews_for_project(
    pool: &SqlitePool,
    project_id: i64,
) -> Result<Vec<ExpertReview>> {
    with_timeout(async {
        let reviews = sqlx::query_as::<_, ExpertReview>(
            "SELECT review_id, vote, comment, project_id, expert_id, reviewed_at \
             FROM expert_reviews \
             WHERE project_id = ?1 \
             ORDER BY reviewed_at ASC, review_id ASC",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await?;
        Ok(reviews)
    })
    .await
}
