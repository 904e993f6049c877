//! Project rows, their review history, and the funding aggregate.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::db::{self, with_timeout};
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub categories: Json<Vec<String>>,
    /// Funding goal in minor currency units.
    pub funding_goal: i64,
    /// Running total of non-refunded backing amounts, in minor units.
    pub current_funding: i64,
    pub deadline: i64,
    pub status: String,
    pub is_suspicious: bool,
    pub experts_decision: Option<String>,
    pub launched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
    pub creator_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub funding_goal: i64,
    pub deadline: i64,
    pub creator_id: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectReview {
    pub review_id: i64,
    pub status: String,
    pub feedback: String,
    pub reviewer_id: i64,
    pub project_id: i64,
    pub reviewed_at: i64,
}

/// Listing filters for the public discovery endpoint.
#[derive(Debug, Clone)]
pub struct DiscoverFilter {
    pub title: Option<String>,
    pub category: Option<String>,
    pub sort: String,
    pub page: i64,
    pub page_size: i64,
}

const PROJECT_COLUMNS: &str = "project_id, title, description, categories, funding_goal, \
     current_funding, deadline, status, is_suspicious, experts_decision, launched_at, \
     created_at, updated_at, version, creator_id";

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

pub async fn insert(pool: &SqlitePool, new: NewProject) -> Result<Project> {
    let now = db::now();
    with_timeout(async {
        let sql = format!(
            "INSERT INTO projects \
                 (title, description, categories, funding_goal, deadline, \
                  created_at, updated_at, creator_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7) \
             RETURNING {PROJECT_COLUMNS}"
        );
        let project = sqlx::query_as::<_, Project>(&sql)
            .bind(&new.title)
            .bind(&new.description)
            .bind(Json(new.categories.clone()))
            .bind(new.funding_goal)
            .bind(new.deadline)
            .bind(now)
            .bind(new.creator_id)
            .fetch_one(pool)
            .await?;
        Ok(project)
    })
    .await
}

/// Conditional full-row update.  Matches only when the stored version equals
/// `project.version`; on success the stored version is bumped and the fresh
/// row is returned.
pub async fn update(pool: &SqlitePool, project: &Project) -> Result<Project> {
    let now = db::now();
    with_timeout(async {
        let sql = format!(
            "UPDATE projects SET \
                 title = ?1, description = ?2, categories = ?3, funding_goal = ?4, \
                 current_funding = ?5, deadline = ?6, status = ?7, is_suspicious = ?8, \
                 experts_decision = ?9, launched_at = ?10, updated_at = ?11, \
                 version = version + 1 \
             WHERE project_id = ?12 AND version = ?13 \
             RETURNING {PROJECT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Project>(&sql)
            .bind(&project.title)
            .bind(&project.description)
            .bind(Json(project.categories.0.clone()))
            .bind(project.funding_goal)
            .bind(project.current_funding)
            .bind(project.deadline)
            .bind(&project.status)
            .bind(project.is_suspicious)
            .bind(&project.experts_decision)
            .bind(project.launched_at)
            .bind(now)
            .bind(project.project_id)
            .bind(project.version)
            .fetch_optional(pool)
            .await?;
        updated.ok_or(AppError::EditConflict)
    })
    .await
}

pub async fn delete(pool: &SqlitePool, project_id: i64) -> Result<()> {
    with_timeout(async {
        let affected = sqlx::query("DELETE FROM projects WHERE project_id = ?1")
            .bind(project_id)
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

/// Move every live project whose deadline has passed to Completed.  Returns
/// how many rows were swept; each swept row gets a version bump so stale
/// editors still conflict.
pub async fn sweep_completed(pool: &SqlitePool, now: i64) -> Result<u64> {
    with_timeout(async {
        let affected = sqlx::query(
            "UPDATE projects \
             SET status = 'Completed', updated_at = ?1, version = version + 1 \
             WHERE status = 'Live' AND deadline < ?1",
        )
        .bind(now)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(affected)
    })
    .await
}

pub async fn insert_review(
    pool: &SqlitePool,
    project_id: i64,
    reviewer_id: i64,
    status: &str,
    feedback: &str,
) -> Result<ProjectReview> {
    let now = db::now();
    with_timeout(async {
        let review = sqlx::query_as::<_, ProjectReview>(
            "INSERT INTO project_reviews (status, feedback, reviewer_id, project_id, reviewed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             RETURNING review_id, status, feedback, reviewer_id, project_id, reviewed_at",
        )
        .bind(status)
        .bind(feedback)
        .bind(reviewer_id)
        .bind(project_id)
        .bind(now)
        .fetch_one(pool)
        .await?;
        Ok(review)
    })
    .await
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn get(pool: &SqlitePool, project_id: i64) -> Result<Project> {
    with_timeout(async {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = ?1");
        let project = sqlx::query_as::<_, Project>(&sql)
            .bind(project_id)
            .fetch_optional(pool)
            .await?;
        project.ok_or_else(AppError::not_found)
    })
    .await
}

/// Public view: only launched projects are discoverable.
pub async fn get_public(pool: &SqlitePool, project_id: i64) -> Result<Project> {
    with_timeout(async {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects \
             WHERE project_id = ?1 AND status IN ('Live', 'Completed')"
        );
        let project = sqlx::query_as::<_, Project>(&sql)
            .bind(project_id)
            .fetch_optional(pool)
            .await?;
        project.ok_or_else(AppError::not_found)
    })
    .await
}

/// Paged public listing with optional title and category filters.
/// Returns the page plus the total number of matching rows.
pub async fn list_public(
    pool: &SqlitePool,
    filter: &DiscoverFilter,
) -> Result<(Vec<Project>, i64)> {
    // The sort clause is interpolated, so it must come from the whitelist.
    let order_by = sort_clause(&filter.sort)?;
    let title = filter
        .title
        .as_deref()
        .map(|t| format!("%{t}%"))
        .unwrap_or_else(|| "%".to_string());
    // Categories are stored as a JSON array; matching the quoted element
    // keeps "art" from matching "film & video" style substrings.
    let category = filter
        .category
        .as_deref()
        .map(|c| format!("%\"{c}\"%"))
        .unwrap_or_else(|| "%".to_string());
    let offset = (filter.page - 1) * filter.page_size;

    with_timeout(async {
        let sql = format!(
            "SELECT count(*) OVER() AS total_records, {PROJECT_COLUMNS} \
             FROM projects \
             WHERE status IN ('Live', 'Completed') \
               AND title LIKE ?1 COLLATE NOCASE \
               AND categories LIKE ?2 \
             ORDER BY {order_by}, project_id ASC \
             LIMIT ?3 OFFSET ?4"
        );
        let rows = sqlx::query_as::<_, ProjectWithTotal>(&sql)
            .bind(&title)
            .bind(&category)
            .bind(filter.page_size)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        let total = rows.first().map(|r| r.total_records).unwrap_or(0);
        let projects = rows.into_iter().map(|r| r.project).collect();
        Ok((projects, total))
    })
    .await
}

pub async fn list_by_creator(pool: &SqlitePool, creator_id: i64) -> Result<Vec<Project>> {
    with_timeout(async {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects \
             WHERE creator_id = ?1 ORDER BY created_at DESC, project_id DESC"
        );
        let projects = sqlx::query_as::<_, Project>(&sql)
            .bind(creator_id)
            .fetch_all(pool)
            .await?;
        Ok(projects)
    })
    .await
}

pub async fn is_owner(pool: &SqlitePool, project_id: i64, user_id: i64) -> Result<bool> {
    with_timeout(async {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM projects WHERE project_id = ?1 AND creator_id = ?2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.is_some())
    })
    .await
}

fn sort_clause(sort: &str) -> Result<&'static str> {
    let clause = match sort {
        "project_id" => "project_id ASC",
        "-project_id" => "project_id DESC",
        "title" => "title ASC",
        "-title" => "title DESC",
        "deadline" => "deadline ASC",
        "-deadline" => "deadline DESC",
        "funding_goal" => "funding_goal ASC",
        "-funding_goal" => "funding_goal DESC",
        "created_at" => "created_at ASC",
        "-created_at" => "created_at DESC",
        _ => return Err(AppError::validation("sort", "invalid sort value")),
    };
    Ok(clause)
}

/// Row shape for the windowed discovery query.
#[derive(sqlx::FromRow)]
struct ProjectWithTotal {
    total_records: i64,
    #[sqlx(flatten)]
    project: Project,
}
