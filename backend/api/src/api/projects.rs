//! Project handlers: creation, discovery, owner CRUD, and the review
//! transition.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{self, Principal};
use crate::db;
use crate::errors::{AppError, Result};
use crate::lifecycle::{self, ReviewDecision};
use crate::money;
use crate::store::projects::{self, DiscoverFilter, NewProject, Project};
use crate::validate::{self, Validator};

use super::{ApiState, Metadata};

/// Response shape for a project.  Monetary fields leave in major units;
/// `successful` is derived, never stored.
#[derive(Debug, Serialize)]
pub struct ProjectView {
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub funding_goal: f64,
    pub current_funding: f64,
    pub deadline: i64,
    pub status: String,
    pub is_suspicious: bool,
    pub experts_decision: Option<String>,
    pub launched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
    pub creator_id: i64,
    pub successful: bool,
}

impl From<Project> for ProjectView {
    fn from(p: Project) -> Self {
        let successful = lifecycle::is_successful(&p);
        Self {
            project_id: p.project_id,
            title: p.title,
            description: p.description,
            categories: p.categories.0,
            funding_goal: money::to_major(p.funding_goal),
            current_funding: money::to_major(p.current_funding),
            deadline: p.deadline,
            status: p.status,
            is_suspicious: p.is_suspicious,
            experts_decision: p.experts_decision,
            launched_at: p.launched_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
            version: p.version,
            creator_id: p.creator_id,
            successful,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Request bodies
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProjectBody {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Goal in minor currency units.
    pub funding_goal: i64,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Unix epoch seconds.
    pub deadline: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateProjectBody {
    pub title: Option<String>,
    pub description: Option<String>,
    pub funding_goal: Option<i64>,
    pub categories: Option<Vec<String>>,
    pub deadline: Option<i64>,
    pub experts_decision: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub status: String,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Deserialize)]
pub struct DiscoverParams {
    pub title: Option<String>,
    pub category: Option<String>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

fn check_project_fields(v: &mut Validator, project: &Project, now: i64) {
    validate::check_title(v, &project.title);
    validate::check_description(v, &project.description);
    validate::check_categories(v, &project.categories.0);
    v.check(project.funding_goal > 0, "funding_goal", "must be positive");
    validate::check_deadline(v, project.deadline, now);
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `POST /v1/projects/create`
pub async fn create(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Json(body): Json<CreateProjectBody>,
) -> Result<impl IntoResponse> {
    auth::require_permission(&state, &principal, "projects:create").await?;

    let now = db::now();
    let mut v = Validator::new();
    validate::check_title(&mut v, &body.title);
    validate::check_description(&mut v, &body.description);
    validate::check_categories(&mut v, &body.categories);
    v.check(body.funding_goal > 0, "funding_goal", "must be positive");
    validate::check_deadline(&mut v, body.deadline, now);
    v.finish()?;

    let project = projects::insert(
        &state.pool,
        NewProject {
            title: body.title,
            description: body.description,
            categories: body.categories,
            funding_goal: body.funding_goal,
            deadline: body.deadline,
            creator_id: principal.user_id,
        },
    )
    .await?;

    let location = format!("/v1/projects/{}", project.project_id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({
            "message": "Project created successfully",
            "project": ProjectView::from(project),
        })),
    ))
}

/// `GET /v1/projects/discover`
pub async fn discover(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<DiscoverParams>,
) -> Result<impl IntoResponse> {
    let page = params.page.unwrap_or(1);
    let page_size = params.page_size.unwrap_or(5);

    let mut v = Validator::new();
    v.check(page > 0, "page", "must be greater than zero");
    v.check(page <= 10_000_000, "page", "must be a maximum of 10 million");
    v.check(page_size > 0, "page_size", "must be greater than zero");
    v.check(page_size <= 100, "page_size", "must be a maximum of 100");
    v.finish()?;

    let filter = DiscoverFilter {
        title: params.title,
        category: params.category,
        sort: params.sort.unwrap_or_else(|| "project_id".to_string()),
        page,
        page_size,
    };

    let (projects, total) = projects::list_public(&state.pool, &filter).await?;
    let metadata = Metadata::calculate(total, page, page_size);
    let views: Vec<ProjectView> = projects.into_iter().map(ProjectView::from).collect();

    Ok(Json(json!({
        "message": "Projects returned successfully",
        "metadata": metadata,
        "projects": views,
    })))
}

/// `GET /v1/projects/discover/:id`: public view, launched projects only.
pub async fn discover_one(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let project = projects::get_public(&state.pool, project_id).await?;
    Ok(Json(json!({
        "message": "Project returned successfully",
        "project": ProjectView::from(project),
    })))
}

/// `GET /v1/projects/:id`: owner (or admin) view, any status.
pub async fn get_one(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    auth::require_project_owner(&state, project_id, &principal).await?;
    let project = projects::get(&state.pool, project_id).await?;
    Ok(Json(json!({
        "message": "Project returned successfully",
        "project": ProjectView::from(project),
    })))
}

/// `GET /v1/projects/creator/me`
pub async fn list_mine(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
) -> Result<impl IntoResponse> {
    let projects = projects::list_by_creator(&state.pool, principal.user_id).await?;
    let views: Vec<ProjectView> = projects.into_iter().map(ProjectView::from).collect();
    Ok(Json(json!({
        "message": "Projects returned successfully",
        "projects": views,
    })))
}

/// `PATCH /v1/projects/:id`
///
/// Partial update of the owner-editable fields.  Status and the funding
/// total are owned by the lifecycle machine and the ledger; they cannot be
/// set here.
pub async fn update(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
    Json(body): Json<UpdateProjectBody>,
) -> Result<impl IntoResponse> {
    auth::require_permission(&state, &principal, "projects:update").await?;
    auth::require_project_owner(&state, project_id, &principal).await?;

    let mut project = projects::get(&state.pool, project_id).await?;

    if let Some(title) = body.title {
        project.title = title;
    }
    if let Some(description) = body.description {
        project.description = description;
    }
    if let Some(categories) = body.categories {
        project.categories = sqlx::types::Json(categories);
    }
    if let Some(funding_goal) = body.funding_goal {
        project.funding_goal = funding_goal;
    }
    if let Some(deadline) = body.deadline {
        project.deadline = deadline;
    }
    if let Some(decision) = body.experts_decision {
        project.experts_decision = Some(decision);
    }

    let mut v = Validator::new();
    check_project_fields(&mut v, &project, db::now());
    v.finish()?;

    let updated = projects::update(&state.pool, &project).await?;
    Ok(Json(json!({
        "message": "Project updated successfully",
        "project": ProjectView::from(updated),
    })))
}

/// `DELETE /v1/projects/:id`
pub async fn delete(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    auth::require_project_owner(&state, project_id, &principal).await?;
    projects::delete(&state.pool, project_id).await?;
    Ok(Json(json!({ "message": "Project deleted successfully" })))
}

/// `POST /v1/projects/review/:id`: human review transition.
pub async fn review(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
    Json(body): Json<ReviewBody>,
) -> Result<impl IntoResponse> {
    auth::require_permission(&state, &principal, "projects:review").await?;

    let decision = ReviewDecision::from_name(&body.status).ok_or_else(|| {
        AppError::validation("status", "Status should be either approved, rejected or flagged")
    })?;

    let project = lifecycle::review_project(
        &state.pool,
        &state.notifier,
        project_id,
        decision,
        &body.feedback,
        principal.user_id,
    )
    .await?;

    Ok(Json(json!({
        "message": "Project reviewed successfully",
        "project": ProjectView::from(project),
    })))
}
