//! Expert handlers: profile registration and project assessment.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{self, Principal};
use crate::errors::{AppError, Result};
use crate::store::experts::{self, NewExpert, Vote};
use crate::store::{projects, users};
use crate::validate::{self, Validator};

use super::ApiState;

#[derive(Debug, Deserialize)]
pub struct AssessBody {
    pub vote: Vote,
    #[serde(default)]
    pub comment: Option<String>,
}

/// `POST /v1/experts`: attach an expert profile to an existing user.
pub async fn register(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Json(body): Json<NewExpert>,
) -> Result<impl IntoResponse> {
    auth::require_permission(&state, &principal, "experts:admin").await?;

    let mut v = Validator::new();
    validate::check_expert_profile(
        &mut v,
        &body.expertise_fields,
        body.expertise_level,
        &body.qualification,
    );
    v.finish()?;

    users::get(&state.pool, body.user_id).await?;
    let expert = experts::insert(&state.pool, body).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Expert created successfully",
            "expert": expert,
        })),
    ))
}

/// `POST /v1/projects/assess/:id`: cast the caller's expert vote on a
/// project.  One vote per (project, expert); a repeat conflicts.
pub async fn assess(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
    Json(body): Json<AssessBody>,
) -> Result<impl IntoResponse> {
    auth::require_activated(&principal)?;

    projects::get(&state.pool, project_id)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("Project not found".to_string()),
            other => other,
        })?;

    let expert = experts::get_by_user(&state.pool, principal.user_id)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("Expert not found".to_string()),
            other => other,
        })?;

    let mut v = Validator::new();
    validate::check_vote_weights(&mut v, &body.vote.weights());
    v.finish()?;

    let review = experts::assess(
        &state.pool,
        project_id,
        expert.expert_id,
        &body.vote,
        body.comment.as_deref(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Project assessed successfully",
            "review": review,
        })),
    ))
}
