//! Dispute handlers: filing, the moderator resolution surface, and cleanup.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{self, Principal};
use crate::errors::{AppError, Result};
use crate::store::disputes::{self, NewDispute, CONTEXTS, STATUS_REJECTED, STATUS_RESOLVED};
use crate::store::projects;
use crate::validate::{self, Validator};

use super::ApiState;

#[derive(Debug, Deserialize)]
pub struct CreateDisputeBody {
    #[serde(rename = "type")]
    pub dispute_type: String,
    pub description: String,
    pub context: String,
    #[serde(default)]
    pub evidences: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveDisputeBody {
    pub status: String,
    #[serde(default)]
    pub note: String,
}

/// `POST /v1/disputes/:id`: file a dispute against the resource named by
/// the path id, in the context named by the body.
pub async fn create(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(resource_id): Path<i64>,
    Json(body): Json<CreateDisputeBody>,
) -> Result<impl IntoResponse> {
    auth::require_activated(&principal)?;

    let mut v = Validator::new();
    v.check(!body.dispute_type.trim().is_empty(), "type", "must be provided");
    validate::check_dispute_description(&mut v, &body.description);
    v.check(
        CONTEXTS.contains(&body.context.as_str()),
        "context",
        "must be project, user or comment",
    );
    v.finish()?;

    // Only project references can be verified locally; user and comment
    // records live with other services.
    if body.context == "project" {
        projects::get(&state.pool, resource_id).await?;
    }

    let dispute = disputes::insert(
        &state.pool,
        NewDispute {
            dispute_type: body.dispute_type,
            description: body.description,
            context: body.context,
            resource_id,
            evidences: body.evidences,
            reporter_id: principal.user_id,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Dispute created successfully",
            "dispute": dispute,
        })),
    ))
}

/// `GET /v1/disputes/:id`: visible to the reporter and to moderators.
pub async fn get_one(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(dispute_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let dispute = disputes::get(&state.pool, dispute_id).await?;
    if !principal.is_admin() && dispute.reporter_id != principal.user_id {
        auth::require_permission(&state, &principal, "disputes:admin").await?;
    }
    Ok(Json(json!({
        "message": "Dispute returned successfully",
        "dispute": dispute,
    })))
}

/// `PATCH /v1/disputes/:id`: settle a pending dispute.
pub async fn resolve(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(dispute_id): Path<i64>,
    Json(body): Json<ResolveDisputeBody>,
) -> Result<impl IntoResponse> {
    auth::require_permission(&state, &principal, "disputes:admin").await?;

    if body.status != STATUS_RESOLVED && body.status != STATUS_REJECTED {
        return Err(AppError::validation(
            "status",
            "Status should be either resolved or rejected",
        ));
    }
    let mut v = Validator::new();
    validate::check_note(&mut v, &body.note);
    v.finish()?;

    let dispute = disputes::get(&state.pool, dispute_id).await?;
    let resolved = disputes::resolve(
        &state.pool,
        dispute_id,
        dispute.version,
        &body.status,
        &body.note,
    )
    .await?;

    Ok(Json(json!({
        "message": "Dispute updated successfully",
        "dispute": resolved,
    })))
}

/// `DELETE /v1/disputes/:id`
pub async fn delete(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(dispute_id): Path<i64>,
) -> Result<impl IntoResponse> {
    auth::require_permission(&state, &principal, "disputes:admin").await?;
    disputes::delete(&state.pool, dispute_id).await?;
    Ok(Json(json!({ "message": "Dispute deleted successfully" })))
}
