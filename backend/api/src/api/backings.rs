//! Backing handlers: the pledge flow, refunds, derived reads, and the
//! admin payment surface.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{self, Principal};
use crate::errors::{AppError, Result};
use crate::gateway::INTENT_SUCCEEDED;
use crate::store::backings;
use crate::validate::Validator;

use super::rewards::into_views;
use super::ApiState;

#[derive(Debug, Deserialize)]
pub struct BackIntentBody {
    /// Pledge in minor currency units.
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct BackProjectBody {
    pub payment_intent_id: String,
    pub payment_method: String,
    #[serde(default)]
    pub rewards: Vec<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RefundBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusBody {
    pub status: String,
}

/// `POST /v1/backing/backIntent/:id`: open a payment intent for a pledge.
pub async fn back_intent(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
    Json(body): Json<BackIntentBody>,
) -> Result<impl IntoResponse> {
    auth::require_activated(&principal)?;
    auth::forbid_project_owner(&state, project_id, &principal).await?;

    let receipt = state
        .ledger
        .create_intent(project_id, principal.user_id, body.amount)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Backing intent is done successfully",
            "payment_intent_id": receipt.intent_id,
            "client_secret": receipt.client_secret,
        })),
    ))
}

/// `POST /v1/backing/backProject/:id`: record a confirmed pledge.
pub async fn back_project(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
    Json(body): Json<BackProjectBody>,
) -> Result<impl IntoResponse> {
    auth::require_activated(&principal)?;
    auth::forbid_project_owner(&state, project_id, &principal).await?;

    let mut v = Validator::new();
    v.check(
        !body.payment_intent_id.trim().is_empty(),
        "payment_intent_id",
        "must be provided",
    );
    v.check(
        !body.payment_method.trim().is_empty(),
        "payment_method",
        "must be provided",
    );
    v.finish()?;

    let receipt = state
        .ledger
        .record_backing(
            project_id,
            principal.user_id,
            &principal.email,
            &body.payment_intent_id,
            &body.payment_method,
            &body.rewards,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Project is backed successfully",
            "backing_id": receipt.backing_id,
            "payment_id": receipt.payment_id,
            "status": receipt.status,
            "transaction_id": receipt.transaction_id,
        })),
    ))
}

/// `POST /v1/backing/refund/:id`: refund the caller's backing of a project.
pub async fn refund(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
    Json(body): Json<RefundBody>,
) -> Result<impl IntoResponse> {
    auth::require_activated(&principal)?;

    state
        .ledger
        .refund(project_id, principal.user_id, &principal.email, &body.reason)
        .await?;

    Ok(Json(json!({ "message": "Backing refunded successfully" })))
}

/// `GET /v1/backing/didIbackIt/:id`
pub async fn did_i_back_it(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    auth::require_activated(&principal)?;
    let did = state.ledger.did_back(project_id, principal.user_id).await?;
    Ok(Json(json!({
        "message": "Did you back it or not revealed successfully",
        "did_i_back_it": did,
    })))
}

/// `GET /v1/backing/projectBackers/:id`: public backer count.
pub async fn project_backers(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let count = state.ledger.backers_count(project_id).await?;
    Ok(Json(json!({
        "message": "Backers count returned successfully",
        "backers_count": count,
    })))
}

/// `GET /v1/backing/rewards/:id`: rewards attached to the caller's latest
/// backing of the project.
pub async fn my_rewards(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    auth::require_activated(&principal)?;
    let rewards = state
        .ledger
        .rewards_for_backer(project_id, principal.user_id)
        .await?;
    Ok(Json(json!({
        "message": "Rewards returned successfully",
        "rewards": into_views(rewards),
    })))
}

/// `PATCH /v1/backing/:id`: admin override of a payment's status.
///
/// Bookkeeping only: the funding total is owned by the refund path, so a
/// status flip here never moves money.  Refunded is terminal.
pub async fn update_payment(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(payment_id): Path<i64>,
    Json(body): Json<PaymentStatusBody>,
) -> Result<impl IntoResponse> {
    auth::require_permission(&state, &principal, "backing:admin").await?;

    if body.status != INTENT_SUCCEEDED && body.status != "refunded" {
        return Err(AppError::validation(
            "status",
            "Status should be either refunded or succeeded",
        ));
    }

    let payment = backings::get_payment(&state.pool, payment_id).await?;
    if payment.status == "refunded" && body.status == INTENT_SUCCEEDED {
        return Err(AppError::validation(
            "status",
            "a refunded payment cannot be marked succeeded again",
        ));
    }

    let updated = backings::update_payment_status(
        &state.pool,
        payment_id,
        payment.version,
        &body.status,
    )
    .await?;

    Ok(Json(json!({
        "message": "Backing updated successfully",
        "status": updated.status,
    })))
}

/// `DELETE /v1/backing/:id`: admin removal of a backing record.
pub async fn delete(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(backing_id): Path<i64>,
) -> Result<impl IntoResponse> {
    auth::require_permission(&state, &principal, "backing:admin").await?;
    backings::delete(&state.pool, backing_id).await?;
    Ok(Json(json!({ "message": "Backing deleted successfully" })))
}
