//! Reward tier handlers: owner bulk replacement and the public listing.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{self, Principal};
use crate::db;
use crate::errors::Result;
use crate::money;
use crate::store::projects;
use crate::store::rewards::{self, NewReward, Reward};
use crate::validate::{self, Validator};

use super::ApiState;

/// Response shape for a reward tier; the threshold leaves in major units.
#[derive(Debug, Serialize)]
pub struct RewardView {
    pub reward_id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub amount: f64,
    pub estimated_delivery: Option<i64>,
    pub image_url: Option<String>,
    pub is_available: bool,
    pub includes: Vec<String>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Reward> for RewardView {
    fn from(r: Reward) -> Self {
        Self {
            reward_id: r.reward_id,
            project_id: r.project_id,
            title: r.title,
            description: r.description,
            amount: money::to_major(r.amount),
            estimated_delivery: r.estimated_delivery,
            image_url: r.image_url,
            is_available: r.is_available,
            includes: r.includes.0,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub fn into_views(rewards: Vec<Reward>) -> Vec<RewardView> {
    rewards.into_iter().map(RewardView::from).collect()
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRewardsBody {
    pub rewards: Vec<NewReward>,
}

/// `PUT /v1/projects/rewards/:id`: replace the project's reward set.
pub async fn replace_all(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(project_id): Path<i64>,
    Json(body): Json<ReplaceRewardsBody>,
) -> Result<impl IntoResponse> {
    auth::require_project_owner(&state, project_id, &principal).await?;

    let now = db::now();
    let mut v = Validator::new();
    v.check(
        !body.rewards.is_empty(),
        "rewards",
        "must contain at least 1 reward",
    );
    for (i, reward) in body.rewards.iter().enumerate() {
        validate::check_reward(&mut v, reward, i + 1, now);
    }
    v.finish()?;

    let rewards = rewards::replace_all(&state.pool, project_id, &body.rewards).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Rewards updated successfully",
            "rewards": into_views(rewards),
        })),
    ))
}

/// `GET /v1/projects/rewards/:id`: public reward listing.
pub async fn list_for_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    projects::get(&state.pool, project_id).await?;
    let rewards = rewards::list_for_project(&state.pool, project_id).await?;
    Ok(Json(json!({
        "message": "Rewards returned successfully",
        "rewards": into_views(rewards),
    })))
}
