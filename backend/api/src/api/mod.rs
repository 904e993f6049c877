//! HTTP surface: router assembly, shared state, and the envelope shapes the
//! handlers respond with.  One submodule per aggregate.

pub mod backings;
pub mod disputes;
pub mod experts;
pub mod projects;
pub mod rewards;
pub mod users;

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::{response::IntoResponse, Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{PermissionChecker, TokenVerifier};
use crate::ledger::Ledger;
use crate::notify::Notifier;

pub struct ApiState {
    pub pool: SqlitePool,
    pub ledger: Ledger,
    pub notifier: Notifier,
    pub verifier: Arc<dyn TokenVerifier>,
    pub perms: Arc<dyn PermissionChecker>,
}

/// Pagination block carried next to every list response.  All zeroes when
/// the result set is empty.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// `GET /v1/healthCheck`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "available",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/v1/healthCheck", get(health))
        // projects
        .route("/v1/projects/create", post(projects::create))
        .route("/v1/projects/discover", get(projects::discover))
        .route("/v1/projects/discover/:id", get(projects::discover_one))
        .route("/v1/projects/creator/me", get(projects::list_mine))
        .route("/v1/projects/review/:id", post(projects::review))
        .route("/v1/projects/assess/:id", post(experts::assess))
        .route(
            "/v1/projects/rewards/:id",
            get(rewards::list_for_project).put(rewards::replace_all),
        )
        .route(
            "/v1/projects/:id",
            get(projects::get_one)
                .patch(projects::update)
                .delete(projects::delete),
        )
        // backing ledger
        .route("/v1/backing/backIntent/:id", post(backings::back_intent))
        .route("/v1/backing/backProject/:id", post(backings::back_project))
        .route("/v1/backing/refund/:id", post(backings::refund))
        .route("/v1/backing/didIbackIt/:id", get(backings::did_i_back_it))
        .route(
            "/v1/backing/projectBackers/:id",
            get(backings::project_backers),
        )
        .route("/v1/backing/rewards/:id", get(backings::my_rewards))
        .route(
            "/v1/backing/:id",
            patch(backings::update_payment).delete(backings::delete),
        )
        // disputes
        .route(
            "/v1/disputes/:id",
            post(disputes::create)
                .get(disputes::get_one)
                .patch(disputes::resolve)
                .delete(disputes::delete),
        )
        // experts
        .route("/v1/experts", post(experts::register))
        // users
        .route("/v1/users/signup", post(users::signup))
        .route("/v1/users/me", get(users::me))
        .route(
            "/v1/users/:id",
            get(users::get_one).patch(users::update).delete(users::delete),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
