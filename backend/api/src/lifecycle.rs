//! Project status state machine, human review, and the deadline sweeper.
//!
//! Review appends an immutable review row and moves the project through the
//! transition table in one flow.  Completion is a system transition owned by
//! the sweeper; "successful" is a read-time predicate, never stored.

use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::db;
use crate::errors::{AppError, Result};
use crate::notify::{Notification, Notifier};
use crate::store::{projects, users};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    Draft,
    Live,
    Flagged,
    Rejected,
    Completed,
}

impl ProjectStatus {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Draft" => Some(Self::Draft),
            "Live" => Some(Self::Live),
            "Flagged" => Some(Self::Flagged),
            "Rejected" => Some(Self::Rejected),
            "Completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Live => "Live",
            Self::Flagged => "Flagged",
            Self::Rejected => "Rejected",
            Self::Completed => "Completed",
        }
    }
}

/// A human reviewer's verdict on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approved,
    Rejected,
    Flagged,
}

impl ReviewDecision {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Approved" => Some(Self::Approved),
            "Rejected" => Some(Self::Rejected),
            "Flagged" => Some(Self::Flagged),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Flagged => "Flagged",
        }
    }
}

/// The transition table.  Draft and Flagged projects can be approved or
/// rejected; Draft and Live projects can be flagged for expert review.
/// Rejected and Completed are terminal for review purposes.
pub fn apply_review(current: ProjectStatus, decision: ReviewDecision) -> Result<ProjectStatus> {
    use ProjectStatus::*;
    use ReviewDecision as D;

    let next = match (current, decision) {
        (Draft | Flagged, D::Approved) => Live,
        (Draft | Flagged, D::Rejected) => Rejected,
        (Draft | Live, D::Flagged) => Flagged,
        _ => {
            return Err(AppError::validation(
                "status",
                &format!(
                    "cannot move a {} project via {}",
                    current.as_str(),
                    decision.as_str()
                ),
            ))
        }
    };
    Ok(next)
}

/// Funding outcome, derived at read time.
pub fn is_successful(project: &projects::Project) -> bool {
    project.current_funding >= project.funding_goal
}

/// Apply a human review: transition the project, append the review row, and
/// queue a notification to the creator.  The project update is OCC-guarded
/// and not retried; a concurrent edit surfaces as EditConflict.
pub async fn review_project(
    pool: &SqlitePool,
    notifier: &Notifier,
    project_id: i64,
    decision: ReviewDecision,
    feedback: &str,
    reviewer_id: i64,
) -> Result<projects::Project> {
    let mut project = projects::get(pool, project_id).await?;
    let current = ProjectStatus::from_name(&project.status)
        .ok_or_else(|| AppError::Internal(format!("unknown project status: {}", project.status)))?;
    let next = apply_review(current, decision)?;

    project.status = next.as_str().to_string();
    match decision {
        ReviewDecision::Approved => {
            if project.launched_at.is_none() {
                project.launched_at = Some(db::now());
            }
            project.is_suspicious = false;
        }
        ReviewDecision::Flagged => {
            project.is_suspicious = true;
        }
        ReviewDecision::Rejected => {}
    }

    let updated = projects::update(pool, &project).await?;
    projects::insert_review(pool, project_id, reviewer_id, decision.as_str(), feedback).await?;

    // Creator notification is best-effort; a missing creator row is logged
    // and skipped, never fails the review.
    match users::get(pool, updated.creator_id).await {
        Ok(creator) => {
            notifier.send(Notification::ProjectReviewed {
                email: creator.email,
                project_title: updated.title.clone(),
                status: updated.status.clone(),
                feedback: feedback.to_string(),
            });
        }
        Err(e) => warn!(
            "creator {} lookup failed while reviewing project {project_id}: {e}",
            updated.creator_id
        ),
    }

    info!(
        "project {project_id} reviewed: {} -> {}",
        current.as_str(),
        updated.status
    );
    Ok(updated)
}

// ─────────────────────────────────────────────────────────
// Deadline sweeper
// ─────────────────────────────────────────────────────────

/// Background loop that completes live projects whose deadline has passed.
/// Runs until the token is cancelled; each pass is one bulk conditional
/// update, so a row that conflicts simply waits for the next tick.
pub async fn run_sweeper(pool: SqlitePool, interval_secs: u64, shutdown: CancellationToken) {
    info!("deadline sweeper starting, interval {interval_secs}s");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("deadline sweeper stopping");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {}
        }

        match sweep_once(&pool).await {
            Ok(0) => {}
            Ok(n) => info!("deadline sweeper completed {n} project(s)"),
            Err(e) => error!("deadline sweep failed: {e}"),
        }
    }
}

/// One sweep pass.  Split out so tests can drive it without the loop.
pub async fn sweep_once(pool: &SqlitePool) -> Result<u64> {
    projects::sweep_completed(pool, db::now()).await
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
