//! Review and sweeper tests against a live database, plus the expert vote
//! uniqueness rule.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::db;
use crate::errors::AppError;
use crate::lifecycle::{self, ReviewDecision};
use crate::notify::Notification;
use crate::store::experts::{self, NewExpert, Vote};
use crate::store::projects;
use crate::testutil::{memory_notifier, seed_project, seed_user, test_pool};

fn unanimous_vote() -> Vote {
    Vote {
        highly_not_recommended: 0.0,
        not_recommended: 0.0,
        recommended: 0.3,
        highly_recommended: 0.7,
    }
}

#[tokio::test]
async fn approving_a_draft_launches_it() {
    let pool = test_pool().await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let reviewer = seed_user(&pool, "reviewer", "admin", true).await;
    let project = seed_project(&pool, creator.user_id, "Draft", db::now() + 86_400).await;

    let (notifier, sink, worker) = memory_notifier();
    let updated = lifecycle::review_project(
        &pool,
        &notifier,
        project.project_id,
        ReviewDecision::Approved,
        "looks solid",
        reviewer.user_id,
    )
    .await
    .unwrap();

    assert_eq!(updated.status, "Live");
    assert!(updated.launched_at.is_some());
    assert!(!updated.is_suspicious);
    assert_eq!(updated.version, project.version + 1);

    let (status, feedback, reviewer_id): (String, String, i64) = sqlx::query_as(
        "SELECT status, feedback, reviewer_id FROM project_reviews WHERE project_id = ?1",
    )
    .bind(project.project_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "Approved");
    assert_eq!(feedback, "looks solid");
    assert_eq!(reviewer_id, reviewer.user_id);

    drop(notifier);
    worker.await.unwrap();
    let delivered = sink.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert!(matches!(
        &delivered[0],
        Notification::ProjectReviewed { email, status, .. }
            if email == &creator.email && status == "Live"
    ));
}

#[tokio::test]
async fn flagging_and_re_approving_keeps_the_first_launch_time() {
    let pool = test_pool().await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let reviewer = seed_user(&pool, "reviewer", "admin", true).await;
    let project = seed_project(&pool, creator.user_id, "Draft", db::now() + 86_400).await;
    let (notifier, _sink, _worker) = memory_notifier();

    let live = lifecycle::review_project(
        &pool,
        &notifier,
        project.project_id,
        ReviewDecision::Approved,
        "",
        reviewer.user_id,
    )
    .await
    .unwrap();
    let launched_at = live.launched_at.unwrap();

    let flagged = lifecycle::review_project(
        &pool,
        &notifier,
        project.project_id,
        ReviewDecision::Flagged,
        "needs an expert look",
        reviewer.user_id,
    )
    .await
    .unwrap();
    assert_eq!(flagged.status, "Flagged");
    assert!(flagged.is_suspicious);

    let relaunched = lifecycle::review_project(
        &pool,
        &notifier,
        project.project_id,
        ReviewDecision::Approved,
        "experts cleared it",
        reviewer.user_id,
    )
    .await
    .unwrap();
    assert_eq!(relaunched.status, "Live");
    assert!(!relaunched.is_suspicious);
    assert_eq!(relaunched.launched_at, Some(launched_at));
}

#[tokio::test]
async fn live_projects_cannot_be_re_approved() {
    let pool = test_pool().await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let reviewer = seed_user(&pool, "reviewer", "admin", true).await;
    let project = seed_project(&pool, creator.user_id, "Live", db::now() + 86_400).await;
    let (notifier, _sink, _worker) = memory_notifier();

    let err = lifecycle::review_project(
        &pool,
        &notifier,
        project.project_id,
        ReviewDecision::Approved,
        "",
        reviewer.user_id,
    )
    .await
    .unwrap_err();
    match err {
        AppError::Validation(fields) => assert!(fields.contains_key("status")),
        other => panic!("expected validation error, got {other:?}"),
    }

    let fresh = projects::get(&pool, project.project_id).await.unwrap();
    assert_eq!(fresh.status, "Live");
    assert_eq!(fresh.version, project.version, "refused review writes nothing");
}

#[tokio::test]
async fn review_of_missing_project_is_not_found() {
    let pool = test_pool().await;
    let reviewer = seed_user(&pool, "reviewer", "admin", true).await;
    let (notifier, _sink, _worker) = memory_notifier();

    let err = lifecycle::review_project(
        &pool,
        &notifier,
        404,
        ReviewDecision::Approved,
        "",
        reviewer.user_id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn sweeper_stops_promptly_on_cancel() {
    let pool = test_pool().await;
    let token = CancellationToken::new();
    let handle = tokio::spawn(lifecycle::run_sweeper(pool, 3_600, token.clone()));

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper should stop without waiting for its interval")
        .unwrap();
}

#[tokio::test]
async fn expert_votes_once_per_project() {
    let pool = test_pool().await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let voter = seed_user(&pool, "voter", "backer", true).await;
    let project = seed_project(&pool, creator.user_id, "Flagged", db::now() + 86_400).await;

    let expert = experts::insert(
        &pool,
        NewExpert {
            user_id: voter.user_id,
            expertise_fields: vec!["technology".to_string()],
            expertise_level: 0.8,
            qualification: "10 years of embedded work".to_string(),
            is_active: true,
        },
    )
    .await
    .unwrap();

    let review = experts::assess(
        &pool,
        project.project_id,
        expert.expert_id,
        &unanimous_vote(),
        Some("solid plan"),
    )
    .await
    .unwrap();
    assert_eq!(review.vote.0, unanimous_vote());

    let err = experts::assess(
        &pool,
        project.project_id,
        expert.expert_id,
        &unanimous_vote(),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::VotedTwice));

    let reviews = experts::list_reviews_for_project(&pool, project.project_id)
        .await
        .unwrap();
    assert_eq!(reviews.len(), 1, "the first vote stands untouched");
    assert_eq!(reviews[0].comment.as_deref(), Some("solid plan"));
}
