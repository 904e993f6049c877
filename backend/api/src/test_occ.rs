//! Conditional-update tests: every mutable aggregate refuses a write whose
//! version is stale, and nothing below the ledger retries.

use crate::db;
use crate::errors::AppError;
use crate::lifecycle;
use crate::store::{backings, disputes, projects, users};
use crate::testutil::{seed_project, seed_user, test_pool};

#[tokio::test]
async fn stale_project_write_conflicts() {
    let pool = test_pool().await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let project = seed_project(&pool, creator.user_id, "Draft", db::now() + 86_400).await;

    // First editor wins and bumps the version.
    let mut first = project.clone();
    first.title = "Solar water pump v2".to_string();
    let updated = projects::update(&pool, &first).await.unwrap();
    assert_eq!(updated.version, project.version + 1);

    // Second editor still holds the original row.
    let mut second = project.clone();
    second.title = "Hydro pump".to_string();
    let err = projects::update(&pool, &second).await.unwrap_err();
    assert!(matches!(err, AppError::EditConflict));

    let fresh = projects::get(&pool, project.project_id).await.unwrap();
    assert_eq!(fresh.title, "Solar water pump v2");
}

#[tokio::test]
async fn stale_payment_write_conflicts() {
    let pool = test_pool().await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let backer = seed_user(&pool, "backer", "backer", true).await;
    let project = seed_project(&pool, creator.user_id, "Live", db::now() + 86_400).await;

    let (_, payment_id) = backings::insert(
        &pool,
        &backings::NewBacking {
            backer_id: backer.user_id,
            project_id: project.project_id,
            amount: 15_000,
            status: "succeeded".to_string(),
            transaction_id: "pi_occ".to_string(),
            payment_method: "card".to_string(),
        },
    )
    .await
    .unwrap();

    let payment = backings::get_payment(&pool, payment_id).await.unwrap();
    backings::update_payment_status(&pool, payment_id, payment.version, "refunded")
        .await
        .unwrap();

    let err = backings::update_payment_status(&pool, payment_id, payment.version, "succeeded")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EditConflict));
}

#[tokio::test]
async fn refund_loses_to_a_concurrent_status_flip() {
    let pool = test_pool().await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let backer = seed_user(&pool, "backer", "backer", true).await;
    let project = seed_project(&pool, creator.user_id, "Live", db::now() + 86_400).await;

    let (backing_id, payment_id) = backings::insert(
        &pool,
        &backings::NewBacking {
            backer_id: backer.user_id,
            project_id: project.project_id,
            amount: 15_000,
            status: "succeeded".to_string(),
            transaction_id: "pi_race".to_string(),
            payment_method: "card".to_string(),
        },
    )
    .await
    .unwrap();
    let payment = backings::get_payment(&pool, payment_id).await.unwrap();

    // Another writer moves the payment between the read and the refund.
    backings::update_payment_status(&pool, payment_id, payment.version, "refunded")
        .await
        .unwrap();

    let err = backings::refund(&pool, payment_id, payment.version, backing_id, "late refund")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EditConflict));

    // The losing refund wrote no cancellation.
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM cancellations WHERE backing_id = ?1")
            .bind(backing_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn stale_user_write_conflicts() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "casey", "backer", true).await;

    let mut first = user.clone();
    first.username = "casey_updated".to_string();
    users::update(&pool, &first).await.unwrap();

    let mut second = user.clone();
    second.username = "casey_other".to_string();
    let err = users::update(&pool, &second).await.unwrap_err();
    assert!(matches!(err, AppError::EditConflict));
}

#[tokio::test]
async fn dispute_resolves_exactly_once() {
    let pool = test_pool().await;
    let reporter = seed_user(&pool, "reporter", "backer", true).await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let project = seed_project(&pool, creator.user_id, "Live", db::now() + 86_400).await;

    let dispute = disputes::insert(
        &pool,
        disputes::NewDispute {
            dispute_type: "fraud".to_string(),
            description: "the prototype photos are stock images".to_string(),
            context: "project".to_string(),
            resource_id: project.project_id,
            evidences: vec!["https://example.com/proof.png".to_string()],
            reporter_id: reporter.user_id,
        },
    )
    .await
    .unwrap();
    assert_eq!(dispute.status, "pending");
    assert_eq!(dispute.project_id, Some(project.project_id));

    let resolved = disputes::resolve(
        &pool,
        dispute.dispute_id,
        dispute.version,
        "resolved",
        "verified the report, project flagged",
    )
    .await
    .unwrap();
    assert_eq!(resolved.status, "resolved");
    assert!(resolved.resolved_at.is_some());

    // Same version, and the row is no longer pending: both guards hold.
    let err = disputes::resolve(
        &pool,
        dispute.dispute_id,
        dispute.version,
        "rejected",
        "second resolution attempt",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::EditConflict));

    let (notes,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM dispute_resolutions WHERE dispute_id = ?1")
            .bind(dispute.dispute_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(notes, 1);
}

#[tokio::test]
async fn sweep_bumps_versions_so_stale_editors_conflict() {
    let pool = test_pool().await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let expired = seed_project(&pool, creator.user_id, "Live", db::now() - 10).await;
    let running = seed_project(&pool, creator.user_id, "Live", db::now() + 86_400).await;

    let swept = lifecycle::sweep_once(&pool).await.unwrap();
    assert_eq!(swept, 1);

    let completed = projects::get(&pool, expired.project_id).await.unwrap();
    assert_eq!(completed.status, "Completed");
    assert_eq!(completed.version, expired.version + 1);
    let untouched = projects::get(&pool, running.project_id).await.unwrap();
    assert_eq!(untouched.status, "Live");
    assert_eq!(untouched.version, running.version);

    // An editor holding the pre-sweep row loses.
    let mut stale = expired.clone();
    stale.title = "Renamed after deadline".to_string();
    let err = projects::update(&pool, &stale).await.unwrap_err();
    assert!(matches!(err, AppError::EditConflict));
}
