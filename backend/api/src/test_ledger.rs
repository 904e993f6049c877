//! Money-path tests: intents, backings, reward attachment, and refunds,
//! run against an in-memory database and an in-process gateway.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::db;
use crate::errors::AppError;
use crate::ledger::Ledger;
use crate::money;
use crate::notify::Notification;
use crate::store::rewards::NewReward;
use crate::store::{backings, projects, rewards};
use crate::testutil::{
    memory_notifier, seed_project, seed_user, test_ledger, test_pool, MockGateway,
};

struct Fixture {
    pool: SqlitePool,
    gateway: Arc<MockGateway>,
    ledger: Ledger,
    project_id: i64,
    backer_id: i64,
    backer_email: String,
}

async fn fixture() -> Fixture {
    let pool = test_pool().await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let backer = seed_user(&pool, "backer", "backer", true).await;
    let project = seed_project(&pool, creator.user_id, "Live", db::now() + 86_400).await;

    let gateway = Arc::new(MockGateway::new());
    let (notifier, _sink, _handle) = memory_notifier();
    let ledger = test_ledger(pool.clone(), gateway.clone(), notifier);

    Fixture {
        pool,
        gateway,
        ledger,
        project_id: project.project_id,
        backer_id: backer.user_id,
        backer_email: backer.email,
    }
}

async fn backings_count(pool: &SqlitePool, project_id: i64) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM backings WHERE project_id = ?1")
        .bind(project_id)
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

#[tokio::test]
async fn backing_moves_minor_units_into_the_funding_total() {
    let f = fixture().await;
    f.gateway.register_succeeded("pi_ok", 15_000);

    let receipt = f
        .ledger
        .record_backing(f.project_id, f.backer_id, &f.backer_email, "pi_ok", "card", &[])
        .await
        .unwrap();
    assert_eq!(receipt.status, "succeeded");
    assert_eq!(receipt.transaction_id, "pi_ok");

    let project = projects::get(&f.pool, f.project_id).await.unwrap();
    assert_eq!(project.current_funding, 15_000);
    // 15000 minor units read back as 150.0 in response views.
    assert_eq!(money::to_major(project.current_funding), 150.0);
}

#[tokio::test]
async fn intent_below_minimum_pledge_fails_validation() {
    let f = fixture().await;
    let err = f
        .ledger
        .create_intent(f.project_id, f.backer_id, 9_999)
        .await
        .unwrap_err();
    match err {
        AppError::Validation(fields) => assert!(fields.contains_key("amount")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn intent_on_closed_project_is_refused() {
    let f = fixture().await;
    let creator = seed_user(&f.pool, "creator2", "creator", true).await;
    let closed = seed_project(&f.pool, creator.user_id, "Live", db::now() - 1).await;

    let err = f
        .ledger
        .create_intent(closed.project_id, f.backer_id, 15_000)
        .await
        .unwrap_err();
    match err {
        AppError::NotFound(msg) => assert_eq!(msg, "Project funding duration is closed"),
        other => panic!("expected not-found, got {other:?}"),
    }
}

#[tokio::test]
async fn late_backing_keeps_its_row_but_not_the_funding() {
    let f = fixture().await;
    let creator = seed_user(&f.pool, "creator2", "creator", true).await;
    let closed = seed_project(&f.pool, creator.user_id, "Live", db::now() - 1).await;
    f.gateway.register_succeeded("pi_late", 15_000);

    let err = f
        .ledger
        .record_backing(
            closed.project_id,
            f.backer_id,
            &f.backer_email,
            "pi_late",
            "card",
            &[],
        )
        .await
        .unwrap_err();
    match err {
        AppError::NotFound(msg) => assert_eq!(msg, "Project funding duration is closed"),
        other => panic!("expected not-found, got {other:?}"),
    }

    // The money was captured, so the ledger row stands for reconciliation;
    // only the funding total stays untouched.
    assert_eq!(backings_count(&f.pool, closed.project_id).await, 1);
    let project = projects::get(&f.pool, closed.project_id).await.unwrap();
    assert_eq!(project.current_funding, 0);
}

#[tokio::test]
async fn unconfirmed_intent_records_nothing() {
    let f = fixture().await;
    let intent = f
        .ledger
        .create_intent(f.project_id, f.backer_id, 15_000)
        .await
        .unwrap();

    // No mark_succeeded: the intent is still awaiting payment.
    let err = f
        .ledger
        .record_backing(
            f.project_id,
            f.backer_id,
            &f.backer_email,
            &intent.intent_id,
            "card",
            &[],
        )
        .await
        .unwrap_err();
    match err {
        AppError::Validation(fields) => assert!(fields.contains_key("payment_intent")),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(backings_count(&f.pool, f.project_id).await, 0);
}

#[tokio::test]
async fn duplicate_intent_is_recorded_once() {
    let f = fixture().await;
    f.gateway.register_succeeded("pi_dup", 15_000);

    f.ledger
        .record_backing(f.project_id, f.backer_id, &f.backer_email, "pi_dup", "card", &[])
        .await
        .unwrap();
    let err = f
        .ledger
        .record_backing(f.project_id, f.backer_id, &f.backer_email, "pi_dup", "card", &[])
        .await
        .unwrap_err();
    match err {
        AppError::Validation(fields) => assert!(fields.contains_key("payment_intent")),
        other => panic!("expected validation error, got {other:?}"),
    }

    let project = projects::get(&f.pool, f.project_id).await.unwrap();
    assert_eq!(project.current_funding, 15_000);
}

#[tokio::test]
async fn parallel_backings_all_land_in_the_total() {
    let f = fixture().await;
    for n in 0..6 {
        f.gateway.register_succeeded(&format!("pi_par_{n}"), 10_000);
    }

    let mut tasks = Vec::new();
    for n in 0..6 {
        let ledger = f.ledger.clone();
        let email = f.backer_email.clone();
        let project_id = f.project_id;
        let backer_id = f.backer_id;
        tasks.push(tokio::spawn(async move {
            ledger
                .record_backing(project_id, backer_id, &email, &format!("pi_par_{n}"), "card", &[])
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let project = projects::get(&f.pool, f.project_id).await.unwrap();
    assert_eq!(project.current_funding, 60_000);
    // The incrementally maintained total matches the audit sum.
    assert_eq!(
        backings::funded_total(&f.pool, f.project_id).await.unwrap(),
        60_000
    );
}

#[tokio::test]
async fn bad_reward_id_names_its_position_and_keeps_earlier_links() {
    let f = fixture().await;
    let tiers = rewards::replace_all(
        &f.pool,
        f.project_id,
        &[NewReward {
            title: "Early bird".to_string(),
            description: String::new(),
            amount: 10_000,
            estimated_delivery: Some(db::now() + 86_400),
            image_url: None,
            is_available: true,
            includes: vec!["sticker".to_string()],
        }],
    )
    .await
    .unwrap();
    f.gateway.register_succeeded("pi_rw", 15_000);

    let err = f
        .ledger
        .record_backing(
            f.project_id,
            f.backer_id,
            &f.backer_email,
            "pi_rw",
            "card",
            &[tiers[0].reward_id, 9_999],
        )
        .await
        .unwrap_err();
    match err {
        AppError::NotFound(msg) => assert_eq!(msg, "Reward 2 not found"),
        other => panic!("expected not-found, got {other:?}"),
    }

    // The first link was already attached and stands; so does the funding.
    let (backing_id,): (i64,) =
        sqlx::query_as("SELECT backing_id FROM backings WHERE project_id = ?1")
            .bind(f.project_id)
            .fetch_one(&f.pool)
            .await
            .unwrap();
    assert!(rewards::backing_has_rewards(&f.pool, backing_id).await.unwrap());
    let project = projects::get(&f.pool, f.project_id).await.unwrap();
    assert_eq!(project.current_funding, 15_000);
}

#[tokio::test]
async fn reward_of_another_project_counts_as_missing() {
    let f = fixture().await;
    let creator = seed_user(&f.pool, "creator2", "creator", true).await;
    let other = seed_project(&f.pool, creator.user_id, "Live", db::now() + 86_400).await;
    let foreign = rewards::replace_all(
        &f.pool,
        other.project_id,
        &[NewReward {
            title: "Foreign tier".to_string(),
            description: String::new(),
            amount: 10_000,
            estimated_delivery: Some(db::now() + 86_400),
            image_url: None,
            is_available: true,
            includes: vec!["mug".to_string()],
        }],
    )
    .await
    .unwrap();
    f.gateway.register_succeeded("pi_fr", 15_000);

    let err = f
        .ledger
        .record_backing(
            f.project_id,
            f.backer_id,
            &f.backer_email,
            "pi_fr",
            "card",
            &[foreign[0].reward_id],
        )
        .await
        .unwrap_err();
    match err {
        AppError::NotFound(msg) => assert_eq!(msg, "Reward 1 not found"),
        other => panic!("expected not-found, got {other:?}"),
    }
}

#[tokio::test]
async fn refund_reverses_funding_and_detaches_rewards() {
    let pool = test_pool().await;
    let creator = seed_user(&pool, "creator", "creator", true).await;
    let backer = seed_user(&pool, "backer", "backer", true).await;
    let project = seed_project(&pool, creator.user_id, "Live", db::now() + 86_400).await;

    let gateway = Arc::new(MockGateway::new());
    let (notifier, sink, worker) = memory_notifier();
    let ledger = test_ledger(pool.clone(), gateway.clone(), notifier);

    let tiers = rewards::replace_all(
        &pool,
        project.project_id,
        &[NewReward {
            title: "Early bird".to_string(),
            description: String::new(),
            amount: 10_000,
            estimated_delivery: Some(db::now() + 86_400),
            image_url: None,
            is_available: true,
            includes: vec!["sticker".to_string()],
        }],
    )
    .await
    .unwrap();
    gateway.register_succeeded("pi_rf", 15_000);

    let receipt = ledger
        .record_backing(
            project.project_id,
            backer.user_id,
            &backer.email,
            "pi_rf",
            "card",
            &[tiers[0].reward_id],
        )
        .await
        .unwrap();

    let outcome = ledger
        .refund(project.project_id, backer.user_id, &backer.email, "changed my mind")
        .await
        .unwrap();
    assert_eq!(outcome.backing_id, receipt.backing_id);
    assert_eq!(outcome.amount, 15_000);

    let fresh = projects::get(&pool, project.project_id).await.unwrap();
    assert_eq!(fresh.current_funding, 0);
    let payment = backings::get_payment(&pool, receipt.payment_id).await.unwrap();
    assert_eq!(payment.status, "refunded");
    assert!(!rewards::backing_has_rewards(&pool, receipt.backing_id).await.unwrap());

    // Both the receipt and the refund notification went out.
    drop(ledger);
    worker.await.unwrap();
    let delivered = sink.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 2);
    assert!(matches!(
        delivered[1],
        Notification::RefundIssued { amount, .. } if amount == 150.0
    ));
}

#[tokio::test]
async fn second_refund_dies_before_the_gateway() {
    let f = fixture().await;
    f.gateway.register_succeeded("pi_2x", 15_000);
    f.ledger
        .record_backing(f.project_id, f.backer_id, &f.backer_email, "pi_2x", "card", &[])
        .await
        .unwrap();

    f.ledger
        .refund(f.project_id, f.backer_id, &f.backer_email, "changed my mind")
        .await
        .unwrap();
    let err = f
        .ledger
        .refund(f.project_id, f.backer_id, &f.backer_email, "still changed my mind")
        .await
        .unwrap_err();
    match err {
        AppError::NotFound(msg) => {
            assert_eq!(msg, "no refundable payment exists for this backing")
        }
        other => panic!("expected not-found, got {other:?}"),
    }
    assert_eq!(f.gateway.refund_calls(), 1);

    let project = projects::get(&f.pool, f.project_id).await.unwrap();
    assert_eq!(project.current_funding, 0, "refund applied exactly once");
}

#[tokio::test]
async fn refund_without_backing_is_refused() {
    let f = fixture().await;
    let err = f
        .ledger
        .refund(f.project_id, f.backer_id, &f.backer_email, "never backed it")
        .await
        .unwrap_err();
    match err {
        AppError::NotFound(msg) => assert_eq!(msg, "This user didn't back this project"),
        other => panic!("expected not-found, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_reason_fails_before_anything_moves() {
    let f = fixture().await;
    f.gateway.register_succeeded("pi_rs", 15_000);
    f.ledger
        .record_backing(f.project_id, f.backer_id, &f.backer_email, "pi_rs", "card", &[])
        .await
        .unwrap();

    let err = f
        .ledger
        .refund(f.project_id, f.backer_id, &f.backer_email, "   ")
        .await
        .unwrap_err();
    match err {
        AppError::Validation(fields) => assert!(fields.contains_key("reason")),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(f.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn gateway_refund_failure_leaves_local_state_alone() {
    let f = fixture().await;
    f.gateway.register_succeeded("pi_gw", 15_000);
    let receipt = f
        .ledger
        .record_backing(f.project_id, f.backer_id, &f.backer_email, "pi_gw", "card", &[])
        .await
        .unwrap();

    f.gateway.set_fail_refunds(true);
    let err = f
        .ledger
        .refund(f.project_id, f.backer_id, &f.backer_email, "changed my mind")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Gateway(_)));

    let payment = backings::get_payment(&f.pool, receipt.payment_id).await.unwrap();
    assert_eq!(payment.status, "succeeded");
    let project = projects::get(&f.pool, f.project_id).await.unwrap();
    assert_eq!(project.current_funding, 15_000);

    // The gateway recovered; the refund goes through on retry.
    f.gateway.set_fail_refunds(false);
    f.ledger
        .refund(f.project_id, f.backer_id, &f.backer_email, "changed my mind")
        .await
        .unwrap();
    let project = projects::get(&f.pool, f.project_id).await.unwrap();
    assert_eq!(project.current_funding, 0);
}

#[tokio::test]
async fn derived_reads_ignore_refunded_backings() {
    let f = fixture().await;
    f.gateway.register_succeeded("pi_dr", 15_000);
    f.ledger
        .record_backing(f.project_id, f.backer_id, &f.backer_email, "pi_dr", "card", &[])
        .await
        .unwrap();

    assert_eq!(f.ledger.backers_count(f.project_id).await.unwrap(), 1);
    assert!(f.ledger.did_back(f.project_id, f.backer_id).await.unwrap());

    f.ledger
        .refund(f.project_id, f.backer_id, &f.backer_email, "changed my mind")
        .await
        .unwrap();

    assert_eq!(f.ledger.backers_count(f.project_id).await.unwrap(), 0);
    assert!(!f.ledger.did_back(f.project_id, f.backer_id).await.unwrap());
}

#[tokio::test]
async fn rewards_for_backer_requires_a_backing() {
    let f = fixture().await;
    let err = f
        .ledger
        .rewards_for_backer(f.project_id, f.backer_id)
        .await
        .unwrap_err();
    match err {
        AppError::NotFound(msg) => assert_eq!(msg, "This user didn't back this project"),
        other => panic!("expected not-found, got {other:?}"),
    }
}
