//! Backing ledger rows: backings, their payments, and refund records.
//!
//! A backing and its payment are born in one transaction and the backing is
//! never mutated afterwards.  All later state lives on the payment, whose
//! status flips succeeded → refunded exactly once under a version check.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{self, with_timeout};
use crate::errors::{is_unique_violation, AppError, Result};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Backing {
    pub backing_id: i64,
    pub created_at: i64,
    pub backer_id: i64,
    pub project_id: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub payment_id: i64,
    /// Amount in minor currency units.
    pub amount: i64,
    pub status: String,
    pub transaction_id: String,
    pub payment_method: String,
    pub backing_id: i64,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewBacking {
    pub backer_id: i64,
    pub project_id: i64,
    pub amount: i64,
    pub status: String,
    pub transaction_id: String,
    pub payment_method: String,
}

/// What the refund path needs to know about a payment before touching the
/// gateway.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRef {
    pub payment_id: i64,
    pub transaction_id: String,
    pub version: i64,
}

const PAYMENT_COLUMNS: &str = "payment_id, amount, status, transaction_id, payment_method, \
     backing_id, version, created_at, updated_at";

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Insert a backing and its payment atomically.  Returns the new
/// `(backing_id, payment_id)` pair.
pub async fn insert(pool: &SqlitePool, new: &NewBacking) -> Result<(i64, i64)> {
    let now = db::now();
    with_timeout(async {
        let mut tx = pool.begin().await?;

        let (backing_id,): (i64,) = sqlx::query_as(
            "INSERT INTO backings (created_at, backer_id, project_id) \
             VALUES (?1, ?2, ?3) RETURNING backing_id",
        )
        .bind(now)
        .bind(new.backer_id)
        .bind(new.project_id)
        .fetch_one(&mut *tx)
        .await?;

        let (payment_id,): (i64,) = sqlx::query_as(
            "INSERT INTO payments \
                 (amount, status, transaction_id, payment_method, backing_id, \
                  created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) RETURNING payment_id",
        )
        .bind(new.amount)
        .bind(&new.status)
        .bind(&new.transaction_id)
        .bind(&new.payment_method)
        .bind(backing_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::validation("payment_intent", "has already been recorded")
            } else {
                AppError::Database(e)
            }
        })?;

        tx.commit().await?;
        Ok((backing_id, payment_id))
    })
    .await
}

/// Flip a payment to refunded and write the cancellation record, in one
/// transaction.  The version check makes concurrent refunds (or an admin
/// override racing a refund) lose cleanly.
pub async fn refund(
    pool: &SqlitePool,
    payment_id: i64,
    version: i64,
    backing_id: i64,
    reason: &str,
) -> Result<()> {
    let now = db::now();
    with_timeout(async {
        let mut tx = pool.begin().await?;

        let flipped: Option<(i64,)> = sqlx::query_as(
            "UPDATE payments \
             SET status = 'refunded', updated_at = ?1, version = version + 1 \
             WHERE payment_id = ?2 AND version = ?3 AND status != 'refunded' \
             RETURNING payment_id",
        )
        .bind(now)
        .bind(payment_id)
        .bind(version)
        .fetch_optional(&mut *tx)
        .await?;
        if flipped.is_none() {
            return Err(AppError::EditConflict);
        }

        sqlx::query(
            "INSERT INTO cancellations (reason, date, backing_id, created_at) \
             VALUES (?1, ?2, ?3, ?2)",
        )
        .bind(reason)
        .bind(now)
        .bind(backing_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    })
    .await
}

/// Conditional payment-status override for the admin surface.
pub async fn update_payment_status(
    pool: &SqlitePool,
    payment_id: i64,
    version: i64,
    status: &str,
) -> Result<Payment> {
    let now = db::now();
    with_timeout(async {
        let sql = format!(
            "UPDATE payments SET status = ?1, updated_at = ?2, version = version + 1 \
             WHERE payment_id = ?3 AND version = ?4 \
             RETURNING {PAYMENT_COLUMNS}"
        );
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(status)
            .bind(now)
            .bind(payment_id)
            .bind(version)
            .fetch_optional(pool)
            .await?;
        payment.ok_or(AppError::EditConflict)
    })
    .await
}

pub async fn delete(pool: &SqlitePool, backing_id: i64) -> Result<()> {
    with_timeout(async {
        let affected = sqlx::query("DELETE FROM backings WHERE backing_id = ?1")
            .bind(backing_id)
            .execute(pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    })
    .await
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

/// The backer's most recent backing of a project, regardless of payment
/// state.
pub async fn latest_for_backer(
    pool: &SqlitePool,
    project_id: i64,
    backer_id: i64,
) -> Result<Backing> {
    with_timeout(async {
        let backing = sqlx::query_as::<_, Backing>(
            "SELECT backing_id, created_at, backer_id, project_id \
             FROM backings \
             WHERE project_id = ?1 AND backer_id = ?2 \
             ORDER BY created_at DESC, backing_id DESC \
             LIMIT 1",
        )
        .bind(project_id)
        .bind(backer_id)
        .fetch_optional(pool)
        .await?;
        backing.ok_or_else(AppError::not_found)
    })
    .await
}

/// The refundable payment behind a backing.  Already-refunded payments do
/// not qualify, which is what makes a second refund die before the gateway
/// is ever contacted.
pub async fn payment_ref(pool: &SqlitePool, backing_id: i64) -> Result<PaymentRef> {
    with_timeout(async {
        let payment = sqlx::query_as::<_, PaymentRef>(
            "SELECT payment_id, transaction_id, version \
             FROM payments \
             WHERE backing_id = ?1 AND status != 'refunded'",
        )
        .bind(backing_id)
        .fetch_optional(pool)
        .await?;
        payment.ok_or_else(AppError::not_found)
    })
    .await
}

pub async fn get_payment(pool: &SqlitePool, payment_id: i64) -> Result<Payment> {
    with_timeout(async {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = ?1");
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(payment_id)
            .fetch_optional(pool)
            .await?;
        payment.ok_or_else(AppError::not_found)
    })
    .await
}

/// Number of non-refunded backings a project has received.
pub async fn backers_count(pool: &SqlitePool, project_id: i64) -> Result<i64> {
    with_timeout(async {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) \
             FROM backings b \
             INNER JOIN payments p ON p.backing_id = b.backing_id \
             WHERE b.project_id = ?1 AND p.status != 'refunded'",
        )
        .bind(project_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    })
    .await
}

/// Whether the user currently backs the project (refunded backings do not
/// count).
pub async fn did_back(pool: &SqlitePool, project_id: i64, backer_id: i64) -> Result<bool> {
    with_timeout(async {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 \
             FROM backings b \
             INNER JOIN payments p ON p.backing_id = b.backing_id \
             WHERE b.project_id = ?1 AND b.backer_id = ?2 AND p.status != 'refunded' \
             LIMIT 1",
        )
        .bind(project_id)
        .bind(backer_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.is_some())
    })
    .await
}

/// Audit view of a project's funding: the sum every non-refunded payment
/// contributes.  Nothing schedules this; tests use it to cross-check the
/// incrementally maintained total.
pub async fn funded_total(pool: &SqlitePool, project_id: i64) -> Result<i64> {
    with_timeout(async {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(p.amount), 0) \
             FROM backings b \
             INNER JOIN payments p ON p.backing_id = b.backing_id \
             WHERE b.project_id = ?1 AND p.status != 'refunded'",
        )
        .bind(project_id)
        .fetch_one(pool)
        .await?;
        Ok(total)
    })
    .await
}
