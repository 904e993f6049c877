//! The backing ledger: payment intents, recorded backings, refunds.
//!
//! Each operation composes independently timeout-bounded store calls with at
//! most one gateway round-trip, and the gateway call never happens inside a
//! database transaction.  Two inconsistency windows are accepted rather than
//! masked: a backing row persists even when the follow-up funding update
//! fails (the gateway has captured the money, reconciliation is the remedy),
//! and reward links attached before a bad reward id stand.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::errors::{AppError, Result};
use crate::gateway::{IntentMetadata, PaymentGateway, INTENT_SUCCEEDED};
use crate::money;
use crate::notify::{Notification, Notifier};
use crate::store::{backings, projects, rewards};
use crate::validate::{self, Validator};

/// How many fresh-read attempts a funding update gets before the conflict
/// surfaces to the caller.
const FUNDING_UPDATE_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct IntentReceipt {
    pub intent_id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct BackingReceipt {
    pub backing_id: i64,
    pub payment_id: i64,
    pub status: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub backing_id: i64,
    /// Refunded amount in minor units.
    pub amount: i64,
}

#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Notifier,
    min_pledge: i64,
    currency: String,
}

impl Ledger {
    pub fn new(
        pool: SqlitePool,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Notifier,
        config: &Config,
    ) -> Self {
        Self {
            pool,
            gateway,
            notifier,
            min_pledge: config.min_pledge,
            currency: config.currency.clone(),
        }
    }

    /// Open a payment intent for a pledge.  Nothing is written locally;
    /// the ledger entry only appears once the payment is confirmed and
    /// [`record_backing`](Self::record_backing) runs.
    pub async fn create_intent(
        &self,
        project_id: i64,
        backer_id: i64,
        amount: i64,
    ) -> Result<IntentReceipt> {
        let project = projects::get(&self.pool, project_id).await?;
        if db::now() >= project.deadline {
            return Err(AppError::NotFound(
                "Project funding duration is closed".to_string(),
            ));
        }

        let mut v = Validator::new();
        v.check(
            amount >= self.min_pledge,
            "amount",
            &format!("must be at least {} minor units", self.min_pledge),
        );
        v.finish()?;

        let intent = self
            .gateway
            .create_intent(
                amount,
                &self.currency,
                IntentMetadata {
                    project_id,
                    backer_id,
                },
            )
            .await?;

        info!(
            "payment intent {} opened for project {project_id}, {} minor units",
            intent.id, intent.amount
        );
        Ok(IntentReceipt {
            intent_id: intent.id,
            client_secret: intent.client_secret,
            amount: intent.amount,
        })
    }

    /// Record a confirmed pledge.  The gateway's view of the intent is the
    /// source of truth for amount and status; the request body only names
    /// the intent.
    pub async fn record_backing(
        &self,
        project_id: i64,
        backer_id: i64,
        backer_email: &str,
        intent_id: &str,
        payment_method: &str,
        reward_ids: &[i64],
    ) -> Result<BackingReceipt> {
        let intent = self.gateway.get_intent(intent_id).await?;
        if intent.status != INTENT_SUCCEEDED {
            return Err(AppError::validation("payment_intent", "has not succeeded"));
        }

        let (backing_id, payment_id) = backings::insert(
            &self.pool,
            &backings::NewBacking {
                backer_id,
                project_id,
                amount: intent.amount,
                status: intent.status.clone(),
                transaction_id: intent.id.clone(),
                payment_method: payment_method.to_string(),
            },
        )
        .await?;

        // The money is captured either way.  From here on a failure leaves
        // the backing row standing and reconciliation is the remedy, not
        // rollback.
        let project = projects::get(&self.pool, project_id).await?;
        if db::now() >= project.deadline {
            warn!(
                "backing {backing_id} recorded after deadline of project {project_id}; \
                 funding total not updated"
            );
            return Err(AppError::NotFound(
                "Project funding duration is closed".to_string(),
            ));
        }

        self.add_funding(project_id, intent.amount).await?;

        for (position, reward_id) in reward_ids.iter().enumerate() {
            let reward = match rewards::get(&self.pool, *reward_id).await {
                Ok(r) if r.project_id == project_id => r,
                Ok(_) | Err(AppError::NotFound(_)) => {
                    return Err(AppError::NotFound(format!(
                        "Reward {} not found",
                        position + 1
                    )));
                }
                Err(e) => return Err(e),
            };
            rewards::attach_to_backing(&self.pool, backing_id, reward.reward_id).await?;
        }

        self.notifier.send(Notification::BackingReceipt {
            email: backer_email.to_string(),
            project_title: project.title.clone(),
            amount: money::to_major(intent.amount),
            backing_id,
        });

        info!(
            "backing {backing_id} recorded on project {project_id}, {} minor units",
            intent.amount
        );
        Ok(BackingReceipt {
            backing_id,
            payment_id,
            status: intent.status,
            transaction_id: intent.id,
        })
    }

    /// Refund the backer's most recent backing of a project, full amount.
    pub async fn refund(
        &self,
        project_id: i64,
        backer_id: i64,
        backer_email: &str,
        reason: &str,
    ) -> Result<RefundOutcome> {
        let project = projects::get(&self.pool, project_id).await?;

        let mut v = Validator::new();
        validate::check_reason(&mut v, reason);
        v.finish()?;

        let backing = backings::latest_for_backer(&self.pool, project_id, backer_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => {
                    AppError::NotFound("This user didn't back this project".to_string())
                }
                other => other,
            })?;

        // Excludes already-refunded payments, so a second refund of the
        // same backing dies here, before the gateway is contacted.
        let payment = backings::payment_ref(&self.pool, backing.backing_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotFound(
                    "no refundable payment exists for this backing".to_string(),
                ),
                other => other,
            })?;

        // Gateway first, outside any transaction.  If the refund call
        // fails nothing local has changed.
        let receipt = self.gateway.refund(&payment.transaction_id).await?;

        backings::refund(
            &self.pool,
            payment.payment_id,
            payment.version,
            backing.backing_id,
            reason,
        )
        .await?;

        self.add_funding(project_id, -receipt.amount).await?;

        if rewards::backing_has_rewards(&self.pool, backing.backing_id).await? {
            rewards::detach_all(&self.pool, backing.backing_id).await?;
        }

        self.notifier.send(Notification::RefundIssued {
            email: backer_email.to_string(),
            project_title: project.title.clone(),
            amount: money::to_major(receipt.amount),
            backing_id: backing.backing_id,
        });

        info!(
            "backing {} refunded on project {project_id}, {} minor units",
            backing.backing_id, receipt.amount
        );
        Ok(RefundOutcome {
            backing_id: backing.backing_id,
            amount: receipt.amount,
        })
    }

    /// Apply a funding delta with a fresh read per attempt.  The store never
    /// retries a conflicted update; this is the caller-side retry loop, and
    /// exhaustion surfaces the conflict unchanged.
    async fn add_funding(&self, project_id: i64, delta: i64) -> Result<()> {
        for _ in 0..FUNDING_UPDATE_ATTEMPTS {
            let mut project = projects::get(&self.pool, project_id).await?;
            project.current_funding += delta;
            match projects::update(&self.pool, &project).await {
                Ok(_) => return Ok(()),
                Err(AppError::EditConflict) => continue,
                Err(e) => return Err(e),
            }
        }
        warn!(
            "funding update for project {project_id} conflicted \
             {FUNDING_UPDATE_ATTEMPTS} times, giving up"
        );
        Err(AppError::EditConflict)
    }

    // ─────────────────────────────────────────────────────────
    // Derived reads
    // ─────────────────────────────────────────────────────────

    pub async fn backers_count(&self, project_id: i64) -> Result<i64> {
        projects::get(&self.pool, project_id).await?;
        backings::backers_count(&self.pool, project_id).await
    }

    pub async fn did_back(&self, project_id: i64, backer_id: i64) -> Result<bool> {
        projects::get(&self.pool, project_id).await?;
        backings::did_back(&self.pool, project_id, backer_id).await
    }

    /// Rewards attached to the backer's most recent backing of a project.
    pub async fn rewards_for_backer(
        &self,
        project_id: i64,
        backer_id: i64,
    ) -> Result<Vec<rewards::Reward>> {
        let backing = backings::latest_for_backer(&self.pool, project_id, backer_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => {
                    AppError::NotFound("This user didn't back this project".to_string())
                }
                other => other,
            })?;
        rewards::list_for_backing(&self.pool, backing.backing_id).await
    }
}
