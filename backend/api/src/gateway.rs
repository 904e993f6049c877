//! Payment gateway client: the outbound boundary for money movement.
//!
//! The platform never talks to the gateway inside a database transaction;
//! ledger code calls these methods first (or last) and composes the local
//! writes around them.  Gateway failures surface unchanged as
//! [`AppError::Gateway`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::errors::{AppError, Result};

/// Intent status the ledger accepts as settled.
pub const INTENT_SUCCEEDED: &str = "succeeded";

/// Identifiers attached to an intent so gateway records can be traced back
/// to the platform.
#[derive(Debug, Clone, Serialize)]
pub struct IntentMetadata {
    pub project_id: i64,
    pub backer_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: String,
    /// Amount in minor currency units.
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundReceipt {
    pub id: String,
    pub status: String,
    /// Refunded amount in minor currency units.
    pub amount: i64,
}

// ─────────────────────────────────────────────────────────
// Error body shape
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorDetail {
    message: String,
}

// ─────────────────────────────────────────────────────────
// Trait seam
// ─────────────────────────────────────────────────────────

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a payment intent for `amount` minor units and return it together
    /// with the client secret the frontend needs to confirm the payment.
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent>;

    /// Fetch an intent by id.  The returned amount and status are the source
    /// of truth when a backing is recorded.
    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent>;

    /// Refund the full amount behind an intent.
    async fn refund(&self, intent_id: &str) -> Result<RefundReceipt>;
}

// ─────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────

pub struct HttpGateway {
    client: Client,
    base_url: String,
    secret: String,
}

impl HttpGateway {
    pub fn new(client: Client, base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client,
            base_url,
            secret: secret.into(),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp.json::<T>().await?)
        } else {
            let message = match resp.json::<GatewayErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("gateway returned HTTP {status}"),
            };
            Err(AppError::Gateway(message))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent> {
        debug!("creating payment intent for {amount} minor units");
        let resp = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret)
            .json(&json!({
                "amount": amount,
                "currency": currency,
                "metadata": metadata,
            }))
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        let resp = self
            .client
            .get(format!("{}/v1/payment_intents/{intent_id}", self.base_url))
            .bearer_auth(&self.secret)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn refund(&self, intent_id: &str) -> Result<RefundReceipt> {
        debug!("requesting refund for intent {intent_id}");
        let resp = self
            .client
            .post(format!("{}/v1/refunds", self.base_url))
            .bearer_auth(&self.secret)
            .json(&json!({ "payment_intent": intent_id }))
            .send()
            .await?;
        Self::decode(resp).await
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
