use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// PaymentIntent
///
/// The provider-side handle of a pending charge. The browser confirms it with
/// `client_secret` and the publishable key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
}

/// PaymentGateway
///
/// Abstract contract with the payment provider, so handlers can be tested against the
/// mock without network access.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a charge for `amount` minor units, tagged with the order id.
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        order_id: Uuid,
    ) -> Result<PaymentIntent, PaymentError>;
}

/// StripeGateway
///
/// Talks to the Stripe REST API (`POST /v1/payment_intents`, form-encoded, bearer auth).
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(api_base: &str, secret_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        order_id: Uuid,
    ) -> Result<PaymentIntent, PaymentError> {
        let url = format!("{}/v1/payment_intents", self.api_base);
        let order_ref = order_id.to_string();
        let amount = amount.to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", currency),
            ("metadata[order_id]", order_ref.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
        ];

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.secret_key)
            // One charge per order, even if checkout is retried.
            .header("Idempotency-Key", order_ref.as_str())
            .form(&form[..])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "payment intent creation rejected");
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<PaymentIntent>().await?)
    }
}

/// MockPaymentGateway
///
/// Deterministic gateway for tests and for local runs without provider credentials.
#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    /// When true, every call fails as if the provider were down.
    pub should_fail: bool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        order_id: Uuid,
    ) -> Result<PaymentIntent, PaymentError> {
        if self.should_fail {
            return Err(PaymentError::Unavailable("mock gateway set to fail".to_string()));
        }
        let id = format!("pi_mock_{}", order_id.simple());
        Ok(PaymentIntent {
            client_secret: format!("{id}_secret_{amount}{currency}"),
            id,
        })
    }
}

pub type PaymentState = Arc<dyn PaymentGateway>;
