//! Payment intake.
//!
//! Defines the `PaymentGateway` trait (hosted checkout + webhook
//! verification) and `PaymentIntake`, which turns verified
//! completed-payment events into balance credits exactly once per event id.

pub mod stripe;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::locks::IdentityLocks;
use crate::storage::AccountStore;
use crate::types::{Account, DepositReceipt, GameError, GameResult};

// ---------------------------------------------------------------------------
// Gateway contract
// ---------------------------------------------------------------------------

/// A hosted checkout session the player is redirected to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// A verified event from the payment processor.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    /// Processor event id, used as the idempotency key.
    pub id: String,
    pub kind: PaymentEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEventKind {
    /// Checkout paid: credit `amount` to `account_id`.
    CheckoutCompleted {
        session_id: String,
        account_id: String,
        amount: Decimal,
    },
    /// Any event this game does not act on.
    Other(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a checkout session for a deposit of `amount`.
    async fn create_checkout(&self, account_id: &str, amount: Decimal) -> Result<CheckoutSession>;

    /// Verify a webhook's signature header against its raw body and
    /// decode the event.
    fn verify_event(&self, payload: &[u8], signature_header: &str) -> GameResult<PaymentEvent>;

    /// Gateway name for logging.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Intake
// ---------------------------------------------------------------------------

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Credited { account: Account, amount: Decimal },
    Duplicate { event_id: String },
    UnknownAccount { account_id: String },
    Ignored { event_type: String },
}

pub struct PaymentIntake {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn AccountStore>,
    locks: Arc<IdentityLocks>,
    deposit_options: Vec<u32>,
}

impl PaymentIntake {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn AccountStore>,
        locks: Arc<IdentityLocks>,
        deposit_options: Vec<u32>,
    ) -> Self {
        Self {
            gateway,
            store,
            locks,
            deposit_options,
        }
    }

    /// Deposit amounts offered in the chat menu.
    pub fn deposit_options(&self) -> &[u32] {
        &self.deposit_options
    }

    /// Start a deposit: returns the session reference and redirect URL.
    pub async fn create_checkout(
        &self,
        account_id: &str,
        amount: Decimal,
    ) -> GameResult<CheckoutSession> {
        if amount <= Decimal::ZERO {
            return Err(GameError::InvalidRequest(format!(
                "deposit must be positive, got {amount}"
            )));
        }

        let session = self
            .gateway
            .create_checkout(account_id, amount)
            .await
            .map_err(|e| {
                warn!(account_id, amount = %amount, error = %e, "Checkout creation failed");
                GameError::upstream(self.gateway.name(), format!("{e:#}"))
            })?;

        info!(account_id, amount = %amount, session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    /// Verify and apply one webhook delivery.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> GameResult<WebhookOutcome> {
        let header = signature_header
            .ok_or_else(|| GameError::SignatureInvalid("missing signature header".into()))?;
        let event = self.gateway.verify_event(payload, header)?;

        match event.kind {
            PaymentEventKind::CheckoutCompleted {
                session_id,
                account_id,
                amount,
            } => {
                info!(event_id = %event.id, session_id = %session_id, account_id = %account_id, "Checkout completed");
                self.credit(&event.id, &account_id, amount).await
            }
            PaymentEventKind::Other(event_type) => Ok(WebhookOutcome::Ignored { event_type }),
        }
    }

    /// Credit a completed payment once per `event_id`.
    pub async fn credit(
        &self,
        event_id: &str,
        account_id: &str,
        amount: Decimal,
    ) -> GameResult<WebhookOutcome> {
        if amount <= Decimal::ZERO {
            return Err(GameError::InvalidRequest(format!(
                "payment {event_id} carries non-positive amount {amount}"
            )));
        }

        let _guard = self.locks.acquire(account_id).await;

        if self
            .store
            .is_payment_processed(event_id)
            .await
            .map_err(GameError::storage)?
        {
            info!(event_id, account_id, "Duplicate payment event ignored");
            return Ok(WebhookOutcome::Duplicate {
                event_id: event_id.to_string(),
            });
        }

        let Some(mut account) = self
            .store
            .get_account(account_id)
            .await
            .map_err(GameError::storage)?
        else {
            warn!(event_id, account_id, amount = %amount, "Payment for unknown account");
            return Ok(WebhookOutcome::UnknownAccount {
                account_id: account_id.to_string(),
            });
        };

        account.balance += amount;
        let receipt = DepositReceipt {
            event_id: event_id.to_string(),
            account_id: account_id.to_string(),
            amount,
            processed_at: Utc::now(),
        };

        let recorded = self
            .store
            .record_deposit(&account, &receipt)
            .await
            .map_err(GameError::storage)?;
        if !recorded {
            return Ok(WebhookOutcome::Duplicate {
                event_id: event_id.to_string(),
            });
        }

        info!(event_id, account_id, amount = %amount, balance = %account.balance, "Deposit credited");
        Ok(WebhookOutcome::Credited { account, amount })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
