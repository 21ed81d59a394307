//! Stripe Checkout integration.
//!
//! API docs: https://stripe.com/docs/api/checkout/sessions/create
//! Webhooks: https://stripe.com/docs/webhooks#verify-manually
//! Auth: `Authorization: Bearer {secret_key}`, form-encoded bodies.
//!
//! Webhook signatures: `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`
//! where each `v1` is HMAC-SHA256 over `"{t}.{raw body}"` keyed with the
//! endpoint's signing secret.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{CheckoutSession, PaymentEvent, PaymentEventKind, PaymentGateway};
use crate::types::{GameError, GameResult};

type HmacSha256 = Hmac<Sha256>;

const BASE_URL: &str = "https://api.stripe.com/v1";
const GATEWAY_NAME: &str = "stripe";
const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Default allowed clock difference between Stripe and us.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

/// The fields of a Checkout Session object this game reads.
#[derive(Debug, Deserialize)]
struct CompletedSession {
    id: String,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct StripeGateway {
    http: Client,
    base_url: String,
    secret_key: SecretString,
    webhook_secret: SecretString,
    webapp_url: String,
    currency: String,
    tolerance_secs: i64,
}

impl StripeGateway {
    pub fn new(
        secret_key: SecretString,
        webhook_secret: SecretString,
        webapp_url: &str,
        currency: &str,
        tolerance_secs: i64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("TickBet/0.1.0")
            .build()
            .context("Failed to build HTTP client for Stripe")?;

        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            secret_key,
            webhook_secret,
            webapp_url: webapp_url.trim_end_matches('/').to_string(),
            currency: currency.to_lowercase(),
            tolerance_secs,
        })
    }

    /// Point the client at a different API root (stripe-mock, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Form fields for a one-item Checkout Session.
    fn checkout_form(&self, account_id: &str, amount: Decimal) -> Result<Vec<(String, String)>> {
        let cents = (amount * Decimal::ONE_HUNDRED)
            .round()
            .to_i64()
            .filter(|c| *c > 0)
            .with_context(|| format!("Deposit amount out of range: {amount}"))?;
        let currency_label = self.currency.to_uppercase();

        let fields = [
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][price_data][currency]", self.currency.clone()),
            ("line_items[0][price_data][product_data][name]", "TickBet deposit".to_string()),
            (
                "line_items[0][price_data][product_data][description]",
                format!("Top-up of {amount} {currency_label}"),
            ),
            ("line_items[0][price_data][unit_amount]", cents.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("mode", "payment".to_string()),
            (
                "success_url",
                format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", self.webapp_url),
            ),
            ("cancel_url", format!("{}/cancel", self.webapp_url)),
            ("metadata[telegramId]", account_id.to_string()),
            ("metadata[amount]", amount.to_string()),
        ];

        Ok(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

fn signed_payload_mac(secret: &str, timestamp: i64, payload: &[u8]) -> GameResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GameError::SignatureInvalid(format!("unusable webhook secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Build a `Stripe-Signature` header value for `payload` at `timestamp`.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> GameResult<String> {
    let mac = signed_payload_mac(secret, timestamp, payload)?;
    Ok(format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a `Stripe-Signature` header against `payload`.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> GameResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| GameError::SignatureInvalid("no timestamp in signature header".into()))?;
    if candidates.is_empty() {
        return Err(GameError::SignatureInvalid("no v1 signature in header".into()));
    }
    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(GameError::SignatureInvalid(format!(
            "timestamp {timestamp} outside tolerance of {tolerance_secs}s"
        )));
    }

    let mac = signed_payload_mac(secret, timestamp, payload)?;
    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(GameError::SignatureInvalid("no matching v1 signature".into()))
    }
}

/// Decode a verified event body.
fn decode_event(payload: &[u8]) -> GameResult<PaymentEvent> {
    let event: StripeEvent = serde_json::from_slice(payload)
        .map_err(|e| GameError::InvalidRequest(format!("malformed Stripe event: {e}")))?;

    if event.event_type != CHECKOUT_COMPLETED {
        return Ok(PaymentEvent {
            id: event.id,
            kind: PaymentEventKind::Other(event.event_type),
        });
    }

    let session: CompletedSession = serde_json::from_value(event.data.object)
        .map_err(|e| GameError::InvalidRequest(format!("malformed checkout session: {e}")))?;

    // Delayed payment methods complete the session before the money arrives.
    if session.payment_status.as_deref() == Some("unpaid") {
        return Ok(PaymentEvent {
            id: event.id,
            kind: PaymentEventKind::Other(format!("{CHECKOUT_COMPLETED} (unpaid)")),
        });
    }

    let account_id = session
        .metadata
        .get("telegramId")
        .cloned()
        .ok_or_else(|| GameError::InvalidRequest(format!("session {} has no telegramId", session.id)))?;
    let amount: Decimal = session
        .metadata
        .get("amount")
        .ok_or_else(|| GameError::InvalidRequest(format!("session {} has no amount", session.id)))?
        .parse()
        .map_err(|e| GameError::InvalidRequest(format!("session {} amount: {e}", session.id)))?;

    Ok(PaymentEvent {
        id: event.id,
        kind: PaymentEventKind::CheckoutCompleted {
            session_id: session.id,
            account_id,
            amount,
        },
    })
}

// ---------------------------------------------------------------------------
// PaymentGateway
// ---------------------------------------------------------------------------

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout(&self, account_id: &str, amount: Decimal) -> Result<CheckoutSession> {
        let form = self.checkout_form(account_id, amount)?;
        let url = format!("{}/checkout/sessions", self.base_url);
        debug!(url = %url, account_id, amount = %amount, "Creating Stripe checkout session");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form)
            .send()
            .await
            .context("Stripe API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            anyhow::bail!("Stripe API error {status}: {message}");
        }

        let session: StripeSession = resp
            .json()
            .await
            .context("Failed to parse Stripe checkout session")?;
        let url = session
            .url
            .with_context(|| format!("Stripe session {} has no redirect URL", session.id))?;

        Ok(CheckoutSession { id: session.id, url })
    }

    fn verify_event(&self, payload: &[u8], signature_header: &str) -> GameResult<PaymentEvent> {
        verify_signature(
            self.webhook_secret.expose_secret(),
            payload,
            signature_header,
            Utc::now().timestamp(),
            self.tolerance_secs,
        )?;
        decode_event(payload)
    }

    fn name(&self) -> &'static str {
        GATEWAY_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
