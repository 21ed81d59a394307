//! Mini-app API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiState>`.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::GameEngine;
use crate::payments::{PaymentIntake, WebhookOutcome};
use crate::price::normalize_symbol;
use crate::telegram::{render, Notifier};
use crate::types::{Account, Direction, GameError, GameResult, Wager};

/// Header carrying the processor's webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub engine: Arc<GameEngine>,
    /// `None` when no payment processor is configured.
    pub payments: Option<Arc<PaymentIntake>>,
    /// `None` when the chat bot is disabled.
    pub notifier: Option<Arc<dyn Notifier>>,
    /// Display currency used in deposit notifications.
    pub currency: String,
}

impl ApiState {
    pub fn new(engine: Arc<GameEngine>) -> Self {
        Self {
            engine,
            payments: None,
            notifier: None,
            currency: "EUR".to_string(),
        }
    }

    pub fn with_payments(mut self, payments: Arc<PaymentIntake>) -> Self {
        self.payments = Some(payments);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BetRequest {
    #[serde(alias = "telegramId", deserialize_with = "string_or_number")]
    pub id: String,
    pub direction: Direction,
    pub amount: Decimal,
}

/// Telegram ids arrive as JSON numbers from some clients.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetResponse {
    pub success: bool,
    pub bet: Wager,
    pub current_price: Decimal,
    pub user: BalanceView,
}

#[derive(Debug, Serialize)]
pub struct BalanceView {
    pub balance: Decimal,
    pub energy: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub success: bool,
    pub won: bool,
    pub profit: Decimal,
    pub final_price: Decimal,
    /// Percentage move, two decimals.
    pub price_change: Decimal,
    pub bet: Wager,
    pub user: StatsView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub balance: Decimal,
    pub energy: u32,
    pub level: u32,
    pub total_wins: u64,
    pub total_losses: u64,
}

#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub pair: String,
    pub symbol: String,
    pub price: Decimal,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/user/:id
pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> GameResult<Json<Account>> {
    state.engine.account(&id).await.map(Json)
}

/// POST /api/bet
pub async fn open_bet(
    State(state): State<AppState>,
    body: Result<Json<BetRequest>, JsonRejection>,
) -> GameResult<Json<BetResponse>> {
    let Json(req) = body.map_err(|e| GameError::InvalidRequest(e.body_text()))?;

    let opened = state
        .engine
        .open_wager(&req.id, req.direction, req.amount)
        .await?;

    Ok(Json(BetResponse {
        success: true,
        current_price: opened.wager.open_price,
        bet: opened.wager,
        user: BalanceView {
            balance: opened.account.balance,
            energy: opened.account.energy,
        },
    }))
}

/// POST /api/bet/resolve/:wager_id
pub async fn resolve_bet(
    State(state): State<AppState>,
    Path(wager_id): Path<String>,
) -> GameResult<Json<ResolveResponse>> {
    let res = state.engine.resolve_wager(&wager_id).await?;
    let account = res.account;

    Ok(Json(ResolveResponse {
        success: true,
        won: res.settlement.outcome.is_win(),
        profit: res.settlement.profit,
        final_price: res.settlement.final_price,
        price_change: res.settlement.price_change_pct,
        bet: res.wager,
        user: StatsView {
            balance: account.balance,
            energy: account.energy,
            level: account.level,
            total_wins: account.total_wins,
            total_losses: account.total_losses,
        },
    }))
}

/// GET /api/price/:pair
pub async fn get_price(
    State(state): State<AppState>,
    Path(pair): Path<String>,
) -> GameResult<Json<PriceResponse>> {
    let symbol = normalize_symbol(&pair);
    if symbol.is_empty() {
        return Err(GameError::InvalidRequest(format!("unrecognised pair: {pair}")));
    }
    let price = state.engine.sample_price(&symbol).await?;
    Ok(Json(PriceResponse {
        pair,
        symbol,
        price,
    }))
}

/// POST /webhook/payment. The raw body is verified before decoding.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> GameResult<Json<Value>> {
    let Some(payments) = &state.payments else {
        warn!("Payment webhook received but payments are not configured");
        return Err(GameError::InvalidRequest("payments are not configured".into()));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match payments.handle_webhook(&body, signature).await? {
        WebhookOutcome::Credited { account, amount } => {
            if let Some(notifier) = state.notifier.clone() {
                let text = render::deposit_credited(amount, account.balance, &state.currency);
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(&account.id, &text).await {
                        warn!(account_id = %account.id, error = %e, "Deposit notification failed");
                    }
                });
            }
        }
        WebhookOutcome::Duplicate { event_id } => {
            info!(event_id = %event_id, "Webhook redelivery acknowledged");
        }
        WebhookOutcome::UnknownAccount { .. } | WebhookOutcome::Ignored { .. } => {}
    }

    Ok(Json(json!({ "received": true })))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
