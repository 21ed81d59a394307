//! Shared types for TickBet.
//!
//! Accounts, wagers and the domain error live here so that the engine,
//! storage, payment and presentation modules can depend on them without
//! circular references. Serialised field names are camelCase because the
//! mini-app front-end consumes these shapes directly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::energy::ENERGY_CAP;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Predicted price direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "UP", alias = "up", alias = "ALCISTA")]
    Up,
    #[serde(rename = "DOWN", alias = "down", alias = "BAJISTA")]
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UP" | "ALCISTA" => Ok(Direction::Up),
            "DOWN" | "BAJISTA" => Ok(Direction::Down),
            _ => Err(anyhow::anyhow!("Unknown direction: {s}")),
        }
    }
}

/// Lifecycle of a wager. `Active → Resolved` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Active,
    Resolved,
}

impl fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerStatus::Active => write!(f, "active"),
            WagerStatus::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for WagerStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(WagerStatus::Active),
            "resolved" => Ok(WagerStatus::Resolved),
            _ => Err(anyhow::anyhow!("Unknown wager status: {s}")),
        }
    }
}

/// Settlement outcome of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn is_win(&self) -> bool {
        matches!(self, Outcome::Win)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "win"),
            Outcome::Loss => write!(f, "loss"),
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Flattened projection of a settled wager, kept on the account for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub pair: String,
    pub direction: Direction,
    pub amount: Decimal,
    #[serde(rename = "result")]
    pub outcome: Outcome,
    pub profit: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A player's long-lived record, keyed by their Telegram identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(rename = "telegramId")]
    pub id: String,
    pub username: String,
    pub balance: Decimal,
    pub energy: u32,
    pub level: u32,
    pub total_wins: u64,
    pub total_losses: u64,
    #[serde(rename = "betsHistory")]
    pub history: Vec<HistoryEntry>,
    pub last_energy_refill: DateTime<Utc>,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) | balance={:.2} | energy={}/{} | level={} | W{}/L{}",
            self.username,
            self.id,
            self.balance,
            self.energy,
            ENERGY_CAP,
            self.level,
            self.total_wins,
            self.total_losses,
        )
    }
}

impl Account {
    /// A fresh account: full energy, level 1, no history.
    pub fn new(id: &str, username: &str, starting_balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            balance: starting_balance,
            energy: ENERGY_CAP,
            level: 1,
            total_wins: 0,
            total_losses: 0,
            history: Vec::new(),
            last_energy_refill: now,
        }
    }

    /// Number of settled wagers.
    pub fn total_resolved(&self) -> u64 {
        self.total_wins + self.total_losses
    }

    /// Win rate as a percentage. Returns 0.0 with no settled wagers.
    pub fn win_rate(&self) -> f64 {
        let resolved = self.total_resolved();
        if resolved == 0 {
            0.0
        } else {
            (self.total_wins as f64 / resolved as f64) * 100.0
        }
    }

    /// Most recent `n` history entries, newest first.
    pub fn recent_history(&self, n: usize) -> Vec<&HistoryEntry> {
        self.history.iter().rev().take(n).collect()
    }
}

// ---------------------------------------------------------------------------
// Wager
// ---------------------------------------------------------------------------

/// A single timed bet on price direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wager {
    pub id: String,
    #[serde(rename = "userId")]
    pub account_id: String,
    pub pair: String,
    pub direction: Direction,
    pub amount: Decimal,
    #[serde(rename = "startPrice")]
    pub open_price: Decimal,
    #[serde(rename = "startTime")]
    pub opened_at: DateTime<Utc>,
    #[serde(rename = "endTime")]
    pub closes_at: DateTime<Utc>,
    pub status: WagerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl fmt::Display for Wager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {:.2} @ {} ({}) [{}]",
            self.pair,
            self.account_id,
            self.direction,
            self.amount,
            self.open_price,
            self.status,
            self.id,
        )
    }
}

impl Wager {
    pub fn is_active(&self) -> bool {
        self.status == WagerStatus::Active
    }

    /// Whether the observation window has elapsed at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now >= self.closes_at
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

/// Ledger row for a credited deposit, keyed by the processor's event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReceipt {
    pub event_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub processed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors surfaced to REST and chat callers.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Wager not found: {0}")]
    WagerNotFound(String),

    #[error("Insufficient energy: have {available}")]
    InsufficientEnergy { available: u32 },

    #[error("Insufficient balance: need {needed:.2}, have {available:.2}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("Wager {wager_id} is not active (status: {status})")]
    InvalidState { wager_id: String, status: WagerStatus },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream unavailable ({service}): {message}")]
    Upstream { service: String, message: String },

    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl GameError {
    pub fn upstream(service: &str, err: impl fmt::Display) -> Self {
        GameError::Upstream {
            service: service.to_string(),
            message: err.to_string(),
        }
    }

    pub fn storage(err: anyhow::Error) -> Self {
        GameError::Storage(format!("{err:#}"))
    }
}

pub type GameResult<T> = Result<T, GameError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
