//! Wager settlement.
//!
//! A wager wins when the price moved strictly in the predicted direction.
//! An unchanged price loses for both directions. Winners are credited
//! stake × 1.85 (stake back plus 85% profit); losers are credited nothing,
//! the stake having been debited at open.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::leveling::level_for;
use crate::types::{Account, Direction, HistoryEntry, Outcome, Wager};

/// Profit on a winning wager as a fraction of the stake.
pub const PAYOUT_RATE: Decimal = dec!(0.85);

/// Length of a wager's observation window.
pub const WAGER_WINDOW_SECS: i64 = 10;

/// Computed result of settling one wager.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub outcome: Outcome,
    /// Signed profit: `stake × 0.85` on a win, `−stake` on a loss.
    pub profit: Decimal,
    /// Amount returned to the balance (`stake + profit`).
    pub credit: Decimal,
    pub final_price: Decimal,
    /// `final − open`.
    pub price_change: Decimal,
    /// Percentage move relative to the open price, two decimals.
    pub price_change_pct: Decimal,
}

/// Settle a wager of `stake` on `direction` opened at `open_price`.
pub fn settle(
    direction: Direction,
    stake: Decimal,
    open_price: Decimal,
    final_price: Decimal,
) -> Settlement {
    let price_change = final_price - open_price;

    let won = match direction {
        Direction::Up => price_change > Decimal::ZERO,
        Direction::Down => price_change < Decimal::ZERO,
    };

    let (outcome, profit) = if won {
        (Outcome::Win, stake * PAYOUT_RATE)
    } else {
        (Outcome::Loss, -stake)
    };

    let price_change_pct = (price_change * Decimal::ONE_HUNDRED)
        .checked_div(open_price)
        .unwrap_or(Decimal::ZERO)
        .round_dp(2);

    Settlement {
        outcome,
        profit,
        credit: stake + profit,
        final_price,
        price_change,
        price_change_pct,
    }
}

/// Apply a settlement to the wager's owner: credit, counters, level and a
/// history entry.
pub fn apply_to_account(
    account: &mut Account,
    wager: &Wager,
    settlement: &Settlement,
    now: DateTime<Utc>,
) {
    account.balance += settlement.credit;
    match settlement.outcome {
        Outcome::Win => account.total_wins += 1,
        Outcome::Loss => account.total_losses += 1,
    }
    account.level = level_for(account.total_wins, account.total_losses);
    account.history.push(HistoryEntry {
        pair: wager.pair.clone(),
        direction: wager.direction,
        amount: wager.amount,
        outcome: settlement.outcome,
        profit: settlement.profit,
        timestamp: now,
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
