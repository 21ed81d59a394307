//! Energy refill.
//!
//! Energy regenerates at one point per whole elapsed minute up to the cap.
//! Fractional minutes are discarded on every refill: the refill timestamp
//! moves to `now`, not to `now` minus the remainder, so frequent refills
//! accrue slower than infrequent ones.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::Account;

/// Maximum energy an account can hold.
pub const ENERGY_CAP: u32 = 60;

/// Energy regained per whole elapsed minute.
pub const ENERGY_PER_MINUTE: u32 = 1;

/// Energy consumed by opening one wager.
pub const ENERGY_PER_WAGER: u32 = 1;

const MS_PER_MINUTE: i64 = 60_000;

/// Result of a refill computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refill {
    pub energy: u32,
    pub refilled_at: DateTime<Utc>,
}

/// Compute the refilled energy for `energy` last refilled at `last_refill`.
///
/// Returns `None` when nothing changes: less than a minute elapsed, the
/// clock went backwards, or the energy is already at the cap.
pub fn compute_refill(
    energy: u32,
    last_refill: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<Refill> {
    let minutes = (now - last_refill).num_milliseconds().div_euclid(MS_PER_MINUTE);
    if minutes <= 0 || energy >= ENERGY_CAP {
        return None;
    }

    let earned = u32::try_from(minutes)
        .unwrap_or(u32::MAX)
        .saturating_mul(ENERGY_PER_MINUTE);
    let added = earned.min(ENERGY_CAP - energy);

    Some(Refill {
        energy: energy + added,
        refilled_at: now,
    })
}

/// Apply a refill to an account in place. Returns whether it changed.
pub fn refill_energy(account: &mut Account, now: DateTime<Utc>) -> bool {
    match compute_refill(account.energy, account.last_energy_refill, now) {
        Some(refill) => {
            debug!(
                account_id = %account.id,
                from = account.energy,
                to = refill.energy,
                "Energy refilled"
            );
            account.energy = refill.energy;
            account.last_energy_refill = refill.refilled_at;
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
