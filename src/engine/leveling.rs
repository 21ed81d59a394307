//! Leveling rule: one level per 50 settled wagers, starting at level 1.

/// Settled wagers needed per level.
pub const WAGERS_PER_LEVEL: u64 = 50;

/// Level for the given cumulative outcome counters.
///
/// Always recomputed from the counters, never incremented.
pub fn level_for(total_wins: u64, total_losses: u64) -> u32 {
    let settled = total_wins.saturating_add(total_losses);
    u32::try_from(settled / WAGERS_PER_LEVEL)
        .unwrap_or(u32::MAX - 1)
        .saturating_add(1)
}

/// Settled wagers counted towards the next level.
pub fn progress_to_next(total_wins: u64, total_losses: u64) -> u64 {
    total_wins.saturating_add(total_losses) % WAGERS_PER_LEVEL
}
