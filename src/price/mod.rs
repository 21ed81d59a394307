//! Market price sources.
//!
//! Defines the `PriceSource` trait and the Binance spot ticker
//! implementation used in production.

pub mod binance;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Symbol sampled for every wager.
pub const DEFAULT_SYMBOL: &str = "BTCUSDT";

/// Display name of the traded pair.
pub const DEFAULT_PAIR: &str = "BTC/USDT";

/// Abstraction over a spot price feed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current price for an exchange symbol such as `BTCUSDT`.
    async fn current_price(&self, symbol: &str) -> Result<Decimal>;

    /// Source name for logging.
    fn name(&self) -> &'static str;
}

/// Normalise a user-facing pair (`BTC-USDT`, `btc/usdt`) into an exchange
/// symbol (`BTCUSDT`).
pub fn normalize_symbol(pair: &str) -> String {
    pair.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}
