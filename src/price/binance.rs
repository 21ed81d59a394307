//! Binance spot ticker.
//!
//! API docs: https://binance-docs.github.io/apidocs/spot/en/#symbol-price-ticker
//! Endpoint: GET /api/v3/ticker/price?symbol=BTCUSDT
//! Auth: not required.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::PriceSource;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const SOURCE_NAME: &str = "binance";

/// `/api/v3/ticker/price` response. Binance sends the price as a string.
#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

/// Binance spot price client.
pub struct BinanceClient {
    http: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("TickBet/0.1.0")
            .build()
            .context("Failed to build HTTP client for Binance")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn ticker_url(&self, symbol: &str) -> String {
        format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            urlencoding::encode(symbol),
        )
    }
}

/// Parse a ticker body into a price, checking it is for the requested symbol.
fn parse_ticker(body: &str, symbol: &str) -> Result<Decimal> {
    let ticker: TickerPrice =
        serde_json::from_str(body).context("Failed to parse Binance ticker response")?;

    if !ticker.symbol.eq_ignore_ascii_case(symbol) {
        anyhow::bail!("Binance returned ticker for {} (asked {symbol})", ticker.symbol);
    }

    let price: Decimal = ticker
        .price
        .parse()
        .with_context(|| format!("Invalid Binance price: {}", ticker.price))?;

    if price <= Decimal::ZERO {
        anyhow::bail!("Binance returned non-positive price {price} for {symbol}");
    }

    Ok(price.normalize())
}

#[async_trait]
impl PriceSource for BinanceClient {
    async fn current_price(&self, symbol: &str) -> Result<Decimal> {
        let url = self.ticker_url(symbol);
        debug!(url = %url, "Fetching Binance price");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Binance API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {status}: {body}");
        }

        let body = resp
            .text()
            .await
            .context("Failed to read Binance response body")?;

        parse_ticker(&body, symbol)
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
