//! Game engine: account access and the wager lifecycle.
//!
//! Open: refill → check energy and balance → sample price → debit.
//! Resolve: check ACTIVE → sample price → settle → credit.
//!
//! The price sample always completes before any balance or energy is
//! touched, and every read-mutate-write cycle holds the owner's identity
//! lock, so a failed or concurrent call never leaves a partial update.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::energy::{refill_energy, ENERGY_PER_WAGER};
use super::locks::IdentityLocks;
use super::settlement::{apply_to_account, settle, Settlement, WAGER_WINDOW_SECS};
use crate::price::{PriceSource, DEFAULT_PAIR, DEFAULT_SYMBOL};
use crate::storage::AccountStore;
use crate::types::{Account, Direction, GameError, GameResult, Wager, WagerStatus};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GameSettings {
    /// Balance gifted to every new account.
    pub starting_balance: Decimal,
    /// Exchange symbol sampled for wagers.
    pub symbol: String,
    /// Display name of the traded pair.
    pub pair: String,
    /// Upper bound on a single price sample.
    pub price_timeout: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::ONE_HUNDRED,
            symbol: DEFAULT_SYMBOL.to_string(),
            pair: DEFAULT_PAIR.to_string(),
            price_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A freshly opened wager and the debited account.
#[derive(Debug, Clone)]
pub struct OpenedWager {
    pub wager: Wager,
    pub account: Account,
}

/// A resolved wager, its settlement and the credited account.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub wager: Wager,
    pub settlement: Settlement,
    pub account: Account,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct GameEngine {
    store: Arc<dyn AccountStore>,
    prices: Arc<dyn PriceSource>,
    locks: Arc<IdentityLocks>,
    settings: GameSettings,
}

impl GameEngine {
    pub fn new(
        store: Arc<dyn AccountStore>,
        prices: Arc<dyn PriceSource>,
        settings: GameSettings,
    ) -> Self {
        Self {
            store,
            prices,
            locks: Arc::new(IdentityLocks::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn store(&self) -> Arc<dyn AccountStore> {
        self.store.clone()
    }

    /// Lock registry shared with other account writers (payment intake).
    pub fn locks(&self) -> Arc<IdentityLocks> {
        self.locks.clone()
    }

    // -- Accounts --------------------------------------------------------

    /// Fetch or create the account for `id`, refilling energy.
    /// Returns the account and whether it was just created.
    pub async fn start_account(&self, id: &str, username: &str) -> GameResult<(Account, bool)> {
        let _guard = self.locks.acquire(id).await;
        let now = Utc::now();

        let fresh = Account::new(id, username, self.settings.starting_balance, now);
        let (mut account, created) = self
            .store
            .create_account_if_absent(fresh)
            .await
            .map_err(GameError::storage)?;

        if created {
            info!(account_id = %id, username, balance = %account.balance, "New account");
        }

        if refill_energy(&mut account, now) {
            self.store.save_account(&account).await.map_err(GameError::storage)?;
        }
        Ok((account, created))
    }

    /// Account snapshot after refilling energy.
    pub async fn account(&self, id: &str) -> GameResult<Account> {
        let _guard = self.locks.acquire(id).await;

        let mut account = self.load_account(id).await?;
        if refill_energy(&mut account, Utc::now()) {
            self.store.save_account(&account).await.map_err(GameError::storage)?;
        }
        Ok(account)
    }

    async fn load_account(&self, id: &str) -> GameResult<Account> {
        self.store
            .get_account(id)
            .await
            .map_err(GameError::storage)?
            .ok_or_else(|| GameError::AccountNotFound(id.to_string()))
    }

    // -- Prices ----------------------------------------------------------

    /// Sample a price with the configured timeout.
    pub async fn sample_price(&self, symbol: &str) -> GameResult<Decimal> {
        let source = self.prices.name();
        match tokio::time::timeout(self.settings.price_timeout, self.prices.current_price(symbol))
            .await
        {
            Ok(Ok(price)) => {
                debug!(source, symbol, price = %price, "Price sampled");
                Ok(price)
            }
            Ok(Err(e)) => {
                warn!(source, symbol, error = %e, "Price source failed");
                Err(GameError::upstream("price", format!("{e:#}")))
            }
            Err(_) => {
                warn!(source, symbol, timeout_ms = self.settings.price_timeout.as_millis() as u64, "Price source timed out");
                Err(GameError::upstream(
                    "price",
                    format!("no price within {:?}", self.settings.price_timeout),
                ))
            }
        }
    }

    // -- Wager lifecycle -------------------------------------------------

    /// Open a wager of `amount` on `direction` for account `id`.
    pub async fn open_wager(
        &self,
        id: &str,
        direction: Direction,
        amount: Decimal,
    ) -> GameResult<OpenedWager> {
        if amount <= Decimal::ZERO {
            return Err(GameError::InvalidRequest(format!(
                "stake must be positive, got {amount}"
            )));
        }

        let _guard = self.locks.acquire(id).await;
        let now = Utc::now();

        let mut account = self.load_account(id).await?;
        refill_energy(&mut account, now);

        if account.energy < ENERGY_PER_WAGER {
            return Err(GameError::InsufficientEnergy {
                available: account.energy,
            });
        }
        if account.balance < amount {
            return Err(GameError::InsufficientBalance {
                needed: amount,
                available: account.balance,
            });
        }

        let open_price = self.sample_price(&self.settings.symbol).await?;

        let opened_at = Utc::now();
        let wager = Wager {
            id: Uuid::new_v4().to_string(),
            account_id: id.to_string(),
            pair: self.settings.pair.clone(),
            direction,
            amount,
            open_price,
            opened_at,
            closes_at: opened_at + ChronoDuration::seconds(WAGER_WINDOW_SECS),
            status: WagerStatus::Active,
            close_price: None,
            resolved_at: None,
        };

        account.balance -= amount;
        account.energy -= ENERGY_PER_WAGER;

        self.store
            .record_open(&account, &wager)
            .await
            .map_err(GameError::storage)?;

        info!(
            account_id = %id,
            wager_id = %wager.id,
            direction = %direction,
            amount = %amount,
            open_price = %open_price,
            balance = %account.balance,
            energy = account.energy,
            "Wager opened"
        );

        Ok(OpenedWager { wager, account })
    }

    /// Resolve an active wager against a fresh price sample.
    pub async fn resolve_wager(&self, wager_id: &str) -> GameResult<Resolution> {
        let owner = self
            .store
            .get_wager(wager_id)
            .await
            .map_err(GameError::storage)?
            .ok_or_else(|| GameError::WagerNotFound(wager_id.to_string()))?
            .account_id;

        let _guard = self.locks.acquire(&owner).await;

        // Re-read under the lock: a concurrent resolve may have won the race.
        let mut wager = self
            .store
            .get_wager(wager_id)
            .await
            .map_err(GameError::storage)?
            .ok_or_else(|| GameError::WagerNotFound(wager_id.to_string()))?;

        if !wager.is_active() {
            return Err(GameError::InvalidState {
                wager_id: wager_id.to_string(),
                status: wager.status,
            });
        }

        let final_price = self.sample_price(&self.settings.symbol).await?;
        let mut account = self.load_account(&owner).await?;

        let now = Utc::now();
        let settlement = settle(wager.direction, wager.amount, wager.open_price, final_price);
        apply_to_account(&mut account, &wager, &settlement, now);

        wager.status = WagerStatus::Resolved;
        wager.close_price = Some(final_price);
        wager.resolved_at = Some(now);

        self.store
            .record_resolution(&account, &wager)
            .await
            .map_err(GameError::storage)?;

        info!(
            account_id = %owner,
            wager_id = %wager.id,
            outcome = %settlement.outcome,
            profit = %settlement.profit,
            open_price = %wager.open_price,
            final_price = %final_price,
            balance = %account.balance,
            level = account.level,
            "Wager resolved"
        );

        Ok(Resolution {
            wager,
            settlement,
            account,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
