//! Persistence layer.
//!
//! Defines the `AccountStore` trait over accounts, wagers and the deposit
//! ledger, with an in-memory implementation for tests and database-less
//! runs and a SQLite implementation for production.
//!
//! Paired writes (`record_open`, `record_resolution`, `record_deposit`) are
//! atomic within each implementation. Callers serialize per identity, so the
//! store itself does no locking across calls.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Account, DepositReceipt, Wager};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch an account by identity.
    async fn get_account(&self, id: &str) -> Result<Option<Account>>;

    /// Insert `account` unless its identity already exists.
    /// Returns the stored record and whether it was newly created.
    async fn create_account_if_absent(&self, account: Account) -> Result<(Account, bool)>;

    /// Overwrite an existing account.
    async fn save_account(&self, account: &Account) -> Result<()>;

    /// Fetch a wager by id.
    async fn get_wager(&self, id: &str) -> Result<Option<Wager>>;

    /// Persist a newly opened wager together with the debited account.
    async fn record_open(&self, account: &Account, wager: &Wager) -> Result<()>;

    /// Persist a resolved wager together with the settled account.
    async fn record_resolution(&self, account: &Account, wager: &Wager) -> Result<()>;

    /// Active wagers whose window closed at or before `now`, oldest first.
    async fn due_wagers(&self, now: DateTime<Utc>) -> Result<Vec<Wager>>;

    /// Whether a payment event has already been credited.
    async fn is_payment_processed(&self, event_id: &str) -> Result<bool>;

    /// Record a deposit and save the credited account.
    /// Returns `false` (and writes nothing) if the event was already recorded.
    async fn record_deposit(&self, account: &Account, receipt: &DepositReceipt) -> Result<bool>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}
