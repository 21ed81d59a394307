//! In-memory store.
//!
//! Everything lives behind one `RwLock`, so paired writes are atomic.
//! State is lost on restart.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::AccountStore;
use crate::types::{Account, DepositReceipt, Wager};

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    wagers: HashMap<String, Wager>,
    deposits: HashMap<String, DepositReceipt>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of wagers stored (any status).
    pub async fn wager_count(&self) -> usize {
        self.inner.read().await.wagers.len()
    }

    /// All wagers owned by an account, oldest first.
    pub async fn wagers_for(&self, account_id: &str) -> Vec<Wager> {
        let inner = self.inner.read().await;
        let mut wagers: Vec<Wager> = inner
            .wagers
            .values()
            .filter(|w| w.account_id == account_id)
            .cloned()
            .collect();
        wagers.sort_by_key(|w| w.opened_at);
        wagers
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        Ok(self.inner.read().await.accounts.get(id).cloned())
    }

    async fn create_account_if_absent(&self, account: Account) -> Result<(Account, bool)> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.accounts.get(&account.id) {
            return Ok((existing.clone(), false));
        }
        debug!(account_id = %account.id, "Account created");
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok((account, true))
    }

    async fn save_account(&self, account: &Account) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.accounts.get_mut(&account.id) {
            Some(slot) => {
                *slot = account.clone();
                Ok(())
            }
            None => bail!("Cannot save unknown account {}", account.id),
        }
    }

    async fn get_wager(&self, id: &str) -> Result<Option<Wager>> {
        Ok(self.inner.read().await.wagers.get(id).cloned())
    }

    async fn record_open(&self, account: &Account, wager: &Wager) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.accounts.contains_key(&account.id) {
            bail!("Cannot open wager for unknown account {}", account.id);
        }
        if inner.wagers.contains_key(&wager.id) {
            bail!("Wager {} already exists", wager.id);
        }
        inner.wagers.insert(wager.id.clone(), wager.clone());
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn record_resolution(&self, account: &Account, wager: &Wager) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.wagers.contains_key(&wager.id) {
            bail!("Cannot resolve unknown wager {}", wager.id);
        }
        if !inner.accounts.contains_key(&account.id) {
            bail!("Cannot settle unknown account {}", account.id);
        }
        inner.wagers.insert(wager.id.clone(), wager.clone());
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn due_wagers(&self, now: DateTime<Utc>) -> Result<Vec<Wager>> {
        let inner = self.inner.read().await;
        let mut due: Vec<Wager> = inner
            .wagers
            .values()
            .filter(|w| w.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|w| w.closes_at);
        Ok(due)
    }

    async fn is_payment_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self.inner.read().await.deposits.contains_key(event_id))
    }

    async fn record_deposit(&self, account: &Account, receipt: &DepositReceipt) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.deposits.contains_key(&receipt.event_id) {
            return Ok(false);
        }
        if !inner.accounts.contains_key(&account.id) {
            bail!("Cannot credit unknown account {}", account.id);
        }
        inner.deposits.insert(receipt.event_id.clone(), receipt.clone());
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, WagerStatus};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn wager(id: &str, account_id: &str, closes_in_secs: i64) -> Wager {
        let now = Utc::now();
        Wager {
            id: id.into(),
            account_id: account_id.into(),
            pair: "BTC/USDT".into(),
            direction: Direction::Up,
            amount: dec!(10),
            open_price: dec!(50000),
            opened_at: now,
            closes_at: now + Duration::seconds(closes_in_secs),
            status: WagerStatus::Active,
            close_price: None,
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_conditional_create() {
        let store = MemoryStore::new();
        let first = Account::new("1", "alice", dec!(100), Utc::now());
        let (stored, created) = store.create_account_if_absent(first).await.unwrap();
        assert!(created);
        assert_eq!(stored.username, "alice");

        let second = Account::new("1", "mallory", dec!(999), Utc::now());
        let (stored, created) = store.create_account_if_absent(second).await.unwrap();
        assert!(!created);
        assert_eq!(stored.username, "alice");
        assert_eq!(stored.balance, dec!(100));
    }

    #[tokio::test]
    async fn test_save_unknown_account_fails() {
        let store = MemoryStore::new();
        let acct = Account::new("1", "alice", dec!(100), Utc::now());
        assert!(store.save_account(&acct).await.is_err());
    }

    #[tokio::test]
    async fn test_record_open_and_due() {
        let store = MemoryStore::new();
        let mut acct = Account::new("1", "alice", dec!(100), Utc::now());
        store.create_account_if_absent(acct.clone()).await.unwrap();

        acct.balance = dec!(90);
        store.record_open(&acct, &wager("w-late", "1", 10)).await.unwrap();
        store.record_open(&acct, &wager("w-early", "1", -5)).await.unwrap();

        assert_eq!(store.wager_count().await, 2);
        assert_eq!(store.get_account("1").await.unwrap().unwrap().balance, dec!(90));

        let due = store.due_wagers(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "w-early");

        assert!(store.record_open(&acct, &wager("w-early", "1", 0)).await.is_err());
    }

    #[tokio::test]
    async fn test_deposit_ledger_is_idempotent() {
        let store = MemoryStore::new();
        let mut acct = Account::new("1", "alice", dec!(100), Utc::now());
        store.create_account_if_absent(acct.clone()).await.unwrap();

        let receipt = DepositReceipt {
            event_id: "evt_1".into(),
            account_id: "1".into(),
            amount: dec!(25),
            processed_at: Utc::now(),
        };
        acct.balance = dec!(125);
        assert!(store.record_deposit(&acct, &receipt).await.unwrap());
        assert!(store.is_payment_processed("evt_1").await.unwrap());

        acct.balance = dec!(150);
        assert!(!store.record_deposit(&acct, &receipt).await.unwrap());
        assert_eq!(store.get_account("1").await.unwrap().unwrap().balance, dec!(125));
    }
}
