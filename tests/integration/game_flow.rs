//! Wager lifecycle against both store backends.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use tickbet::engine::energy::ENERGY_CAP;
use tickbet::engine::resolver::sweep_due;
use tickbet::engine::{GameEngine, GameSettings};
use tickbet::storage::{AccountStore, MemoryStore, SqliteStore};
use tickbet::types::{Account, Direction, GameError, Outcome, Wager, WagerStatus};

use crate::doubles::ScriptedFeed;

fn engine_with(store: Arc<dyn AccountStore>, feed: Arc<ScriptedFeed>) -> GameEngine {
    GameEngine::new(store, feed, GameSettings::default())
}

async fn sqlite() -> Arc<dyn AccountStore> {
    Arc::new(SqliteStore::in_memory().await.unwrap())
}

#[tokio::test]
async fn test_fresh_account_win_persists_in_sqlite() {
    let store = sqlite().await;
    let feed = Arc::new(ScriptedFeed::new(&[dec!(50000), dec!(50100)]));
    let engine = engine_with(store.clone(), feed);

    let (account, created) = engine.start_account("1001", "alice").await.unwrap();
    assert!(created);
    assert_eq!(account.balance, dec!(100));
    assert_eq!(account.energy, ENERGY_CAP);
    assert_eq!(account.level, 1);

    let opened = engine.open_wager("1001", Direction::Up, dec!(10)).await.unwrap();
    assert_eq!(opened.account.balance, dec!(90));
    assert_eq!(opened.account.energy, 59);
    assert_eq!(opened.wager.closes_at - opened.wager.opened_at, Duration::seconds(10));

    let res = engine.resolve_wager(&opened.wager.id).await.unwrap();
    assert_eq!(res.settlement.outcome, Outcome::Win);
    assert_eq!(res.settlement.profit, dec!(8.5));
    assert_eq!(res.account.balance, dec!(108.5));

    // Everything survives a re-read from the database.
    let stored = store.get_account("1001").await.unwrap().unwrap();
    assert_eq!(stored.balance, dec!(108.5));
    assert_eq!(stored.total_wins, 1);
    assert_eq!(stored.level, 1);
    assert_eq!(stored.history.len(), 1);
    assert_eq!(stored.history[0].profit, dec!(8.5));

    let wager = store.get_wager(&opened.wager.id).await.unwrap().unwrap();
    assert_eq!(wager.status, WagerStatus::Resolved);
    assert_eq!(wager.close_price, Some(dec!(50100)));
}

#[tokio::test]
async fn test_loss_and_flat_price() {
    let feed = Arc::new(ScriptedFeed::new(&[dec!(50000), dec!(49900), dec!(100), dec!(100)]));
    let engine = engine_with(Arc::new(MemoryStore::new()), feed);
    engine.start_account("7", "bob").await.unwrap();

    let w = engine.open_wager("7", Direction::Up, dec!(10)).await.unwrap();
    let res = engine.resolve_wager(&w.wager.id).await.unwrap();
    assert_eq!(res.settlement.outcome, Outcome::Loss);
    assert_eq!(res.settlement.profit, dec!(-10));
    assert_eq!(res.account.balance, dec!(90));
    assert_eq!(res.account.total_losses, 1);

    // Unchanged price loses even for DOWN.
    let w = engine.open_wager("7", Direction::Down, dec!(10)).await.unwrap();
    let res = engine.resolve_wager(&w.wager.id).await.unwrap();
    assert_eq!(res.settlement.outcome, Outcome::Loss);
    assert_eq!(res.account.balance, dec!(80));
}

#[tokio::test]
async fn test_double_resolve_changes_balance_once() {
    let feed = Arc::new(ScriptedFeed::new(&[dec!(1), dec!(2)]));
    let engine = engine_with(sqlite().await, feed.clone());
    engine.start_account("5", "eve").await.unwrap();

    let w = engine.open_wager("5", Direction::Up, dec!(20)).await.unwrap();
    engine.resolve_wager(&w.wager.id).await.unwrap();
    let calls = feed.calls();

    let again = engine.resolve_wager(&w.wager.id).await;
    assert!(matches!(again, Err(GameError::InvalidState { .. })));
    // No price sample for an already-settled wager.
    assert_eq!(feed.calls(), calls);

    let account = engine.account("5").await.unwrap();
    assert_eq!(account.balance, dec!(117));
    assert_eq!(account.total_resolved(), 1);
}

#[tokio::test]
async fn test_energy_regenerates_from_stored_timestamp() {
    let store = sqlite().await;
    let mut drained = Account::new("9", "carol", dec!(100), Utc::now() - Duration::minutes(5));
    drained.energy = 0;
    store.create_account_if_absent(drained).await.unwrap();

    let engine = engine_with(store.clone(), Arc::new(ScriptedFeed::new(&[dec!(1)])));
    let account = engine.account("9").await.unwrap();
    assert_eq!(account.energy, 5);
    assert_eq!(store.get_account("9").await.unwrap().unwrap().energy, 5);
}

#[tokio::test]
async fn test_insufficient_balance_leaves_no_trace() {
    let store = Arc::new(MemoryStore::new());
    let mut poor = Account::new("3", "dan", dec!(5), Utc::now());
    poor.energy = 10;
    store.create_account_if_absent(poor).await.unwrap();

    let feed = Arc::new(ScriptedFeed::new(&[dec!(50000)]));
    let engine = engine_with(store.clone(), feed.clone());

    let err = engine.open_wager("3", Direction::Down, dec!(10)).await.unwrap_err();
    assert!(matches!(err, GameError::InsufficientBalance { .. }));
    assert_eq!(store.wager_count().await, 0);
    assert_eq!(feed.calls(), 0);

    let account = store.get_account("3").await.unwrap().unwrap();
    assert_eq!(account.balance, dec!(5));
    assert_eq!(account.energy, 10);
}

#[tokio::test]
async fn test_price_outage_then_recovery() {
    let feed = Arc::new(ScriptedFeed::new(&[dec!(100), dec!(101)]));
    let engine = engine_with(Arc::new(MemoryStore::new()), feed.clone());
    engine.start_account("4", "fay").await.unwrap();

    let w = engine.open_wager("4", Direction::Up, dec!(10)).await.unwrap();

    feed.set_error("exchange unreachable");
    let err = engine.resolve_wager(&w.wager.id).await.unwrap_err();
    assert!(matches!(err, GameError::Upstream { .. }));
    assert_eq!(engine.account("4").await.unwrap().balance, dec!(90));

    // The wager is still open and resolves once the feed is back.
    feed.clear_error();
    let res = engine.resolve_wager(&w.wager.id).await.unwrap();
    assert_eq!(res.account.balance, dec!(108.5));
}

#[tokio::test]
async fn test_level_rises_after_fifty_wagers() {
    let feed = Arc::new(ScriptedFeed::new(&[]));
    let engine = engine_with(Arc::new(MemoryStore::new()), feed.clone());
    engine.start_account("8", "gus").await.unwrap();

    for i in 0..50u32 {
        feed.push(Decimal::from(1000 + i));
        feed.push(Decimal::from(1000 + i + 1));
        let w = engine.open_wager("8", Direction::Up, dec!(1)).await.unwrap();
        let res = engine.resolve_wager(&w.wager.id).await.unwrap();
        let expected = if i < 49 { 1 } else { 2 };
        assert_eq!(res.account.level, expected, "after wager {}", i + 1);
    }

    let account = engine.account("8").await.unwrap();
    assert_eq!(account.total_wins, 50);
    assert_eq!(account.balance, dec!(142.5));
    assert_eq!(account.recent_history(10).len(), 10);
}

#[tokio::test]
async fn test_sweep_resolves_overdue_wagers() {
    let store = sqlite().await;
    let feed = Arc::new(ScriptedFeed::new(&[dec!(200)]));
    let engine = engine_with(store.clone(), feed);
    let (mut account, _) = engine.start_account("6", "hal").await.unwrap();

    let opened_at = Utc::now() - Duration::seconds(30);
    let overdue = Wager {
        id: "w-overdue".into(),
        account_id: "6".into(),
        pair: "BTC/USDT".into(),
        direction: Direction::Down,
        amount: dec!(10),
        open_price: dec!(250),
        opened_at,
        closes_at: opened_at + Duration::seconds(10),
        status: WagerStatus::Active,
        close_price: None,
        resolved_at: None,
    };
    account.balance -= overdue.amount;
    account.energy -= 1;
    store.record_open(&account, &overdue).await.unwrap();

    let report = sweep_due(&engine).await.unwrap();
    assert_eq!(report.resolved.len(), 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.resolved[0].settlement.outcome, Outcome::Win);

    let account = store.get_account("6").await.unwrap().unwrap();
    assert_eq!(account.balance, dec!(108.5));

    // Nothing left to sweep.
    assert!(sweep_due(&engine).await.unwrap().resolved.is_empty());
}
