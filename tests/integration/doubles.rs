//! Deterministic collaborators for integration testing.
//!
//! `ScriptedFeed` replays a queue of prices and repeats the last one once
//! the queue is drained. `RecordingNotifier` captures outgoing messages.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tickbet::price::PriceSource;
use tickbet::telegram::Notifier;

pub struct ScriptedFeed {
    queue: Mutex<VecDeque<Decimal>>,
    last: Mutex<Decimal>,
    /// If set, every sample fails with this message.
    force_error: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(prices: &[Decimal]) -> Self {
        Self {
            queue: Mutex::new(prices.iter().copied().collect()),
            last: Mutex::new(prices.last().copied().unwrap_or(Decimal::ONE)),
            force_error: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, price: Decimal) {
        self.queue.lock().unwrap().push_back(price);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedFeed {
    async fn current_price(&self, _symbol: &str) -> Result<Decimal> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.queue.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(*last)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, account_id: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((account_id.to_string(), text.to_string()));
        Ok(())
    }
}
