//! TickBet: Telegram BTC/USDT direction betting game
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod price;
pub mod engine;
pub mod storage;
pub mod payments;
pub mod telegram;
pub mod api;
