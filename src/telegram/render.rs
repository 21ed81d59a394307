//! Chat screens: message text plus inline keyboard.
//!
//! Everything here is pure so the wording and button layout are testable
//! without the Bot API. Text is HTML (`parse_mode = "HTML"`); anything that
//! comes from the user is escaped.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::Write as _;

use crate::engine::energy::ENERGY_CAP;
use crate::engine::leveling::{progress_to_next, WAGERS_PER_LEVEL};
use crate::types::Account;

/// Number of history entries shown in the chat.
pub const HISTORY_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Keyboard types (Bot API wire shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_app: Option<WebAppInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebAppInfo {
    pub url: String,
}

impl InlineButton {
    pub fn callback(text: &str, action: Action) -> Self {
        Self {
            text: text.to_string(),
            callback_data: Some(action.callback_data()),
            url: None,
            web_app: None,
        }
    }

    pub fn url(text: &str, url: &str) -> Self {
        Self {
            text: text.to_string(),
            callback_data: None,
            url: Some(url.to_string()),
            web_app: None,
        }
    }

    pub fn web_app(text: &str, url: &str) -> Self {
        Self {
            text: text.to_string(),
            callback_data: None,
            url: None,
            web_app: Some(WebAppInfo {
                url: url.to_string(),
            }),
        }
    }
}

/// A message body and its keyboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Screen {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl Screen {
    fn new(text: String, rows: Vec<Vec<InlineButton>>) -> Self {
        Self {
            text,
            keyboard: Some(InlineKeyboard {
                inline_keyboard: rows,
            }),
        }
    }

    fn plain(text: String) -> Self {
        Self {
            text,
            keyboard: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Callback actions
// ---------------------------------------------------------------------------

/// Button presses the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Profile,
    History,
    Deposit,
    DepositAmount(u32),
    BackStart,
}

impl Action {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "profile" => Some(Self::Profile),
            "history" => Some(Self::History),
            "deposit" => Some(Self::Deposit),
            "back_start" => Some(Self::BackStart),
            other => other
                .strip_prefix("deposit_")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|&n| n > 0)
                .map(Self::DepositAmount),
        }
    }

    pub fn callback_data(&self) -> String {
        match self {
            Self::Profile => "profile".into(),
            Self::History => "history".into(),
            Self::Deposit => "deposit".into(),
            Self::DepositAmount(n) => format!("deposit_{n}"),
            Self::BackStart => "back_start".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Screens
// ---------------------------------------------------------------------------

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn money(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {currency}", amount.round_dp(2))
}

fn signed_money(amount: Decimal, currency: &str) -> String {
    if amount > Decimal::ZERO {
        format!("+{}", money(amount, currency))
    } else {
        money(amount, currency)
    }
}

fn main_menu(webapp_url: &str) -> Vec<Vec<InlineButton>> {
    vec![
        vec![InlineButton::web_app("🎮 Open Mini App", webapp_url)],
        vec![InlineButton::callback("💰 Deposit", Action::Deposit)],
        vec![InlineButton::callback("📊 My Profile", Action::Profile)],
    ]
}

fn status_lines(account: &Account, currency: &str) -> String {
    format!(
        "💰 Balance: {}\n⚡ Energy: {}/{ENERGY_CAP}\n🏆 Level {}",
        money(account.balance, currency),
        account.energy,
        account.level,
    )
}

/// Reply to `/start`. New players also get the starting-gift line.
pub fn welcome(
    account: &Account,
    pair: &str,
    currency: &str,
    webapp_url: &str,
    gift: Option<Decimal>,
) -> Screen {
    let mut text = format!(
        "🎰 <b>Welcome to TickBet</b>\n\n{}\n\nPredict whether {} goes up or down in the next 10 seconds.",
        status_lines(account, currency),
        escape_html(pair),
    );
    if let Some(gift) = gift {
        let _ = write!(text, "\n\n🎁 You received {} to get started!", money(gift, currency));
    }
    Screen::new(text, main_menu(webapp_url))
}

/// The "back" target: status summary with the main menu.
pub fn home(account: &Account, currency: &str, webapp_url: &str) -> Screen {
    let text = format!("🎰 <b>TickBet</b>\n\n{}", status_lines(account, currency));
    Screen::new(text, main_menu(webapp_url))
}

pub fn profile(account: &Account, currency: &str) -> Screen {
    let text = format!(
        "👤 <b>Your Profile</b> ({})\n\n\
         💰 Balance: <b>{}</b>\n\
         ⚡ Energy: {}/{ENERGY_CAP}\n\
         🏆 Level: {}\n\n\
         📊 <b>Stats</b>\n\
         ✅ Wins: {}\n\
         ❌ Losses: {}\n\
         📈 Win rate: {:.2}%\n\n\
         💎 Progress to level {}: {}/{WAGERS_PER_LEVEL}",
        escape_html(&account.username),
        money(account.balance, currency),
        account.energy,
        account.level,
        account.total_wins,
        account.total_losses,
        account.win_rate(),
        account.level + 1,
        progress_to_next(account.total_wins, account.total_losses),
    );
    Screen::new(
        text,
        vec![
            vec![InlineButton::callback("🔄 Refresh", Action::Profile)],
            vec![InlineButton::callback("📜 History", Action::History)],
            vec![InlineButton::callback("◀️ Back", Action::BackStart)],
        ],
    )
}

/// Last `HISTORY_LIMIT` settled wagers, newest first.
pub fn history(account: &Account, currency: &str) -> Screen {
    let back = vec![vec![InlineButton::callback("◀️ Back", Action::Profile)]];

    let recent = account.recent_history(HISTORY_LIMIT);
    if recent.is_empty() {
        return Screen::new("You have no wagers yet.".to_string(), back);
    }

    let mut text = format!("📜 <b>Last {HISTORY_LIMIT} Wagers</b>\n\n");
    for entry in recent {
        let icon = if entry.outcome.is_win() { "✅" } else { "❌" };
        let _ = write!(
            text,
            "{icon} {} - {}\n   {}\n\n",
            escape_html(&entry.pair),
            entry.direction,
            signed_money(entry.profit, currency),
        );
    }
    Screen::new(text.trim_end().to_string(), back)
}

/// Deposit amount picker, two buttons per row.
pub fn deposit_menu(options: &[u32], currency: &str) -> Screen {
    let mut rows: Vec<Vec<InlineButton>> = options
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|&n| InlineButton::callback(&format!("{n} {currency}"), Action::DepositAmount(n)))
                .collect()
        })
        .collect();
    rows.push(vec![InlineButton::callback("◀️ Back", Action::BackStart)]);

    Screen::new(
        "💳 <b>Deposit Funds</b>\n\nChoose how much you want to deposit:".to_string(),
        rows,
    )
}

pub fn deposits_unavailable() -> Screen {
    Screen::new(
        "💳 Deposits are currently unavailable.".to_string(),
        vec![vec![InlineButton::callback("◀️ Back", Action::BackStart)]],
    )
}

/// Link to a created checkout session.
pub fn checkout(amount: u32, currency: &str, checkout_url: &str) -> Screen {
    Screen::new(
        format!("💳 <b>Deposit of {amount} {currency}</b>\n\nTap the button to complete the payment:"),
        vec![
            vec![InlineButton::url("💳 Pay with Stripe", checkout_url)],
            vec![InlineButton::callback("◀️ Back", Action::Deposit)],
        ],
    )
}

/// Sent to the owner once a deposit has been credited.
pub fn deposit_credited(amount: Decimal, balance: Decimal, currency: &str) -> String {
    format!(
        "✅ Deposit successful!\n\n💰 +{} added to your account.\n💵 New balance: {}",
        money(amount, currency),
        money(balance, currency),
    )
}

pub fn need_start() -> Screen {
    Screen::plain("Use /start first.".to_string())
}

pub fn payment_failed() -> Screen {
    Screen::plain("Could not start the payment. Please try again.".to_string())
}

pub fn something_went_wrong() -> Screen {
    Screen::plain("Something went wrong. Please try again in a moment.".to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, HistoryEntry, Outcome};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account::new("42", "alice", dec!(100), Utc::now())
    }

    fn entry(outcome: Outcome, profit: Decimal, minutes_ago: i64) -> HistoryEntry {
        HistoryEntry {
            pair: "BTC/USDT".into(),
            direction: Direction::Up,
            amount: dec!(10),
            outcome,
            profit,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    fn callbacks(screen: &Screen) -> Vec<String> {
        screen
            .keyboard
            .as_ref()
            .map(|k| {
                k.inline_keyboard
                    .iter()
                    .flatten()
                    .filter_map(|b| b.callback_data.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(Action::parse("profile"), Some(Action::Profile));
        assert_eq!(Action::parse("back_start"), Some(Action::BackStart));
        assert_eq!(Action::parse("deposit"), Some(Action::Deposit));
        assert_eq!(Action::parse("deposit_25"), Some(Action::DepositAmount(25)));
        assert_eq!(Action::parse("deposit_0"), None);
        assert_eq!(Action::parse("deposit_abc"), None);
        assert_eq!(Action::parse("withdraw"), None);
        assert_eq!(Action::DepositAmount(50).callback_data(), "deposit_50");
    }

    #[test]
    fn test_welcome_mentions_gift_only_for_new_players() {
        let acct = account();
        let fresh = welcome(&acct, "BTC/USDT", "EUR", "https://app.example", Some(dec!(100)));
        assert!(fresh.text.contains("100.00 EUR to get started"));
        assert!(fresh.text.contains("⚡ Energy: 60/60"));

        let returning = welcome(&acct, "BTC/USDT", "EUR", "https://app.example", None);
        assert!(!returning.text.contains("get started"));

        let kb = fresh.keyboard.unwrap();
        assert_eq!(
            kb.inline_keyboard[0][0].web_app,
            Some(WebAppInfo { url: "https://app.example".into() })
        );
        assert_eq!(callbacks(&returning), vec!["deposit", "profile"]);
    }

    #[test]
    fn test_profile_stats() {
        let mut acct = account();
        acct.total_wins = 2;
        acct.total_losses = 1;
        acct.username = "<bob>".into();
        let screen = profile(&acct, "EUR");
        assert!(screen.text.contains("Win rate: 66.67%"));
        assert!(screen.text.contains("Progress to level 2: 3/50"));
        assert!(screen.text.contains("&lt;bob&gt;"));
        assert_eq!(callbacks(&screen), vec!["profile", "history", "back_start"]);
    }

    #[test]
    fn test_profile_without_wagers_shows_zero_rate() {
        let screen = profile(&account(), "EUR");
        assert!(screen.text.contains("Win rate: 0.00%"));
    }

    #[test]
    fn test_history_newest_first_and_capped() {
        let mut acct = account();
        for i in 0..12 {
            acct.history.push(entry(Outcome::Loss, dec!(-1), 100 - i));
        }
        acct.history.push(entry(Outcome::Win, dec!(8.5), 0));

        let screen = history(&acct, "EUR");
        assert_eq!(screen.text.matches("BTC/USDT").count(), HISTORY_LIMIT);
        let win_at = screen.text.find("+8.50 EUR").unwrap();
        let loss_at = screen.text.find("-1.00 EUR").unwrap();
        assert!(win_at < loss_at);
        assert_eq!(callbacks(&screen), vec!["profile"]);
    }

    #[test]
    fn test_empty_history() {
        let screen = history(&account(), "EUR");
        assert_eq!(screen.text, "You have no wagers yet.");
    }

    #[test]
    fn test_deposit_menu_layout() {
        let screen = deposit_menu(&[10, 25, 50, 100], "EUR");
        let kb = screen.keyboard.as_ref().unwrap();
        assert_eq!(kb.inline_keyboard.len(), 3);
        assert_eq!(kb.inline_keyboard[0][1].text, "25 EUR");
        assert_eq!(
            callbacks(&screen),
            vec!["deposit_10", "deposit_25", "deposit_50", "deposit_100", "back_start"]
        );
    }

    #[test]
    fn test_checkout_and_notification() {
        let screen = checkout(25, "EUR", "https://pay.example/cs_1");
        let kb = screen.keyboard.unwrap();
        assert_eq!(kb.inline_keyboard[0][0].url.as_deref(), Some("https://pay.example/cs_1"));

        let note = deposit_credited(dec!(25), dec!(125), "EUR");
        assert!(note.contains("+25.00 EUR"));
        assert!(note.contains("New balance: 125.00 EUR"));
    }

    #[test]
    fn test_keyboard_wire_shape() {
        let json = serde_json::to_value(InlineButton::callback("x", Action::History)).unwrap();
        assert_eq!(json, serde_json::json!({"text": "x", "callback_data": "history"}));
    }
}
