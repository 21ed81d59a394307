//! Telegram chat front end.
//!
//! Long-polls the Bot API for `/start` and inline-button presses and
//! answers with the screens from `render`. Also implements `Notifier`, used
//! to tell a player that a deposit was credited.

pub mod render;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::engine::GameEngine;
use crate::payments::PaymentIntake;
use crate::types::GameError;
use render::{Action, InlineKeyboard, Screen};

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Out-of-band message to a player, keyed by account id (the chat id of a
/// private chat).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, account_id: &str, text: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Bot API wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

impl User {
    /// Telegram username, falling back to the first name.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.first_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboard>,
}

#[derive(Debug, Serialize)]
struct EditMessageText<'a> {
    chat_id: &'a str,
    message_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboard>,
}

/// Extract a bot command name from message text: `/start@TickBot x` → `start`.
pub fn command_name(text: &str) -> Option<String> {
    let first = text.trim().split_whitespace().next()?;
    let cmd = first.strip_prefix('/')?;
    let cmd = cmd.split('@').next().unwrap_or(cmd);
    (!cmd.is_empty()).then(|| cmd.to_lowercase())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Thin Bot API client.
pub struct TelegramClient {
    http: Client,
    api_base: String,
    token: SecretString,
}

impl TelegramClient {
    /// `poll_timeout_secs` is the long-poll wait; the HTTP timeout is set
    /// above it.
    pub fn new(token: SecretString, api_base: &str, poll_timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 10))
            .user_agent("TickBet/0.1.0")
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token.expose_secret())
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            // reqwest errors embed the URL, which carries the token.
            .map_err(|e| anyhow::anyhow!("Telegram {method} request failed: {}", e.without_url()))?;

        let status = resp.status();
        let parsed: ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram {method} response"))?;

        if !parsed.ok {
            anyhow::bail!(
                "Telegram API error {status} on {method}: {}",
                parsed.description.unwrap_or_default()
            );
        }
        parsed
            .result
            .with_context(|| format!("Telegram {method} returned no result"))
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &serde_json::json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    pub async fn send_screen(&self, chat_id: &str, screen: &Screen) -> Result<()> {
        let body = SendMessage {
            chat_id,
            text: &screen.text,
            parse_mode: "HTML",
            reply_markup: screen.keyboard.as_ref(),
        };
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    pub async fn edit_screen(&self, chat_id: &str, message_id: i64, screen: &Screen) -> Result<()> {
        let body = EditMessageText {
            chat_id,
            message_id,
            text: &screen.text,
            parse_mode: "HTML",
            reply_markup: screen.keyboard.as_ref(),
        };
        let _: serde_json::Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    pub async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &serde_json::json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn notify(&self, account_id: &str, text: &str) -> Result<()> {
        let screen = Screen {
            text: render::escape_html(text),
            keyboard: None,
        };
        self.send_screen(account_id, &screen).await
    }
}

// ---------------------------------------------------------------------------
// Bot
// ---------------------------------------------------------------------------

/// Display settings for chat screens.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub webapp_url: String,
    pub currency: String,
    pub poll_timeout_secs: u64,
}

pub struct TelegramBot {
    client: Arc<TelegramClient>,
    engine: Arc<GameEngine>,
    payments: Option<Arc<PaymentIntake>>,
    settings: BotSettings,
}

impl TelegramBot {
    pub fn new(
        client: Arc<TelegramClient>,
        engine: Arc<GameEngine>,
        payments: Option<Arc<PaymentIntake>>,
        settings: BotSettings,
    ) -> Self {
        Self {
            client,
            engine,
            payments,
            settings,
        }
    }

    /// Poll until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Telegram bot polling started");
        let mut offset = 0_i64;

        loop {
            let poll = self
                .client
                .get_updates(offset, self.settings.poll_timeout_secs);

            let updates = tokio::select! {
                res = poll => res,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to poll Telegram updates");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
        info!("Telegram bot polling stopped");
    }

    async fn handle_update(&self, update: Update) {
        if let Some(msg) = update.message {
            self.handle_message(msg).await;
        } else if let Some(query) = update.callback_query {
            self.handle_callback(query).await;
        }
    }

    async fn handle_message(&self, msg: Message) {
        let (Some(from), Some(text)) = (msg.from.as_ref(), msg.text.as_deref()) else {
            return;
        };
        let chat_id = msg.chat.id.to_string();

        match command_name(text).as_deref() {
            Some("start") => {
                let id = from.id.to_string();
                debug!(account_id = %id, "/start");
                let screen = match self.engine.start_account(&id, from.display_name()).await {
                    Ok((account, created)) => render::welcome(
                        &account,
                        &self.engine.settings().pair,
                        &self.settings.currency,
                        &self.settings.webapp_url,
                        created.then_some(self.engine.settings().starting_balance),
                    ),
                    Err(e) => {
                        error!(account_id = %id, error = %e, "Failed to start account");
                        render::something_went_wrong()
                    }
                };
                self.send(&chat_id, &screen).await;
            }
            Some(other) => debug!(command = other, "Ignoring unknown command"),
            None => {}
        }
    }

    async fn handle_callback(&self, query: CallbackQuery) {
        if let Err(e) = self.client.answer_callback(&query.id).await {
            debug!(error = %e, "answerCallbackQuery failed");
        }

        let Some(action) = query.data.as_deref().and_then(Action::parse) else {
            debug!(data = ?query.data, "Ignoring unknown callback");
            return;
        };
        let Some(message) = query.message else {
            return;
        };
        let chat_id = message.chat.id.to_string();
        let id = query.from.id.to_string();
        let currency = &self.settings.currency;

        let screen = match action {
            Action::Profile => self.with_account(&id, |a| render::profile(a, currency)).await,
            Action::History => self.with_account(&id, |a| render::history(a, currency)).await,
            Action::BackStart => {
                self.with_account(&id, |a| render::home(a, currency, &self.settings.webapp_url))
                    .await
            }
            Action::Deposit => match &self.payments {
                Some(payments) => render::deposit_menu(payments.deposit_options(), currency),
                None => render::deposits_unavailable(),
            },
            Action::DepositAmount(amount) => self.start_deposit(&id, amount).await,
        };

        // Error replies go out as new messages; menus replace the pressed one.
        if screen.keyboard.is_some() {
            if let Err(e) = self
                .client
                .edit_screen(&chat_id, message.message_id, &screen)
                .await
            {
                // "message is not modified" on a repeated refresh lands here too.
                debug!(error = %e, "editMessageText failed");
            }
        } else {
            self.send(&chat_id, &screen).await;
        }
    }

    async fn with_account<F>(&self, id: &str, render_fn: F) -> Screen
    where
        F: FnOnce(&crate::types::Account) -> Screen,
    {
        match self.engine.account(id).await {
            Ok(account) => render_fn(&account),
            Err(GameError::AccountNotFound(_)) => render::need_start(),
            Err(e) => {
                error!(account_id = %id, error = %e, "Failed to load account");
                render::something_went_wrong()
            }
        }
    }

    async fn start_deposit(&self, id: &str, amount: u32) -> Screen {
        let Some(payments) = &self.payments else {
            return render::deposits_unavailable();
        };
        if !payments.deposit_options().contains(&amount) {
            warn!(account_id = %id, amount, "Deposit amount not offered");
            return render::payment_failed();
        }

        match payments.create_checkout(id, Decimal::from(amount)).await {
            Ok(session) => render::checkout(amount, &self.settings.currency, &session.url),
            Err(e) => {
                error!(account_id = %id, amount, error = %e, "Failed to create checkout session");
                render::payment_failed()
            }
        }
    }

    async fn send(&self, chat_id: &str, screen: &Screen) {
        if let Err(e) = self.client.send_screen(chat_id, screen).await {
            warn!(chat_id, error = %e, "sendMessage failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
