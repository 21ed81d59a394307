//! TickBet: Telegram BTC/USDT direction betting game
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the store, price feed, payments and chat bot around the game
//! engine, and serves the mini-app API until shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use tickbet::api::{self, routes::ApiState};
use tickbet::config::{self, AppConfig};
use tickbet::engine::resolver::spawn_auto_resolver;
use tickbet::engine::GameEngine;
use tickbet::payments::stripe::StripeGateway;
use tickbet::payments::PaymentIntake;
use tickbet::price::binance::BinanceClient;
use tickbet::storage::{AccountStore, MemoryStore, SqliteStore};
use tickbet::telegram::{BotSettings, Notifier, TelegramBot, TelegramClient};

const BANNER: &str = r#"
 _____ _      _    ____       _
|_   _(_) ___| | _| __ )  ___| |_
  | | | |/ __| |/ /  _ \ / _ \ __|
  | | | | (__|   <| |_) |  __/ |_
  |_| |_|\___|_|\_\____/ \___|\__|

  BTC/USDT up-or-down in 10 seconds
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load_or_default("config.toml")?;

    init_logging();

    println!("{BANNER}");
    let port = cfg.listen_port();
    info!(
        port,
        symbol = %cfg.price.symbol,
        starting_balance = %cfg.game.starting_balance,
        auto_resolve = cfg.auto_resolve.enabled,
        "TickBet starting up"
    );

    // -- Components ------------------------------------------------------

    let store: Arc<dyn AccountStore> = match AppConfig::optional_env(&cfg.storage.database_url_env)
    {
        Some(url) => {
            let sqlite = SqliteStore::connect(&url).await?;
            info!(store = sqlite.name(), "Persistent store ready");
            Arc::new(sqlite)
        }
        None => {
            warn!(
                env = %cfg.storage.database_url_env,
                "No database configured, using in-memory store (state is lost on restart)"
            );
            Arc::new(MemoryStore::new())
        }
    };

    let prices = Arc::new(BinanceClient::new(
        &cfg.price.base_url,
        Duration::from_millis(cfg.price.timeout_ms),
    )?);

    let engine = Arc::new(GameEngine::new(store.clone(), prices, cfg.game_settings()));

    let webapp_url = AppConfig::optional_env(&cfg.telegram.webapp_url_env).unwrap_or_default();
    if webapp_url.is_empty() {
        warn!(env = %cfg.telegram.webapp_url_env, "Web-app URL not set; mini-app buttons and payment redirects will be broken");
    }

    let payments = build_payments(&cfg, &webapp_url, store.clone(), &engine)?;

    let telegram_client = build_telegram_client(&cfg)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    // -- API -------------------------------------------------------------

    let mut state = ApiState::new(engine.clone()).with_currency(&cfg.game.currency);
    if let Some(p) = &payments {
        state = state.with_payments(p.clone());
    }
    if let Some(client) = &telegram_client {
        state = state.with_notifier(client.clone() as Arc<dyn Notifier>);
    }
    tasks.push(api::spawn_api(Arc::new(state), port, shutdown_rx.clone()).await?);

    // -- Chat bot --------------------------------------------------------

    if let Some(client) = telegram_client {
        let bot = Arc::new(TelegramBot::new(
            client,
            engine.clone(),
            payments.clone(),
            BotSettings {
                webapp_url: webapp_url.clone(),
                currency: cfg.game.currency.clone(),
                poll_timeout_secs: cfg.telegram.poll_timeout_secs,
            },
        ));
        tasks.push(tokio::spawn(bot.run(shutdown_rx.clone())));
    }

    // -- Auto-resolver ---------------------------------------------------

    if cfg.auto_resolve.enabled {
        tasks.push(spawn_auto_resolver(
            engine.clone(),
            Duration::from_secs(cfg.auto_resolve.interval_secs),
            shutdown_rx.clone(),
        ));
    }

    // -- Run until signalled ---------------------------------------------

    info!("Running. Press Ctrl+C to stop.");
    wait_for_shutdown().await;
    info!("Shutdown signal received.");

    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Task ended abnormally");
        }
    }

    info!("TickBet shut down cleanly.");
    Ok(())
}

/// Stripe checkout and webhook intake, if both secrets are present.
fn build_payments(
    cfg: &AppConfig,
    webapp_url: &str,
    store: Arc<dyn AccountStore>,
    engine: &GameEngine,
) -> Result<Option<Arc<PaymentIntake>>> {
    if !cfg.payments.enabled {
        info!("Payments disabled in config");
        return Ok(None);
    }

    let secrets = (
        AppConfig::resolve_secret(&cfg.payments.secret_key_env),
        AppConfig::resolve_secret(&cfg.payments.webhook_secret_env),
    );
    let (secret_key, webhook_secret) = match secrets {
        (Ok(k), Ok(w)) => (k, w),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Payments unavailable");
            return Ok(None);
        }
    };

    let gateway = StripeGateway::new(
        secret_key,
        webhook_secret,
        webapp_url,
        &cfg.payments.currency,
        cfg.payments.signature_tolerance_secs,
    )?;
    info!(currency = %cfg.payments.currency, options = ?cfg.payments.deposit_options, "Stripe payments enabled");

    Ok(Some(Arc::new(PaymentIntake::new(
        Arc::new(gateway),
        store,
        engine.locks(),
        cfg.payments.deposit_options.clone(),
    ))))
}

/// Bot API client, if the bot is enabled and has a token.
fn build_telegram_client(cfg: &AppConfig) -> Result<Option<Arc<TelegramClient>>> {
    if !cfg.telegram.enabled {
        info!("Telegram bot disabled in config");
        return Ok(None);
    }
    match AppConfig::resolve_secret(&cfg.telegram.bot_token_env) {
        Ok(token) => Ok(Some(Arc::new(TelegramClient::new(
            token,
            &cfg.telegram.api_base,
            cfg.telegram.poll_timeout_secs,
        )?))),
        Err(e) => {
            warn!(error = %e, "Telegram bot unavailable; serving the API only");
            Ok(None)
        }
    }
}

/// Resolve on Ctrl+C, or SIGTERM on Unix.
async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tickbet=info"));

    let json_logging = std::env::var("TICKBET_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
