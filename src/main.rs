//! # Wallcast: wall post notifier for group chats
//!
//! Usage:
//!   wallcast <bot-token> <admin-id>                 # Subscription relay
//!   wallcast <bot-token> <admin-id> -d subs.db      # Custom database path
//!   wallcast <bot-token> 0 --mode sweep --user-token <token>

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wallcast_channels::{LongPoll, VkClient};
use wallcast_core::WallcastConfig;
use wallcast_core::config::RelayMode;
use wallcast_db::SubscriptionDb;
use wallcast_relay::{CommandInterpreter, DiscoverySweep, DispatchEngine, Relay};

#[derive(Parser)]
#[command(
    name = "wallcast",
    version,
    about = "📣 Wallcast: notifies group chats about new wall posts",
    after_help = "Chat commands (admin only): /subscribe [text], /unsubscribe"
)]
struct Cli {
    /// Bot (community) token
    token: String,

    /// Admin user id (may run /subscribe and /unsubscribe)
    admin: i64,

    /// Path to database file
    #[arg(short, long)]
    database: Option<String>,

    /// Config file (default: ~/.wallcast/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Distribution mode: subscriptions or sweep
    #[arg(long)]
    mode: Option<RelayMode>,

    /// Community id (resolved from the bot token when omitted)
    #[arg(long)]
    group_id: Option<i64>,

    /// User token for reading the wall in sweep mode (or WALLCAST_USER_TOKEN)
    #[arg(long)]
    user_token: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

impl Cli {
    /// Config file values with command-line overrides on top.
    fn into_config(self) -> Result<WallcastConfig> {
        let mut config = match &self.config {
            Some(path) => WallcastConfig::load_from(&PathBuf::from(expand_path(&path.to_string_lossy())))?,
            None => WallcastConfig::load()?,
        };

        config.vk.bot_token = self.token;
        config.admin_id = self.admin;
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(group_id) = self.group_id {
            config.vk.group_id = group_id;
        }
        if let Some(token) = self.user_token.or_else(|| std::env::var("WALLCAST_USER_TOKEN").ok()) {
            config.vk.user_token = Some(token);
        }
        config.database = expand_path(&config.database);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "wallcast=debug,wallcast_relay=debug,wallcast_channels=debug,wallcast_db=debug"
    } else {
        "wallcast=info,wallcast_relay=info,wallcast_channels=info,wallcast_db=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = cli.into_config()?;
    config.validate()?;

    tracing::info!("Initializing database...");
    let db = Arc::new(SubscriptionDb::open(std::path::Path::new(&config.database))?);

    let bot = Arc::new(VkClient::bot(&config.vk));
    let group_id = if config.vk.group_id != 0 {
        config.vk.group_id
    } else {
        bot.resolve_group_id()
            .await
            .context("Could not resolve the community id from the bot token")?
    };

    tracing::info!("📣 Wallcast v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("   Community: {group_id}");
    tracing::info!("   Mode:      {:?}", config.mode);
    tracing::info!("   Database:  {}", config.database);

    match config.mode {
        RelayMode::Subscriptions => {
            let relay = Relay::new(
                CommandInterpreter::new(group_id, config.admin_id, db.clone(), bot.clone()),
                DispatchEngine::new(db, bot.clone(), &config.dispatch),
            );
            let events = LongPoll::new(bot.as_ref().clone(), group_id, config.vk.long_poll_wait).start();

            tokio::select! {
                _ = relay.run(events) => {
                    tracing::warn!("Event stream ended");
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                }
            }
        }
        RelayMode::Sweep => {
            let user = VkClient::user(&config.vk)
                .context("Sweep mode requires a user token")?;
            let sweep = Arc::new(DiscoverySweep::new(
                group_id,
                Arc::new(user),
                bot.clone(),
                bot,
                db,
                &config.sweep,
                &config.dispatch.default_text,
            ));

            tokio::select! {
                _ = wallcast_relay::spawn_sweep(sweep) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                }
            }
        }
    }

    Ok(())
}
