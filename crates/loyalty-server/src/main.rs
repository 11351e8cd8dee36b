mod config;

use std::sync::Arc;

use tracing::info;

use loyalty_bot::irc::{IrcClient, normalize_channel};
use loyalty_bot::{CommandRouter, Dispatcher, router};
use loyalty_db::Database;
use loyalty_ledger::LoyaltyLedger;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "loyalty_server=info,loyalty_bot=info,loyalty_ledger=info,loyalty_db=info"
                    .into()
            }),
        )
        .init();

    // Config errors are fatal before any connection is attempted
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            eprintln!("       Set USER_NAME, USER_OAUTH_TOKEN and USER_CHANNEL in your environment or .env file.");
            std::process::exit(1);
        }
    };

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    let ledger = Arc::new(LoyaltyLedger::new(db));
    let clock = ledger.clock();

    // Chat connection
    let channel = normalize_channel(&config.channel);
    let (client, incoming) = IrcClient::connect(
        &config.irc_host,
        config.irc_port,
        &config.bot_name,
        &config.oauth_token,
    )
    .await?;
    let chat = client.handle();
    chat.join_channel(&channel)?;
    info!("Joined {} as {}", channel, config.bot_name);

    // Replies go out through a single paced sender
    let (dispatcher, sender) = Dispatcher::spawn(chat, channel.clone(), config.send_interval);
    let router = Arc::new(CommandRouter::new(ledger, clock, dispatcher));

    router::run(router, incoming).await;

    sender.abort();
    client.shutdown();
    anyhow::bail!("chat connection to {} closed", channel)
}
