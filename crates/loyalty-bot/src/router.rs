use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info};

use loyalty_ledger::{Clock, LoyaltyRepo};
use loyalty_types::chat::ChatMessage;

use crate::commands;
use crate::dispatcher::Dispatcher;

const COMMAND_MARKER: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Sub,
    GiftSub,
    Me,
    Stats,
    Cheer,
}

impl Command {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "sub" => Some(Self::Sub),
            "giftsub" => Some(Self::GiftSub),
            "me" => Some(Self::Me),
            "stats" => Some(Self::Stats),
            t if t.starts_with("cheer") => Some(Self::Cheer),
            _ => None,
        }
    }
}

/// First space-delimited token, lower-cased, without a leading `!`.
pub fn command_token(text: &str) -> String {
    let first = text.split(' ').next().unwrap_or_default().to_lowercase();
    match first.strip_prefix(COMMAND_MARKER) {
        Some(rest) => rest.to_string(),
        None => first,
    }
}

/// The `n`th argument after the command, lower-cased, without a leading
/// `@`. Missing and empty arguments are both `None`.
pub fn argument(text: &str, n: usize) -> Option<String> {
    let raw = text.split(' ').nth(n + 1)?.to_lowercase();
    let arg = raw.strip_prefix('@').unwrap_or(&raw);
    if arg.is_empty() {
        None
    } else {
        Some(arg.to_string())
    }
}

/// Reply for one chat line, or `None` when the line is not a command.
pub fn reply_for(ledger: &dyn LoyaltyRepo, now: DateTime<Utc>, msg: &ChatMessage) -> Option<String> {
    let token = command_token(&msg.text);
    let reply = match Command::parse(&token)? {
        Command::Sub => commands::subscribe(ledger, msg),
        Command::GiftSub => commands::gift_sub(ledger, msg),
        Command::Me => commands::about_me(ledger, now, msg),
        Command::Stats => commands::stats(ledger),
        Command::Cheer => commands::cheer(ledger, &token, msg),
    };
    Some(reply)
}

/// Turns chat lines into ledger calls and queues the replies.
pub struct CommandRouter {
    ledger: Arc<dyn LoyaltyRepo>,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
}

impl CommandRouter {
    pub fn new(ledger: Arc<dyn LoyaltyRepo>, clock: Arc<dyn Clock>, dispatcher: Dispatcher) -> Self {
        Self {
            ledger,
            clock,
            dispatcher,
        }
    }

    pub async fn handle(&self, msg: ChatMessage) {
        let ledger = self.ledger.clone();
        let now = self.clock.now();

        // Ledger calls hit SQLite, keep them off the async workers
        let reply = match tokio::task::spawn_blocking(move || {
            let reply = reply_for(ledger.as_ref(), now, &msg);
            if reply.is_none() {
                info!("{}: {}", msg.login, msg.text);
            }
            reply
        })
        .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!("Command handler panicked: {}", e);
                return;
            }
        };

        if let Some(reply) = reply {
            self.dispatcher.enqueue(reply).await;
        }
    }
}

/// Handle every incoming chat line on its own task until the chat
/// connection closes.
pub async fn run(router: Arc<CommandRouter>, mut incoming: mpsc::UnboundedReceiver<ChatMessage>) {
    while let Some(msg) = incoming.recv().await {
        let router = router.clone();
        tokio::spawn(async move { router.handle(msg).await });
    }
    info!("Chat stream ended");
}
