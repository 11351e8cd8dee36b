use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::warn;

use loyalty_ledger::LoyaltyRepo;
use loyalty_types::chat::ChatMessage;

use crate::router::argument;

pub const EMOTES: &str = "SeemsGood VoHiYo 4Head GivePLZ Kappa MingLee TableHere";
pub const GIFT_USAGE: &str = "To gift sub, type !giftsub <username>";
pub const CHEER_USAGE: &str = "To cheer, type !cheer <amount>, or Cheer100";

/// Largest single cheer the bot accepts.
pub const MAX_CHEER: i64 = 1_000_000;

/// A command argument the bot refuses before touching the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no cheer amount given")]
    MissingAmount,
    #[error("cheer amount is not a number")]
    NotANumber,
    #[error("cheer amount is negative")]
    Negative,
    #[error("cheer amount is above {}", MAX_CHEER)]
    TooGenerous,
}

/// Amount for `!cheer <n>` or `!cheer<n>`. A number fused to the command
/// token wins over a separate argument.
pub fn parse_cheer_amount(command: &str, text: &str) -> Result<i64, ValidationError> {
    let suffix = command.strip_prefix("cheer").unwrap_or_default();
    let raw = if suffix.is_empty() {
        argument(text, 0).ok_or(ValidationError::MissingAmount)?
    } else {
        suffix.to_string()
    };

    let amount: i64 = raw.parse().map_err(|_| ValidationError::NotANumber)?;
    if amount < 0 {
        return Err(ValidationError::Negative);
    }
    if amount > MAX_CHEER {
        return Err(ValidationError::TooGenerous);
    }
    Ok(amount)
}

pub fn subscribe(ledger: &dyn LoyaltyRepo, msg: &ChatMessage) -> String {
    if let Err(e) = ledger.subscribe(&msg.login) {
        warn!("Sub for {} failed: {}", msg.login, e);
        return format!("{}, your sub failed because `{}`", msg.display_name, e);
    }
    format!(
        "Thank you {} for the sub! You can now use our emotes: {} #IfYouWant!",
        msg.display_name, EMOTES
    )
}

pub fn gift_sub(ledger: &dyn LoyaltyRepo, msg: &ChatMessage) -> String {
    let Some(recipient) = argument(&msg.text, 0) else {
        return GIFT_USAGE.to_string();
    };

    if let Err(e) = ledger.gift(&recipient, &msg.login) {
        warn!("Gift sub from {} to {} failed: {}", msg.login, recipient, e);
        return format!("{}, your giftsub failed because `{}`", msg.display_name, e);
    }

    let given = ledger.user_info(&msg.login).gifts_given;
    format!(
        "Thank you {} for the gift sub to {}! They can now use {}! You have given {} to this channel.",
        msg.display_name,
        recipient,
        EMOTES,
        plural(given, "gift sub")
    )
}

pub fn about_me(ledger: &dyn LoyaltyRepo, now: DateTime<Utc>, msg: &ChatMessage) -> String {
    let info = ledger.user_info(&msg.login);
    let mut parts = Vec::with_capacity(4);

    match info.last_sub {
        Some(last_sub) if info.is_subscribed(now) => parts.push(format!(
            "have been subscribed for {}, most recently {} ago",
            plural(info.months_subbed, "month"),
            elapsed(now - last_sub)
        )),
        _ => parts.push("are not currently subscribed".to_string()),
    }

    if info.gifts_given == 0 {
        parts.push("have given 0 gift subs to the community".to_string());
    } else {
        parts.push(format!("have given {}", plural(info.gifts_given, "gift sub")));
    }

    if let Some(from) = &info.subbed_from {
        parts.push(format!("last received a gift sub from {}", from));
    }

    if info.bits_cheered == 0 {
        parts.push("have not cheered".to_string());
    } else {
        parts.push(format!("have cheered {} bits", info.bits_cheered));
    }

    format!("{}, you: {}.", msg.display_name, parts.join("; "))
}

pub fn stats(ledger: &dyn LoyaltyRepo) -> String {
    let info = ledger.channel_info();
    format!(
        "There are currently {} active subscribers! The community has given {} gift subs and cheered {} bits, enough for a new {}!",
        info.active_subs,
        info.total_gifts,
        info.total_cheers,
        info.treat()
    )
}

pub fn cheer(ledger: &dyn LoyaltyRepo, command: &str, msg: &ChatMessage) -> String {
    let amount = match parse_cheer_amount(command, &msg.text) {
        Ok(amount) => amount,
        Err(e) => return rejected_cheer(e, &msg.display_name),
    };

    if let Err(e) = ledger.cheer(&msg.login, amount) {
        warn!("Cheer from {} failed: {}", msg.login, e);
        return format!("{}, your cheer failed because `{}`", msg.display_name, e);
    }

    let user = ledger.user_info(&msg.login);
    let channel = ledger.channel_info();
    format!(
        "{}, thanks for cheering {} bits, for a total of {}! The community has given {} bits, enough for a new {}!",
        msg.display_name,
        amount,
        user.bits_cheered,
        channel.total_cheers,
        channel.treat()
    )
}

fn rejected_cheer(error: ValidationError, display_name: &str) -> String {
    match error {
        ValidationError::MissingAmount => CHEER_USAGE.to_string(),
        ValidationError::NotANumber => format!("{}, you must cheer a number.", display_name),
        ValidationError::Negative => {
            format!("{}, stop trying to steal my bits! :(", display_name)
        }
        ValidationError::TooGenerous => {
            format!("{}, I can't allow you to be so generous! GivePLZ", display_name)
        }
    }
}

fn plural(count: i64, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

/// Time since the last sub, rounded to the hour.
fn elapsed(since: Duration) -> String {
    let hours = (since.num_minutes() + 30) / 60;
    match (hours / 24, hours % 24) {
        (0, 0) => "less than an hour".to_string(),
        (0, h) => plural(h, "hour"),
        (d, 0) => plural(d, "day"),
        (d, h) => format!("{} and {}", plural(d, "day"), plural(h, "hour")),
    }
}
