use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use loyalty_bot::dispatcher::DEFAULT_SEND_INTERVAL;
use loyalty_bot::irc::{DEFAULT_HOST, DEFAULT_PORT};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} variable empty")]
    Missing(&'static str),

    #[error("{name} is not a valid number: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub oauth_token: String,
    pub channel: String,
    pub db_path: PathBuf,
    pub irc_host: String,
    pub irc_port: u16,
    pub send_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source. The three chat
    /// credentials are required; everything else has a default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let bot_name = required("USER_NAME")?;
        let oauth_token = required("USER_OAUTH_TOKEN")?;
        let channel = required("USER_CHANNEL")?;

        let db_path = lookup("LOYALTY_DB_PATH").unwrap_or_else(|| "loyalty.db".into()).into();
        let irc_host = lookup("LOYALTY_IRC_HOST").unwrap_or_else(|| DEFAULT_HOST.into());
        let irc_port = match lookup("LOYALTY_IRC_PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "LOYALTY_IRC_PORT", value })?,
            None => DEFAULT_PORT,
        };
        let send_interval = match lookup("LOYALTY_SEND_INTERVAL_SECS") {
            Some(value) => Duration::from_secs(value.parse().map_err(|_| ConfigError::Invalid {
                name: "LOYALTY_SEND_INTERVAL_SECS",
                value,
            })?),
            None => DEFAULT_SEND_INTERVAL,
        };

        Ok(Self {
            bot_name,
            oauth_token,
            channel,
            db_path,
            irc_host,
            irc_port,
            send_interval,
        })
    }
}
