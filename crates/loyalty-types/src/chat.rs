use serde::{Deserialize, Serialize};

/// A chat line received from the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel: String,
    /// Lower-case account name; the ledger key.
    pub login: String,
    /// Name shown to the user in replies.
    pub display_name: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(channel: &str, login: &str, text: &str) -> Self {
        Self {
            channel: channel.to_string(),
            login: login.to_lowercase(),
            display_name: login.to_string(),
            text: text.to_string(),
        }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        if !display_name.is_empty() {
            self.display_name = display_name.to_string();
        }
        self
    }
}
