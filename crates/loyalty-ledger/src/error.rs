use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The recipient already has a subscription inside the renewal window.
    #[error("user is already subscribed")]
    AlreadySubscribed,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
