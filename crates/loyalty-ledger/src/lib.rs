pub mod clock;
pub mod error;
pub mod ledger;
pub mod locks;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LedgerError;
pub use ledger::{LoyaltyLedger, LoyaltyRepo};
