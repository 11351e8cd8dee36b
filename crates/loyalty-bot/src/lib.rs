pub mod commands;
pub mod dispatcher;
pub mod irc;
pub mod router;

pub use dispatcher::{ChatSink, Dispatcher};
pub use router::CommandRouter;
