//! Transport core: the mode state machine, the two transports it drives and
//! the session that ties them to the UI.

pub mod backoff;
pub mod message_log;
pub mod mode_controller;
pub mod session;
pub mod transport;

pub use message_log::{MergeOutcome, MessageLog};
pub use mode_controller::{ModeController, ModeEffect, ModeEvent};
pub use session::ChatSessionClient;
