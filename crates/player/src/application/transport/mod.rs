//! The two transports the mode controller switches between.

pub mod polling;
pub mod probe;

pub use polling::{
    HealthChange, PollResponse, PollSchedule, PollingHealth, PollingTransport, MIN_POLL_TIMEOUT,
};
pub use probe::{ConnectFailed, Connected, PersistentConnection, ProbeEvent, TransportProbe};
