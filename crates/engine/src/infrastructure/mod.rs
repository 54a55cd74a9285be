//! Infrastructure - adapters behind the backend's ports.

pub mod clock;
pub mod ports;
pub mod replier;
