//! Port traits: the seams between the session logic and concrete transports.

pub mod outbound;
