// connect-bridge: receiver side of the second-screen app channel
// Channel transport, command dispatch and platform profiles

pub mod channel;
pub mod command;
pub mod config;
pub mod events;
pub mod logging;
pub mod media;
pub mod platform;

#[cfg(test)]
pub(crate) mod testing;
