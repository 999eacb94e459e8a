//! helpnet-core: topic derivation, message protocol, wire types and config.
//! All other helpnet crates depend on this one.

pub mod config;
pub mod protocol;
pub mod topic;
pub mod wire;

pub use protocol::{Location, LocationError, Message, MessageKind, SAFE_PREFIX, SOS_TEXT};
pub use topic::{derive_topic, Topic, DEFAULT_NETWORK_NAME};
