//! helpnet-services: the peer-session core.
//!
//! Connection bookkeeping, derived survivor state, the discovery seam and the
//! session controller that ties them together. Transports live elsewhere;
//! everything here talks to peers through [`PeerConnection`] channels.

pub mod discovery;
pub mod event;
pub mod link;
pub mod registry;
pub mod session;
pub mod state;

pub use discovery::{
    ChannelDiscovery, Discovery, DiscoveryEvent, DiscoveryInjector, DiscoverySetupError,
    JoinOptions,
};
pub use event::{MessageSource, SessionEvent};
pub use link::{LinkState, PeerConnection, PeerId, RemoteEnd, WriteError};
pub use registry::{DuplicateConnectionError, PeerRegistry};
pub use session::{BroadcastReport, SessionController, SessionError, SessionPhase};
pub use state::{PeerLocations, SafeList};
