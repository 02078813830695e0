//! WolfPeer - WireGuard Peer Control Plane
//!
//! An HTTP control plane for the peers of a single WireGuard interface:
//! check whether a peer is configured, add a peer with its allowed-IPs,
//! remove a peer, and hand out the next free address of a subnet.
//!
//! # Architecture
//!
//! WolfPeer keeps no database. The live interface is the only source of
//! truth and is read again on every request through the
//! [`wireguard::WireGuardInterface`] trait. Check-then-act sequences are
//! serialized per interface by the [`directory::PeerDirectory`].
//!
//! # Features
//!
//! - Peer existence checks by exact public key match
//! - Peer add/remove with conflict detection
//! - Lowest-free-host address allocation (`.2` to `.254`)
//! - `wg` command backend with bounded command time
//! - In-memory backend for tests and dry runs

pub mod config;
pub mod error;
pub mod allocator;
pub mod wireguard;
pub mod directory;
pub mod api;

pub use config::WolfPeerConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfPeerConfig;
    pub use crate::error::{Error, Result};
    pub use crate::allocator::{find_available, Subnet};
    pub use crate::wireguard::{CommandInterface, MemoryInterface, WireGuardInterface};
    pub use crate::directory::{PeerDirectory, PeerEntry, RemoveOutcome};
    pub use crate::api::HttpServer;
}
