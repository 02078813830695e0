//! WolfPeer Error Types

use thiserror::Error;

/// Result type alias for WolfPeer operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfPeer error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid subnet {subnet}: {reason}")]
    InvalidSubnet { subnet: String, reason: String },

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Interface errors
    #[error("Failed to query interface {interface}: {diagnostic}")]
    InterfaceQueryFailed { interface: String, diagnostic: String },

    #[error("Failed to update interface {interface}: {diagnostic}")]
    InterfaceMutationFailed { interface: String, diagnostic: String },

    #[error("Command on interface {interface} timed out after {secs}s")]
    InterfaceTimeout { interface: String, secs: u64, mutation: bool },

    // Allocation errors
    #[error("No available IP address found in the subnet {subnet}")]
    NoAddressAvailable { subnet: String },

    // State conflicts
    #[error("Peer already exists: {0}")]
    PeerAlreadyExists(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),
}

impl Error {
    /// Check if this error is a peer state conflict rather than a failure
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::PeerAlreadyExists(_) | Error::PeerNotFound(_))
    }

    /// Check if this error came from the external interface tool
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Error::InterfaceQueryFailed { .. }
                | Error::InterfaceMutationFailed { .. }
                | Error::InterfaceTimeout { .. }
        )
    }

    /// Check if this error came from a call that changes the interface
    pub fn is_mutation_failure(&self) -> bool {
        matches!(
            self,
            Error::InterfaceMutationFailed { .. } | Error::InterfaceTimeout { mutation: true, .. }
        )
    }

    /// Raw diagnostic text from the failed external call, if any
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Error::InterfaceQueryFailed { diagnostic, .. }
            | Error::InterfaceMutationFailed { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }
}
