//! Peer Directory
//!
//! Answers peer existence queries and mutates membership against the live
//! interface. Nothing is cached: every call reads the interface again,
//! since peers may be changed out-of-band between requests.
//!
//! The request-level operations (`add_peer`, `remove_peer`, allocation)
//! are check-then-act sequences. They hold a per-interface gate for their
//! whole duration so two requests cannot both observe the same state.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::allocator::{self, Subnet};
use crate::error::{Error, Result};
use crate::wireguard::WireGuardInterface;

/// Outcome of a remove request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The peer was configured and has been removed
    Removed,
    /// The peer was not configured; nothing was done
    NotFound,
}

/// A configured peer and its allowed-IPs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEntry {
    pub public_key: String,
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: Vec<String>,
}

/// Peer directory over a single interface
pub struct PeerDirectory {
    iface: Arc<dyn WireGuardInterface>,
    default_subnet: Subnet,
    /// Held across each check-then-act sequence
    gate: Mutex<()>,
}

impl PeerDirectory {
    /// Create a directory over `iface`, allocating from `default_subnet`
    pub fn new(iface: Arc<dyn WireGuardInterface>, default_subnet: Subnet) -> Self {
        Self {
            iface,
            default_subnet,
            gate: Mutex::new(()),
        }
    }

    pub fn interface_name(&self) -> &str {
        self.iface.interface_name()
    }

    pub fn default_subnet(&self) -> &Subnet {
        &self.default_subnet
    }

    /// Check whether `public_key` is configured, by exact string match
    pub async fn exists(&self, public_key: &str) -> Result<bool> {
        let peers = self.iface.list_peers().await?;
        let found = peers.iter().any(|p| p.trim() == public_key);
        tracing::debug!("Peer {} present on {}: {}", public_key, self.interface_name(), found);
        Ok(found)
    }

    /// Bind `allowed_ips` to `public_key`. Does not check for an existing peer.
    pub async fn add(&self, public_key: &str, allowed_ips: &str) -> Result<()> {
        self.iface.set_peer(public_key, allowed_ips).await
    }

    /// Remove `public_key`. Does not check that the peer exists.
    pub async fn remove(&self, public_key: &str) -> Result<()> {
        self.iface.remove_peer(public_key).await
    }

    /// Every allowed-IP currently bound on the interface
    pub async fn used_addresses(&self) -> Result<Vec<String>> {
        self.iface.list_allowed_ips().await
    }

    /// Existence check: `Err(PeerNotFound)` when the peer is absent
    pub async fn check_peer(&self, public_key: &str) -> Result<()> {
        if self.exists(public_key).await? {
            Ok(())
        } else {
            Err(Error::PeerNotFound(public_key.to_string()))
        }
    }

    /// Add a peer unless it already exists.
    ///
    /// Without `allowed_ips` the next free address of the default subnet is
    /// assigned. Returns the allowed-IPs that were bound.
    pub async fn add_peer(&self, public_key: &str, allowed_ips: Option<&str>) -> Result<String> {
        let _gate = self.gate.lock().await;

        if self.exists(public_key).await? {
            tracing::info!("Peer already exists: {}", public_key);
            return Err(Error::PeerAlreadyExists(public_key.to_string()));
        }

        let allowed_ips = match allowed_ips {
            Some(ips) => ips.to_string(),
            None => self.next_free(&self.default_subnet).await?,
        };

        self.add(public_key, &allowed_ips).await?;
        tracing::info!("Added peer {} with allowed-ips {}", public_key, allowed_ips);
        Ok(allowed_ips)
    }

    /// Remove a peer if it exists. A missing peer is not an error.
    pub async fn remove_peer(&self, public_key: &str) -> Result<RemoveOutcome> {
        let _gate = self.gate.lock().await;

        if !self.exists(public_key).await? {
            tracing::info!("Peer not found, nothing to remove: {}", public_key);
            return Ok(RemoveOutcome::NotFound);
        }

        self.remove(public_key).await?;
        tracing::info!("Removed peer {}", public_key);
        Ok(RemoveOutcome::Removed)
    }

    /// Next free address in the default subnet
    pub async fn allocate_address(&self) -> Result<String> {
        self.allocate_in(&self.default_subnet).await
    }

    /// Next free address in `subnet`
    pub async fn allocate_in(&self, subnet: &Subnet) -> Result<String> {
        let _gate = self.gate.lock().await;
        self.next_free(subnet).await
    }

    /// All configured peers with their allowed-IPs
    pub async fn list_peers(&self) -> Result<Vec<PeerEntry>> {
        Ok(self
            .iface
            .peer_table()
            .await?
            .into_iter()
            .map(|(public_key, allowed_ips)| PeerEntry { public_key, allowed_ips })
            .collect())
    }

    /// Caller must hold the gate
    async fn next_free(&self, subnet: &Subnet) -> Result<String> {
        let used = self.used_addresses().await?;
        tracing::debug!("Addresses in use on {}: {:?}", self.interface_name(), used);

        allocator::find_available(subnet, &used).ok_or_else(|| Error::NoAddressAvailable {
            subnet: subnet.to_string(),
        })
    }
}
