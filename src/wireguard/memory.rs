//! In-memory WireGuard interface
//!
//! Behaves like `wg` on a single interface without touching the kernel.
//! Used by tests and by `wolfpeer start --dry-run`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::WireGuardInterface;
use crate::error::{Error, Result};

/// In-memory peer table
pub struct MemoryInterface {
    name: String,
    /// Peer key -> allowed-IPs, as `wg set` would record them
    peers: RwLock<BTreeMap<String, Vec<String>>>,
    /// Diagnostic returned by every query when set
    query_failure: RwLock<Option<String>>,
    /// Diagnostic returned by every mutation when set
    mutation_failure: RwLock<Option<String>>,
    /// Number of set/remove calls issued, including failed ones
    mutations: AtomicUsize,
}

impl MemoryInterface {
    /// Create an empty interface
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            peers: RwLock::new(BTreeMap::new()),
            query_failure: RwLock::new(None),
            mutation_failure: RwLock::new(None),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Create an interface pre-populated with `(key, allowed_ips)` pairs
    pub fn with_peers<I, K, V>(name: impl Into<String>, peers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let table = peers
            .into_iter()
            .map(|(k, v)| (k.into(), split_allowed_ips(v.as_ref())))
            .collect();
        Self {
            peers: RwLock::new(table),
            ..Self::new(name)
        }
    }

    /// Make every query fail with `diagnostic` (or succeed again with `None`)
    pub async fn fail_queries(&self, diagnostic: Option<&str>) {
        *self.query_failure.write().await = diagnostic.map(String::from);
    }

    /// Make every mutation fail with `diagnostic` (or succeed again with `None`)
    pub async fn fail_mutations(&self, diagnostic: Option<&str>) {
        *self.mutation_failure.write().await = diagnostic.map(String::from);
    }

    /// Number of mutating calls issued so far
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    async fn check_query(&self) -> Result<()> {
        match self.query_failure.read().await.as_ref() {
            Some(diagnostic) => Err(Error::InterfaceQueryFailed {
                interface: self.name.clone(),
                diagnostic: diagnostic.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn check_mutation(&self) -> Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        match self.mutation_failure.read().await.as_ref() {
            Some(diagnostic) => Err(Error::InterfaceMutationFailed {
                interface: self.name.clone(),
                diagnostic: diagnostic.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// `wg set ... allowed-ips` takes a comma separated list
fn split_allowed_ips(allowed_ips: &str) -> Vec<String> {
    allowed_ips
        .split(',')
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
        .collect()
}

#[async_trait]
impl WireGuardInterface for MemoryInterface {
    fn interface_name(&self) -> &str {
        &self.name
    }

    async fn list_peers(&self) -> Result<Vec<String>> {
        self.check_query().await?;
        Ok(self.peers.read().await.keys().cloned().collect())
    }

    async fn peer_table(&self) -> Result<Vec<(String, Vec<String>)>> {
        self.check_query().await?;
        Ok(self
            .peers
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn set_peer(&self, public_key: &str, allowed_ips: &str) -> Result<()> {
        self.check_mutation().await?;
        // Re-adding an existing peer replaces its allowed-IPs, as wg does
        self.peers
            .write()
            .await
            .insert(public_key.to_string(), split_allowed_ips(allowed_ips));
        tracing::debug!("[{}] set peer {} ({})", self.name, public_key, allowed_ips);
        Ok(())
    }

    async fn remove_peer(&self, public_key: &str) -> Result<()> {
        self.check_mutation().await?;
        self.peers.write().await.remove(public_key);
        tracing::debug!("[{}] removed peer {}", self.name, public_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_remove() {
        let iface = MemoryInterface::new("wg0");
        iface.set_peer("abc123=", "10.200.200.2/32").await.unwrap();
        iface.set_peer("def456=", "10.200.200.3/32, 10.9.0.0/16").await.unwrap();

        assert_eq!(iface.list_peers().await.unwrap(), vec!["abc123=", "def456="]);
        assert_eq!(
            iface.list_allowed_ips().await.unwrap(),
            vec!["10.200.200.2/32", "10.200.200.3/32", "10.9.0.0/16"]
        );

        iface.remove_peer("abc123=").await.unwrap();
        assert_eq!(iface.list_peers().await.unwrap(), vec!["def456="]);
        assert_eq!(iface.mutation_count(), 3);
    }

    #[tokio::test]
    async fn test_set_overwrites_allowed_ips() {
        let iface = MemoryInterface::with_peers("wg0", [("abc123=", "10.200.200.2/32")]);
        iface.set_peer("abc123=", "10.200.200.7/32").await.unwrap();
        assert_eq!(iface.list_allowed_ips().await.unwrap(), vec!["10.200.200.7/32"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let iface = MemoryInterface::with_peers("wg0", [("abc123=", "10.200.200.2/32")]);

        iface.fail_queries(Some("No such device")).await;
        assert!(matches!(
            iface.list_peers().await,
            Err(Error::InterfaceQueryFailed { .. })
        ));
        iface.fail_queries(None).await;
        assert!(iface.list_peers().await.is_ok());

        iface.fail_mutations(Some("Operation not permitted")).await;
        let err = iface.remove_peer("abc123=").await.unwrap_err();
        assert_eq!(err.diagnostic(), Some("Operation not permitted"));
        // Failed mutation leaves the table untouched
        assert_eq!(iface.list_peers().await.unwrap(), vec!["abc123="]);
    }
}
