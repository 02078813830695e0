//! WireGuard Interface Module
//!
//! Narrow capability interface over the live VPN interface. The interface
//! is the only source of truth for peers and allowed-IPs, so every call
//! reads or mutates it directly.

mod command;
mod memory;

pub use command::CommandInterface;
pub use memory::MemoryInterface;

use async_trait::async_trait;

use crate::error::Result;

/// Operations the peer directory needs from the VPN interface
#[async_trait]
pub trait WireGuardInterface: Send + Sync {
    /// Name of the interface (e.g. `wg0`)
    fn interface_name(&self) -> &str;

    /// List the public keys of all configured peers
    async fn list_peers(&self) -> Result<Vec<String>>;

    /// List peers together with their allowed-IPs
    async fn peer_table(&self) -> Result<Vec<(String, Vec<String>)>>;

    /// List every allowed-IP CIDR bound to any peer
    async fn list_allowed_ips(&self) -> Result<Vec<String>> {
        Ok(self
            .peer_table()
            .await?
            .into_iter()
            .flat_map(|(_, cidrs)| cidrs)
            .collect())
    }

    /// Bind `allowed_ips` to `public_key`, creating the peer if needed
    async fn set_peer(&self, public_key: &str, allowed_ips: &str) -> Result<()>;

    /// Remove `public_key` and its allowed-IPs from the interface
    async fn remove_peer(&self, public_key: &str) -> Result<()>;
}

/// Parse `wg show <if> peers` output
pub fn parse_peers(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `wg show <if> allowed-ips` output into `(key, cidrs)` rows.
///
/// Each line is `<key>\t<cidr> <cidr>...`; peers without allowed-IPs
/// print `(none)`, which is dropped along with anything else lacking a `/`.
pub fn parse_allowed_ips(output: &str) -> Vec<(String, Vec<String>)> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let key = fields.next()?;
            let cidrs = fields.filter(|f| f.contains('/')).map(String::from).collect();
            Some((key.to_string(), cidrs))
        })
        .collect()
}
