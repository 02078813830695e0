//! Address Allocator
//!
//! Picks the lowest free host address in a subnet, given the allowed-IPs
//! currently bound on the interface. Only the fourth octet varies; `.0`,
//! `.1` and `.255` are never handed out whatever the prefix length is.

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::Error;

/// Lowest host number eligible for allocation
pub const FIRST_HOST: u8 = 2;

/// Highest host number eligible for allocation
pub const LAST_HOST: u8 = 254;

/// Subnet that allocations are drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    base: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    /// Create a subnet from a base address and prefix length
    pub fn new(base: Ipv4Addr, prefix_len: u8) -> crate::Result<Self> {
        if prefix_len > 32 {
            return Err(Error::InvalidSubnet {
                subnet: format!("{}/{}", base, prefix_len),
                reason: "prefix length must be between 0 and 32".into(),
            });
        }
        Ok(Self { base, prefix_len })
    }

    pub fn base(&self) -> Ipv4Addr {
        self.base
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// CIDR string for a host number, carrying this subnet's prefix length
    pub fn candidate(&self, host: u8) -> String {
        let [a, b, c, _] = self.base.octets();
        format!("{}/{}", Ipv4Addr::new(a, b, c, host), self.prefix_len)
    }
}

impl FromStr for Subnet {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let invalid = |reason: &str| Error::InvalidSubnet {
            subnet: s.to_string(),
            reason: reason.to_string(),
        };

        let (base, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("expected a.b.c.d/n"))?;
        let base: Ipv4Addr = base.parse().map_err(|_| invalid("base is not an IPv4 address"))?;
        let prefix_len: u8 = prefix.parse().map_err(|_| invalid("prefix length is not a number"))?;

        Subnet::new(base, prefix_len).map_err(|_| invalid("prefix length must be between 0 and 32"))
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix_len)
    }
}

/// Find the lowest free address in `subnet`.
///
/// Membership is an exact string match on the `a.b.c.d/n` form, so the
/// used set must be formatted the way `wg show allowed-ips` prints it.
/// Returns `None` when every host from `.2` to `.254` is taken.
pub fn find_available<S: AsRef<str>>(subnet: &Subnet, used: &[S]) -> Option<String> {
    let used: HashSet<&str> = used.iter().map(|s| s.as_ref()).collect();

    (FIRST_HOST..=LAST_HOST)
        .map(|host| subnet.candidate(host))
        .find(|candidate| !used.contains(candidate.as_str()))
}
