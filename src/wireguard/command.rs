//! Command-line WireGuard interface
//!
//! Runs the `wg` tool against a single interface. Arguments are passed as
//! a vector, never through a shell.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{parse_allowed_ips, parse_peers, WireGuardInterface};
use crate::config::InterfaceConfig;
use crate::error::{Error, Result};

/// Whether a command reads or mutates the interface
#[derive(Debug, Clone, Copy)]
enum CommandKind {
    Query,
    Mutation,
}

/// WireGuard interface backed by the `wg` binary
pub struct CommandInterface {
    /// Interface name (e.g. `wg0`)
    name: String,
    /// Path to the wg command
    wg_path: String,
    /// Upper bound on a single command
    timeout: Duration,
}

impl CommandInterface {
    /// Create a command interface with the default `wg` path
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wg_path: "wg".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Create from the interface section of the configuration
    pub fn from_config(config: &InterfaceConfig) -> Self {
        Self {
            name: config.name.clone(),
            wg_path: config.wg_path.clone(),
            timeout: config.command_timeout(),
        }
    }

    /// Run `wg` with `args` and return stdout
    async fn exec(&self, kind: CommandKind, args: &[&str]) -> Result<String> {
        tracing::trace!(cmd = %self.wg_path, args = ?args, "Executing command");

        let fail = |diagnostic: String| match kind {
            CommandKind::Query => Error::InterfaceQueryFailed {
                interface: self.name.clone(),
                diagnostic,
            },
            CommandKind::Mutation => Error::InterfaceMutationFailed {
                interface: self.name.clone(),
                diagnostic,
            },
        };

        let mut command = Command::new(&self.wg_path);
        command.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                tracing::error!("{} {} timed out", self.wg_path, args.join(" "));
                Error::InterfaceTimeout {
                    interface: self.name.clone(),
                    secs: self.timeout.as_secs(),
                    mutation: matches!(kind, CommandKind::Mutation),
                }
            })?
            .map_err(|e| {
                tracing::error!("Failed to execute {}: {}", self.wg_path, e);
                fail(format!("Failed to execute {}: {}", self.wg_path, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!("{} {} failed: {}", self.wg_path, args.join(" "), stderr);
            let diagnostic = if stderr.is_empty() {
                format!("{} exited with {}", self.wg_path, output.status)
            } else {
                stderr
            };
            return Err(fail(diagnostic));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl WireGuardInterface for CommandInterface {
    fn interface_name(&self) -> &str {
        &self.name
    }

    async fn list_peers(&self) -> Result<Vec<String>> {
        let output = self.exec(CommandKind::Query, &["show", &self.name, "peers"]).await?;
        Ok(parse_peers(&output))
    }

    async fn peer_table(&self) -> Result<Vec<(String, Vec<String>)>> {
        let output = self
            .exec(CommandKind::Query, &["show", &self.name, "allowed-ips"])
            .await?;
        Ok(parse_allowed_ips(&output))
    }

    async fn set_peer(&self, public_key: &str, allowed_ips: &str) -> Result<()> {
        self.exec(
            CommandKind::Mutation,
            &["set", &self.name, "peer", public_key, "allowed-ips", allowed_ips],
        )
        .await?;
        tracing::info!("Peer added: {} ({})", public_key, allowed_ips);
        Ok(())
    }

    async fn remove_peer(&self, public_key: &str) -> Result<()> {
        self.exec(CommandKind::Mutation, &["set", &self.name, "peer", public_key, "remove"])
            .await?;
        tracing::info!("Peer removed: {}", public_key);
        Ok(())
    }
}
