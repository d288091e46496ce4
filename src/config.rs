//! Cluster configuration: node identity, peer membership, and the handful of
//! timing constants the consensus mechanics are tuned against.
//!
//! Layering follows the teacher's executables: a `clap` CLI overrides a TOML
//! file, which overrides the `SERVER_ID` environment variable, which
//! overrides the hardcoded five-node default the original source shipped.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::{RaftError, Result};

pub type ServerId = u64;

/// Minimum election timeout, in seconds. Each node's actual timeout is
/// `ELECTION_TIMEOUT_MIN + server_id * 3`.
pub const ELECTION_TIMEOUT_MIN_SECS: u64 = 4;
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
pub const RPC_TIMEOUT: Duration = Duration::from_secs(1);
pub const FAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const ELECTION_TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(
    name = "kvraft-server",
    about = "Replicated key-value store node with Raft-inspired leader election"
)]
pub struct Cli {
    /// This node's server id. Falls back to the SERVER_ID environment
    /// variable, then to 1.
    #[arg(long)]
    pub server_id: Option<ServerId>,

    /// Optional TOML file providing a `[peers]` table of `server_id = "url"`
    /// entries. Without one, the built-in five-node localhost map is used.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ClusterFile {
    peers: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_id: ServerId,
    /// Base URL for every server in the cluster, including this node's own
    /// entry (the election driver addresses itself through this map too,
    /// see DESIGN.md open question 6).
    pub peers: HashMap<ServerId, String>,
    pub bind_addr: SocketAddr,
    pub election_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub rpc_timeout: Duration,
    pub fault_poll_interval: Duration,
    pub election_tick_interval: Duration,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Config> {
        let server_id = cli
            .server_id
            .or_else(|| {
                std::env::var("SERVER_ID")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or(1);

        let peers = match cli.config {
            Some(path) => load_peers_file(&path)?,
            None => default_peers(),
        };

        if !peers.contains_key(&server_id) {
            return Err(RaftError::Config(format!(
                "server id {server_id} is not present in the cluster membership map"
            )));
        }

        let port = 5000 + server_id;
        let bind_addr: SocketAddr = format!("0.0.0.0:{port}")
            .parse()
            .map_err(|e| RaftError::Config(format!("invalid bind address: {e}")))?;

        Ok(Config {
            server_id,
            peers,
            bind_addr,
            election_timeout: Duration::from_secs(ELECTION_TIMEOUT_MIN_SECS + server_id * 3),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            rpc_timeout: RPC_TIMEOUT,
            fault_poll_interval: FAULT_POLL_INTERVAL,
            election_tick_interval: ELECTION_TICK_INTERVAL,
        })
    }
}

fn load_peers_file(path: &PathBuf) -> Result<HashMap<ServerId, String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| RaftError::Config(format!("reading {}: {e}", path.display())))?;
    let parsed: ClusterFile = toml::from_str(&text)
        .map_err(|e| RaftError::Config(format!("parsing {}: {e}", path.display())))?;
    parsed
        .peers
        .into_iter()
        .map(|(id, url)| {
            id.parse::<ServerId>()
                .map(|id| (id, url))
                .map_err(|e| RaftError::Config(format!("invalid peer id {id:?}: {e}")))
        })
        .collect()
}

/// The five-node localhost cluster the original source hardcoded, ported
/// from Docker service names (`raft-server-N`) to local ports so the crate
/// runs out of the box without compose/DNS.
fn default_peers() -> HashMap<ServerId, String> {
    (1..=5)
        .map(|id| (id, format!("http://127.0.0.1:{}", 5000 + id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_peers_has_five_entries_with_matching_ports() {
        let peers = default_peers();
        assert_eq!(peers.len(), 5);
        assert_eq!(peers[&3], "http://127.0.0.1:5003");
    }

    #[test]
    fn from_cli_rejects_unknown_server_id() {
        let cli = Cli {
            server_id: Some(42),
            config: None,
        };
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn from_cli_derives_election_timeout_from_server_id() {
        let cli = Cli {
            server_id: Some(2),
            config: None,
        };
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(
            config.election_timeout,
            Duration::from_secs(ELECTION_TIMEOUT_MIN_SECS + 2 * 3)
        );
        assert_eq!(config.bind_addr.port(), 5002);
    }
}
