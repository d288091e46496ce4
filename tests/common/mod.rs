//! Shared scaffolding for the scenario tests in `tests/scenarios.rs`: wires
//! a five-node cluster together over a single `InMemoryTransport`, matching
//! the harness described in SPEC_FULL.md §8.

use std::sync::Arc;

use kvraft::config::{Cli, Config, ServerId};
use kvraft::router::GetOutcome;
use kvraft::server::node::{spawn_drivers, Node};
use kvraft::transport::in_memory::InMemoryTransport;

pub struct Cluster {
    pub nodes: Vec<Arc<Node>>,
    _drivers: Vec<(tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>)>,
}

impl Cluster {
    pub fn node(&self, id: ServerId) -> &Arc<Node> {
        self.nodes
            .iter()
            .find(|n| n.server_id() == id)
            .unwrap_or_else(|| panic!("no node with id {id} in cluster"))
    }

    /// Returns the node currently believing itself to be leader, panicking
    /// if none or more than one does (there should be exactly one after the
    /// boot settling period).
    pub async fn leader(&self) -> &Arc<Node> {
        let mut found = None;
        for node in &self.nodes {
            if node.role().await == kvraft::state::Role::Leader {
                assert!(found.is_none(), "more than one node believes it is leader");
                found = Some(node);
            }
        }
        found.expect("no leader elected")
    }

    /// Reads `key` from `from`, following at most one redirect — mirroring
    /// the single-hop client contract in SPEC_FULL.md §6.
    pub async fn get(&self, from: ServerId, key: &str) -> Option<String> {
        match self.node(from).handle_get(key).await.unwrap() {
            GetOutcome::Value(resp) => resp.value,
            GetOutcome::Forwarded(body) => body.get("value").and_then(value_as_opt_string),
            GetOutcome::Redirect(peer) => match self.node(peer).handle_get(key).await.unwrap() {
                GetOutcome::Value(resp) => resp.value,
                GetOutcome::Forwarded(body) => body.get("value").and_then(value_as_opt_string),
                GetOutcome::Redirect(_) => panic!("redirect chased a second hop"),
            },
        }
    }
}

fn value_as_opt_string(v: &serde_json::Value) -> Option<String> {
    v.as_str().map(|s| s.to_string())
}

pub fn build_cluster() -> Cluster {
    let transport = Arc::new(InMemoryTransport::new());
    let mut nodes = Vec::new();
    let mut drivers = Vec::new();

    for server_id in 1..=5 {
        let config = Config::from_cli(Cli {
            server_id: Some(server_id),
            config: None,
        })
        .unwrap();
        let node = Node::new(config, transport.clone());
        transport.register(&node);
        drivers.push(spawn_drivers(Arc::clone(&node)));
        nodes.push(node);
    }

    Cluster {
        nodes,
        _drivers: drivers,
    }
}
