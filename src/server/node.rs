//! `Node`: the per-replica bundle of config, the single coarse lock over
//! [`NodeState`], the fault gate, and the transport used for every outbound
//! call. This is the generalization of the teacher's `Server` struct
//! (`server/mod.rs` in the original `jteplitz602-Rusty-Raft` sources): same
//! role (owns state + peers + bootstraps the background activities), new
//! transport (HTTP/JSON over `Transport` instead of capnp-over-`mio`).

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{Config, ServerId};
use crate::fault::FaultGate;
use crate::state::{NodeState, Role};
use crate::transport::Transport;

pub struct Node {
    pub(crate) config: Config,
    pub(crate) state: Mutex<NodeState>,
    pub(crate) fault: FaultGate,
    pub(crate) transport: Arc<dyn Transport>,
}

impl Node {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Arc<Node> {
        let fault = FaultGate::new(config.fault_poll_interval);
        let state = Mutex::new(NodeState::new(config.server_id));
        Arc::new(Node {
            config,
            state,
            fault,
            transport,
        })
    }

    pub fn server_id(&self) -> ServerId {
        self.config.server_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fault_gate(&self) -> &FaultGate {
        &self.fault
    }

    /// Every peer id known to the cluster, including this node's own (the
    /// election driver deliberately addresses itself too, see DESIGN.md
    /// open question 6).
    pub(crate) fn peer_ids(&self) -> Vec<ServerId> {
        self.config.peers.keys().copied().collect()
    }

    /// Peer ids excluding this node — used by the heartbeat/replication
    /// drivers, which only ever need to contact *other* replicas.
    pub(crate) fn other_peer_ids(&self) -> Vec<ServerId> {
        self.config
            .peers
            .keys()
            .copied()
            .filter(|id| *id != self.server_id())
            .collect()
    }

    pub(crate) fn majority(&self) -> usize {
        self.config.peers.len() / 2
    }

    /// This node's current role, for diagnostics and the integration test
    /// harness (which has no other way to observe it from outside the
    /// crate).
    pub async fn role(&self) -> Role {
        self.state.lock().await.role
    }
}

/// Spawns the election and heartbeat driver tasks for `node`. Returns their
/// `JoinHandle`s so `main` can hold onto them (and tests can drop/abort
/// them between scenarios).
pub fn spawn_drivers(node: Arc<Node>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let election_node = Arc::clone(&node);
    let election_handle = tokio::spawn(async move {
        election_node.run_election_driver().await;
    });
    let heartbeat_node = Arc::clone(&node);
    let heartbeat_handle = tokio::spawn(async move {
        heartbeat_node.run_heartbeat_driver().await;
    });
    (election_handle, heartbeat_handle)
}
