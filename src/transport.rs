//! The `Transport` abstraction: every RPC this node issues, whether to a
//! peer (vote/heartbeat/repl) or forwarded on a client's behalf
//! (get/put/post/delete/head/update), is expressed as
//! `(peer_id, method, path, body) -> response_or_error`. §9's
//! re-architecture guidance calls this out explicitly so the test suite can
//! inject in-memory peers instead of real sockets; `HttpTransport` is the
//! real implementation, `InMemoryTransport` (used only under `cfg(test)`
//! in the integration tests) dispatches directly into sibling `Node`s.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ServerId;
use crate::error::{RaftError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Head,
    Patch,
}

impl HttpMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues one RPC to `peer` and returns its decoded JSON body. A
    /// non-2xx/non-302 status or a network failure (timeout included) is
    /// reported as `RaftError::Transport` — callers decide whether to
    /// swallow it (heartbeat/election best-effort fan-out) or surface it to
    /// the client (`NotLeader`).
    async fn call(&self, peer: ServerId, method: HttpMethod, path: &str, body: Value)
        -> Result<Value>;
}

/// Real HTTP/JSON transport backed by `reqwest`, bounded by the spec's 1s
/// RPC timeout (§5).
pub struct HttpTransport {
    client: reqwest::Client,
    peers: HashMap<ServerId, String>,
}

impl HttpTransport {
    pub fn new(peers: HashMap<ServerId, String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        HttpTransport { client, peers }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        peer: ServerId,
        method: HttpMethod,
        path: &str,
        body: Value,
    ) -> Result<Value> {
        let base = self
            .peers
            .get(&peer)
            .ok_or(RaftError::UnknownPeer(peer))?;
        let url = format!("{base}{path}");
        let response = self
            .client
            .request(method.as_reqwest(), &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RaftError::Transport(e.to_string()))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| RaftError::Transport(e.to_string()))
    }
}

pub mod in_memory {
    //! In-memory `Transport` used by the integration test suite to wire a
    //! small in-process cluster together without sockets (SPEC_FULL.md §8
    //! "Test harness"). Not gated behind `cfg(test)` so that integration
    //! tests under `tests/`, which compile as a separate crate, can use it
    //! too.

    use super::*;
    use crate::server::node::Node;
    use std::sync::{Arc, Mutex, Weak};

    /// Dispatches a `call` straight into the matching `Node`'s axum-free
    /// handler functions (`server::handlers::dispatch`), bypassing HTTP
    /// entirely. Registered nodes are held weakly so the transport doesn't
    /// keep a cluster alive after the test drops it.
    #[derive(Default, Clone)]
    pub struct InMemoryTransport {
        nodes: Arc<Mutex<HashMap<ServerId, Weak<Node>>>>,
    }

    impl InMemoryTransport {
        pub fn new() -> Self {
            InMemoryTransport::default()
        }

        pub fn register(&self, node: &Arc<Node>) {
            self.nodes
                .lock()
                .unwrap()
                .insert(node.server_id(), Arc::downgrade(node));
        }
    }

    #[async_trait]
    impl Transport for InMemoryTransport {
        async fn call(
            &self,
            peer: ServerId,
            method: HttpMethod,
            path: &str,
            body: Value,
        ) -> Result<Value> {
            let node = {
                let nodes = self.nodes.lock().unwrap();
                nodes.get(&peer).and_then(|n| n.upgrade())
            }
            .ok_or(RaftError::UnknownPeer(peer))?;
            if !node.fault_gate().is_alive() && path != "/turnon" && path != "/turnoff" {
                // Mirror a connection refused / timeout against a dead peer.
                return Err(RaftError::Transport(format!(
                    "peer {peer} is not accepting connections"
                )));
            }
            crate::server::handlers::dispatch(&node, method, path, body).await
        }
    }
}
