//! Client request router: verb dispatch for PUT/POST/DELETE/HEAD/PATCH/GET
//! (SPEC_FULL.md §4.5). Writes other than CAS are applied locally by the
//! leader and replicated lazily by the heartbeat driver; CAS delegates to
//! `replication.rs`. A non-leader forwards to the known leader and relays
//! whatever JSON comes back, mirroring `original_source/server.py`'s
//! `jsonify(response.json())` forwarding pattern — the inner 302 status is
//! not preserved across the hop, only its body (§9 open question 6, HEAD
//! included: no headers-wrapping quirk, it's forwarded like every other
//! verb).

use std::sync::Arc;

use serde_json::Value;

use crate::config::ServerId;
use crate::error::{RaftError, Result};
use crate::rpc::{
    DeleteDataRequest, GetDataResponse, HeadDataRequest, HeadDataResponse, OkResponse,
    PutDataRequest, UpdateDataRequest,
};
use crate::server::node::Node;
use crate::state::{LogEntry, Role};
use crate::transport::HttpMethod;

/// Result of routing a GET: a value served locally, a redirect to a fresher
/// peer, or the raw body a forward to the leader came back with.
pub enum GetOutcome {
    Value(GetDataResponse),
    Redirect(ServerId),
    Forwarded(Value),
}

impl Node {
    async fn forward_to_leader(&self, method: HttpMethod, path: &str, body: Value) -> Result<Value> {
        let leader_id = {
            let state = self.state.lock().await;
            state.leader_id
        }
        .ok_or(RaftError::NotLeader)?;
        self.transport
            .call(leader_id, method, path, body)
            .await
            .map_err(|_| RaftError::NotLeader)
    }

    async fn is_leader(&self) -> bool {
        self.state.lock().await.role == Role::Leader
    }

    /// PUT/POST /put_data (aliases, §6).
    pub async fn handle_put(self: &Arc<Self>, req: PutDataRequest) -> Result<Value> {
        self.fault.await_alive().await;
        if !self.is_leader().await {
            let body = to_value(&req)?;
            return self.forward_to_leader(HttpMethod::Put, "/put_data", body).await;
        }
        let mut state = self.state.lock().await;
        state.append_and_apply(LogEntry::Put {
            key: req.key,
            value: req.value,
        });
        to_value(&OkResponse::ok())
    }

    /// DELETE /delete_data.
    pub async fn handle_delete(self: &Arc<Self>, req: DeleteDataRequest) -> Result<Value> {
        self.fault.await_alive().await;
        if !self.is_leader().await {
            let body = to_value(&req)?;
            return self.forward_to_leader(HttpMethod::Delete, "/delete_data", body).await;
        }
        let mut state = self.state.lock().await;
        if !state.kv.contains_key(&req.key) {
            return Err(RaftError::KeyNotFound);
        }
        state.append_and_apply(LogEntry::Delete { key: req.key });
        to_value(&OkResponse::ok())
    }

    /// HEAD /head_data.
    pub async fn handle_head(self: &Arc<Self>, req: HeadDataRequest) -> Result<Value> {
        self.fault.await_alive().await;
        if !self.is_leader().await {
            let body = to_value(&req)?;
            return self.forward_to_leader(HttpMethod::Head, "/head_data", body).await;
        }
        let state = self.state.lock().await;
        let status = if state.kv.contains_key(&req.key) {
            "exists"
        } else {
            "not found"
        };
        to_value(&HeadDataResponse {
            status: status.to_string(),
        })
    }

    /// PATCH /update_data: compare-and-swap, delegated to `replication.rs`.
    pub async fn handle_update(self: &Arc<Self>, req: UpdateDataRequest) -> Result<Value> {
        self.fault.await_alive().await;
        if !self.is_leader().await {
            let body = to_value(&req)?;
            return self.forward_to_leader(HttpMethod::Patch, "/update_data", body).await;
        }
        let ok = self.propose_cas(req).await?;
        to_value(&ok)
    }

    /// GET /get_data: freshness-routed read (§4.5).
    pub async fn handle_get(self: &Arc<Self>, key: &str) -> Result<GetOutcome> {
        self.fault.await_alive().await;
        if !self.is_leader().await {
            let body = serde_json::json!({ "key": key });
            let forwarded = self.forward_to_leader(HttpMethod::Get, "/get_data", body).await?;
            return Ok(GetOutcome::Forwarded(forwarded));
        }

        let state = self.state.lock().await;
        let key_ver = state.key_version(key);
        for (&peer, &len) in state.peer_log_len.iter() {
            if (len as i64) > key_ver {
                return Ok(GetOutcome::Redirect(peer));
            }
        }
        Ok(GetOutcome::Value(GetDataResponse {
            key: key.to_string(),
            value: state.kv.get(key).cloned(),
        }))
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| RaftError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cli, Config};
    use crate::transport::in_memory::InMemoryTransport;
    use std::sync::Arc as StdArc;

    fn test_config(server_id: ServerId) -> Config {
        Config::from_cli(Cli {
            server_id: Some(server_id),
            config: None,
        })
        .unwrap()
    }

    async fn make_leader(server_id: ServerId) -> Arc<Node> {
        let transport = StdArc::new(InMemoryTransport::new());
        let node = Node::new(test_config(server_id), transport);
        let mut state = node.state.lock().await;
        state.role = Role::Leader;
        state.leader_id = Some(server_id);
        drop(state);
        node
    }

    #[tokio::test]
    async fn put_on_leader_applies_locally() {
        let node = make_leader(1).await;
        let resp = node
            .handle_put(PutDataRequest {
                key: "foo".into(),
                value: "bar".into(),
            })
            .await
            .unwrap();
        assert_eq!(resp["status"], "ok");
        assert_eq!(node.state.lock().await.kv.get("foo"), Some(&"bar".to_string()));
    }

    #[tokio::test]
    async fn delete_missing_key_errors() {
        let node = make_leader(1).await;
        let err = node
            .handle_delete(DeleteDataRequest { key: "missing".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, RaftError::KeyNotFound));
    }

    #[tokio::test]
    async fn get_redirects_when_a_peer_is_fresher() {
        let node = make_leader(1).await;
        {
            let mut state = node.state.lock().await;
            state.append_and_apply(LogEntry::Put {
                key: "foo".into(),
                value: "bar".into(),
            });
            state.peer_log_len.insert(2, 5);
        }
        match node.handle_get("foo").await.unwrap() {
            GetOutcome::Redirect(peer) => assert_eq!(peer, 2),
            _ => panic!("expected redirect"),
        }
    }

    #[tokio::test]
    async fn get_serves_locally_when_no_peer_is_fresher() {
        let node = make_leader(1).await;
        {
            let mut state = node.state.lock().await;
            state.append_and_apply(LogEntry::Put {
                key: "foo".into(),
                value: "bar".into(),
            });
            state.peer_log_len.insert(2, 0);
        }
        match node.handle_get("foo").await.unwrap() {
            GetOutcome::Value(resp) => assert_eq!(resp.value, Some("bar".to_string())),
            _ => panic!("expected value"),
        }
    }

    #[tokio::test]
    async fn non_leader_without_known_leader_errors_not_leader() {
        let transport = StdArc::new(InMemoryTransport::new());
        let node = Node::new(test_config(2), transport);
        let err = node
            .handle_put(PutDataRequest {
                key: "foo".into(),
                value: "bar".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RaftError::NotLeader));
    }
}
