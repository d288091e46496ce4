//! Heartbeat driver, log reconciliation, and the follower-side heartbeat
//! handler (SPEC_FULL.md §4.3).
//!
//! Grounded on the teacher's `send_append_entries`/`AppendEntriesHandler`
//! pair, with the reconciliation slice (`log[max(cur_len,1)-1 ..]`) and the
//! "apply immediately on the follower" behavior taken from
//! `original_source/server.py`'s `send_heartbeat`/`heartbeat`.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use crate::config::ServerId;
use crate::rpc::{HeartbeatRequest, HeartbeatResponse};
use crate::server::node::Node;
use crate::state::Role;
use crate::transport::HttpMethod;

impl Node {
    /// Runs forever: every `heartbeat_interval`, if this node is the
    /// leader, pings every other peer and reconciles any follower whose
    /// log has fallen behind.
    pub async fn run_heartbeat_driver(self: Arc<Self>) {
        loop {
            self.fault.await_alive().await;

            let leader_snapshot = {
                let state = self.state.lock().await;
                if state.role == Role::Leader {
                    Some((state.term, state.log.clone()))
                } else {
                    None
                }
            };

            if let Some((term, log)) = leader_snapshot {
                let leader_id = self.server_id();
                let calls = self.other_peer_ids().into_iter().map(|peer| {
                    let node = Arc::clone(&self);
                    let log = log.clone();
                    async move { (peer, node.ping_peer(peer, leader_id, term, &log).await) }
                });
                let results = join_all(calls).await;

                let mut state = self.state.lock().await;
                for (peer, new_len) in results {
                    if let Some(len) = new_len {
                        state.peer_log_len.insert(peer, len);
                    }
                }
                state.last_heartbeat_ts = Instant::now();
            }

            tokio::time::sleep(self.config.heartbeat_interval).await;
        }
    }

    /// Sends one heartbeat to `peer` and, if it reports a shorter log than
    /// `log`, follows up with a reconciling `change_log` heartbeat.
    /// Returns the peer's resulting log length, or `None` if the peer could
    /// not be reached or rejected the heartbeat (swallowed as best-effort
    /// per §7).
    async fn ping_peer(
        &self,
        peer: ServerId,
        leader_id: ServerId,
        term: u64,
        log: &[crate::state::LogEntry],
    ) -> Option<usize> {
        let first = HeartbeatRequest {
            leader_id,
            term,
            change_log: None,
        };
        let body = match serde_json::to_value(&first) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("failed to serialize heartbeat for peer {peer}: {e}");
                return None;
            }
        };
        let reply = match self
            .transport
            .call(peer, HttpMethod::Post, "/heartbeat", body)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("heartbeat to peer {peer} failed: {e}");
                return None;
            }
        };
        let reply: HeartbeatResponse = match serde_json::from_value(reply) {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("malformed heartbeat reply from peer {peer}: {e}");
                return None;
            }
        };
        if reply.status != "ok" {
            log::warn!("heartbeat to peer {peer} rejected: {}", reply.status);
            return None;
        }

        let mut cur_len = reply.cur_len;
        if cur_len < log.len() {
            let start = cur_len.max(1) - 1;
            let change_log = log[start..].to_vec();
            let second = HeartbeatRequest {
                leader_id,
                term,
                change_log: Some(change_log),
            };
            match serde_json::to_value(&second) {
                Ok(body) => match self
                    .transport
                    .call(peer, HttpMethod::Post, "/heartbeat", body)
                    .await
                {
                    Ok(reply) => match serde_json::from_value::<HeartbeatResponse>(reply) {
                        Ok(reply) if reply.status == "ok" => cur_len = reply.cur_len,
                        Ok(reply) => log::warn!(
                            "reconciling heartbeat to peer {peer} rejected: {}",
                            reply.status
                        ),
                        Err(e) => {
                            log::warn!("malformed reconciling heartbeat reply from peer {peer}: {e}")
                        }
                    },
                    Err(e) => log::warn!("reconciling heartbeat to peer {peer} failed: {e}"),
                },
                Err(e) => {
                    log::warn!("failed to serialize reconciling heartbeat for peer {peer}: {e}")
                }
            }
        }
        Some(cur_len)
    }

    /// Heartbeat RPC receiver. Applies any piggybacked `change_log` entries
    /// immediately (no commit phase on this path — see DESIGN.md open
    /// question 1).
    pub async fn handle_heartbeat(&self, req: HeartbeatRequest) -> HeartbeatResponse {
        self.fault.await_alive().await;

        let mut state = self.state.lock().await;
        if state.term > req.term {
            return HeartbeatResponse {
                status: "bad".to_string(),
                cur_len: 0,
            };
        }

        state.role = Role::Follower;
        state.term = req.term;
        state.leader_id = Some(req.leader_id);
        state.last_heartbeat_ts = Instant::now();

        if let Some(change_log) = req.change_log {
            state.append_entries_from_leader(change_log);
        }

        HeartbeatResponse {
            status: "ok".to_string(),
            cur_len: state.log.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use crate::config::Config;
    use crate::state::LogEntry;
    use crate::transport::in_memory::InMemoryTransport;
    use std::sync::Arc as StdArc;

    fn test_config(server_id: ServerId) -> Config {
        Config::from_cli(Cli {
            server_id: Some(server_id),
            config: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn follower_rejects_stale_term() {
        let transport = StdArc::new(InMemoryTransport::new());
        let node = Node::new(test_config(2), transport);
        {
            let mut state = node.state.lock().await;
            state.term = 5;
        }
        let resp = node
            .handle_heartbeat(HeartbeatRequest {
                leader_id: 1,
                term: 3,
                change_log: None,
            })
            .await;
        assert_eq!(resp.status, "bad");
    }

    #[tokio::test]
    async fn follower_applies_change_log_immediately() {
        let transport = StdArc::new(InMemoryTransport::new());
        let node = Node::new(test_config(2), transport);
        let resp = node
            .handle_heartbeat(HeartbeatRequest {
                leader_id: 1,
                term: 1,
                change_log: Some(vec![LogEntry::Put {
                    key: "foo".into(),
                    value: "bar".into(),
                }]),
            })
            .await;
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.cur_len, 1);
        let state = node.state.lock().await;
        assert_eq!(state.kv.get("foo"), Some(&"bar".to_string()));
        assert_eq!(state.role, Role::Follower);
        assert_eq!(state.leader_id, Some(1));
    }
}
