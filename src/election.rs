//! Election driver and vote RPC handling (SPEC_FULL.md §4.2).
//!
//! Grounded on the teacher's `start_election`/`RequestVoteHandler` pair in
//! `server/mod.rs`, generalized from a blocking `mpsc`-driven candidate loop
//! to a `tokio::spawn`ed task that fans vote requests out over `Transport`
//! without holding the node lock across the network round trip.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use crate::rpc::VoteRequest;
use crate::server::node::Node;
use crate::state::Role;
use crate::transport::HttpMethod;

impl Node {
    /// Runs forever: once per `election_tick_interval`, checks whether this
    /// node has gone too long without hearing from a leader and, if so,
    /// starts an election.
    pub async fn run_election_driver(self: Arc<Self>) {
        loop {
            self.fault.await_alive().await;

            let should_start = {
                let state = self.state.lock().await;
                state.role != Role::Leader
                    && state.last_heartbeat_ts.elapsed() > self.config.election_timeout
            };

            if should_start {
                log::info!("server {} starts election", self.server_id());
                self.start_election().await;
            }

            log::debug!("election tick: server {}", self.server_id());
            tokio::time::sleep(self.config.election_tick_interval).await;
        }
    }

    /// Bumps the term, requests votes from every peer (including self, per
    /// DESIGN.md open question 6), and becomes leader on majority. Note
    /// that — matching the original source precisely — this node's own
    /// `role` is never set to `Candidate` while campaigning: the vote
    /// receiver's grant rule checks for `Role::Follower` specifically (see
    /// `handle_vote` below and DESIGN.md open question 7), so staying a
    /// Follower throughout is what lets concurrent candidacies interleave
    /// the way the source does.
    async fn start_election(self: &Arc<Self>) {
        let term = {
            let mut state = self.state.lock().await;
            state.term += 1;
            state.term
        };

        let candidate_id = self.server_id();
        let calls = self.peer_ids().into_iter().map(|peer| {
            let node = Arc::clone(self);
            async move {
                let req = VoteRequest { candidate_id, term };
                let body = serde_json::to_value(&req).unwrap();
                let result = node
                    .transport
                    .call(peer, HttpMethod::Post, "/vote", body)
                    .await;
                (peer, result)
            }
        });
        let results = join_all(calls).await;

        let votes = results
            .into_iter()
            .filter(|(peer, result)| match result {
                Ok(v) => v
                    .get("vote_granted")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                Err(e) => {
                    log::warn!("vote request to peer {peer} failed: {e}");
                    false
                }
            })
            .count();

        if votes > self.majority() {
            let mut state = self.state.lock().await;
            // A concurrent heartbeat/vote may have moved the term on while
            // the fan-out above was in flight; only claim leadership if
            // we're still campaigning on the term we won.
            if state.term == term {
                state.role = Role::Leader;
                state.leader_id = Some(candidate_id);
                state.last_heartbeat_ts = Instant::now();
                log::info!("server {candidate_id} is elected as leader in term {term}!");
            }
        }
    }

    /// Vote RPC receiver. Deliberately omits the log-up-to-date comparison
    /// real Raft requires (§9 open question 2).
    pub async fn handle_vote(&self, req: VoteRequest) -> crate::rpc::VoteResponse {
        self.fault.await_alive().await;

        let mut state = self.state.lock().await;
        if req.term > state.term {
            state.term = req.term;
        }

        if req.candidate_id == self.server_id() {
            log::info!(
                "server {} votes for candidate {}",
                self.server_id(),
                req.candidate_id
            );
            return crate::rpc::VoteResponse { vote_granted: true };
        }

        if state.role == Role::Follower {
            if state.voted_for_by_term.contains_key(&req.term) {
                return crate::rpc::VoteResponse {
                    vote_granted: false,
                };
            }
            state.last_heartbeat_ts = Instant::now();
            state.voted_for_by_term.insert(req.term, req.candidate_id);
            log::info!(
                "server {} votes for candidate {}",
                self.server_id(),
                req.candidate_id
            );
            return crate::rpc::VoteResponse { vote_granted: true };
        }

        crate::rpc::VoteResponse {
            vote_granted: false,
        }
    }
}
