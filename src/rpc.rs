//! Wire types for every RPC the spec's HTTP surface (§6) defines: the
//! server-to-server vote/heartbeat/repl trio, and the client-facing
//! get/put/delete/head/update bodies. All are plain `serde` structs; the
//! `Transport` in `transport.rs` moves them as JSON regardless of whether
//! the peer is reached over HTTP or through the in-memory test double.

use serde::{Deserialize, Serialize};

use crate::config::ServerId;
use crate::state::LogEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub candidate_id: ServerId,
    pub term: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub leader_id: ServerId,
    pub term: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_log: Option<Vec<LogEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: String,
    #[serde(default)]
    pub cur_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplRequest {
    pub leader_id: ServerId,
    pub term: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_log: Option<Vec<LogEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub state: String,
    pub leader_id: Option<ServerId>,
    pub term: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub status: String,
}

impl OkResponse {
    pub fn ok() -> Self {
        OkResponse {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataQuery {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataResponse {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectResponse {
    pub id: ServerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutDataRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteDataRequest {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadDataRequest {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadDataResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDataRequest {
    pub key: String,
    pub value: String,
    pub old: String,
}
