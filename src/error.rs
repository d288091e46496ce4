//! Error taxonomy for the replicated store.
//!
//! Every fallible operation in the core returns [`Result<T>`]; the HTTP
//! layer (`server::handlers`) converts a [`RaftError`] into the JSON error
//! envelope described in the spec's error-handling section.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RaftError>;

#[derive(Error, Debug, Clone)]
pub enum RaftError {
    #[error("Not leader, forward failed")]
    NotLeader,

    #[error("Key not found")]
    KeyNotFound,

    #[error("Value has been changed")]
    ValueChanged,

    #[error("Not enough servers ack")]
    NotEnoughAcks,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown peer: {0}")]
    UnknownPeer(u64),
}

impl IntoResponse for RaftError {
    /// Every client-facing error becomes `{status: "error", message: ...}`.
    /// Stale-term rejections on `/vote`, `/heartbeat`, and `/repl` don't flow
    /// through here — those handlers build their own typed `{status: "bad"}`
    /// response directly, since that's the wire shape those RPCs promise.
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            Json(json!({"status": "error", "message": self.to_string()})),
        )
            .into_response()
    }
}
