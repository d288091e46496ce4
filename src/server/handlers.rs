//! HTTP surface: the `axum` router binding each verb in §6 to a `Node`
//! method, plus [`dispatch`], the axum-free entry point the in-memory
//! transport calls directly so tests never touch a socket.
//!
//! Grounded on the teacher's `RequestVoteHandler`/`AppendEntriesHandler`
//! `RpcObject` impls in `server/mod.rs` — same idea (one function per RPC,
//! bound into a dispatch table), generalized from capnp framing to `axum`
//! JSON extractors.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::{RaftError, Result};
use crate::router::GetOutcome;
use crate::rpc::{
    DeleteDataRequest, GetDataQuery, HeadDataRequest, HeartbeatRequest, OkResponse,
    PutDataRequest, ReplRequest, StatusResponse, UpdateDataRequest, VoteRequest,
};
use crate::server::node::Node;
use crate::state::Role;
use crate::transport::HttpMethod;

pub fn build_router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/turnon", get(turn_on))
        .route("/turnoff", get(turn_off))
        .route("/vote", post(vote))
        .route("/heartbeat", post(heartbeat))
        .route("/repl", post(repl))
        .route("/get_data", get(get_data))
        .route("/put_data", put(put_data))
        .route("/post_data", post(put_data))
        .route("/delete_data", delete(delete_data))
        .route("/head_data", axum::routing::head(head_data))
        .route("/update_data", patch(update_data))
        .with_state(node)
}

async fn status(State(node): State<Arc<Node>>) -> Json<StatusResponse> {
    let state = node.state.lock().await;
    let role = match state.role {
        Role::Follower => "follower",
        Role::Candidate => "candidate",
        Role::Leader => "leader",
    };
    Json(StatusResponse {
        state: role.to_string(),
        leader_id: state.leader_id,
        term: state.term,
    })
}

async fn turn_on(State(node): State<Arc<Node>>) -> Json<OkResponse> {
    node.fault_gate().set_alive(true);
    Json(OkResponse::ok())
}

async fn turn_off(State(node): State<Arc<Node>>) -> Json<OkResponse> {
    node.fault_gate().set_alive(false);
    Json(OkResponse::ok())
}

async fn vote(State(node): State<Arc<Node>>, Json(req): Json<VoteRequest>) -> impl IntoResponse {
    Json(node.handle_vote(req).await)
}

async fn heartbeat(
    State(node): State<Arc<Node>>,
    Json(req): Json<HeartbeatRequest>,
) -> impl IntoResponse {
    Json(node.handle_heartbeat(req).await)
}

async fn repl(State(node): State<Arc<Node>>, Json(req): Json<ReplRequest>) -> impl IntoResponse {
    Json(node.handle_repl(req).await)
}

async fn put_data(
    State(node): State<Arc<Node>>,
    Json(req): Json<PutDataRequest>,
) -> Result<Json<Value>> {
    node.handle_put(req).await.map(Json)
}

async fn delete_data(
    State(node): State<Arc<Node>>,
    Json(req): Json<DeleteDataRequest>,
) -> Result<Json<Value>> {
    node.handle_delete(req).await.map(Json)
}

async fn head_data(
    State(node): State<Arc<Node>>,
    Json(req): Json<HeadDataRequest>,
) -> Result<Json<Value>> {
    node.handle_head(req).await.map(Json)
}

async fn update_data(
    State(node): State<Arc<Node>>,
    Json(req): Json<UpdateDataRequest>,
) -> Result<Json<Value>> {
    node.handle_update(req).await.map(Json)
}

/// The only handler whose success path can carry a real HTTP status other
/// than 200: a fresher peer is known, so the client is redirected there.
async fn get_data(
    State(node): State<Arc<Node>>,
    Json(query): Json<GetDataQuery>,
) -> Result<Response> {
    match node.handle_get(&query.key).await? {
        GetOutcome::Value(resp) => Ok((StatusCode::OK, Json(resp)).into_response()),
        GetOutcome::Redirect(id) => {
            Ok((StatusCode::FOUND, Json(json!({ "id": id }))).into_response())
        }
        GetOutcome::Forwarded(body) => Ok((StatusCode::OK, Json(body)).into_response()),
    }
}

/// Entry point for [`crate::transport::in_memory::InMemoryTransport`]:
/// drives the same `Node` methods the axum routes above call, without any
/// HTTP framing. The 302-vs-200 distinction the real server makes doesn't
/// apply here — the redirect `{id}` body is the only signal a caller needs.
pub async fn dispatch(node: &Arc<Node>, method: HttpMethod, path: &str, body: Value) -> Result<Value> {
    match (method, path) {
        (HttpMethod::Get, "/status") => {
            let state = node.state.lock().await;
            let role = match state.role {
                Role::Follower => "follower",
                Role::Candidate => "candidate",
                Role::Leader => "leader",
            };
            to_value(&StatusResponse {
                state: role.to_string(),
                leader_id: state.leader_id,
                term: state.term,
            })
        }
        (HttpMethod::Get, "/turnon") => {
            node.fault_gate().set_alive(true);
            to_value(&OkResponse::ok())
        }
        (HttpMethod::Get, "/turnoff") => {
            node.fault_gate().set_alive(false);
            to_value(&OkResponse::ok())
        }
        (HttpMethod::Post, "/vote") => {
            let req: VoteRequest = from_value(body)?;
            to_value(&node.handle_vote(req).await)
        }
        (HttpMethod::Post, "/heartbeat") => {
            let req: HeartbeatRequest = from_value(body)?;
            to_value(&node.handle_heartbeat(req).await)
        }
        (HttpMethod::Post, "/repl") => {
            let req: ReplRequest = from_value(body)?;
            to_value(&node.handle_repl(req).await)
        }
        (HttpMethod::Get, "/get_data") => {
            let query: GetDataQuery = from_value(body)?;
            match node.handle_get(&query.key).await? {
                GetOutcome::Value(resp) => to_value(&resp),
                GetOutcome::Redirect(id) => to_value(&json!({ "id": id })),
                GetOutcome::Forwarded(body) => Ok(body),
            }
        }
        (HttpMethod::Put, "/put_data") | (HttpMethod::Post, "/post_data") => {
            let req: PutDataRequest = from_value(body)?;
            node.handle_put(req).await
        }
        (HttpMethod::Delete, "/delete_data") => {
            let req: DeleteDataRequest = from_value(body)?;
            node.handle_delete(req).await
        }
        (HttpMethod::Head, "/head_data") => {
            let req: HeadDataRequest = from_value(body)?;
            node.handle_head(req).await
        }
        (HttpMethod::Patch, "/update_data") => {
            let req: UpdateDataRequest = from_value(body)?;
            node.handle_update(req).await
        }
        (_, other) => Err(RaftError::Transport(format!("no route for {other}"))),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| RaftError::Transport(e.to_string()))
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| RaftError::Transport(e.to_string()))
}
