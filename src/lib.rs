//! Replicated key-value store with leader-based, Raft-inspired consensus.
//! See `SPEC_FULL.md` for the full design; `DESIGN.md` for how each module
//! is grounded in the teacher repo this crate was built from.

pub mod config;
pub mod election;
pub mod error;
pub mod fault;
pub mod heartbeat;
pub mod replication;
pub mod router;
pub mod rpc;
pub mod server;
pub mod state;
pub mod transport;
