//! Server module for Freightliner's remote-operation mode.
//!
//! This module implements a small REST API so replication can be driven
//! from a long-running process instead of one CLI invocation per job:
//! - `GET /health` and `GET /metrics` for liveness and in-process counters
//! - `POST /api/v1/replicate` to copy one repository's tags synchronously
//! - `POST /api/v1/replicate-tree` to start a tree replication in the
//!   background, tracked by job id
//! - `GET /api/v1/status/{job_id}` to poll a tree replication's progress

//-------------------------------------------------------------------------------------------------
// Exports
//-------------------------------------------------------------------------------------------------

mod handlers;
mod routes;
mod state;
mod types;

pub use routes::create_router;
pub use state::ServerState;
