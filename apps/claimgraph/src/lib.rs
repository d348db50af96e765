//! # claimgraph
//!
//! HTTP server and CLI around [`claimgraph_core`].
//!
//! The binary in `main.rs` is a thin wrapper over [`cli::execute`]; the
//! router is exposed here so integration tests can drive it without a socket.

pub mod api;
pub mod cli;
pub mod config;
