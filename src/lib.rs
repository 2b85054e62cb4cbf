#![forbid(unsafe_code)]

//! Cody agent: a JSON-RPC server that lets an out-of-process client drive the
//! Cody recipe engine, and proxies the engine's editor and intent queries
//! back to that client.
//!
//! The [`rpc`] layer is symmetric and is used by both the agent
//! ([`agent::serve_connection`]) and the headless client
//! ([`client::ClientSession`]).

pub mod agent;
pub mod chat;
pub mod client;
pub mod config;
pub mod editor;
pub mod errors;
pub mod intent;
pub mod protocol;
pub mod recipes;
pub mod rpc;

pub use config::AgentConfig;
pub use errors::{AppError, Result};
