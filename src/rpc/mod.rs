//! Replication RPC: one request/response protocol over three
//! transport substrates (spec §4.10).
//!
//! `wire` owns the framing, `transport` the substrate-specific byte
//! pipes (Unix socket, SSH-spawned child stdio), `server` the
//! thread-per-session dispatch loop, `client` the caller-side stub
//! used by [`crate::repo::Repository::pull`], and `http` the axum
//! surface that exposes the same payloads over plain HTTP.

pub mod client;
pub mod http;
pub mod server;
pub mod transport;
pub mod wire;

pub use client::RepoClient;
pub use server::RpcServer;
pub use wire::Command;
