//! Primary/replica SQLite nodes with best-effort statement fan-out.
//!
//! One node is the primary and is the only one that accepts schema changes
//! from clients. Every node applies a client's statement locally and then
//! forwards it to its peers, tagged so the receivers do not forward it again.
//! Replies, including query rows, come from local storage only.
//!
//! - [`protocol`] defines the JSON request and reply types for `POST /query`.
//! - [`classify`] and [`role`] decide whether a node may run a statement.
//! - [`store`] wraps the node's SQLite database.
//! - [`replication`] fans accepted client requests out to peers.
//! - [`node`] ties these together per request; [`server`] exposes it over HTTP.
//! - [`topology`] and [`cli`] describe cluster membership at startup.
//! - [`client`] talks to a node over HTTP.

pub mod classify;
pub mod cli;
pub mod client;
pub mod error;
pub mod node;
pub mod protocol;
pub mod replication;
pub mod role;
pub mod server;
pub mod store;
pub mod topology;
pub mod value;
