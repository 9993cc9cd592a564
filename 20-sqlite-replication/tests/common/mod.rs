#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlite_replication::{
    client::PeerError,
    node::Node,
    protocol::Request,
    replication::PeerTransport,
    store::SqliteStore,
    topology::Topology,
};

pub const PRIMARY: &str = "http://primary:8080";
pub const REPLICA_1: &str = "http://replica1:8081";
pub const REPLICA_2: &str = "http://replica2:8082";

/// Transport that records every forwarded request instead of sending it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Request)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(String, Request)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn peers(&self) -> Vec<String> {
        self.sent().into_iter().map(|(peer, _)| peer).collect()
    }
}

#[async_trait]
impl PeerTransport for RecordingTransport {
    async fn forward(&self, peer: &str, request: &Request) -> Result<(), PeerError> {
        self.sent
            .lock()
            .unwrap()
            .push((peer.to_string(), request.clone()));
        Ok(())
    }
}

pub fn three_node_topology(self_addr: &str) -> Topology {
    Topology::new(
        self_addr,
        PRIMARY,
        vec![PRIMARY.into(), REPLICA_1.into(), REPLICA_2.into()],
    )
    .expect("valid topology")
}

/// A node backed by an in-memory store and a recording transport.
pub fn recording_node(self_addr: &str) -> (Node, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let store = SqliteStore::open_in_memory().expect("in-memory store");
    let node = Node::new(three_node_topology(self_addr), store, transport.clone());
    (node, transport)
}
