//! Best-effort fan-out of accepted client requests to peer nodes.
//!
//! Each forwarded copy carries `is_replicated`, so the receiving peer applies it
//! without forwarding again. Peers are contacted one after another in
//! configuration order; a failed peer is logged and skipped. Nothing is
//! retried, acknowledged or rolled back.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::client::{NodeClient, PeerError};
use crate::protocol::Request;
use crate::role::NodeRole;
use crate::topology::Topology;

/// Delivers one request to one peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn forward(&self, peer: &str, request: &Request) -> Result<(), PeerError>;
}

/// Forwards over HTTP with the client's per-call timeout.
pub struct HttpTransport {
    client: NodeClient,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(NodeClient::new()?))
    }

    pub fn with_client(client: NodeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn forward(&self, peer: &str, request: &Request) -> Result<(), PeerError> {
        let body = self.client.send(peer, request).await?;
        debug!(peer = %peer, body = %body.trim_end(), "peer response");
        Ok(())
    }
}

pub struct Replicator {
    peers: Vec<String>,
    from_primary: bool,
    transport: Arc<dyn PeerTransport>,
}

impl Replicator {
    pub fn new(topology: &Topology, transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            peers: topology.peers().to_vec(),
            from_primary: topology.role() == NodeRole::Primary,
            transport,
        }
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Sends a replicated copy of `request` to every peer except `source`.
    ///
    /// Returns once every peer has been tried. The caller learns nothing about
    /// individual outcomes.
    pub async fn propagate(&self, request: &Request, source: &str) {
        if request.already_replicated {
            warn!(statement = %request.statement, "refusing to re-propagate a replicated request");
            return;
        }

        let copy = request.replicated_copy(self.from_primary);
        for peer in self.peers.iter().filter(|peer| peer.as_str() != source) {
            match self.transport.forward(peer, &copy).await {
                Ok(()) => info!(peer = %peer, statement = %copy.statement, "replicated"),
                Err(err) => warn!(peer = %peer, error = %err, "replication to peer failed"),
            }
        }
    }
}
