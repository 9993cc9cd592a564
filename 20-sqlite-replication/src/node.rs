//! Per-node request orchestration.
//!
//! [`Node`] is the context object built once at startup. It owns the topology,
//! the local store and the replicator, and runs each request through
//! authorize → execute locally → replicate.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::classify::classify;
use crate::error::NodeError;
use crate::protocol::{Command, Reply, Request};
use crate::replication::{PeerTransport, Replicator};
use crate::role::NodeRole;
use crate::store::SqliteStore;
use crate::topology::Topology;

pub struct Node {
    topology: Topology,
    store: SqliteStore,
    replicator: Arc<Replicator>,
}

/// A locally executed request.
///
/// `replication` is the detached fan-out task, present whenever the request
/// came from a client rather than from a peer. Dropping the handle does not
/// cancel the task.
pub struct Dispatched {
    pub reply: Reply,
    pub replication: Option<JoinHandle<()>>,
}

impl Node {
    pub fn new(topology: Topology, store: SqliteStore, transport: Arc<dyn PeerTransport>) -> Self {
        let replicator = Arc::new(Replicator::new(&topology, transport));
        Self {
            topology,
            store,
            replicator,
        }
    }

    pub fn role(&self) -> NodeRole {
        self.topology.role()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Authorizes and executes `request` against local storage, then starts
    /// replication if the request was not itself a replicated copy.
    ///
    /// Both commands are forwarded: the store does not stop a `query` from
    /// mutating, so peers see every statement this node ran for a client. A
    /// request that fails before or during local execution is never
    /// replicated.
    pub async fn dispatch(&self, request: Request) -> Result<Dispatched, NodeError> {
        let classification = classify(&request.statement, request.command);
        if let Err(err) = self
            .role()
            .may_execute(classification, request.already_replicated)
        {
            warn!(role = %self.role(), statement = %request.statement, "rejected schema change");
            return Err(err);
        }

        let reply = match request.command {
            Command::Exec => Reply::Executed {
                rows_affected: self.store.apply(&request.statement, &request.params).await?,
            },
            Command::Query => Reply::Rows(self.store.fetch(&request.statement, &request.params).await?),
        };
        debug!(
            command = ?request.command,
            ?classification,
            replicated = request.already_replicated,
            "applied locally"
        );

        let replication = (!request.already_replicated).then(|| self.spawn_replication(request));

        Ok(Dispatched { reply, replication })
    }

    fn spawn_replication(&self, request: Request) -> JoinHandle<()> {
        let replicator = Arc::clone(&self.replicator);
        let source = self.topology.self_addr().to_string();
        tokio::spawn(async move {
            replicator.propagate(&request, &source).await;
        })
    }
}
