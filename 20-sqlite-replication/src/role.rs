//! Node role and the authorization rule tied to it.
//!
//! The primary may run anything. A replica refuses schema changes sent to it
//! directly and accepts them only as replicated copies.

use std::fmt;

use crate::classify::Classification;
use crate::error::NodeError;

/// Whether this process is authoritative for schema changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Primary,
    Replica,
}

impl NodeRole {
    /// The single authorization rule: a replica refuses schema changes unless
    /// they were pushed to it by replication.
    pub fn may_execute(
        self,
        classification: Classification,
        already_replicated: bool,
    ) -> Result<(), NodeError> {
        match (self, classification) {
            (NodeRole::Replica, Classification::SchemaChange) if !already_replicated => {
                Err(NodeError::Forbidden(
                    "replica nodes cannot perform schema operations".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Primary => f.write_str("primary"),
            NodeRole::Replica => f.write_str("replica"),
        }
    }
}
