//! JSON wire format for the `/query` endpoint.
//!
//! Field names follow the deployed protocol: the statement text travels as
//! `query`, the primary hint as `is_master` and the anti-loop flag as
//! `is_replicated`. Everything except `command` may be omitted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::NodeError;
use crate::value::Value;

/// Plain-text body returned for a successful `exec`.
pub const SUCCESS_TOKEN: &str = "success";

/// A result row: column name to value, keys in sorted order.
pub type Record = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Mutating statement; replicated to peers.
    Exec,
    /// Read-only statement; answered from local storage.
    Query,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(rename = "query", default)]
    pub statement: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
    #[serde(rename = "is_master", default, skip_serializing_if = "is_false")]
    pub requires_primary: bool,
    /// Set only by replication fan-out. A node never forwards a request
    /// carrying this flag.
    #[serde(rename = "is_replicated", default, skip_serializing_if = "is_false")]
    pub already_replicated: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl Request {
    pub fn exec(statement: impl Into<String>) -> Self {
        Self::new(Command::Exec, statement)
    }

    pub fn query(statement: impl Into<String>) -> Self {
        Self::new(Command::Query, statement)
    }

    fn new(command: Command, statement: impl Into<String>) -> Self {
        Self {
            command,
            statement: statement.into(),
            params: Vec::new(),
            requires_primary: false,
            already_replicated: false,
        }
    }

    pub fn with_params<I, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the request as one that must be applied at the primary.
    pub fn on_primary(mut self) -> Self {
        self.requires_primary = true;
        self
    }

    /// Decodes a request body, rejecting malformed JSON, unknown commands,
    /// non-scalar params and blank statements.
    pub fn decode(body: &[u8]) -> Result<Self, NodeError> {
        let request: Request =
            serde_json::from_slice(body).map_err(|err| NodeError::BadRequest(err.to_string()))?;
        if request.statement.trim().is_empty() {
            return Err(NodeError::BadRequest("statement is empty".to_string()));
        }
        Ok(request)
    }

    /// The copy sent to peers. `authored_at_primary` also raises the primary
    /// hint so receivers can tell the change came from the primary.
    pub fn replicated_copy(&self, authored_at_primary: bool) -> Self {
        let mut copy = self.clone();
        copy.already_replicated = true;
        copy.requires_primary |= authored_at_primary;
        copy
    }
}

/// Outcome of a locally executed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Executed { rows_affected: usize },
    Rows(Vec<Record>),
}
