//! Coarse statement classification used for authorization.
//!
//! Only the leading keywords are inspected. A schema keyword buried in a
//! comment or subquery is not detected.

use crate::protocol::Command;

/// Leading keyword pairs that mark a schema or database-level statement.
const SCHEMA_PREFIXES: &[&str] = &[
    "CREATE DATABASE",
    "DROP DATABASE",
    "CREATE TABLE",
    "DROP TABLE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    SchemaChange,
    DataChange,
    Read,
}

/// Classifies a statement by its leading keywords, falling back to the
/// declared command.
pub fn classify(statement: &str, command: Command) -> Classification {
    // Collapse whitespace between the first two words so `CREATE\n  TABLE`
    // still matches.
    let head = statement
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();

    if SCHEMA_PREFIXES.iter().any(|prefix| head.starts_with(prefix)) {
        return Classification::SchemaChange;
    }

    match command {
        Command::Exec => Classification::DataChange,
        Command::Query => Classification::Read,
    }
}
