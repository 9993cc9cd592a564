use std::{convert::Infallible, net::SocketAddr, path::PathBuf};

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};

use crate::protocol::Request;
use crate::topology::{Topology, local_port};
use crate::value::Value;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a node with an explicit cluster membership.
    Serve(ServeArgs),
    /// Run node `index` of a single-host cluster (primary on the base port).
    ServeLocal(LocalArgs),
    /// Send one statement to a node and print the response body.
    Send(SendArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to bind the HTTP endpoint to.
    #[arg(long)]
    pub listen: SocketAddr,

    /// Address peers use to reach this node. Defaults to http://<listen>.
    #[arg(long)]
    pub advertise: Option<String>,

    /// Address of the primary node.
    #[arg(long)]
    pub primary: String,

    /// Every node in the cluster, including this one and the primary.
    #[arg(long = "node", value_delimiter = ',', required = true)]
    pub nodes: Vec<String>,

    /// Path of this node's database file.
    #[arg(long)]
    pub db: PathBuf,
}

impl ServeArgs {
    pub fn topology(&self) -> Result<Topology> {
        let self_addr = self
            .advertise
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen));
        Topology::new(self_addr, self.primary.clone(), self.nodes.clone())
    }
}

#[derive(Args, Debug, Clone)]
pub struct LocalArgs {
    /// Number of replicas in the cluster.
    #[arg(long)]
    pub replicas: usize,

    /// Which node to run: 0 is the primary, 1..=replicas are replicas.
    #[arg(long)]
    pub index: usize,

    /// Port of the primary; replica i listens on base_port + i.
    #[arg(long, default_value_t = 8080)]
    pub base_port: u16,

    /// Directory holding the node{index}.db files.
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,
}

impl LocalArgs {
    pub fn topology(&self) -> Result<Topology> {
        Topology::local(self.replicas, self.index, self.base_port)
    }

    pub fn listen(&self) -> Result<SocketAddr> {
        let port = local_port(self.base_port, self.index)?;
        Ok(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("node{}.db", self.index))
    }
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// Node to send the statement to.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub node: String,

    #[command(flatten)]
    pub statement: StatementArgs,

    /// Positional parameter as a JSON scalar; anything else is sent as text.
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<Value>,

    /// Mark the statement as one that must run on the primary.
    #[arg(long)]
    pub primary_hint: bool,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct StatementArgs {
    /// Mutating statement, replicated to peers.
    #[arg(long)]
    pub exec: Option<String>,

    /// Read-only statement, answered locally.
    #[arg(long)]
    pub query: Option<String>,
}

impl SendArgs {
    pub fn request(&self) -> Result<Request> {
        let request = match (&self.statement.exec, &self.statement.query) {
            (Some(sql), None) => Request::exec(sql.clone()),
            (None, Some(sql)) => Request::query(sql.clone()),
            _ => bail!("exactly one of --exec or --query is required"),
        };
        let request = request.with_params(self.params.clone());
        Ok(if self.primary_hint {
            request.on_primary()
        } else {
            request
        })
    }
}

fn parse_param(raw: &str) -> Result<Value, Infallible> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::Text(raw.to_string())))
}
