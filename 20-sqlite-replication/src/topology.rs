use anyhow::{Context, Result, ensure};

use crate::role::NodeRole;

/// Static cluster membership, fixed at startup.
///
/// Addresses are base URLs such as `http://127.0.0.1:8081`. A node's peers are
/// every other node in the cluster: the primary fans out to all replicas, a
/// replica to the primary and the remaining replicas.
#[derive(Debug, Clone)]
pub struct Topology {
    self_addr: String,
    primary_addr: String,
    peers: Vec<String>,
}

impl Topology {
    /// Builds the topology from the full node list, which must contain both
    /// this node and the primary.
    pub fn new(
        self_addr: impl Into<String>,
        primary_addr: impl Into<String>,
        nodes: Vec<String>,
    ) -> Result<Self> {
        let self_addr = normalize(self_addr.into());
        let primary_addr = normalize(primary_addr.into());
        let nodes: Vec<String> = nodes.into_iter().map(normalize).collect();

        ensure!(!nodes.is_empty(), "topology requires at least one node");
        for (index, node) in nodes.iter().enumerate() {
            ensure!(!node.is_empty(), "node addresses cannot be empty");
            ensure!(
                !nodes[..index].contains(node),
                "node {node} is listed more than once"
            );
        }
        ensure!(
            nodes.contains(&primary_addr),
            "primary {primary_addr} is not in the node list"
        );
        ensure!(
            nodes.contains(&self_addr),
            "this node ({self_addr}) is not in the node list"
        );

        let peers = nodes.into_iter().filter(|node| *node != self_addr).collect();
        Ok(Self {
            self_addr,
            primary_addr,
            peers,
        })
    }

    /// Single-host layout: the primary listens on `base_port` and replica `i`
    /// on `base_port + i`. `index` 0 is the primary.
    pub fn local(replicas: usize, index: usize, base_port: u16) -> Result<Self> {
        ensure!(replicas > 0, "at least one replica is required");
        ensure!(
            index <= replicas,
            "node index {index} is out of range for {replicas} replicas"
        );

        let nodes = (0..=replicas)
            .map(|i| local_port(base_port, i).map(local_addr))
            .collect::<Result<Vec<_>>>()?;
        let self_addr = nodes[index].clone();
        let primary_addr = nodes[0].clone();
        Self::new(self_addr, primary_addr, nodes)
    }

    pub fn role(&self) -> NodeRole {
        if self.self_addr == self.primary_addr {
            NodeRole::Primary
        } else {
            NodeRole::Replica
        }
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    pub fn primary_addr(&self) -> &str {
        &self.primary_addr
    }

    /// Every node except this one, in configuration order.
    pub fn peers(&self) -> &[String] {
        &self.peers
    }
}

/// Port of node `index` in the single-host layout.
pub fn local_port(base_port: u16, index: usize) -> Result<u16> {
    u16::try_from(index)
        .ok()
        .and_then(|offset| base_port.checked_add(offset))
        .with_context(|| format!("port for node {index} overflows base port {base_port}"))
}

fn local_addr(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

fn normalize(addr: String) -> String {
    addr.trim().trim_end_matches('/').to_string()
}
