//! End-to-end tests against real nodes on ephemeral ports, talking HTTP.

use std::{sync::Arc, time::Duration};

use anyhow::{Result, bail};
use reqwest::StatusCode;
use sqlite_replication::{
    client::{NodeClient, PeerError},
    node::Node,
    protocol::{Record, Request},
    replication::HttpTransport,
    server::Server,
    store::SqliteStore,
    topology::Topology,
    value::Value,
};
use tempfile::TempDir;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle, time::sleep};

const CONVERGE_TIMEOUT: Duration = Duration::from_secs(5);
const PEER_TIMEOUT: Duration = Duration::from_secs(2);
const USERS_TABLE: &str = "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'users'";

struct TestCluster {
    addrs: Vec<String>,
    shutdowns: Vec<oneshot::Sender<()>>,
    servers: Vec<JoinHandle<()>>,
    client: NodeClient,
    _data: TempDir,
}

impl TestCluster {
    /// Starts one primary and `replicas` replicas. `extra_nodes` are listed in
    /// the membership right after the primary but never started, so the
    /// primary contacts them before any running replica.
    async fn spawn(replicas: usize, extra_nodes: &[String]) -> Result<Self> {
        let data = tempfile::tempdir()?;

        let mut listeners = Vec::new();
        let mut addrs = Vec::new();
        for _ in 0..=replicas {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            addrs.push(format!("http://{}", listener.local_addr()?));
            listeners.push(listener);
        }

        let mut nodes = vec![addrs[0].clone()];
        nodes.extend(extra_nodes.iter().cloned());
        nodes.extend(addrs[1..].iter().cloned());

        let mut shutdowns = Vec::new();
        let mut servers = Vec::new();
        for (index, listener) in listeners.into_iter().enumerate() {
            let topology = Topology::new(addrs[index].clone(), addrs[0].clone(), nodes.clone())?;
            let store = SqliteStore::open(data.path().join(format!("node{index}.db")))?;
            let transport = HttpTransport::with_client(NodeClient::with_timeout(PEER_TIMEOUT)?);
            let server = Server::new(listener, Node::new(topology, store, Arc::new(transport)));

            let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
            servers.push(tokio::spawn(async move {
                let shutdown = async move {
                    let _ = shutdown_rx.await;
                };
                let _ = server.run_until(shutdown).await;
            }));
            shutdowns.push(shutdown_tx);
        }

        Ok(Self {
            addrs,
            shutdowns,
            servers,
            client: NodeClient::new()?,
            _data: data,
        })
    }

    fn primary(&self) -> &str {
        &self.addrs[0]
    }

    fn replica(&self, index: usize) -> &str {
        &self.addrs[index]
    }

    async fn send(&self, addr: &str, request: Request) -> Result<String, PeerError> {
        self.client.send(addr, &request).await
    }

    async fn rows(&self, addr: &str, sql: &str) -> Result<Vec<Record>> {
        Ok(self.client.fetch(addr, &Request::query(sql)).await?)
    }

    /// Polls `addr` until `sql` returns `expected` rows.
    async fn wait_for_rows(&self, addr: &str, sql: &str, expected: usize) -> Result<Vec<Record>> {
        let start = tokio::time::Instant::now();
        loop {
            if let Ok(rows) = self.rows(addr, sql).await {
                if rows.len() == expected {
                    return Ok(rows);
                }
            }
            if start.elapsed() > CONVERGE_TIMEOUT {
                bail!("timeout waiting for {expected} rows from {addr}: {sql}");
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// Creates the users table through the primary and waits until every
    /// running replica has it. Fan-out tasks are not ordered with respect to
    /// each other, so rows sent before this point could overtake the table.
    async fn create_users(&self) -> Result<()> {
        let body = self.send(self.primary(), create_users()).await?;
        assert_eq!(body, "success");
        for addr in &self.addrs[1..] {
            self.wait_for_rows(addr, USERS_TABLE, 1).await?;
        }
        Ok(())
    }

    async fn shutdown(self) {
        for shutdown in self.shutdowns {
            let _ = shutdown.send(());
        }
        for server in self.servers {
            let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
        }
    }
}

fn create_users() -> Request {
    Request::exec("CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, username TEXT, age INTEGER)")
        .on_primary()
}

#[tokio::test]
async fn primary_writes_converge_on_every_replica() -> Result<()> {
    let cluster = TestCluster::spawn(2, &[]).await?;
    cluster.create_users().await?;

    cluster
        .send(
            cluster.primary(),
            Request::exec("INSERT INTO users (username, age) VALUES (?, ?)")
                .with_params([Value::from("test_user"), Value::from(30_i64)]),
        )
        .await?;

    for index in 1..=2 {
        let rows = cluster
            .wait_for_rows(cluster.replica(index), "SELECT * FROM users", 1)
            .await?;
        assert_eq!(rows[0].get("username"), Some(&Value::Text("test_user".into())));
        assert_eq!(rows[0].get("age"), Some(&Value::Integer(30)));
    }

    cluster.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn replica_rejects_direct_schema_change_over_http() -> Result<()> {
    let cluster = TestCluster::spawn(2, &[]).await?;
    cluster.create_users().await?;

    let err = cluster
        .send(cluster.replica(1), Request::exec("DROP TABLE users").on_primary())
        .await
        .expect_err("replica must refuse schema changes from clients");
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));

    // Still present everywhere: nothing was applied or forwarded.
    for addr in [cluster.primary(), cluster.replica(1), cluster.replica(2)] {
        let tables = cluster.rows(addr, USERS_TABLE).await?;
        assert_eq!(tables.len(), 1, "users table missing on {addr}");
    }

    cluster.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn replica_writes_reach_primary_and_other_replicas() -> Result<()> {
    let cluster = TestCluster::spawn(2, &[]).await?;
    cluster.create_users().await?;

    cluster
        .send(
            cluster.replica(2),
            Request::exec("INSERT INTO users (username) VALUES (?)").with_params(["from_replica"]),
        )
        .await?;

    for addr in [cluster.primary(), cluster.replica(1), cluster.replica(2)] {
        cluster
            .wait_for_rows(addr, "SELECT * FROM users WHERE username = 'from_replica'", 1)
            .await?;
    }

    // Exactly one copy per node: forwarded copies were not forwarded again.
    sleep(Duration::from_millis(200)).await;
    for addr in [cluster.primary(), cluster.replica(1), cluster.replica(2)] {
        let rows = cluster.rows(addr, "SELECT * FROM users").await?;
        assert_eq!(rows.len(), 1, "duplicate apply on {addr}");
    }

    cluster.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unreachable_peer_does_not_fail_the_client() -> Result<()> {
    // Reserve a port, then release it so nothing listens there.
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        format!("http://{}", listener.local_addr()?)
    };
    let cluster = TestCluster::spawn(1, std::slice::from_ref(&dead)).await?;
    cluster.create_users().await?;
    cluster
        .send(
            cluster.primary(),
            Request::exec("INSERT INTO users (username) VALUES ('alive')"),
        )
        .await?;

    cluster
        .wait_for_rows(cluster.replica(1), "SELECT * FROM users", 1)
        .await?;

    cluster.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn client_timeout_bounds_a_peer_that_never_answers() -> Result<()> {
    // Accepted by the kernel backlog, never read from or answered.
    let silent = TcpListener::bind("127.0.0.1:0").await?;
    let addr = format!("http://{}", silent.local_addr()?);
    let client = NodeClient::with_timeout(Duration::from_millis(300))?;

    let start = tokio::time::Instant::now();
    let err = client
        .send(&addr, &Request::exec("DELETE FROM t"))
        .await
        .expect_err("silent peer must time out");

    assert!(matches!(err, PeerError::Unreachable { .. }), "{err}");
    assert_eq!(err.status(), None);
    assert!(start.elapsed() < Duration::from_secs(2));
    drop(silent);
    Ok(())
}

#[tokio::test]
async fn silent_peer_delays_but_does_not_block_the_remaining_peers() -> Result<()> {
    let silent = TcpListener::bind("127.0.0.1:0").await?;
    let silent_addr = format!("http://{}", silent.local_addr()?);
    let cluster = TestCluster::spawn(1, std::slice::from_ref(&silent_addr)).await?;
    cluster.create_users().await?;

    let start = tokio::time::Instant::now();
    cluster
        .send(
            cluster.primary(),
            Request::exec("INSERT INTO users (username) VALUES ('patient')"),
        )
        .await?;
    assert!(
        start.elapsed() < PEER_TIMEOUT,
        "the client must not wait for fan-out"
    );

    // The silent peer is tried first and held for the whole client timeout.
    cluster
        .wait_for_rows(cluster.replica(1), "SELECT * FROM users", 1)
        .await?;

    cluster.shutdown().await;
    drop(silent);
    Ok(())
}

#[tokio::test]
async fn failed_local_write_is_reported_and_not_replicated() -> Result<()> {
    let cluster = TestCluster::spawn(1, &[]).await?;
    cluster.create_users().await?;

    let err = cluster
        .send(
            cluster.primary(),
            Request::exec("INSERT INTO users (id, username) VALUES (1, 'a'), (1, 'b')"),
        )
        .await
        .expect_err("duplicate primary key must fail locally");
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));

    // A later write is observed on the replica; the failed one never is.
    cluster
        .send(
            cluster.primary(),
            Request::exec("INSERT INTO users (id, username) VALUES (2, 'c')"),
        )
        .await?;
    let rows = cluster
        .wait_for_rows(cluster.replica(1), "SELECT * FROM users", 1)
        .await?;
    assert_eq!(rows[0].get("id"), Some(&Value::Integer(2)));

    cluster.shutdown().await;
    Ok(())
}
