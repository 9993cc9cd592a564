use std::{net::SocketAddr, path::Path, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use sqlite_replication::{
    cli::{Cli, Command},
    client::NodeClient,
    node::Node,
    replication::HttpTransport,
    server::Server,
    store::SqliteStore,
    topology::Topology,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let topology = args.topology()?;
            serve(args.listen, topology, &args.db).await?;
        }
        Command::ServeLocal(args) => {
            let topology = args.topology()?;
            serve(args.listen()?, topology, &args.db_path()).await?;
        }
        Command::Send(args) => {
            let request = args.request()?;
            let client = NodeClient::new().context("failed to build http client")?;
            let body = client.send(&args.node, &request).await?;
            println!("{}", body.trim_end());
        }
    }

    Ok(())
}

async fn serve(listen: SocketAddr, topology: Topology, db: &Path) -> Result<()> {
    let store = SqliteStore::open(db)?;
    let transport = HttpTransport::new().context("failed to build peer transport")?;
    let node = Node::new(topology, store, Arc::new(transport));

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let server = Server::new(listener, node);
    info!(
        addr = %server.local_addr()?,
        db = %db.display(),
        "node listening"
    );

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("node exited with error: {err:?}");
        return Err(err);
    }
    Ok(())
}
