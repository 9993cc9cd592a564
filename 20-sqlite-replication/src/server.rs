use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::NodeError;
use crate::node::{Dispatched, Node};
use crate::protocol::{Reply, Request, SUCCESS_TOKEN};

/// HTTP front end for a [`Node`], serving `POST /query`.
pub struct Server {
    listener: TcpListener,
    node: Arc<Node>,
}

impl Server {
    pub fn new(listener: TcpListener, node: Node) -> Self {
        Self {
            listener,
            node: Arc::new(node),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Server { listener, node } = self;
        let role = node.role();

        axum::serve(listener, router(node))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!(%role, "node shut down");
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/query", post(handle_query))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

// The body is taken raw so malformed payloads map to our own 400 instead of
// axum's JSON rejection codes.
async fn handle_query(State(node): State<Arc<Node>>, body: Bytes) -> Result<Reply, NodeError> {
    let request =
        Request::decode(&body).inspect_err(|err| warn!(error = %err, "rejected request body"))?;
    // Dropping the replication handle leaves fan-out running after we respond.
    let Dispatched { reply, .. } = node
        .dispatch(request)
        .await
        .inspect_err(|err| warn!(error = %err, "request failed"))?;
    Ok(reply)
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Executed { .. } => (StatusCode::OK, SUCCESS_TOKEN).into_response(),
            Reply::Rows(rows) => Json(rows).into_response(),
        }
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = match &self {
            NodeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            NodeError::Forbidden(_) => StatusCode::FORBIDDEN,
            NodeError::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
