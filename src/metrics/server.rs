//! Prometheus metrics endpoint.
//!
//! A batch run is short-lived, so the endpoint is opt-in. It is bound before
//! the run starts and stopped with [`MetricsServer::shutdown`] once the run
//! is over, so it is scrapeable exactly for the lifetime of the run.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{MetricsBindSnafu, MetricsError, PrometheusInitSnafu};

/// Install the Prometheus recorder and serve `/metrics` and `/health` on `addr`.
pub async fn init(addr: SocketAddr) -> Result<MetricsServer, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;
    let listener = TcpListener::bind(addr)
        .await
        .context(MetricsBindSnafu { addr })?;

    Ok(MetricsServer::start(listener, handle))
}

/// A running metrics endpoint, scoped to one run.
pub struct MetricsServer {
    local_addr: Option<SocketAddr>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MetricsServer {
    fn start(listener: TcpListener, handle: PrometheusHandle) -> Self {
        let local_addr = listener.local_addr().ok();
        let (shutdown, stopped) = oneshot::channel::<()>();

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(Extension(handle));

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = stopped.await;
            });
            if let Err(e) = serve.await {
                error!("Metrics server error: {}", e);
            }
        });

        Self {
            local_addr,
            shutdown,
            task,
        }
    }

    /// Address the endpoint is listening on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop accepting scrapes and wait for in-flight requests to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("Metrics server task failed: {}", e);
        }
        debug!("Metrics endpoint stopped");
    }
}

async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> &'static str {
    "ok\n"
}
