mod error;
mod routes;

use axum::{
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{config::Config, engine::WorkflowEngine};

pub use routes::ListQuery;

pub struct Server {
    engine: Arc<WorkflowEngine>,
}

impl Server {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self::new(Arc::new(WorkflowEngine::from_config(config)?)))
    }

    pub fn build_router(self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route(
                "/workflows",
                get(routes::list_workflows).post(routes::start_workflow),
            )
            .route("/workflows/{id}", get(routes::get_workflow))
            .route("/metrics", get(routes::metrics))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.engine)
    }

    pub async fn start(self, addr: &str) -> crate::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Orchestrator listening on {}", listener.local_addr()?);

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Orchestrator stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
