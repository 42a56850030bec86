//! Gateway assembly: credential service, usage log and middleware stack.

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::adapters::{CompositeUsageSink, InMemoryCredentialStore, InMemoryUsageLog, TracingUsageSink};
use crate::domain::{GatewayConfig, GatewayError};
use crate::middleware::{cleanup_task, GatewayMetrics, MiddlewareStack};
use crate::ports::CredentialStore;
use crate::service::CredentialService;

/// Integration gateway
pub struct IntegrationGateway {
    config: GatewayConfig,
    service: Arc<CredentialService>,
    usage_log: Arc<InMemoryUsageLog>,
    stack: MiddlewareStack,
    cleanup_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl IntegrationGateway {
    /// Gateway backed by the in-memory credential store
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_store(config, Arc::new(InMemoryCredentialStore::new()))
    }

    pub fn with_store(
        config: GatewayConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let service = Arc::new(CredentialService::new(
            store,
            config.keys.clone(),
            config.security.empty_whitelist,
        ));

        let usage_log = Arc::new(InMemoryUsageLog::new(config.usage.buffer_capacity));
        let sink = CompositeUsageSink::new()
            .with(Arc::new(TracingUsageSink))
            .with(usage_log.clone());

        let stack = MiddlewareStack::from_config(&config, Arc::clone(&service), Arc::new(sink));

        Ok(Self {
            config,
            service,
            usage_log,
            stack,
            cleanup_handle: None,
            shutdown_tx: None,
        })
    }

    /// Wrap application routes in the gateway middleware
    pub fn protect<S>(&self, routes: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.stack.apply(routes)
    }

    /// Start background maintenance (stale rate limit buckets)
    pub fn start_cleanup_tasks(&mut self) {
        if self.cleanup_handle.is_some() || !self.config.rate_limit.enabled {
            return;
        }

        let state = self.stack.rate_limit_state();
        let interval = self.config.rate_limit.cleanup_interval;
        let max_age = self.config.rate_limit.bucket_max_age;
        self.cleanup_handle = Some(tokio::spawn(cleanup_task(state, interval, max_age)));
    }

    /// Serve `routes` behind the gateway until [`shutdown`](Self::shutdown)
    /// or a server error.
    pub async fn serve(&mut self, listener: TcpListener, routes: Router) -> Result<(), GatewayError> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        self.start_cleanup_tasks();

        let app = self
            .protect(routes)
            .into_make_service_with_connect_info::<SocketAddr>();

        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Integration gateway listening");
        }

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;

        self.stop_cleanup_tasks();

        match result {
            Ok(()) => {
                info!("Integration gateway stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Server error");
                Err(GatewayError::Server(e.to_string()))
            }
        }
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.stop_cleanup_tasks();
    }

    fn stop_cleanup_tasks(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn credentials(&self) -> Arc<CredentialService> {
        Arc::clone(&self.service)
    }

    pub fn usage_log(&self) -> Arc<InMemoryUsageLog> {
        Arc::clone(&self.usage_log)
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        self.stack.metrics()
    }
}

impl Drop for IntegrationGateway {
    fn drop(&mut self) {
        self.stop_cleanup_tasks();
    }
}
