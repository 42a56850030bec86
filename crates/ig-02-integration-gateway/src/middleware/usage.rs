//! Usage recording.
//!
//! Wraps authentication so rejected requests are recorded as well. The
//! caller identity comes from the `AuthenticatedClient` response extension.

use axum::{body::Body, http::Request, response::Response};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tower::{Layer, Service};

use super::ip_protection::ClientIp;
use super::metrics::GatewayMetrics;
use crate::domain::{AuthenticatedClient, UsageRecord};
use crate::ports::UsageSink;

/// Usage log layer
#[derive(Clone)]
pub struct UsageLogLayer {
    sink: Arc<dyn UsageSink>,
    metrics: Arc<GatewayMetrics>,
}

impl UsageLogLayer {
    pub fn new(sink: Arc<dyn UsageSink>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { sink, metrics }
    }
}

impl<S> Layer<S> for UsageLogLayer {
    type Service = UsageLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UsageLogService {
            inner,
            sink: Arc::clone(&self.sink),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Usage log service
#[derive(Clone)]
pub struct UsageLogService<S> {
    inner: S,
    sink: Arc<dyn UsageSink>,
    metrics: Arc<GatewayMetrics>,
}

impl<S> Service<Request<Body>> for UsageLogService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let sink = Arc::clone(&self.sink);
        let metrics = Arc::clone(&self.metrics);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let start = Instant::now();
            let timestamp = Utc::now();
            let method = req.method().to_string();
            let path = req.uri().path().to_string();
            let client_ip = req.extensions().get::<ClientIp>().map(|ip| ip.0);

            let response = inner.call(req).await?;

            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            let client = response.extensions().get::<AuthenticatedClient>();

            metrics.record_request(latency_ms);
            sink.record(UsageRecord {
                timestamp,
                client_id: client.map(|c| c.client_id),
                key_id: client.map(|c| c.key_id),
                source_ip: client.map(|c| c.source_ip).or(client_ip),
                method,
                path,
                status: response.status().as_u16(),
                latency_ms,
            });

            Ok(response)
        })
    }
}
