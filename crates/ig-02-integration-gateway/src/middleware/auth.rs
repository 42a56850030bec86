//! API key authentication and source address authorization.
//!
//! Reads the key from `X-API-Key` or `Authorization: Bearer`, authenticates
//! it against the resolved [`ClientIp`], and attaches the resulting
//! [`AuthenticatedClient`] to both the request and the response extensions.

use axum::{
    body::Body,
    http::{header, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip_protection::ClientIp;
use super::metrics::GatewayMetrics;
use crate::domain::ApiError;
use crate::service::CredentialService;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication layer
#[derive(Clone)]
pub struct AuthLayer {
    service: Arc<CredentialService>,
    metrics: Arc<GatewayMetrics>,
}

impl AuthLayer {
    pub fn new(service: Arc<CredentialService>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { service, metrics }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            service: Arc::clone(&self.service),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    service: Arc<CredentialService>,
    metrics: Arc<GatewayMetrics>,
}

impl<S> Service<Request<Body>> for AuthService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let service = Arc::clone(&self.service);
        let metrics = Arc::clone(&self.metrics);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(raw_key) = extract_api_key(&req) else {
                debug!(path = %req.uri().path(), "Request without API key");
                return Ok(reject(&metrics, ApiError::missing_api_key()));
            };

            let Some(ClientIp(source_ip)) = req.extensions().get::<ClientIp>().copied() else {
                warn!(path = %req.uri().path(), "Client address unknown; denying");
                return Ok(reject(&metrics, ApiError::ip_not_allowed(None)));
            };

            let client = match service.authenticate(&raw_key, source_ip).await {
                Ok(client) => client,
                Err(e) => {
                    debug!(source_ip = %source_ip, code = ?e.code, "Authentication failed");
                    return Ok(reject(&metrics, e));
                }
            };

            metrics.record_authorized();
            req.extensions_mut().insert(client.clone());

            let mut response = inner.call(req).await?;
            response.extensions_mut().insert(client);
            Ok(response)
        })
    }
}

fn reject(metrics: &GatewayMetrics, error: ApiError) -> Response {
    metrics.record_rejection(error.code);
    error.into_response()
}

/// API key from `X-API-Key`, else from `Authorization: Bearer`
fn extract_api_key<B>(req: &Request<B>) -> Option<String> {
    let from_header = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());

    let from_bearer = || {
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|k| !k.is_empty())
    };

    from_header.or_else(from_bearer).map(str::to_string)
}
