//! Client address resolution.
//!
//! Forwarded headers are honored only when the direct peer is a trusted
//! proxy. The resolved address is stored as a [`ClientIp`] request extension
//! and mirrored in the `x-real-client-ip` header.
//!
//! Addresses are canonicalized first: a dual-stack listener reports IPv4
//! peers as IPv4-mapped IPv6 (`::ffff:a.b.c.d`), which is resolved to the
//! plain IPv4 address for proxy trust and whitelist checks alike.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderValue, Request},
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::domain::SecurityConfig;

/// Header carrying the resolved client address to downstream services
pub const REAL_CLIENT_IP_HEADER: &str = "x-real-client-ip";

/// Resolved client address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Trusted proxy configuration
#[derive(Clone, Debug)]
pub struct TrustedProxyConfig {
    /// List of trusted proxy IPs
    pub trusted_proxies: Vec<IpAddr>,
    /// Trust local IPs (127.0.0.1, ::1)
    pub trust_localhost: bool,
    /// Trust private IPs (10.x.x.x, 192.168.x.x, 172.16-31.x.x)
    pub trust_private: bool,
    /// Header to use for real IP (X-Forwarded-For, X-Real-IP, etc.)
    pub real_ip_header: String,
    /// Number of trusted proxies in chain (for X-Forwarded-For)
    pub proxy_count: usize,
}

impl Default for TrustedProxyConfig {
    fn default() -> Self {
        Self::from(&SecurityConfig::default())
    }
}

impl From<&SecurityConfig> for TrustedProxyConfig {
    fn from(security: &SecurityConfig) -> Self {
        Self {
            trusted_proxies: security.trusted_proxies.clone(),
            trust_localhost: security.trust_localhost,
            trust_private: security.trust_private_ips,
            real_ip_header: security.real_ip_header.clone(),
            proxy_count: security.proxy_count,
        }
    }
}

/// IP protection layer
#[derive(Clone)]
pub struct IpProtectionLayer {
    config: Arc<TrustedProxyConfig>,
}

impl IpProtectionLayer {
    pub fn new(config: TrustedProxyConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// No trusted proxies: always use the direct peer address
    pub fn direct_only() -> Self {
        Self::new(TrustedProxyConfig {
            trusted_proxies: Vec::new(),
            trust_localhost: false,
            trust_private: false,
            real_ip_header: String::new(),
            proxy_count: 0,
        })
    }
}

impl<S> Layer<S> for IpProtectionLayer {
    type Service = IpProtectionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IpProtectionService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// IP protection service
#[derive(Clone)]
pub struct IpProtectionService<S> {
    inner: S,
    config: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for IpProtectionService<S>
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
        let config = Arc::clone(&self.config);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            // Never trust a caller-supplied copy of our own header
            parts.headers.remove(REAL_CLIENT_IP_HEADER);

            let direct_ip = parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_canonical());

            match direct_ip {
                Some(direct_ip) => {
                    let real_ip = determine_real_ip(&parts.headers, direct_ip, &config);

                    if let Ok(ip_str) = HeaderValue::from_str(&real_ip.to_string()) {
                        parts.headers.insert(REAL_CLIENT_IP_HEADER, ip_str);
                    }
                    parts.extensions.insert(ClientIp(real_ip));

                    if !is_trusted_proxy(direct_ip, &config) {
                        if let Some(forwarded) = parts.headers.get("x-forwarded-for") {
                            warn!(
                                direct_ip = %direct_ip,
                                forwarded = ?forwarded,
                                "Ignoring X-Forwarded-For from untrusted source"
                            );
                        }
                    }
                }
                None => {
                    // Downstream authorization fails closed without a ClientIp
                    debug!("No connection info on request; client address unknown");
                }
            }

            let req = Request::from_parts(parts, body);
            inner.call(req).await
        })
    }
}

/// Determine the real client IP based on trusted proxy configuration
fn determine_real_ip(
    headers: &axum::http::HeaderMap,
    direct_ip: IpAddr,
    config: &TrustedProxyConfig,
) -> IpAddr {
    let direct_ip = direct_ip.to_canonical();
    if !is_trusted_proxy(direct_ip, config) || config.real_ip_header.is_empty() {
        return direct_ip;
    }

    let Some(value_str) = headers
        .get(config.real_ip_header.as_str())
        .and_then(|v| v.to_str().ok())
    else {
        return direct_ip;
    };

    if config
        .real_ip_header
        .eq_ignore_ascii_case("x-forwarded-for")
    {
        // client, proxy1, proxy2: take the Nth from the right
        let ips: Vec<&str> = value_str.split(',').map(|s| s.trim()).collect();
        let index = ips.len().saturating_sub(config.proxy_count + 1);
        if let Some(ip) = ips.get(index).and_then(|s| parse_forwarded(s)) {
            debug!(
                header = config.real_ip_header,
                value = value_str,
                extracted_ip = %ip,
                "Extracted client IP from header"
            );
            return ip;
        }
    } else if let Some(ip) = parse_forwarded(value_str.trim()) {
        // X-Real-IP and friends carry a single address
        return ip;
    }

    direct_ip
}

fn parse_forwarded(value: &str) -> Option<IpAddr> {
    value.parse::<IpAddr>().ok().map(|ip| ip.to_canonical())
}

/// Check if an IP is a trusted proxy
fn is_trusted_proxy(ip: IpAddr, config: &TrustedProxyConfig) -> bool {
    config.trusted_proxies.contains(&ip)
        || (config.trust_localhost && ip.is_loopback())
        || (config.trust_private && is_private_ip(ip))
}

/// Check if IP is in private range
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_private() || ipv4.is_link_local(),
        IpAddr::V6(ipv6) => {
            // Unique local addresses (fc00::/7)
            (ipv6.octets()[0] & 0xfe) == 0xfc
        }
    }
}
