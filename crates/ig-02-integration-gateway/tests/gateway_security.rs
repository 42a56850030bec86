//! End-to-end tests of the gateway middleware stack.

use axum::{
    body::Body,
    extract::{ConnectInfo, Extension},
    http::{header, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use ig_02_integration_gateway::{
    AuthenticatedClient, CredentialService, EmptyWhitelistPolicy, GatewayConfig,
    IntegrationGateway,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const ORDERS: &str = "/api/v1/orders";

async fn whoami(Extension(client): Extension<AuthenticatedClient>) -> String {
    client.client_name
}

fn routes() -> Router {
    Router::new().route(ORDERS, get(whoami))
}

struct Harness {
    gateway: IntegrationGateway,
    app: Router,
}

impl Harness {
    fn new(config: GatewayConfig) -> Self {
        let gateway = IntegrationGateway::new(config).unwrap();
        let app = gateway.protect(routes());
        Self { gateway, app }
    }

    fn credentials(&self) -> Arc<CredentialService> {
        self.gateway.credentials()
    }

    async fn client_with_key(&self, name: &str) -> (Uuid, String) {
        let creds = self.credentials();
        let client = creds.create_client(name, "dealer-1").await.unwrap();
        let issued = creds.issue_key(client.id, None).await.unwrap();
        (client.id, issued.plaintext)
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }
}

fn request(peer: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(ORDERS);
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    let mut req = builder.body(Body::empty()).unwrap();
    let addr: SocketAddr = peer.parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_missing_key_rejected() {
    let h = Harness::new(GatewayConfig::default());

    let response = h.send(request("198.51.100.4:5000", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "missing_api_key");
}

#[tokio::test]
async fn test_unknown_key_rejected() {
    let h = Harness::new(GatewayConfig::default());
    let fake = format!("ig_live_{}", "0".repeat(64));

    let response = h.send(request("198.51.100.4:5000", Some(&fake))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["code"], "invalid_api_key");
}

#[tokio::test]
async fn test_valid_key_empty_whitelist_allowed() {
    let h = Harness::new(GatewayConfig::default());
    let (_, key) = h.client_with_key("erp-sync").await;

    let response = h.send(request("198.51.100.4:5000", Some(&key))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text_body(response).await, "erp-sync");
}

#[tokio::test]
async fn test_bearer_token_accepted() {
    let h = Harness::new(GatewayConfig::default());
    let (_, key) = h.client_with_key("erp-sync").await;

    let mut req = request("198.51.100.4:5000", None);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", key).parse().unwrap(),
    );

    assert_eq!(h.send(req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_empty_whitelist_deny_policy() {
    let mut config = GatewayConfig::default();
    config.security.empty_whitelist = EmptyWhitelistPolicy::Deny;
    let h = Harness::new(config);
    let (_, key) = h.client_with_key("erp-sync").await;

    let response = h.send(request("198.51.100.4:5000", Some(&key))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["code"], "ip_not_allowed");
}

#[tokio::test]
async fn test_cidr_whitelist_enforced() {
    let h = Harness::new(GatewayConfig::default());
    let (client_id, key) = h.client_with_key("erp-sync").await;
    h.credentials()
        .add_whitelist_entry(client_id, "192.168.10.0/24", None)
        .await
        .unwrap();

    let inside = h.send(request("192.168.10.200:443", Some(&key))).await;
    assert_eq!(inside.status(), StatusCode::OK);

    let outside = h.send(request("192.168.11.1:443", Some(&key))).await;
    assert_eq!(outside.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ipv6_whitelist_and_family_isolation() {
    let h = Harness::new(GatewayConfig::default());
    let (client_id, key) = h.client_with_key("erp-sync").await;
    h.credentials()
        .add_whitelist_entry(client_id, "2001:db8::/32", None)
        .await
        .unwrap();

    let v6 = h.send(request("[2001:db8:1::5]:443", Some(&key))).await;
    assert_eq!(v6.status(), StatusCode::OK);

    let v4 = h.send(request("32.1.13.184:443", Some(&key))).await;
    assert_eq!(v4.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_dual_stack_ipv4_peer_matches_ipv4_whitelist() {
    let h = Harness::new(GatewayConfig::default());
    let (client_id, key) = h.client_with_key("erp-sync").await;
    h.credentials()
        .add_whitelist_entry(client_id, "10.0.0.0/8", None)
        .await
        .unwrap();

    // What a socket bound to [::] reports for an IPv4 caller
    let response = h.send(request("[::ffff:10.0.0.5]:1", Some(&key))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let outside = h.send(request("[::ffff:11.0.0.5]:1", Some(&key))).await;
    assert_eq!(outside.status(), StatusCode::FORBIDDEN);

    let records = h.gateway.usage_log().recent(10);
    assert_eq!(records[0].source_ip, Some("10.0.0.5".parse().unwrap()));
}

#[tokio::test]
async fn test_revoked_key_stays_revoked_under_traffic() {
    let h = Harness::new(GatewayConfig::default());
    let creds = h.credentials();
    let (client_id, key) = h.client_with_key("erp-sync").await;
    let key_id = creds.list_keys(client_id).await.unwrap()[0].id;

    let traffic: Vec<_> = (0..16)
        .map(|_| {
            let app = h.app.clone();
            let key = key.clone();
            tokio::spawn(async move {
                app.oneshot(request("198.51.100.4:5000", Some(&key)))
                    .await
                    .unwrap()
                    .status()
            })
        })
        .collect();
    let revoked = creds.revoke_key(key_id).await.unwrap();
    for task in traffic {
        let status = task.await.unwrap();
        assert!(status == StatusCode::OK || status == StatusCode::UNAUTHORIZED);
    }

    assert_eq!(creds.get_key(key_id).await.unwrap().revoked_at, revoked.revoked_at);
    let response = h.send(request("198.51.100.4:5000", Some(&key))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forwarded_for_ignored_from_untrusted_peer() {
    let h = Harness::new(GatewayConfig::default());
    let (client_id, key) = h.client_with_key("erp-sync").await;
    h.credentials()
        .add_whitelist_entry(client_id, "10.0.0.0/8", None)
        .await
        .unwrap();

    let mut req = request("198.51.100.4:5000", Some(&key));
    req.headers_mut()
        .insert("x-forwarded-for", "10.1.2.3".parse().unwrap());
    req.headers_mut()
        .insert("x-real-client-ip", "10.1.2.3".parse().unwrap());

    assert_eq!(h.send(req).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_forwarded_for_honored_from_trusted_proxy() {
    let h = Harness::new(GatewayConfig::default());
    let (client_id, key) = h.client_with_key("erp-sync").await;
    h.credentials()
        .add_whitelist_entry(client_id, "10.0.0.0/8", None)
        .await
        .unwrap();

    // Loopback peers are trusted by default
    let mut req = request("127.0.0.1:5000", Some(&key));
    req.headers_mut()
        .insert("x-forwarded-for", "10.1.2.3".parse().unwrap());

    assert_eq!(h.send(req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_peer_fails_closed() {
    let h = Harness::new(GatewayConfig::default());
    let (_, key) = h.client_with_key("erp-sync").await;

    let req = Request::builder()
        .uri(ORDERS)
        .header("X-API-Key", key)
        .body(Body::empty())
        .unwrap();

    let response = h.send(req).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["code"], "ip_not_allowed");
}

#[tokio::test]
async fn test_disabled_client_and_revoked_key() {
    let h = Harness::new(GatewayConfig::default());
    let creds = h.credentials();
    let (client_id, key) = h.client_with_key("erp-sync").await;

    creds.set_client_active(client_id, false).await.unwrap();
    let response = h.send(request("198.51.100.4:5000", Some(&key))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["code"], "client_disabled");

    creds.set_client_active(client_id, true).await.unwrap();
    let key_id = creds.list_keys(client_id).await.unwrap()[0].id;
    creds.revoke_key(key_id).await.unwrap();

    let response = h.send(request("198.51.100.4:5000", Some(&key))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["code"], "api_key_revoked");
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let h = Harness::new(GatewayConfig::default());
    let (client_id, key) = h.client_with_key("erp-sync").await;
    let (_, other_key) = h.client_with_key("crm-sync").await;
    h.credentials()
        .set_rate_limit(client_id, Some(2))
        .await
        .unwrap();

    for _ in 0..2 {
        let ok = h.send(request("198.51.100.4:5000", Some(&key))).await;
        assert_eq!(ok.status(), StatusCode::OK);
    }

    let limited = h.send(request("198.51.100.4:5000", Some(&key))).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(json_body(limited).await["error"]["code"], "rate_limited");

    // Other clients have their own budget
    let other = h.send(request("198.51.100.4:5000", Some(&other_key))).await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_usage_and_metrics_recorded() {
    let h = Harness::new(GatewayConfig::default());
    let (client_id, key) = h.client_with_key("erp-sync").await;
    h.credentials()
        .add_whitelist_entry(client_id, "203.0.113.0/24", None)
        .await
        .unwrap();

    h.send(request("203.0.113.9:5000", Some(&key))).await;
    h.send(request("198.51.100.4:5000", Some(&key))).await;
    h.send(request("198.51.100.4:5000", None)).await;

    let log = h.gateway.usage_log();
    let records = log.recent(10);
    assert_eq!(records.len(), 3);

    assert_eq!(records[0].status, 200);
    assert_eq!(records[0].client_id, Some(client_id));
    assert_eq!(records[0].path, ORDERS);
    assert_eq!(records[0].method, "GET");

    // Rejected requests carry the source address but no identity
    assert_eq!(records[1].status, 403);
    assert_eq!(records[1].client_id, None);
    assert_eq!(records[1].source_ip, Some("198.51.100.4".parse().unwrap()));
    assert_eq!(records[2].status, 401);

    assert_eq!(log.request_count(client_id), 1);

    let metrics = h.gateway.metrics().snapshot();
    assert_eq!(metrics.requests_total, 3);
    assert_eq!(metrics.requests_authorized, 1);
    assert_eq!(metrics.rejected_ip_not_allowed, 1);
    assert_eq!(metrics.rejected_missing_key, 1);
}

#[tokio::test]
async fn test_usage_logging_can_be_disabled() {
    let mut config = GatewayConfig::default();
    config.usage.enabled = false;
    let h = Harness::new(config);
    let (_, key) = h.client_with_key("erp-sync").await;

    let response = h.send(request("198.51.100.4:5000", Some(&key))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.gateway.usage_log().is_empty());
}
