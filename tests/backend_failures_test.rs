//! # 后端故障分类集成测试
//!
//! 验证传输层故障到网关状态码的映射:超时 504、不可达 503、协议错误 502

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::util::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use osa_gateway::auth::MapSecretResolver;
use osa_gateway::config::{
    AppConfig, BackendConfig, ChallengeConfig, ModelDefaults, RateLimitConfig, ServerConfig,
    TenantPolicy, TenantRegistry,
};
use osa_gateway::gateway::{AppContext, GatewayServer};

async fn build_router(backend_url: String, timeout_seconds: u64) -> Router {
    let config = AppConfig {
        server: ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
        },
        backend: BackendConfig {
            url: backend_url,
            timeout_seconds,
            max_error_body_bytes: 1024,
        },
        defaults: ModelDefaults {
            default_model: "qwen/qwen3-30b-a3b-instruct-2507".to_string(),
            default_model_provider: None,
            platform_credential_env: "OPENROUTER_API_KEY".to_string(),
        },
        rate_limit: RateLimitConfig {
            per_minute: 100,
            per_hour: 1000,
        },
        redis: None,
        challenge: ChallengeConfig {
            verify_url: "https://challenge.invalid/siteverify".to_string(),
            secret_env: "TURNSTILE_SECRET_KEY".to_string(),
            timeout_ms: 800,
        },
    };

    let tenants = TenantRegistry::from_policies(vec![TenantPolicy {
        tenant_id: "hed".to_string(),
        allowed_origins: vec!["https://hed.example.org".to_string()],
        default_model: None,
        default_model_provider: None,
        credential_env: None,
    }])
    .unwrap();

    let resolver = Arc::new(MapSecretResolver::new([(
        "OPENROUTER_API_KEY",
        "sk-or-platform",
    )]));
    let context = AppContext::build(config, tenants, resolver).await.unwrap();
    GatewayServer::new(Arc::new(context)).router()
}

fn ask_request() -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/hed/ask")
        .header(header::ORIGIN, "https://hed.example.org")
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 54321))))
        .body(Body::from(
            serde_json::to_vec(&json!({"question": "hi"})).unwrap(),
        ))
        .unwrap()
}

async fn error_code(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn unreachable_backend_maps_to_503() {
    // 端口 1 上没有监听者,连接立即被拒绝
    let router = build_router("http://127.0.0.1:1".to_string(), 5).await;

    let response = router.oneshot(ask_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(response).await, "BACKEND_UNREACHABLE");
}

#[tokio::test]
async fn slow_backend_maps_to_504() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hed/ask"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&backend)
        .await;

    let router = build_router(backend.uri(), 1).await;
    let response = router.oneshot(ask_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(error_code(response).await, "BACKEND_TIMEOUT");
}

#[tokio::test]
async fn malformed_backend_json_maps_to_502() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hed/ask"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("not json at all", "application/json"),
        )
        .mount(&backend)
        .await;

    let router = build_router(backend.uri(), 5).await;
    let response = router.oneshot(ask_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(response).await, "BACKEND_PROTOCOL_ERROR");
}
