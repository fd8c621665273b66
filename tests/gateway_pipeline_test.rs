//! # 网关准入流水线集成测试
//!
//! 用 wiremock 模拟后端与挑战校验服务，对完整路由树做端到端断言：
//! 来源授权、凭证注入、模型选择、限流与错误映射。

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Method, Request, StatusCode, header};
use futures::StreamExt;
use pretty_assertions::assert_eq;
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

const PLATFORM_SECRET: &str = "sk-or-platform";
const DEFAULT_MODEL: &str = "qwen/qwen3-30b-a3b-instruct-2507";
const HED_ORIGIN: &str = "https://hed.example.org";

struct TestGateway {
    router: Router,
    backend: MockServer,
}

fn test_config(
    backend_url: String,
    per_minute: u32,
    challenge_verify_url: Option<String>,
) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
        },
        backend: BackendConfig {
            url: backend_url,
            timeout_seconds: 5,
            max_error_body_bytes: 1024,
        },
        defaults: ModelDefaults {
            default_model: DEFAULT_MODEL.to_string(),
            default_model_provider: Some("nebius".to_string()),
            platform_credential_env: "OPENROUTER_API_KEY".to_string(),
        },
        rate_limit: RateLimitConfig {
            per_minute,
            per_hour: 1000,
        },
        redis: None,
        challenge: ChallengeConfig {
            verify_url: challenge_verify_url
                .unwrap_or_else(|| "https://challenge.invalid/siteverify".to_string()),
            secret_env: "TURNSTILE_SECRET_KEY".to_string(),
            timeout_ms: 800,
        },
    }
}

fn hed_tenants() -> TenantRegistry {
    TenantRegistry::from_policies(vec![TenantPolicy {
        tenant_id: "hed".to_string(),
        allowed_origins: vec![
            HED_ORIGIN.to_string(),
            "https://*.hed.example.org".to_string(),
        ],
        default_model: None,
        default_model_provider: None,
        credential_env: None,
    }])
    .unwrap()
}

async fn build_gateway(
    per_minute: u32,
    challenge_verify_url: Option<String>,
    extra_secrets: &[(&str, &str)],
) -> TestGateway {
    let backend = MockServer::start().await;
    let config = test_config(backend.uri(), per_minute, challenge_verify_url);
    let tenants = hed_tenants();

    let mut secrets = vec![("OPENROUTER_API_KEY", PLATFORM_SECRET)];
    secrets.extend_from_slice(extra_secrets);
    let resolver = Arc::new(MapSecretResolver::new(secrets));

    let context = AppContext::build(config, tenants, resolver).await.unwrap();
    TestGateway {
        router: GatewayServer::new(Arc::new(context)).router(),
        backend,
    }
}

fn request(
    http_method: Method,
    uri: &str,
    origin: Option<&str>,
    headers: &[(&str, &str)],
    body: Option<&Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(http_method)
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 54321))));
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn health_reports_component_snapshot() {
    let gateway = build_gateway(10, None, &[]).await;

    let response = gateway
        .router
        .oneshot(request(Method::GET, "/health", None, &[], None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["status"], json!("ok"));
    assert_eq!(body["data"]["tenants"], json!(1));
    assert_eq!(body["data"]["challenge_enabled"], json!(false));
    assert_eq!(body["data"]["counter_store"], json!("in-process"));
}

#[tokio::test]
async fn registered_origin_gets_platform_credential_and_default_model() {
    let gateway = build_gateway(10, None, &[]).await;
    Mock::given(method("POST"))
        .and(path("/hed/ask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": "42"})))
        .expect(1)
        .mount(&gateway.backend)
        .await;

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            Some(HED_ORIGIN),
            &[],
            Some(&json!({"question": "hi", "challenge_token": "tok-1"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body, json!({"answer": "42"}));

    let received = gateway.backend.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let forwarded = &received[0];
    assert_eq!(
        forwarded.headers.get("x-openrouter-key").unwrap(),
        PLATFORM_SECRET
    );
    let forwarded_body: Value = serde_json::from_slice(&forwarded.body).unwrap();
    assert_eq!(forwarded_body["model"], json!(DEFAULT_MODEL));
    assert_eq!(forwarded_body["provider"], json!("nebius"));
    assert!(forwarded_body.get("challenge_token").is_none());
}

#[tokio::test]
async fn unregistered_origin_without_caller_key_is_rejected() {
    let gateway = build_gateway(10, None, &[]).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&gateway.backend)
        .await;

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            Some("https://evil.example"),
            &[],
            Some(&json!({"question": "hi"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert_eq!(error_code(&body), "ORIGIN_REJECTED");
}

#[tokio::test]
async fn wildcard_subdomain_origin_is_accepted() {
    let gateway = build_gateway(10, None, &[]).await;
    Mock::given(method("POST"))
        .and(path("/hed/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&gateway.backend)
        .await;

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/chat",
            Some("https://staging.hed.example.org"),
            &[],
            Some(&json!({"messages": []})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn custom_model_without_caller_key_is_rejected() {
    let gateway = build_gateway(10, None, &[]).await;

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            Some(HED_ORIGIN),
            &[("x-model-override", "openai/gpt-5")],
            Some(&json!({"question": "hi"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert_eq!(error_code(&body), "CREDENTIAL_REQUIRED_FOR_MODEL");
}

#[tokio::test]
async fn caller_key_bypasses_origin_and_uses_custom_model() {
    let gateway = build_gateway(10, None, &[]).await;
    Mock::given(method("POST"))
        .and(path("/hed/ask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": "ok"})))
        .expect(2)
        .mount(&gateway.backend)
        .await;

    // 无 Origin、自带凭证：自定义模型放行，租户提供商提示被丢弃
    let response = gateway
        .router
        .clone()
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            None,
            &[
                ("x-openrouter-key", "sk-or-caller"),
                ("x-model-override", "openai/gpt-5"),
            ],
            Some(&json!({"question": "hi"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let received = gateway.backend.received_requests().await.unwrap();
    let forwarded = &received[0];
    assert_eq!(
        forwarded.headers.get("x-openrouter-key").unwrap(),
        "sk-or-caller"
    );
    let forwarded_body: Value = serde_json::from_slice(&forwarded.body).unwrap();
    assert_eq!(forwarded_body["model"], json!("openai/gpt-5"));
    assert!(forwarded_body.get("provider").is_none());

    // 自费请求可以显式指定提供商路由
    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            None,
            &[
                ("x-openrouter-key", "sk-or-caller"),
                ("x-model-override", "openai/gpt-5"),
                ("x-provider-override", "deepinfra"),
            ],
            Some(&json!({"question": "hi"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let received = gateway.backend.received_requests().await.unwrap();
    let forwarded_body: Value = serde_json::from_slice(&received[1].body).unwrap();
    assert_eq!(forwarded_body["provider"], json!("deepinfra"));
}

#[tokio::test]
async fn event_stream_responses_are_relayed_with_stream_headers() {
    let gateway = build_gateway(10, None, &[]).await;
    Mock::given(method("POST"))
        .and(path("/hed/ask"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw("data: {\"chunk\":1}\n\ndata: [DONE]\n\n", "text/event-stream"),
        )
        .mount(&gateway.backend)
        .await;

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            Some(HED_ORIGIN),
            &[],
            Some(&json!({"question": "hi", "stream": true})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.starts_with(b"data: "));
}

#[tokio::test]
async fn surplus_minute_request_is_rate_limited() {
    let gateway = build_gateway(2, None, &[]).await;
    Mock::given(method("POST"))
        .and(path("/hed/ask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&gateway.backend)
        .await;

    for _ in 0..2 {
        let response = gateway
            .router
            .clone()
            .oneshot(request(
                Method::POST,
                "/hed/ask",
                Some(HED_ORIGIN),
                &[],
                Some(&json!({"question": "hi"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            Some(HED_ORIGIN),
            &[],
            Some(&json!({"question": "hi"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = response_json(response).await;
    assert_eq!(error_code(&body), "RATE_LIMITED");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("per minute")
    );
}

#[tokio::test]
async fn caller_funded_requests_share_the_rate_limit() {
    let gateway = build_gateway(1, None, &[]).await;
    Mock::given(method("POST"))
        .and(path("/hed/ask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&gateway.backend)
        .await;

    // 自带凭证免挑战,不免限流
    let byoc = || {
        request(
            Method::POST,
            "/hed/ask",
            None,
            &[("x-openrouter-key", "sk-or-caller")],
            Some(&json!({"question": "hi"})),
        )
    };

    let response = gateway.router.clone().oneshot(byoc()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = gateway.router.oneshot(byoc()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = response_json(response).await;
    assert_eq!(error_code(&body), "RATE_LIMITED");
}

#[tokio::test]
async fn read_only_routes_count_against_the_rate_limit() {
    let gateway = build_gateway(1, None, &[]).await;
    Mock::given(method("GET"))
        .and(path("/hed/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tenant": "hed"})))
        .expect(1)
        .mount(&gateway.backend)
        .await;

    let response = gateway
        .router
        .clone()
        .oneshot(request(Method::GET, "/hed/", Some(HED_ORIGIN), &[], None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = gateway
        .router
        .clone()
        .oneshot(request(Method::GET, "/hed/", Some(HED_ORIGIN), &[], None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = response_json(response).await;
    assert_eq!(error_code(&body), "RATE_LIMITED");

    // 同一 IP 的公开指标路由也共享额度
    let response = gateway
        .router
        .oneshot(request(
            Method::GET,
            "/hed/metrics/public",
            Some(HED_ORIGIN),
            &[],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn stream_chunks_arrive_one_by_one_in_backend_order() {
    const CHUNKS: [&str; 3] = [
        "data: {\"delta\":\"fir\"}\n\n",
        "data: {\"delta\":\"st\"}\n\n",
        "data: [DONE]\n\n",
    ];

    // wiremock 一次性吐完整响应体,验证逐块中继得自己起一个分块后端
    let backend = Router::new().route(
        "/hed/ask",
        axum::routing::post(|| async {
            let frames = futures::stream::iter(CHUNKS).then(|chunk| async move {
                tokio::time::sleep(std::time::Duration::from_millis(80)).await;
                Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(chunk))
            });
            axum::response::Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from_stream(frames))
                .unwrap()
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, backend).await.unwrap() });

    let config = test_config(backend_url, 10, None);
    let resolver = Arc::new(MapSecretResolver::new(vec![(
        "OPENROUTER_API_KEY",
        PLATFORM_SECRET,
    )]));
    let context = AppContext::build(config, hed_tenants(), resolver)
        .await
        .unwrap();
    let router = GatewayServer::new(Arc::new(context)).router();

    let response = router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            Some(HED_ORIGIN),
            &[],
            Some(&json!({"question": "hi", "stream": true})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let mut received = Vec::new();
    while let Some(chunk) = body.next().await {
        received.push(String::from_utf8(chunk.unwrap().to_vec()).unwrap());
    }
    assert_eq!(received, CHUNKS);
}

#[tokio::test]
async fn backend_error_bodies_pass_through_verbatim() {
    let gateway = build_gateway(10, None, &[]).await;
    Mock::given(method("POST"))
        .and(path("/hed/ask"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(json!({"detail": "backend is drowning"})),
        )
        .mount(&gateway.backend)
        .await;

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            Some(HED_ORIGIN),
            &[],
            Some(&json!({"question": "hi"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = response_json(response).await;
    assert_eq!(body, json!({"detail": "backend is drowning"}));
}

#[tokio::test]
async fn unknown_tenant_is_not_found() {
    let gateway = build_gateway(10, None, &[]).await;

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/nope/ask",
            Some(HED_ORIGIN),
            &[],
            Some(&json!({"question": "hi"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(error_code(&body), "TENANT_NOT_FOUND");
}

#[tokio::test]
async fn challenge_rejection_blocks_platform_funded_requests() {
    let siteverify = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/siteverify"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "error-codes": ["invalid-input-response"]})),
        )
        .mount(&siteverify)
        .await;

    let gateway = build_gateway(
        10,
        Some(format!("{}/siteverify", siteverify.uri())),
        &[("TURNSTILE_SECRET_KEY", "ts-secret")],
    )
    .await;

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            Some(HED_ORIGIN),
            &[("x-challenge-token", "bad-token")],
            Some(&json!({"question": "hi"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert_eq!(error_code(&body), "CHALLENGE_FAILED");
}

#[tokio::test]
async fn missing_challenge_token_is_rejected_when_enabled() {
    let siteverify = MockServer::start().await;
    let gateway = build_gateway(
        10,
        Some(format!("{}/siteverify", siteverify.uri())),
        &[("TURNSTILE_SECRET_KEY", "ts-secret")],
    )
    .await;

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            Some(HED_ORIGIN),
            &[],
            Some(&json!({"question": "hi"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert_eq!(error_code(&body), "CHALLENGE_FAILED");
}

#[tokio::test]
async fn accepted_challenge_lets_the_request_through() {
    let siteverify = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/siteverify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&siteverify)
        .await;

    let gateway = build_gateway(
        10,
        Some(format!("{}/siteverify", siteverify.uri())),
        &[("TURNSTILE_SECRET_KEY", "ts-secret")],
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/hed/ask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&gateway.backend)
        .await;

    let response = gateway
        .router
        .oneshot(request(
            Method::POST,
            "/hed/ask",
            Some(HED_ORIGIN),
            &[("x-challenge-token", "good-token")],
            Some(&json!({"question": "hi"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_config_fetch_is_an_anonymous_read_only_passthrough() {
    let gateway = build_gateway(10, None, &[]).await;
    Mock::given(method("GET"))
        .and(path("/hed/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"tenant": "hed", "widget": {}})),
        )
        .expect(2)
        .mount(&gateway.backend)
        .await;

    for _ in 0..2 {
        let response = gateway
            .router
            .clone()
            .oneshot(request(Method::GET, "/hed/", Some(HED_ORIGIN), &[], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["tenant"], json!("hed"));
    }

    // 只读路由不注入凭证
    let received = gateway.backend.received_requests().await.unwrap();
    assert!(received[0].headers.get("x-openrouter-key").is_none());
}

#[tokio::test]
async fn preflight_echoes_platform_origins_and_falls_back_otherwise() {
    let gateway = build_gateway(10, None, &[]).await;

    let response = gateway
        .router
        .clone()
        .oneshot(request(
            Method::OPTIONS,
            "/hed/ask",
            Some("https://demo.osc.earth"),
            &[],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "https://demo.osc.earth"
    );

    let response = gateway
        .router
        .oneshot(request(
            Method::OPTIONS,
            "/hed/ask",
            Some("https://evil.example"),
            &[],
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "https://demo.osc.earth"
    );
}
