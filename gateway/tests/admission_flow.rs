//! 准入流程集成测试

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{
    FailingSubscriptionStore, FailingWindowStore, Harness, SlowSubscriptionStore, header,
    json_body, request,
};
use plangate_common::{ResourceKind, TenantId};
use plangate_gateway::middleware::TENANT_HEADER;
use plangate_gateway::routing::{FORWARDED_METHOD_HEADER, FORWARDED_URI_HEADER};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test]
async fn test_missing_tenant_is_unauthorized() {
    let harness = Harness::new();

    let response = harness
        .business_router()
        .oneshot(request(Method::GET, "/api/projects", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_create_below_cap_is_admitted() {
    let harness = Harness::new();
    harness.set_count("starter", ResourceKind::ClientSpace, 4);

    let response = harness
        .business_router()
        .oneshot(request(Method::POST, "/api/client-spaces", Some("starter")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(header(&response, "X-RateLimit-Limit"), Some("300"));
}

#[tokio::test]
async fn test_create_at_cap_is_rejected() {
    let harness = Harness::new();
    harness.set_count("starter", ResourceKind::ClientSpace, 5);

    let response = harness
        .business_router()
        .oneshot(request(Method::POST, "/api/client-spaces", Some("starter")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "QUOTA_EXCEEDED");
    assert_eq!(body["error"]["tier"], "Starter");
    assert_eq!(body["error"]["limit"], 5);
    assert_eq!(body["error"]["currentCount"], 5);
}

#[tokio::test]
async fn test_reads_are_not_quota_checked() {
    let harness = Harness::new();
    harness.set_count("starter", ResourceKind::ClientSpace, 99);

    let response = harness
        .business_router()
        .oneshot(request(Method::GET, "/api/projects", Some("starter")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unlimited_cap_after_many_creations() {
    let harness = Harness::new();
    harness.set_count("enterprise", ResourceKind::ClientSpace, 10_000);

    let result = harness
        .service
        .quota
        .can_create(&TenantId::new("enterprise"), ResourceKind::ClientSpace)
        .await
        .unwrap();
    assert!(result.allowed);

    let response = harness
        .business_router()
        .oneshot(request(Method::POST, "/api/client-spaces", Some("enterprise")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_external_count_kind_is_not_enforced() {
    let harness = Harness::new();

    let response = harness
        .business_router()
        .oneshot(request(
            Method::POST,
            "/api/client-spaces/cs-1/guests",
            Some("starter"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_feature_gate() {
    let harness = Harness::new();
    let app = harness.business_router();

    let denied = app
        .clone()
        .oneshot(request(Method::PUT, "/api/branding", Some("starter")))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    let body = json_body(denied).await;
    assert_eq!(body["error"]["code"], "FEATURE_NOT_AVAILABLE");
    assert_eq!(body["error"]["tier"], "Starter");

    let allowed = app
        .oneshot(request(Method::PUT, "/api/branding", Some("pro")))
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_checked_before_quota() {
    let harness = Harness::new();
    let app = harness.business_router();
    harness.set_count("tiny", ResourceKind::ClientSpace, 0);

    for _ in 0..20 {
        app.clone()
            .oneshot(request(Method::GET, "/api/projects", Some("tiny")))
            .await
            .unwrap();
    }

    let response = app
        .oneshot(request(Method::POST, "/api/client-spaces", Some("tiny")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_unknown_tenant_gets_fallback_tier() {
    let harness = Harness::new();

    let response = harness
        .business_router()
        .oneshot(request(Method::GET, "/api/projects", Some("newcomer")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "X-RateLimit-Limit"), Some("300"));
}

#[tokio::test]
async fn test_subscription_failure_uses_fallback_tier() {
    let harness = Harness::with_subscriptions(Arc::new(FailingSubscriptionStore));

    let response = harness
        .business_router()
        .oneshot(request(Method::GET, "/api/projects", Some("enterprise")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "X-RateLimit-Limit"), Some("300"));
}

#[tokio::test]
async fn test_slow_subscription_store_times_out_to_fallback() {
    let harness =
        Harness::with_subscriptions(Arc::new(SlowSubscriptionStore(Duration::from_secs(5))));

    let started = std::time::Instant::now();
    let response = harness
        .business_router()
        .oneshot(request(Method::GET, "/api/projects", Some("enterprise")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "X-RateLimit-Limit"), Some("300"));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_window_store_failure_fails_open() {
    let harness = Harness::with_window_store(Arc::new(FailingWindowStore));

    let response = harness
        .business_router()
        .oneshot(request(Method::GET, "/api/projects", Some("starter")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "X-RateLimit-Limit").is_none());
}

#[tokio::test]
async fn test_counter_failure_keeps_rate_headers() {
    let harness = Harness::with_failing_counter(ResourceKind::ClientSpace);

    let response = harness
        .business_router()
        .oneshot(request(Method::POST, "/api/client-spaces", Some("starter")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(header(&response, "X-RateLimit-Limit"), Some("300"));
    assert_eq!(header(&response, "X-RateLimit-Remaining"), Some("299"));
}

#[tokio::test]
async fn test_plan_change_visible_after_invalidate() {
    let harness = Harness::new();
    let tenant = TenantId::new("starter");
    let app = harness.business_router();

    app.clone()
        .oneshot(request(Method::GET, "/api/projects", Some("starter")))
        .await
        .unwrap();

    harness.subscriptions.assign(tenant.clone(), "Professional");
    harness.service.resolver.invalidate(&tenant).await;

    let response = app
        .oneshot(request(Method::GET, "/api/projects", Some("starter")))
        .await
        .unwrap();
    assert_eq!(header(&response, "X-RateLimit-Limit"), Some("1000"));
}

#[tokio::test]
async fn test_disabled_admission_passes_everything() {
    let harness = Harness::with_config("[admission]\nenabled = false\n");
    harness.set_count("starter", ResourceKind::ClientSpace, 5);

    let response = harness
        .business_router()
        .oneshot(request(Method::POST, "/api/client-spaces", Some("starter")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(header(&response, "X-RateLimit-Limit").is_none());
}

fn verify_request(tenant: &str, method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri("/admission/verify")
        .header(TENANT_HEADER, tenant)
        .header(FORWARDED_METHOD_HEADER, method)
        .header(FORWARDED_URI_HEADER, uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_forward_auth_admits_with_headers() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(verify_request("pro", "POST", "/api/client-spaces"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(header(&response, "X-RateLimit-Limit"), Some("1000"));
    assert_eq!(header(&response, "X-RateLimit-Remaining"), Some("999"));
}

#[tokio::test]
async fn test_forward_auth_rejects_over_quota() {
    let harness = Harness::new();
    harness.set_count("starter", ResourceKind::ClientSpace, 5);

    let response = harness
        .router()
        .oneshot(verify_request("starter", "POST", "/api/client-spaces"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "QUOTA_EXCEEDED");
}

#[tokio::test]
async fn test_forward_auth_requires_forwarded_headers() {
    let harness = Harness::new();
    harness.set_count("starter", ResourceKind::ClientSpace, 5);

    let missing_uri = Request::builder()
        .method(Method::GET)
        .uri("/admission/verify")
        .header(TENANT_HEADER, "starter")
        .header(FORWARDED_METHOD_HEADER, "POST")
        .body(Body::empty())
        .unwrap();
    let response = harness.router().oneshot(missing_uri).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = harness
        .router()
        .oneshot(verify_request("starter", "BAD METHOD", "/api/client-spaces"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
