// tests/gateway/router_tests.rs

#[cfg(test)]
mod tests {
    use crate::fixtures::test_clock::TestClock;
    use axum::Router;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::header::{CONTENT_TYPE, HOST, RETRY_AFTER};
    use axum::http::{Request, StatusCode};
    use chrono::TimeDelta;
    use ip_gate::web::{AppState, router};
    use ip_gate::{Gate, GatewayConfig, Ledger, Throttle, ThrottleConfig, parse_trusted_proxies};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        ledger: Arc<Ledger<TestClock>>,
        clock: TestClock,
    }

    fn harness(config: GatewayConfig) -> Harness {
        let clock = TestClock::new();
        let ledger = Arc::new(Ledger::with_config(&config, clock.clone()));
        let gate = Arc::new(Gate::new(Arc::clone(&ledger), &config));
        let throttle = Arc::new(Throttle::with_config(config.throttle(), clock.clone()).unwrap());
        let state = AppState::new(gate, throttle, config.proxies().to_vec());
        Harness {
            app: router(state),
            ledger,
            clock,
        }
    }

    fn from(app: &Router, peer: &str) -> Router {
        let addr = SocketAddr::new(peer.parse().unwrap(), 40000);
        app.clone().layer(MockConnectInfo(addr))
    }

    fn unlock(pass: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/unlock")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("pass={pass}")))
            .unwrap()
    }

    fn access(host: &str) -> Request<Body> {
        Request::builder()
            .uri("/access")
            .header(HOST, host)
            .body(Body::empty())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn unlock_response_does_not_reveal_outcome() {
        let h = harness(GatewayConfig::new("s3cret"));
        let app = from(&h.app, "203.0.113.5");

        let wrong = app.clone().oneshot(unlock("nope")).await.unwrap();
        let wrong_status = wrong.status();
        let wrong_body = body_text(wrong).await;

        let right = app.clone().oneshot(unlock("s3cret")).await.unwrap();
        let right_status = right.status();
        let right_body = body_text(right).await;

        assert_eq!(wrong_status, StatusCode::OK);
        assert_eq!(right_status, wrong_status);
        assert_eq!(right_body, wrong_body);
        assert!(h.ledger.lookup("203.0.113.5").is_some());
    }

    #[tokio::test]
    async fn malformed_secret_is_a_bad_request() {
        let h = harness(GatewayConfig::new("s3cret"));
        let app = from(&h.app, "203.0.113.5");
        let response = app.oneshot(unlock("%00")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn secret_that_is_not_utf8_is_a_bad_request() {
        let h = harness(GatewayConfig::new("s3cret"));
        let response = from(&h.app, "203.0.113.7")
            .oneshot(unlock("%FF%FE"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(h.ledger.is_empty());

        let audit = from(&h.app, "203.0.113.5").oneshot(get("/audit")).await.unwrap();
        let html = body_text(audit).await;
        assert!(!html.contains("203.0.113.7"));
        assert!(!html.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn percent_encoded_secret_is_decoded() {
        let h = harness(GatewayConfig::new("open sesame!"));
        let app = from(&h.app, "203.0.113.5");
        let response = app.oneshot(unlock("open+sesame%21")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(h.ledger.lookup("203.0.113.5").is_some());
    }

    #[tokio::test]
    async fn access_requires_a_grant() {
        let h = harness(GatewayConfig::new("s3cret"));
        let app = from(&h.app, "203.0.113.5");

        let denied = app.clone().oneshot(access("wiki.example")).await.unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        app.clone().oneshot(unlock("s3cret")).await.unwrap();
        let allowed = app.clone().oneshot(access("wiki.example")).await.unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let other = from(&h.app, "203.0.113.6");
        let stranger = other.oneshot(access("wiki.example")).await.unwrap();
        assert_eq!(stranger.status(), StatusCode::UNAUTHORIZED);

        let record = h.ledger.lookup("203.0.113.5").unwrap();
        assert_eq!(record.domains(), vec!["wiki.example"]);
    }

    #[tokio::test]
    async fn expired_grant_gets_unauthorized() {
        let h = harness(GatewayConfig::new("s3cret"));
        let app = from(&h.app, "203.0.113.5");
        app.clone().oneshot(unlock("s3cret")).await.unwrap();

        h.clock.advance(TimeDelta::days(31));
        let response = app.oneshot(access("wiki.example")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.ledger.len(), 1);
    }

    #[tokio::test]
    async fn unlock_is_throttled_per_ip() {
        let config = GatewayConfig::new("s3cret").unlock_throttle(ThrottleConfig::new(1.0, 1.0));
        let h = harness(config);
        let app = from(&h.app, "203.0.113.5");

        for _ in 0..2 {
            let ok = app.clone().oneshot(unlock("nope")).await.unwrap();
            assert_eq!(ok.status(), StatusCode::OK);
        }
        let limited = app.clone().oneshot(unlock("s3cret")).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.headers()[RETRY_AFTER], "1");
        assert!(h.ledger.is_empty());

        let other = from(&h.app, "203.0.113.6");
        let fine = other.oneshot(unlock("s3cret")).await.unwrap();
        assert_eq!(fine.status(), StatusCode::OK);

        h.clock.advance(TimeDelta::seconds(1));
        let retried = app.oneshot(unlock("s3cret")).await.unwrap();
        assert_eq!(retried.status(), StatusCode::OK);
        assert!(h.ledger.lookup("203.0.113.5").is_some());
    }

    #[tokio::test]
    async fn trusted_proxy_forwards_client_ip() {
        let config = GatewayConfig::new("s3cret")
            .trusted_proxies(parse_trusted_proxies("127.0.0.1").unwrap());
        let h = harness(config);
        let app = from(&h.app, "127.0.0.1");

        let mut request = unlock("s3cret");
        request
            .headers_mut()
            .insert("x-forwarded-for", "198.51.100.20".parse().unwrap());
        app.oneshot(request).await.unwrap();

        assert!(h.ledger.lookup("198.51.100.20").is_some());
        assert!(h.ledger.lookup("127.0.0.1").is_none());
    }

    #[tokio::test]
    async fn untrusted_peer_cannot_spoof_forwarded_for() {
        let h = harness(GatewayConfig::new("s3cret"));
        let app = from(&h.app, "203.0.113.5");

        let mut request = unlock("s3cret");
        request
            .headers_mut()
            .insert("x-forwarded-for", "198.51.100.20".parse().unwrap());
        app.oneshot(request).await.unwrap();

        assert!(h.ledger.lookup("203.0.113.5").is_some());
        assert!(h.ledger.lookup("198.51.100.20").is_none());
    }

    #[tokio::test]
    async fn buckets_view_validates_and_renders() {
        let h = harness(GatewayConfig::new("s3cret"));
        let app = from(&h.app, "203.0.113.5");
        app.clone().oneshot(unlock("s3cret")).await.unwrap();
        app.clone().oneshot(access("wiki.example")).await.unwrap();

        let ok = app.clone().oneshot(get("/buckets?ip=203.0.113.5")).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(body_text(ok).await.contains("2024-05-01T10:00:00+00:00"));

        let bad = app.clone().oneshot(get("/buckets?ip=1.2.3.4%0d%0a")).await.unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let long = format!("/buckets?ip={}", "9".repeat(200));
        let too_long = app.clone().oneshot(get(&long)).await.unwrap();
        assert_eq!(too_long.status(), StatusCode::BAD_REQUEST);

        let missing = app.clone().oneshot(get("/buckets?ip=10.9.9.9")).await.unwrap();
        assert!(body_text(missing).await.contains("No record."));

        let encoded = app.oneshot(get("/buckets?ip=203%2E0%2E113%2E5")).await.unwrap();
        assert_eq!(encoded.status(), StatusCode::OK);
        assert!(body_text(encoded).await.contains("2024-05-01T10:00:00+00:00"));
    }

    #[tokio::test]
    async fn bucket_ip_that_is_not_utf8_is_a_bad_request() {
        let h = harness(GatewayConfig::new("s3cret"));
        let app = from(&h.app, "203.0.113.5");
        let response = app.clone().oneshot(get("/buckets?ip=%FF%FE")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let truncated = app.oneshot(get("/buckets?ip=10.0.0.1%C3")).await.unwrap();
        assert_eq!(truncated.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn audit_lists_grants_and_failures() {
        let h = harness(GatewayConfig::new("s3cret"));
        from(&h.app, "203.0.113.5")
            .oneshot(unlock("s3cret"))
            .await
            .unwrap();
        from(&h.app, "203.0.113.9")
            .oneshot(unlock("<guess>"))
            .await
            .unwrap();

        let response = from(&h.app, "203.0.113.5").oneshot(get("/audit")).await.unwrap();
        let html = body_text(response).await;
        assert!(html.contains("203.0.113.5"));
        assert!(html.contains("203.0.113.9"));
        assert!(html.contains("&lt;guess&gt;"));
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let h = harness(GatewayConfig::new("s3cret"));
        let response = from(&h.app, "203.0.113.5").oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
