use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    modules,
    web::{AppState, auth},
};

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config().max_body_bytes();

    Router::new()
        .route("/login", get(auth::login_page).post(auth::process_login))
        .route("/logout", post(auth::logout))
        .route("/api/token", post(auth::issue_token))
        .route("/healthz", get(healthz))
        .merge(modules::summarizer::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{
        accounts::{self, InMemoryAccountStore},
        config::AppConfig,
        modules::summarizer::HistoryPolicy,
        test_support::{FakeCompletion, service_with},
        web::auth::SESSION_COOKIE,
    };

    async fn seeded_router() -> Router {
        seeded_router_with(AppConfig::for_tests()).await
    }

    async fn seeded_router_with(config: AppConfig) -> Router {
        let store = Arc::new(InMemoryAccountStore::new());
        accounts::ensure_seed_user(store.as_ref(), &config.auth)
            .await
            .expect("seed");
        let harness = service_with(FakeCompletion::ok("s"), HistoryPolicy::default());
        build_router(AppState::from_parts(
            config,
            harness.service,
            harness.history,
            store,
        ))
    }

    #[tokio::test]
    async fn token_endpoint_issues_bearer_tokens() {
        let router = seeded_router().await;
        let response = router
            .oneshot(
                Request::post("/api/token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=demo-user&password=change-me"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["token_type"], "bearer");
        assert!(body["access_token"].as_str().is_some_and(|token| !token.is_empty()));
    }

    #[tokio::test]
    async fn wrong_password_gets_401() {
        let router = seeded_router().await;
        let response = router
            .oneshot(
                Request::post("/api/token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=demo-user&password=nope"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_sets_an_http_only_session_cookie() {
        let router = seeded_router().await;
        let response = router
            .oneshot(
                Request::post("/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=demo-user&password=change-me"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .expect("set-cookie");
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}=")));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn secure_cookie_setting_marks_the_session_cookie() {
        let mut config = AppConfig::for_tests();
        config.auth.secure_cookie = true;
        let router = seeded_router_with(config).await;
        let response = router
            .oneshot(
                Request::post("/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=demo-user&password=change-me"))
                    .expect("request"),
            )
            .await
            .expect("response");

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .expect("set-cookie");
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn healthz_is_public() {
        let router = seeded_router().await;
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
