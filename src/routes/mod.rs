//! Router assembly: public and authenticated HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::auth::require_auth;
use crate::state::AppState;

pub mod account;
pub mod http;

/// CORS policy. With no configured origins anything goes (no credentials);
/// with origins, only those may call us, cookies included.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(target: "recall_backend", origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the application router with:
/// - public routes: health, register, login
/// - authenticated routes behind `require_auth` (accessToken cookie)
/// - CORS
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    let protected = Router::new()
        .route("/api/v1/auth/logout", post(account::http_post_logout))
        .route("/api/v1/auth/me", get(account::http_get_me).delete(account::http_delete_me))
        .route("/api/v1/recall/generate", post(http::http_post_generate))
        .route("/api/v1/recall/questions", get(http::http_get_questions))
        .route("/api/v1/recall/questions/:id/answers", get(http::http_get_answers))
        .route("/api/v1/recall/feedback", post(http::http_post_feedback))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/auth/register", post(account::http_post_register))
        .route("/api/v1/auth/login", post(account::http_post_login))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::cache::{Cache, CacheError, CacheResult};
    use crate::openai::tests::{client_for, completion};
    use crate::recall::questions_cache_key;
    use crate::state::tests::test_state;

    fn app_with(state: AppState) -> Router {
        build_router(Arc::new(state), cors_layer(&[]))
    }

    /// Cache whose every call fails, as when Redis is unreachable.
    struct DownCache;

    fn redis_down(key: &str) -> CacheError {
        CacheError::Redis {
            key: key.to_string(),
            source: redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")),
        }
    }

    #[async_trait]
    impl Cache for DownCache {
        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            Err(redis_down(key))
        }
        async fn set(&self, key: &str, _value: String) -> CacheResult<()> {
            Err(redis_down(key))
        }
        async fn del(&self, key: &str) -> CacheResult<()> {
            Err(redis_down(key))
        }
        async fn exists(&self, key: &str) -> CacheResult<bool> {
            Err(redis_down(key))
        }
        async fn ping(&self) -> CacheResult<()> {
            Err(redis_down(""))
        }
    }

    fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn empty_request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// `accessToken=...` pair from the Set-Cookie header.
    fn session_from(response: &Response) -> String {
        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn register(app: &Router, email: &str) -> String {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                json!({ "email": email, "password": "hunter2hunter2" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        session_from(&response)
    }

    #[tokio::test]
    async fn health_reports_backends() {
        let app = app_with(test_state(None));
        let response = app.oneshot(empty_request("GET", "/api/v1/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ok": true, "store": true, "cache": true }));
    }

    #[tokio::test]
    async fn protected_routes_require_the_cookie() {
        let app = app_with(test_state(None));

        let response = app.clone().oneshot(empty_request("GET", "/api/v1/recall/questions", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Access token missing");

        let response = app
            .oneshot(empty_request("GET", "/api/v1/recall/questions", Some("accessToken=garbage")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Invalid or expired access token");
    }

    #[tokio::test]
    async fn missing_jwt_secret_is_a_server_error() {
        let mut state = test_state(None);
        state.auth.jwt_secret = None;
        let app = app_with(state);

        let response = app
            .oneshot(empty_request("GET", "/api/v1/auth/me", Some("accessToken=anything")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "No secret key found");
    }

    #[tokio::test]
    async fn register_without_jwt_secret_creates_no_user() {
        let mut state = test_state(None);
        state.auth.jwt_secret = None;
        let state = Arc::new(state);
        let app = build_router(state.clone(), cors_layer(&[]));

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                json!({ "email": "ada@example.com", "password": "hunter2hunter2" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(body_json(response).await["message"], "No secret key found");
        assert!(state.store.find_user_by_email("ada@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_me_drops_the_cached_question_list() {
        let state = Arc::new(test_state(None));
        let app = build_router(state.clone(), cors_layer(&[]));
        let cookie = register(&app, "learner@example.com").await;

        let response = app.clone().oneshot(empty_request("GET", "/api/v1/auth/me", Some(&cookie))).await.unwrap();
        let id: uuid::Uuid = body_json(response).await["id"].as_str().unwrap().parse().unwrap();
        let key = questions_cache_key(id);

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/api/v1/recall/questions", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.cache.exists(&key).await.unwrap());

        let response = app.oneshot(empty_request("DELETE", "/api/v1/auth/me", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!state.cache.exists(&key).await.unwrap());
        assert!(state.store.find_user(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_me_keeps_the_account_when_the_cache_is_down() {
        let mut state = test_state(None);
        state.cache = Arc::new(DownCache);
        let state = Arc::new(state);
        let app = build_router(state.clone(), cors_layer(&[]));
        let cookie = register(&app, "learner@example.com").await;

        let response = app.clone().oneshot(empty_request("DELETE", "/api/v1/auth/me", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.store.find_user_by_email("learner@example.com").await.unwrap().is_some());

        let response = app.oneshot(empty_request("GET", "/api/v1/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn register_login_and_duplicate_email() {
        let app = app_with(test_state(None));
        let cookie = register(&app, "Ada@Example.com").await;
        assert!(cookie.starts_with("accessToken="));

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                json!({ "email": "ada@example.com", "password": "another-password" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                json!({ "email": "ada@example.com", "password": "wrong-password" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                json!({ "email": "ADA@example.com", "password": "hunter2hunter2" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let login_cookie = session_from(&response);

        let response = app.oneshot(empty_request("GET", "/api/v1/auth/me", Some(&login_cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn register_validates_input() {
        let app = app_with(test_state(None));
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/auth/register", None, json!({ "email": "x", "password": "hunter2hunter2" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request("POST", "/api/v1/auth/register", None, json!({ "email": "a@example.com" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["message"].is_string());
    }

    #[tokio::test]
    async fn full_recall_cycle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "model": "strong-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"questions":[{"question":"What is a borrow?","answer":"A reference that does not take ownership.","hasCode":false}]}"#,
            )))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "model": "fast-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Right idea; mention ownership.")))
            .mount(&server)
            .await;

        let app = app_with(test_state(Some(client_for(&server))));
        let cookie = register(&app, "learner@example.com").await;

        // generate
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/recall/generate", Some(&cookie), json!({ "text": "Borrowing in Rust..." })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let generated = body_json(response).await;
        assert_eq!(generated["questions"].as_array().unwrap().len(), 1);
        assert!(generated.to_string().find("does not take ownership").is_none());

        // list (fills the cache)
        let response = app
            .clone()
            .oneshot(empty_request("GET", "/api/v1/recall/questions", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = body_json(response).await;
        let question = &listed["questions"][0];
        assert_eq!(question["question"], "What is a borrow?");
        assert_eq!(question["hasCode"], false);
        assert!(question.get("officialAnswer").is_none() && question.get("official_answer").is_none());
        let question_id = question["id"].as_str().unwrap().to_string();

        // feedback
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/recall/feedback",
                Some(&cookie),
                json!({ "questionId": question_id, "userAnswer": "A pointer you can use without owning" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let feedback = body_json(response).await;
        assert_eq!(feedback["feedback"], "Right idea; mention ownership.");
        assert_eq!(feedback["questionId"], question_id.as_str());

        // history
        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/api/v1/recall/questions/{question_id}/answers"), Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let history = body_json(response).await;
        assert_eq!(history["answers"][0]["text"], "A pointer you can use without owning");

        // delete account, then the token no longer maps to a user
        let response = app.clone().oneshot(empty_request("DELETE", "/api/v1/auth/me", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app.oneshot(empty_request("GET", "/api/v1/auth/me", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn llm_failure_is_a_generic_500() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let app = app_with(test_state(Some(client_for(&server))));
        let cookie = register(&app, "learner@example.com").await;
        let response = app
            .oneshot(json_request("POST", "/api/v1/recall/generate", Some(&cookie), json!({ "text": "notes" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "Language model request failed");
    }

    #[tokio::test]
    async fn feedback_before_listing_is_not_found() {
        let app = app_with(test_state(None));
        let cookie = register(&app, "learner@example.com").await;
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/recall/feedback",
                Some(&cookie),
                json!({ "questionId": uuid::Uuid::new_v4().to_string(), "userAnswer": "guess" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn logout_clears_the_cookie() {
        let app = app_with(test_state(None));
        let cookie = register(&app, "learner@example.com").await;
        let response = app.oneshot(empty_request("POST", "/api/v1/auth/logout", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("accessToken=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }
}
