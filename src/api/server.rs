use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::api::middleware::bearer::require_bearer;
use crate::db::prelude::*;
use crate::util::identity::{IdentityErr, IdentityProvider};

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Clone, Debug)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub identity: Arc<dyn IdentityProvider>,
}

pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    let auth_routes = Router::new()
        .route("/auth/verify", post(verify))
        .route_layer(from_fn(require_bearer));

    Router::new()
        .merge(auth_routes)
        //
        // general
        .route("/", get(home))
        .route("/health", get(health))
        //
        // quiz
        .route("/quiz/submit", post(submit_quiz))
        .route("/quiz/me/quiz", post(user_quiz_data))
        .route("/quiz/questions", get(quiz_questions))
        //
        // leaderboard
        .route("/leaderboard", get(leaderboard))
        .route("/leaderboard/", get(leaderboard))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .layer(cors)
        .with_state(state)
}

/// Logs any `RouteError` a handler stashed in the response extensions.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

/// Binds `0.0.0.0:port` and serves `app` until ctrl-c.
#[instrument(skip(app))]
pub async fn start_server(
    port: u16,
    app: Router,
) -> std::io::Result<JoinHandle<std::io::Result<()>>> {
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{}", listener.local_addr()?.port()),
        "server ready"
    );

    Ok(tokio::task::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?e, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    tracing::info!("shutdown signal received");
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Missing token")]
    MissingToken,

    #[error("User not found.")]
    UserNotFound,

    #[error("Missing Fields")]
    MissingFields,

    #[error(transparent)]
    InvalidBody(#[from] JsonRejection),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityErr),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let (status, error, err) = match &self {
            RouteError::MissingToken => (StatusCode::UNAUTHORIZED, self.to_string(), None),
            RouteError::UserNotFound => (StatusCode::NOT_FOUND, self.to_string(), None),
            RouteError::MissingFields => (StatusCode::BAD_REQUEST, self.to_string(), None),

            RouteError::InvalidBody(rejection) => {
                (StatusCode::BAD_REQUEST, rejection.body_text(), None)
            }

            RouteError::Store(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error.to_string(),
                Some(self),
            ),

            RouteError::Identity(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error.to_string(),
                Some(self),
            ),
        };

        let mut response = (status, Json(ErrorResponse { error })).into_response();
        if let Some(err) = err {
            response.extensions_mut().insert(Arc::new(err));
        }

        response
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use axum::body::Body;
    use http::header::{AUTHORIZATION, CONTENT_TYPE};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::api::middleware::cors;
    use crate::constants::{TABLE_USER_AUTH, TABLE_USERS};
    use crate::db::StoreResult;
    use crate::db::memory::MemoryStore;
    use crate::util::identity::{IdentityResult, IdentityUser};

    /// Maps known tokens to canned provider profiles.
    #[derive(Debug, Default)]
    struct StubIdentity {
        profiles: HashMap<String, Value>,
    }

    #[async_trait]
    impl IdentityProvider for StubIdentity {
        async fn get_user(&self, token: &str) -> IdentityResult<Option<IdentityUser>> {
            self.profiles
                .get(token)
                .cloned()
                .map(IdentityUser::from_payload)
                .transpose()
        }
    }

    /// Rejects every call the way PostgREST does for a missing table.
    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn select(&self, _: &Query) -> StoreResult<Vec<Row>> {
            Err(rejected())
        }

        async fn insert(&self, _: &str, _: Row) -> StoreResult<Vec<Row>> {
            Err(rejected())
        }

        async fn upsert(&self, _: &str, _: Row, _: &str) -> StoreResult<Vec<Row>> {
            Err(rejected())
        }
    }

    fn rejected() -> StoreError {
        StoreError::Rejected {
            status: 404,
            message: "relation \"public.UserAchievements\" does not exist".into(),
        }
    }

    fn app_with(store: Arc<dyn Store>) -> Router {
        let identity = StubIdentity {
            profiles: HashMap::from([(
                "good-token".to_string(),
                json!({
                    "id": "5b9f0c1e-aaaa-bbbb-cccc-000000000001",
                    "email": "reader@example.com",
                    "user_metadata": { "full_name": "Ada Reader" },
                    "app_metadata": { "provider": "google" },
                    "identities": [{ "provider": "google", "id": "g-1" }],
                }),
            )]),
        };

        let state = Arc::new(AppState {
            store,
            identity: Arc::new(identity),
        });

        router(state, cors(&["*".into()]).unwrap())
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn verify_req(authorization: Option<&str>) -> Request<Body> {
        let mut builder = http::Request::builder().method("POST").uri("/auth/verify");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_home_and_health() {
        let app = app_with(Arc::new(MemoryStore::new()));

        let (status, body) = send(&app, get_req("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "API running" }));

        let (status, body) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_verify_requires_bearer() {
        let app = app_with(Arc::new(MemoryStore::new()));

        for header in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer "), Some("good-token")] {
            let (status, body) = send(&app, verify_req(header)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "header {header:?}");
            assert_eq!(body, json!({ "error": "Missing token" }));
        }
    }

    #[tokio::test]
    async fn test_verify_unknown_user() {
        let app = app_with(Arc::new(MemoryStore::new()));

        let (status, body) = send(&app, verify_req(Some("Bearer who-is-this"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "User not found." }));
    }

    #[tokio::test]
    async fn test_verify_provisions_once() {
        let store = Arc::new(MemoryStore::new());
        let app = app_with(store.clone());

        for _ in 0..3 {
            let (status, body) = send(&app, verify_req(Some("Bearer good-token"))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(
                body,
                json!({ "info": { "email": "reader@example.com", "name": "Ada Reader" } })
            );
        }

        let users = store.rows(TABLE_USERS).await;
        let links = store.rows(TABLE_USER_AUTH).await;
        assert_eq!(users.len(), 1);
        assert_eq!(links.len(), 1);
        assert_eq!(users[0]["id"], "5b9f0c1e-aaaa-bbbb-cccc-000000000001");
        assert_eq!(links[0]["provider_user_id"], "g-1");
    }

    #[tokio::test]
    async fn test_submit_rejects_incomplete_bodies() {
        let app = app_with(Arc::new(MemoryStore::new()));

        let incomplete = [
            json!({}),
            json!({ "user_id": "u1", "story_id": "s1" }),
            json!({ "user_id": "u1", "points": 10 }),
            json!({ "story_id": "s1", "points": 10 }),
            json!({ "user_id": "  ", "story_id": "s1", "points": 10 }),
            json!({ "user_id": "u1", "story_id": "s1", "points": null }),
        ];

        for body in incomplete {
            let (status, res) = send(&app, post_json("/quiz/submit", body.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
            assert_eq!(res, json!({ "error": "Missing Fields" }));
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_malformed_json() {
        let app = app_with(Arc::new(MemoryStore::new()));

        let req = http::Request::builder()
            .method("POST")
            .uri("/quiz/submit")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{ not json"))
            .unwrap();

        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = send(
            &app,
            post_json(
                "/quiz/submit",
                json!({ "user_id": "u1", "story_id": "s1", "points": "lots" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_submit_then_fetch() {
        let app = app_with(Arc::new(MemoryStore::new()));

        let (status, body) = send(
            &app,
            post_json(
                "/quiz/submit",
                json!({ "user_id": "u1", "story_id": "s1", "points": 80 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Quiz submission recorded");
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["quiz_score"], 80);
        assert!(body["data"][0]["leaderboard_rank"].is_null());
        assert!(body["data"][0]["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(body["data"][0]["completed_at"].is_string());

        let (status, body) = send(
            &app,
            post_json("/quiz/me/quiz", json!({ "user_id": "u1", "story_id": "s1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quizScore"], 80);
        assert_eq!(body["leaderboardPosition"], 1);
        assert!(body["completedAt"].is_string());
    }

    #[tokio::test]
    async fn test_zero_points_and_numeric_ids() {
        let app = app_with(Arc::new(MemoryStore::new()));

        let (status, _) = send(
            &app,
            post_json(
                "/quiz/submit",
                json!({ "user_id": 42, "story_id": 3, "points": 0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(
            &app,
            post_json("/quiz/me/quiz", json!({ "user_id": "42", "story_id": 3 })),
        )
        .await;
        assert_eq!(body["quizScore"], 0);
    }

    #[tokio::test]
    async fn test_user_quiz_data_missing_attempt() {
        let app = app_with(Arc::new(MemoryStore::new()));

        let (status, body) = send(
            &app,
            post_json("/quiz/me/quiz", json!({ "user_id": "u9", "story_id": "s1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "quizScore": "N/A", "leaderboardPosition": "N/A", "completedAt": null })
        );

        let (status, body) = send(&app, post_json("/quiz/me/quiz", json!({ "user_id": "u9" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Missing Fields" }));
    }

    #[tokio::test]
    async fn test_leaderboard_top_ten() {
        let app = app_with(Arc::new(MemoryStore::new()));

        for i in 0..15 {
            let story = if i % 2 == 0 { "s1" } else { "s2" };
            let (status, _) = send(
                &app,
                post_json(
                    "/quiz/submit",
                    json!({ "user_id": format!("u{i}"), "story_id": story, "points": (i * 7) % 50 }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        for uri in ["/leaderboard", "/leaderboard/"] {
            let (status, body) = send(&app, get_req(uri)).await;
            assert_eq!(status, StatusCode::OK);

            let board = body["leaderboard"].as_array().unwrap();
            assert_eq!(board.len(), 10);

            let scores: Vec<i64> = board.iter().map(|e| e["score"].as_i64().unwrap()).collect();
            assert!(scores.windows(2).all(|w| w[0] >= w[1]));

            let ranks: Vec<i64> = board.iter().map(|e| e["rank"].as_i64().unwrap()).collect();
            assert_eq!(ranks, (1..=10).collect::<Vec<_>>());
            assert!(board[0]["userId"].is_string());
            assert!(board[0]["storyId"].is_string());
        }

        let (_, body) = send(&app, get_req("/leaderboard?story_id=s2")).await;
        let board = body["leaderboard"].as_array().unwrap();
        assert_eq!(board.len(), 7);
        assert!(board.iter().all(|e| e["storyId"] == "s2"));
    }

    #[tokio::test]
    async fn test_fallback_questions() {
        let app = app_with(Arc::new(MemoryStore::new()));

        let (status, body) = send(&app, get_req("/quiz/questions")).await;
        assert_eq!(status, StatusCode::OK);

        let questions = body["questions"].as_array().unwrap();
        assert_eq!(questions.len(), 4);
        assert_eq!(questions[0]["options"].as_array().unwrap().len(), 4);
        assert_eq!(questions[0]["correctAnswer"], "21 million");
        assert_eq!(questions[1]["correctAnswer"], "Satoshi Nakamoto");
    }

    #[tokio::test]
    async fn test_store_failure_is_500() {
        let app = app_with(Arc::new(BrokenStore));

        let res = app
            .clone()
            .oneshot(get_req("/leaderboard"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.extensions().get::<Arc<RouteError>>().is_some());

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({ "error": "relation \"public.UserAchievements\" does not exist" })
        );

        let (status, _) = send(&app, verify_req(Some("Bearer good-token"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
