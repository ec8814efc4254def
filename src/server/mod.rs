//! HTTP transport for the document server.
//!
//! # Endpoints
//!
//! - `GET /health`: health check (no auth required)
//! - `POST /api/register`: create an account with the admin token
//! - `POST /api/auth`: exchange login and password for a session token
//! - `DELETE /api/auth/{token}`: end a session
//! - `POST /api/docs`: create a document
//! - `GET /api/docs`: list readable documents
//! - `GET /api/docs/{id}`: fetch a document
//! - `DELETE /api/docs/{id}`: delete an owned document
//!
//! Document routes take the session token as `Authorization: Bearer <token>`
//! or as a `token` query (body `meta.token` for create) parameter. GET routes
//! also answer HEAD. File documents refer to files under the storage
//! directory by relative path.

pub mod auth;
pub mod docs;
pub mod files;
pub mod response;

use axum::{
    http::{header, HeaderMap},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::AuthService;
use crate::documents::DocumentService;
use crate::error::{ServiceError, ServiceResult};

pub use files::FileStorage;
pub use response::ApiResponse;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub docs: Arc<DocumentService>,
    pub files: Arc<FileStorage>,
}

impl AppState {
    pub fn new(auth: AuthService, docs: DocumentService, files: FileStorage) -> Self {
        Self {
            auth: Arc::new(auth),
            docs: Arc::new(docs),
            files: Arc::new(files),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/register", post(auth::register))
        .route("/auth", post(auth::authenticate))
        .route("/auth/{token}", delete(auth::logout))
        .route("/docs", post(docs::create).get(docs::list))
        .route("/docs/{id}", get(docs::get).delete(docs::delete));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Picks the bearer token from the headers, falling back to `fallback`.
pub(crate) fn request_token(
    headers: &HeaderMap,
    fallback: Option<String>,
) -> ServiceResult<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match (bearer, fallback) {
        (Some(token), _) => Ok(token.to_string()),
        (None, Some(token)) if !token.is_empty() => Ok(token),
        _ => Err(ServiceError::bad_request("token is required")),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DocumentCache, MemoryCache};
    use crate::db::test_support::{test_db, TestDb};
    use crate::db::{
        CredentialStore, DocumentStore, SqliteDocumentRepository, SqliteSessionRepository,
        SqliteUserRepository,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    const ADMIN: &str = "admin-secret";
    const PASSWORD: &str = "Passw0rd!";

    struct TestEnv {
        db: TestDb,
        storage: tempfile::TempDir,
    }

    async fn app() -> (TestEnv, Router) {
        let db = test_db().await;
        let auth = AuthService::new(
            Arc::new(SqliteUserRepository::new(db.pool.clone())),
            Arc::new(SqliteSessionRepository::new(db.pool.clone())),
            ADMIN,
            Duration::from_secs(3600),
        )
        .with_bcrypt_cost(4);
        let cache = DocumentCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));
        let docs = DocumentService::new(
            Arc::new(SqliteDocumentRepository::new(db.pool.clone())),
            cache,
        )
        .with_filter_workers(2);
        let storage = tempfile::tempdir().unwrap();
        let files = FileStorage::new(storage.path());
        let env = TestEnv { db, storage };
        (env, router(AppState::new(auth, docs, files)))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn bearer(method: Method, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn login(app: &Router, user: &str) -> String {
        let (status, _) = send(
            app,
            json_request(
                Method::POST,
                "/api/register",
                json!({ "token": ADMIN, "login": user, "password": PASSWORD }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            app,
            json_request(
                Method::POST,
                "/api/auth",
                json!({ "login": user, "password": PASSWORD }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["response"]["token"].as_str().unwrap().to_string()
    }

    async fn create_doc(app: &Router, token: &str, meta: Value, payload: Value) -> String {
        let mut meta = meta;
        meta["token"] = json!(token);
        let (status, body) = send(
            app,
            json_request(
                Method::POST,
                "/api/docs",
                json!({ "meta": meta, "json": payload }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "create failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_env, app) = app().await;

        let (status, body) = send(
            &app,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let (_env, app) = app().await;

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/register",
                json!({ "token": ADMIN, "login": "alice123", "password": PASSWORD }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "response": { "login": "alice123" } }));

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/auth",
                json!({ "login": "alice123", "password": "Wr0ngPass!" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body,
            json!({ "error": { "code": 401, "text": "invalid credentials" } })
        );
    }

    #[tokio::test]
    async fn test_register_with_wrong_admin_token() {
        let (_env, app) = app().await;

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/register",
                json!({ "token": "nope", "login": "alice123", "password": PASSWORD }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["text"], "invalid admin token");
    }

    #[tokio::test]
    async fn test_malformed_body_uses_envelope() {
        let (_env, app) = app().await;

        let (status, body) = send(
            &app,
            json_request(Method::POST, "/api/auth", json!({ "login": "alice123" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], 400);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (_env, app) = app().await;

        let (status, body) = send(
            &app,
            Request::builder().uri("/api/docs").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["text"], "token is required");
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (_env, app) = app().await;

        let (status, body) = send(&app, bearer(Method::GET, "/api/docs", "bogus")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["text"], "invalid token");
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let (_env, app) = app().await;
        let alice = login(&app, "alice123").await;
        let bob = login(&app, "bob12345").await;

        let id = create_doc(
            &app,
            &alice,
            json!({ "name": "notes", "mime": "application/json", "grant": ["bob12345"] }),
            json!({ "title": "hello" }),
        )
        .await;

        // Grantee reads the payload, via query token.
        let (status, body) = send(
            &app,
            Request::builder()
                .uri(format!("/api/docs/{}?token={}", id, bob))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "data": { "title": "hello" } }));

        // Grantee cannot delete.
        let (status, body) =
            send(&app, bearer(Method::DELETE, &format!("/api/docs/{}", id), &bob)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], 403);

        let (status, body) =
            send(&app, bearer(Method::DELETE, &format!("/api/docs/{}", id), &alice)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["success"], true);

        let (status, _) =
            send(&app, bearer(Method::GET, &format!("/api/docs/{}", id), &alice)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_private_document_forbidden() {
        let (_env, app) = app().await;
        let alice = login(&app, "alice123").await;
        let carol = login(&app, "carol999").await;

        let id = create_doc(
            &app,
            &alice,
            json!({ "name": "secret", "mime": "application/json" }),
            json!({ "k": 1 }),
        )
        .await;

        let (status, body) =
            send(&app, bearer(Method::GET, &format!("/api/docs/{}", id), &carol)).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["text"], "access denied");
    }

    #[tokio::test]
    async fn test_list_by_login_and_predicate() {
        let (_env, app) = app().await;
        let alice = login(&app, "alice123").await;
        let bob = login(&app, "bob12345").await;

        create_doc(
            &app,
            &alice,
            json!({ "name": "beta", "mime": "text/plain", "public": true }),
            json!({ "tag": "x" }),
        )
        .await;
        create_doc(
            &app,
            &alice,
            json!({ "name": "alpha", "mime": "text/plain", "public": true }),
            json!({ "tag": "y" }),
        )
        .await;
        create_doc(
            &app,
            &alice,
            json!({ "name": "hidden", "mime": "text/plain" }),
            json!({ "tag": "x" }),
        )
        .await;

        let (status, body) =
            send(&app, bearer(Method::GET, "/api/docs?login=alice123", &bob)).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["data"]["docs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        let (_, body) = send(
            &app,
            bearer(Method::GET, "/api/docs?login=alice123&key=tag&value=x", &alice),
        )
        .await;
        let names: Vec<&str> = body["data"]["docs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["beta", "hidden"]);

        let (status, _) =
            send(&app, bearer(Method::GET, "/api/docs?login=nobody00", &alice)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_is_served_by_get_routes() {
        let (_env, app) = app().await;
        let alice = login(&app, "alice123").await;

        let (status, body) = send(&app, bearer(Method::HEAD, "/api/docs", &alice)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
    }

    async fn create_file_doc(app: &Router, token: &str, name: &str, file: &str) -> (StatusCode, Value) {
        send(
            app,
            json_request(
                Method::POST,
                "/api/docs",
                json!({
                    "meta": { "name": name, "mime": "text/plain", "file": true, "token": token },
                    "file": file,
                }),
            ),
        )
        .await
    }

    #[tokio::test]
    async fn test_file_document_is_streamed() {
        let (env, app) = app().await;
        let alice = login(&app, "alice123").await;
        std::fs::write(env.storage.path().join("report.txt"), "file contents").unwrap();

        let (status, body) = create_file_doc(&app, &alice, "report.txt", "report.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["file"], "report.txt");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(bearer(Method::GET, &format!("/api/docs/{}", id), &alice))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"file contents");
    }

    #[tokio::test]
    async fn test_file_reference_outside_storage_is_refused() {
        let (_env, app) = app().await;
        let mallory = login(&app, "mallory1").await;

        for reference in ["/etc/passwd", "../docvault.db", "notes/../../config.yaml"] {
            let (status, body) = create_file_doc(&app, &mallory, "loot", reference).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {}", reference);
            assert_eq!(body["error"]["text"], "invalid file path");
        }

        let (_, body) = send(&app, bearer(Method::GET, "/api/docs", &mallory)).await;
        assert_eq!(body["data"]["docs"], json!([]));
    }

    #[tokio::test]
    async fn test_stored_absolute_reference_is_not_read() {
        let (env, app) = app().await;
        let alice = login(&app, "alice123").await;
        let owner = SqliteUserRepository::new(env.db.pool.clone())
            .get_by_login("alice123")
            .await
            .unwrap()
            .identity();
        let doc = crate::models::Document::new(
            &owner,
            crate::models::NewDocument::new("passwd", "text/plain").with_file("/etc/passwd"),
        );
        SqliteDocumentRepository::new(env.db.pool.clone())
            .create(&doc)
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(bearer(Method::GET, &format!("/api/docs/{}", doc.id), &alice))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["text"], "invalid file path");
    }

    #[tokio::test]
    async fn test_download_name_is_escaped() {
        let (env, app) = app().await;
        let alice = login(&app, "alice123").await;
        std::fs::write(env.storage.path().join("q.txt"), "quoted").unwrap();

        let (status, body) =
            create_file_doc(&app, &alice, "say \"hi\"\r\nSet-Cookie: x", "q.txt").await;
        assert_eq!(status, StatusCode::OK);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(bearer(Method::GET, &format!("/api/docs/{}", id), &alice))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"say _hi___Set-Cookie: x\"; \
             filename*=UTF-8''say%20%22hi%22%0D%0ASet-Cookie%3A%20x"
        );
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let (_env, app) = app().await;
        let alice = login(&app, "alice123").await;

        let (status, body) =
            send(&app, bearer(Method::DELETE, &format!("/api/auth/{}", alice), &alice)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["success"], true);

        let (status, _) = send(&app, bearer(Method::GET, "/api/docs", &alice)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_document_id() {
        let (_env, app) = app().await;
        let alice = login(&app, "alice123").await;

        let (status, body) =
            send(&app, bearer(Method::GET, "/api/docs/not-a-uuid", &alice)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["text"], "invalid document id");
    }

    #[test]
    fn test_request_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());

        assert_eq!(
            request_token(&headers, Some("query".into())).unwrap(),
            "abc"
        );
        assert_eq!(
            request_token(&HeaderMap::new(), Some("query".into())).unwrap(),
            "query"
        );
        assert!(request_token(&HeaderMap::new(), Some(String::new())).is_err());
    }
}
