//! HTTP surface, driven in-process through the router.

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tower::ServiceExt;
use vellum::auth::PROJECT_HEADER;
use vellum::server::{AppState, create_router};

use common::Fixture;

struct TestApp {
    router: Router,
    admin: String,
    editor: String,
    other: String,
}

impl TestApp {
    fn new() -> Self {
        let Fixture {
            repo,
            admin,
            editor,
            other,
            ..
        } = Fixture::new();
        let principals = repo.principals();
        let admin = principals.issue_token(&admin, None).unwrap();
        let editor = principals.issue_token(&editor, None).unwrap();
        let other = principals.issue_token(&other, None).unwrap();
        let state = Arc::new(AppState {
            repository: Arc::new(repo),
        });
        Self {
            router: create_router(state),
            admin,
            editor,
            other,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        project: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(project) = project {
            builder = builder.header(PROJECT_HEADER, project);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn json(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        project: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.send(method, uri, Some(token), project, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_file(&self, token: &str, path: &str, content: &str) -> (StatusCode, Value) {
        self.json(
            "POST",
            "/api/v1/resources",
            token,
            Some("Offline"),
            Some(json!({
                "path": path,
                "type": "plain",
                "content": STANDARD.encode(content),
            })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.send("GET", "/health", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_requests_require_token() {
    let app = TestApp::new();
    let (status, _) = app
        .send("GET", "/api/v1/resources?path=/", None, None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send("GET", "/api/v1/resources?path=/", Some("vellum_bogus"), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app
        .json("GET", "/api/v1/resources?path=/", &app.editor, Some("Nope"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Unknown project");
}

#[tokio::test]
async fn test_create_and_read_file() {
    let app = TestApp::new();
    let (status, body) = app.create_file(&app.editor, "/a.html", "hello").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["root_path"], "/a.html");
    assert_eq!(body["data"]["state"], "new");
    assert_eq!(body["data"]["length"], 5);

    let (status, bytes) = app
        .send(
            "GET",
            "/api/v1/content?path=/a.html",
            Some(&app.editor),
            Some("Offline"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"hello");

    let (status, body) = app
        .json(
            "GET",
            "/api/v1/resources/children?path=/",
            &app.editor,
            Some("Offline"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["root_path"], "/a.html");
}

#[tokio::test]
async fn test_error_statuses() {
    let app = TestApp::new();

    let (status, body) = app
        .json(
            "GET",
            "/api/v1/resources?path=/missing.html",
            &app.editor,
            Some("Offline"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["data"].is_null());

    let (status, _) = app.create_file(&app.editor, "/a.html", "one").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.create_file(&app.editor, "/a.html", "two").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .json(
            "POST",
            "/api/v1/resources",
            &app.editor,
            Some("Offline"),
            Some(json!({ "path": "/b.html", "type": "spreadsheet" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(
            "POST",
            "/api/v1/resources",
            &app.editor,
            None,
            Some(json!({ "path": "/b.html", "type": "plain" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_foreign_lock_is_reported_as_locked() {
    let app = TestApp::new();
    app.create_file(&app.editor, "/a.html", "mine").await;

    let (status, body) = app
        .json(
            "GET",
            "/api/v1/locks?path=/a.html",
            &app.other,
            Some("Offline"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["lock"]["mode"], "common");

    let (status, _) = app
        .send(
            "PUT",
            "/api/v1/content?path=/a.html",
            Some(&app.other),
            Some("Offline"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::LOCKED);

    let (status, body) = app
        .json(
            "POST",
            "/api/v1/locks/steal?path=/a.html",
            &app.other,
            Some("Offline"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mode"], "common");

    let (status, _) = app
        .send(
            "PUT",
            "/api/v1/content?path=/a.html",
            Some(&app.other),
            Some("Offline"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = TestApp::new();
    let (status, _) = app
        .json("GET", "/api/v1/admin/users", &app.editor, None, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .json("GET", "/api/v1/admin/users", &app.admin, None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"editor".to_string()));
    assert!(body["data"][0].get("password_hash").is_none());

    let (status, body) = app
        .json(
            "POST",
            "/api/v1/admin/users/editor/tokens",
            &app.admin,
            None,
            Some(json!({ "expires_in_seconds": 3600 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["data"]["token"].as_str().unwrap().to_string();
    let (status, _) = app
        .json("GET", "/api/v1/resources?path=/", &token, None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_publish_through_api() {
    let app = TestApp::new();
    app.create_file(&app.admin, "/a.html", "hello").await;

    let (status, _) = app
        .json(
            "POST",
            "/api/v1/publish",
            &app.editor,
            Some("Offline"),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .json(
            "POST",
            "/api/v1/publish",
            &app.admin,
            Some("Offline"),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["files"], json!(["/a.html"]));

    let (status, body) = app
        .json("GET", "/api/v1/resources?path=/a.html", &app.editor, None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "unchanged");
}
