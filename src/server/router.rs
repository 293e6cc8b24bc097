use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post},
};

use super::admin::admin_router;
use super::{access, projects, resources};
use crate::repository::Repository;

pub struct AppState {
    pub repository: Arc<Repository>,
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

fn resource_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/resources",
            get(resources::get_resource)
                .post(resources::create_resource)
                .delete(resources::delete_resource),
        )
        .route("/resources/children", get(resources::list_children))
        .route(
            "/resources/siblings",
            get(resources::list_siblings).post(resources::create_sibling),
        )
        .route("/resources/copy", post(resources::copy_resource))
        .route("/resources/undelete", post(resources::undelete_resource))
        .route("/resources/undo", post(resources::undo_changes))
        .route("/resources/restore", post(resources::restore_resource))
        .route("/resources/versions", get(resources::list_versions))
        .route(
            "/content",
            get(resources::read_content).put(resources::write_content),
        )
        .route(
            "/properties",
            get(resources::read_properties).put(resources::write_properties),
        )
        .route("/properties/value", get(resources::read_property))
        .route("/permissions", get(resources::read_permissions))
        .route(
            "/acl",
            get(access::list_aces)
                .put(access::write_ace)
                .delete(access::remove_ace),
        )
        .route(
            "/locks",
            get(access::get_lock)
                .post(access::lock_resource)
                .delete(access::unlock_resource),
        )
        .route("/locks/steal", post(access::steal_lock))
}

fn project_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/projects/{name}",
            get(projects::get_project).delete(projects::delete_project),
        )
        .route("/projects/{name}/unlock", post(projects::unlock_project))
        .route(
            "/publish",
            get(projects::preview_publish).post(projects::publish),
        )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", resource_router().merge(project_router()))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
