mod principals;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        // User routes
        .route("/users", post(principals::create_user))
        .route("/users", get(principals::list_users))
        .route("/users/{name}", get(principals::get_user))
        .route("/users/{name}/tokens", post(principals::create_user_token))
        .route(
            "/users/{name}/groups/{group}",
            post(principals::add_user_to_group),
        )
        .route(
            "/users/{name}/groups/{group}",
            delete(principals::remove_user_from_group),
        )
        // Group routes
        .route("/groups", post(principals::create_group))
        .route("/groups/{name}", get(principals::get_group))
        // Cache routes
        .route("/caches/clear", post(principals::clear_caches))
}
