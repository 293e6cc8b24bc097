use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{
    CreateGroupRequest, CreateTokenRequest, CreateUserRequest, TokenCreatedResponse,
};
use crate::server::response::{ApiError, ApiResponse};

pub async fn create_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    let principals = state.repository.principals();
    let user = principals.create_user(&req.name, &req.password, req.description.as_deref())?;
    for group in &req.groups {
        principals.add_user_to_group(&user.name, group)?;
    }

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let users = state.repository.principals().list_users()?;

    Ok::<_, ApiError>(Json(ApiResponse::success(users)))
}

pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let user = state.repository.principals().read_user_by_name(&name)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn create_user_token(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<CreateTokenRequest>,
) -> impl IntoResponse {
    let expires_at = match req.expires_in_seconds {
        Some(secs) if secs <= 0 => {
            return Err(ApiError::bad_request("expires_in_seconds must be positive"));
        }
        Some(secs) => Some(Utc::now() + Duration::seconds(secs)),
        None => None,
    };

    let principals = state.repository.principals();
    let user = principals.read_user_by_name(&name)?;
    let token = principals.issue_token(&user, expires_at)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(TokenCreatedResponse { token })),
    ))
}

pub async fn add_user_to_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path((name, group)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .repository
        .principals()
        .add_user_to_group(&name, &group)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn remove_user_from_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path((name, group)): Path<(String, String)>,
) -> impl IntoResponse {
    let removed = state
        .repository
        .principals()
        .remove_user_from_group(&name, &group)?;
    if !removed {
        return Err(ApiError::not_found("Membership not found"));
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn create_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupRequest>,
) -> impl IntoResponse {
    let group = state.repository.principals().create_group(
        &req.name,
        req.description.as_deref(),
        req.parent.as_deref(),
    )?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(group))))
}

pub async fn get_group(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let group = state.repository.principals().read_group_by_name(&name)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(group)))
}

pub async fn clear_caches(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    state.repository.clear_caches();
    tracing::info!(user = %admin.user.name, "caches cleared");

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
