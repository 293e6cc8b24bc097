use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireContext;
use crate::server::AppState;
use crate::server::dto::{
    AceRequest, AceResponse, AclQuery, LockQuery, LockResponse, PathQuery, RemoveAceQuery,
    parse_permissions,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::{AccessControlEntry, AceFlags, PrincipalId, ResourceFilter};

pub async fn list_aces(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AclQuery>,
) -> impl IntoResponse {
    let entries = state
        .repository
        .resources()
        .read_access_control_entries(&ctx, &query.path, query.inherited)?;
    let entries: Vec<AceResponse> = entries.into_iter().map(AceResponse::from).collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(entries)))
}

pub async fn write_ace(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
    Json(req): Json<AceRequest>,
) -> impl IntoResponse {
    let allowed =
        parse_permissions(&req.allow).ok_or_else(|| ApiError::bad_request("Unknown permission"))?;
    let denied =
        parse_permissions(&req.deny).ok_or_else(|| ApiError::bad_request("Unknown permission"))?;

    let repository = &state.repository;
    let principal_id = resolve_principal(&state, &req.principal, req.group)?;
    let resource = repository
        .resources()
        .read_resource(&ctx, &query.path, ResourceFilter::IGNORE_EXPIRATION)?;

    let flags = AceFlags::default()
        .with(if req.group { AceFlags::GROUP } else { AceFlags::USER }, true)
        .with(AceFlags::INHERIT, req.inherit)
        .with(AceFlags::OVERWRITE, req.overwrite);
    let ace = AccessControlEntry::new(resource.resource_id, principal_id, allowed, denied, flags);
    repository
        .resources()
        .write_access_control_entry(&ctx, &query.path, ace.clone())?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(AceResponse::from(ace))),
    ))
}

pub async fn remove_ace(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RemoveAceQuery>,
) -> impl IntoResponse {
    let principal_id: PrincipalId = query
        .principal
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid principal id"))?;
    let removed = state
        .repository
        .resources()
        .remove_access_control_entry(&ctx, &query.path, &principal_id)?;
    if !removed {
        return Err(ApiError::not_found("Access control entry not found"));
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn get_lock(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let resources = state.repository.resources();
    // Locks are only visible on resources the caller may read.
    let resource = resources.read_resource(&ctx, &query.path, ResourceFilter::ALL)?;
    let lock = resources.get_lock(&resource.root_path)?;
    let count = resources.count_locks(&resource.root_path)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(LockResponse { lock, count })))
}

pub async fn lock_resource(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<LockQuery>,
) -> impl IntoResponse {
    let resources = state.repository.resources();
    resources.lock_resource(&ctx, &query.path, query.mode())?;
    let lock = resources.get_lock(&query.path)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(lock)))
}

pub async fn unlock_resource(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    state
        .repository
        .resources()
        .unlock_resource(&ctx, &query.path)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn steal_lock(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let resources = state.repository.resources();
    resources.change_lock(&ctx, &query.path)?;
    let lock = resources.get_lock(&query.path)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(lock)))
}

fn resolve_principal(state: &AppState, name: &str, group: bool) -> Result<PrincipalId, ApiError> {
    let principals = state.repository.principals();
    let id = if group {
        principals.read_group_by_name(name)?.id
    } else {
        principals.read_user_by_name(name)?.id
    };
    Ok(id)
}
