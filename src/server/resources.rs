use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::auth::RequireContext;
use crate::server::AppState;
use crate::server::dto::{
    ChildrenQuery, CopyResourceRequest, CreateResourceRequest, CreateSiblingRequest, DeleteQuery,
    PathQuery, PermissionsResponse, PropertyQuery, RestoreRequest, UndeleteRequest, parse_filter,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::{Property, ResourceFilter, ResourceType};

fn filter_of(query: &PathQuery, default: ResourceFilter) -> Result<ResourceFilter, ApiError> {
    query
        .filter(default)
        .ok_or_else(|| ApiError::bad_request("Unknown resource filter"))
}

pub async fn get_resource(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let filter = filter_of(&query, ResourceFilter::DEFAULT)?;
    let resource = state
        .repository
        .resources()
        .read_resource(&ctx, &query.path, filter)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(resource)))
}

pub async fn create_resource(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateResourceRequest>,
) -> impl IntoResponse {
    let resource_type = ResourceType::parse(&req.resource_type)
        .ok_or_else(|| ApiError::bad_request("Unknown resource type"))?;
    let content = match req.content.as_deref() {
        Some(encoded) => STANDARD
            .decode(encoded)
            .map_err(|_| ApiError::bad_request("Content must be base64 encoded"))?,
        None => Vec::new(),
    };

    let resources = state.repository.resources();
    let resource = if req.import {
        resources.import_resource(&ctx, &req.path, resource_type, &content, &req.properties)?
    } else {
        resources.create_resource(&ctx, &req.path, resource_type, &content, &req.properties)?
    };

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(resource))))
}

pub async fn delete_resource(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteQuery>,
) -> impl IntoResponse {
    state
        .repository
        .resources()
        .delete_resource(&ctx, &query.path, query.mode)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_children(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChildrenQuery>,
) -> impl IntoResponse {
    let filter = match query.filter.as_deref() {
        Some(name) => {
            parse_filter(name).ok_or_else(|| ApiError::bad_request("Unknown resource filter"))?
        }
        None => ResourceFilter::DEFAULT,
    };
    let children = state.repository.resources().read_child_resources(
        &ctx,
        &query.path,
        filter,
        query.files,
        query.folders,
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(children)))
}

pub async fn list_siblings(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let filter = filter_of(&query, ResourceFilter::IGNORE_EXPIRATION)?;
    let siblings = state
        .repository
        .resources()
        .read_siblings(&ctx, &query.path, filter)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(siblings)))
}

pub async fn create_sibling(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSiblingRequest>,
) -> impl IntoResponse {
    let sibling = state.repository.resources().create_sibling(
        &ctx,
        &req.source,
        &req.path,
        &req.properties,
    )?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(sibling))))
}

pub async fn copy_resource(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CopyResourceRequest>,
) -> impl IntoResponse {
    let copy = state.repository.resources().copy_resource(
        &ctx,
        &req.source,
        &req.destination,
        req.mode,
    )?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(copy))))
}

pub async fn undelete_resource(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UndeleteRequest>,
) -> impl IntoResponse {
    let resources = state.repository.resources();
    resources.undelete_resource(&ctx, &req.path, req.recursive)?;
    let resource = resources.read_resource(&ctx, &req.path, ResourceFilter::IGNORE_EXPIRATION)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(resource)))
}

pub async fn undo_changes(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let resource = state
        .repository
        .resources()
        .undo_changes(&ctx, &query.path)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(resource)))
}

pub async fn restore_resource(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RestoreRequest>,
) -> impl IntoResponse {
    let resource = state
        .repository
        .resources()
        .restore_resource(&ctx, &req.path, req.tag)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(resource)))
}

pub async fn list_versions(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let versions = state
        .repository
        .resources()
        .read_backup_versions(&ctx, &query.path)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(versions)))
}

pub async fn read_content(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let filter = filter_of(&query, ResourceFilter::DEFAULT)?;
    let file = state
        .repository
        .resources()
        .read_file(&ctx, &query.path, filter)?;

    Ok::<_, ApiError>((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        file.contents,
    ))
}

pub async fn write_content(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
    body: Bytes,
) -> impl IntoResponse {
    let resource = state
        .repository
        .resources()
        .write_file(&ctx, &query.path, &body)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(resource)))
}

pub async fn read_properties(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let filter = filter_of(&query, ResourceFilter::ALL)?;
    let properties = state
        .repository
        .resources()
        .read_properties(&ctx, &query.path, filter)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(properties)))
}

pub async fn read_property(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PropertyQuery>,
) -> impl IntoResponse {
    let value = state
        .repository
        .resources()
        .read_property(&ctx, &query.path, &query.name, query.search)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(Property {
        name: query.name,
        value,
    })))
}

pub async fn write_properties(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
    Json(properties): Json<Vec<Property>>,
) -> impl IntoResponse {
    let resources = state.repository.resources();
    resources.write_properties(&ctx, &query.path, &properties)?;
    let properties = resources.read_properties(&ctx, &query.path, ResourceFilter::ALL)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(properties)))
}

pub async fn read_permissions(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let permissions = state
        .repository
        .resources()
        .read_permissions(&ctx, &query.path)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(PermissionsResponse::new(
        query.path,
        permissions,
    ))))
}
