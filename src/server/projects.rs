use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use crate::auth::{RequireAuth, RequireContext};
use crate::server::AppState;
use crate::server::dto::{CreateProjectRequest, PublishPreview, PublishRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::{NewProject, Project};

#[derive(Debug, Serialize)]
struct UnlockResponse {
    released: usize,
}

pub async fn list_projects(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let projects: Vec<Project> = state
        .repository
        .projects()
        .list_projects()?
        .into_iter()
        .filter(|p| !p.hidden)
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(projects)))
}

pub async fn get_project(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let project = state.repository.projects().read_project_by_name(&name)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(project)))
}

pub async fn create_project(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    let principals = state.repository.principals();
    let user_group_id = match req.user_group.as_deref() {
        Some(name) => Some(principals.read_group_by_name(name)?.id),
        None => None,
    };
    let manager_group_id = match req.manager_group.as_deref() {
        Some(name) => Some(principals.read_group_by_name(name)?.id),
        None => None,
    };

    let projects = state.repository.projects();
    let project = projects.create_project(
        &ctx,
        &NewProject {
            name: req.name.clone(),
            description: req.description.clone(),
            user_group_id,
            manager_group_id,
            project_type: req.project_type(),
        },
    )?;
    for root_path in &req.resources {
        projects.copy_resource_to_project(&ctx, project.id, root_path)?;
    }
    let project = projects.read_project(project.id)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(project))))
}

pub async fn delete_project(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let projects = state.repository.projects();
    let project = projects.read_project_by_name(&name)?;
    projects.delete_project(&ctx, project.id)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn unlock_project(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let projects = state.repository.projects();
    let project = projects.read_project_by_name(&name)?;
    let released = projects.unlock_project(&ctx, project.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(UnlockResponse { released })))
}

pub async fn preview_publish(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let list = state.repository.publisher().publish_list(&ctx)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(PublishPreview {
        folders: list.folders,
        files: list.files,
        deleted_folders: list.deleted_folders,
    })))
}

pub async fn publish(
    RequireContext(ctx): RequireContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PublishRequest>,
) -> impl IntoResponse {
    let publisher = state.repository.publisher();
    let result = match req.path.as_deref() {
        Some(path) => publisher.publish_resource(&ctx, path, req.include_siblings)?,
        None => publisher.publish_project(&ctx)?,
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(result)))
}
