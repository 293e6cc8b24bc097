use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{TokenValidationError, ValidatedToken, extract_token_from_header, validate_token};
use crate::context::RequestContext;
use crate::server::AppState;
use crate::types::{ProjectId, Token, User};

/// Header naming the project a request works in. Requests without it work online.
pub const PROJECT_HEADER: &str = "x-vellum-project";

/// Extractor that requires any valid authentication
pub struct RequireAuth {
    pub token: Token,
    pub user: User,
}

/// Extractor that requires a member of the administrators group
pub struct RequireAdmin {
    pub user: User,
}

/// Extractor that resolves the caller and the project selected by [`PROJECT_HEADER`]
pub struct RequireContext(pub RequestContext);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    UserDisabled,
    NotAdmin,
    UnknownProject,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::UserDisabled => (StatusCode::FORBIDDEN, "User is disabled"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::UnknownProject => (StatusCode::NOT_FOUND, "Unknown project"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                HeaderValue::from_static("Bearer realm=\"vellum\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate_token(parts, state).await?;
        Ok(RequireAuth {
            token: validated.token,
            user: validated.user,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate_token(parts, state).await?;

        let is_admin = state
            .repository
            .principals()
            .is_admin(&validated.user)
            .map_err(|_| AuthError::InternalError)?;
        if !is_admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin {
            user: validated.user,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate_token(parts, state).await?;

        let projects = state.repository.projects();
        let project = match parts.headers.get(PROJECT_HEADER) {
            Some(value) => {
                let name = value.to_str().map_err(|_| AuthError::UnknownProject)?;
                projects.read_project_by_name(name)
            }
            None => projects.read_project(ProjectId::ONLINE),
        }
        .map_err(|e| {
            if e.is_not_found() {
                AuthError::UnknownProject
            } else {
                AuthError::InternalError
            }
        })?;

        Ok(RequireContext(RequestContext::new(validated.user, project)))
    }
}

async fn extract_and_validate_token(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> Result<ValidatedToken, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = extract_token_from_header(auth_header)
        .map_err(|e| match e {
            TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
            TokenValidationError::InvalidToken => AuthError::InvalidToken,
            _ => AuthError::InternalError,
        })?
        .ok_or(AuthError::MissingAuth)?;

    validate_token(&state.repository, &raw_token).map_err(|e| match e {
        TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
        TokenValidationError::InvalidToken => AuthError::InvalidToken,
        TokenValidationError::TokenExpired => AuthError::TokenExpired,
        TokenValidationError::UserDisabled => AuthError::UserDisabled,
        TokenValidationError::InternalError => AuthError::InternalError,
    })
}
