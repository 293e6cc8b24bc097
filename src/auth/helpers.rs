use chrono::Utc;

use super::parse_token;
use crate::repository::Repository;
use crate::types::{Token, User};

#[derive(Debug)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    UserDisabled,
    InternalError,
}

pub struct ValidatedToken {
    pub token: Token,
    pub user: User,
}

/// Extracts a token string from a Basic auth header.
/// Expects format: Basic base64(x-token:actual_token)
pub fn extract_basic_auth_token(header: &str) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;

    if username != "x-token" {
        return None;
    }

    Some(password.to_string())
}

/// Validates a raw token string and resolves the user it belongs to.
pub fn validate_token(
    repository: &Repository,
    raw_token: &str,
) -> Result<ValidatedToken, TokenValidationError> {
    let (lookup, _secret) = parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let store = repository.store();
    let token = store
        .get_token_by_lookup(&lookup)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    if !repository
        .principals()
        .verify_token(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if let Some(expires_at) = &token.expires_at {
        if expires_at < &Utc::now() {
            return Err(TokenValidationError::TokenExpired);
        }
    }

    let user = repository
        .principals()
        .read_user(&token.user_id)
        .map_err(|e| {
            if e.is_not_found() {
                TokenValidationError::InvalidToken
            } else {
                TokenValidationError::InternalError
            }
        })?;
    if !user.enabled {
        return Err(TokenValidationError::UserDisabled);
    }

    if let Err(e) = store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, user })
}

/// Extracts token from Authorization header (Bearer or Basic).
/// Returns None if no auth header is present.
/// Returns Err if the auth scheme is unsupported.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Result<Option<String>, TokenValidationError> {
    let Some(header) = auth_header else {
        return Ok(None);
    };
    if let Some(token) = header.strip_prefix("Bearer ") {
        return Ok(Some(token.to_string()));
    }
    if header.starts_with("Basic ") {
        return extract_basic_auth_token(header)
            .ok_or(TokenValidationError::InvalidToken)
            .map(Some);
    }
    Err(TokenValidationError::InvalidScheme)
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        let token = extract_token_from_header(Some("Bearer vellum_abc")).unwrap();
        assert_eq!(token.as_deref(), Some("vellum_abc"));
    }

    #[test]
    fn test_extract_basic_token() {
        let header = format!("Basic {}", STANDARD.encode("x-token:vellum_abc"));
        let token = extract_token_from_header(Some(&header)).unwrap();
        assert_eq!(token.as_deref(), Some("vellum_abc"));
    }

    #[test]
    fn test_basic_requires_token_user() {
        let header = format!("Basic {}", STANDARD.encode("alice:secret"));
        assert!(extract_basic_auth_token(&header).is_none());
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(matches!(
            extract_token_from_header(Some("Digest abc")),
            Err(TokenValidationError::InvalidScheme)
        ));
        assert!(extract_token_from_header(None).unwrap().is_none());
    }
}
