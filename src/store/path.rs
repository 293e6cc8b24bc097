//! Root path handling. Folder paths end with `/`, the root folder is `/`.

use crate::error::{Error, Result};

pub const ROOT: &str = "/";

const INVALID_CHARS: &[char] = &['\0', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Normalizes a root path, validating every segment. `folder` controls the trailing slash.
pub fn normalize_path(path: &str, folder: bool) -> Result<String> {
    let path = path.trim();

    if path.is_empty() {
        return Err(Error::invalid("path cannot be empty"));
    }

    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        if folder {
            return Ok(ROOT.to_string());
        }
        return Err(Error::invalid("a file cannot be the root folder"));
    }

    for segment in &segments {
        validate_segment(segment)?;
    }

    let mut normalized = format!("/{}", segments.join("/"));
    if folder {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Normalizes a path whose kind is given by its trailing slash.
pub fn normalize_any(path: &str) -> Result<String> {
    normalize_path(path, is_folder_path(path.trim()))
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment == "." || segment == ".." {
        return Err(Error::invalid(format!(
            "path segment '{segment}' is not allowed"
        )));
    }

    if segment.len() > 255 {
        return Err(Error::invalid("path segment cannot exceed 255 characters"));
    }

    if segment
        .chars()
        .any(|c| c.is_control() || INVALID_CHARS.contains(&c))
    {
        return Err(Error::invalid(format!(
            "path segment '{segment}' contains invalid characters"
        )));
    }

    Ok(())
}

#[must_use]
pub fn is_folder_path(path: &str) -> bool {
    path.ends_with('/')
}

/// Returns the parent folder path, or `None` for the root folder.
#[must_use]
pub fn parent_path(path: &str) -> Option<String> {
    if path == ROOT || path.is_empty() {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    Some(trimmed[..=idx].to_string())
}

/// Returns the last segment, with the trailing slash kept for folders.
#[must_use]
pub fn resource_name(path: &str) -> &str {
    if path == ROOT {
        return ROOT;
    }
    let trimmed = path.trim_end_matches('/');
    let start = trimmed.rfind('/').map_or(0, |i| i + 1);
    &path[start..]
}

/// All ancestor folder paths, root first, excluding `path` itself.
#[must_use]
pub fn ancestors(path: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = parent_path(path);
    while let Some(p) = current {
        current = parent_path(&p);
        chain.push(p);
    }
    chain.reverse();
    chain
}

/// Returns true if `path` equals `prefix` or lies beneath it.
#[must_use]
pub fn is_under(path: &str, prefix: &str) -> bool {
    if is_folder_path(prefix) {
        path.starts_with(prefix)
    } else {
        path == prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_basic() {
        assert_eq!(normalize_path("a/x.html", false).unwrap(), "/a/x.html");
        assert_eq!(normalize_path("/a/", true).unwrap(), "/a/");
        assert_eq!(normalize_path("//a//b", true).unwrap(), "/a/b/");
        assert_eq!(normalize_path("/", true).unwrap(), "/");
    }

    #[test]
    fn test_normalize_path_rejects_invalid() {
        assert!(normalize_path("", false).is_err());
        assert!(normalize_path("/", false).is_err());
        assert!(normalize_path("/a/../b", false).is_err());
        assert!(normalize_path("/a/b?c", false).is_err());
        assert!(normalize_path("/a/b\nc", false).is_err());
        assert!(normalize_path(&format!("/{}", "x".repeat(256)), false).is_err());
    }

    #[test]
    fn test_normalize_any() {
        assert_eq!(normalize_any("/a/b/").unwrap(), "/a/b/");
        assert_eq!(normalize_any("/a/b").unwrap(), "/a/b");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/a/x.html").as_deref(), Some("/a/"));
        assert_eq!(parent_path("/a/b/").as_deref(), Some("/a/"));
        assert_eq!(parent_path("/a/").as_deref(), Some("/"));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(resource_name("/a/x.html"), "x.html");
        assert_eq!(resource_name("/a/b/"), "b/");
        assert_eq!(resource_name("/"), "/");
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("/a/b/x.html"), vec!["/", "/a/", "/a/b/"]);
        assert!(ancestors("/").is_empty());
    }

    #[test]
    fn test_is_under() {
        assert!(is_under("/a/b/x", "/a/"));
        assert!(is_under("/a/", "/a/"));
        assert!(!is_under("/ab/x", "/a/"));
        assert!(is_under("/a/x", "/a/x"));
        assert!(!is_under("/a/xy", "/a/x"));
    }
}
