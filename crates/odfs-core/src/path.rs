//! Slash-separated path helpers.
//!
//! Paths inside a container are absolute strings rooted at `/`. They never
//! touch the local filesystem, so plain string handling is used instead of
//! `std::path`.

/// The container root.
pub const ROOT: &str = "/";

/// Final component of `path` (`""` for the root).
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Parent directory of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) | None => Some(ROOT),
        Some(idx) => Some(&trimmed[..idx]),
    }
}

/// Appends a single component to a directory path.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    format!("{dir}/{name}")
}

/// Collapses repeated and trailing separators: `"//docs/"` becomes `"/docs"`.
pub fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Splits an absolute mount path into the container name and the
/// container-relative remainder.
///
/// Empty segments are ignored. Returns `None` for the mount root.
///
/// ```
/// use odfs_core::path::split_container;
///
/// assert_eq!(split_container("/Data/docs/a.txt"), Some(("Data", "/docs/a.txt".to_string())));
/// assert_eq!(split_container("/Data"), Some(("Data", "/".to_string())));
/// assert_eq!(split_container("/"), None);
/// ```
pub fn split_container(path: &str) -> Option<(&str, String)> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let container = segments.next()?;
    let rest: Vec<&str> = segments.collect();
    Some((container, normalize(&rest.join("/"))))
}
