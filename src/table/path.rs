//! Path handling
//!
//! Canonical paths have no leading, trailing or doubled separators:
//! `/a//b/` and `a/b` are the same path. The root is the empty string.

/// Path separator
pub const SEPARATOR: char = '/';

/// Non-empty segments of a path
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Canonical form of a path
pub fn normalize(path: &str) -> String {
    segments(path).collect::<Vec<_>>().join("/")
}

/// Join a (possibly empty) prefix and a relative key, normalizing both
pub fn join(prefix: &str, key: &str) -> String {
    segments(prefix)
        .chain(segments(key))
        .collect::<Vec<_>>()
        .join("/")
}

/// Last segment of a normalized path
pub fn name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

/// Parent of a normalized path (`""` for top-level paths)
pub fn parent(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// True if normalized `path` equals `prefix` or lies below it
pub fn is_under(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// Part of normalized `path` below `prefix`, if it is strictly below it
pub fn relative<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return if path.is_empty() { None } else { Some(path) };
    }
    path.strip_prefix(prefix)?.strip_prefix(SEPARATOR)
}
