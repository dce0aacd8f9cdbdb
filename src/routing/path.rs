//! Prefix resolution and request-path rewriting.
//!
//! An upstream's routes are mounted under
//! `join(external root, manifest prefix, upstream prefix)`. The same string
//! is stripped from the inbound path before the request is forwarded.

/// Join path elements and clean the result.
///
/// Empty elements are skipped, repeated separators collapse, `.`/`..`
/// resolve and the trailing separator is dropped. The result is always
/// absolute, except when every element is empty, in which case it is `""`.
pub fn join(elements: &[&str]) -> String {
    let joined = elements
        .iter()
        .filter(|e| !e.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        return String::new();
    }
    clean(&joined)
}

/// Normalize a path lexically. Always returns an absolute path.
pub fn clean(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    format!("/{}", out.join("/"))
}

/// Effective prefix for one upstream.
pub fn resolve_prefix(root: &str, manifest_prefix: &str, upstream_prefix: &str) -> String {
    join(&[root, manifest_prefix, upstream_prefix])
}

/// Render an effective root, reporting the empty root as `/`.
pub fn display_root(root: &str) -> &str {
    if root.is_empty() {
        "/"
    } else {
        root
    }
}

/// Full registration path for a route under `prefix`.
///
/// With `keep_trailing_slash`, a trailing `/` on the route survives the join
/// so `/a` and `/a/` stay distinct routes.
pub fn route_path(prefix: &str, route: &str, keep_trailing_slash: bool) -> String {
    let mut full = join(&[prefix, route]);
    if full.is_empty() {
        full.push('/');
    }
    if keep_trailing_slash && route.ends_with('/') && !full.ends_with('/') {
        full.push('/');
    }
    full
}

/// The other spelling of `path` when trailing slashes are equivalent.
///
/// Returns `None` for the root and for catch-all patterns, which already
/// cover both spellings.
pub fn trailing_slash_variant(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    let last = path.rsplit('/').next().unwrap_or_default();
    if last == "*" || last.starts_with("{*") {
        return None;
    }
    match path.strip_suffix('/') {
        Some(trimmed) => Some(trimmed.to_string()),
        None => Some(format!("{}/", path)),
    }
}

/// Remove `prefix` from the start of `path`.
///
/// The prefix must end on a segment boundary. An exhausted path becomes `/`.
pub fn strip_prefix(path: &str, prefix: &str) -> Option<String> {
    if prefix.is_empty() || prefix == "/" {
        return Some(path.to_string());
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

/// Drop a single trailing slash, leaving the root alone.
pub fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}
