//! Virtual path sanitising.
//!
//! Pure string functions with **no I/O**: the raw-input screen that runs before
//! normalisation, the normaliser itself, and the root containment check.

use crate::{DriveError, DriveResult};
use std::path::{Path, MAIN_SEPARATOR};

/// Signatures rejected anywhere in the raw input (compared case-insensitively).
///
/// Percent-encoded `.`, `/` and `\` cover both single and double encoding (`%25`), since
/// normalisation never decodes and would let an encoded separator through to a consumer that
/// does.
const DANGEROUS_PATTERNS: &[&str] = &["%2e", "%2f", "%5c", "%25", "%00", "\\"];

/// Screens a raw virtual path before normalisation.
///
/// Order matters only for which error is reported: null bytes first, then literal `..`, then
/// the remaining dangerous signatures.
pub fn screen_raw(raw: &str) -> DriveResult<()> {
    if raw.contains('\0') {
        return Err(DriveError::NullByte);
    }
    if raw.contains("..") {
        return Err(DriveError::PathTraversal);
    }
    let lowered = raw.to_ascii_lowercase();
    if DANGEROUS_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return Err(DriveError::DangerousPattern);
    }
    if raw.chars().any(char::is_control) {
        return Err(DriveError::DangerousPattern);
    }
    Ok(())
}

/// Normalises a virtual path.
///
/// Collapses repeated separators, drops `.` segments, resolves `..` lexically and returns an
/// absolute path without a trailing separator. The empty string and `/` both normalise to
/// `/`.
pub fn clean(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(raw.len() + 1);
    for s in segments {
        out.push('/');
        out.push_str(s);
    }
    out
}

/// Splits a cleaned virtual path into its segments (no empty segments).
pub fn segments(cleaned: &str) -> Vec<&str> {
    cleaned.split('/').filter(|s| !s.is_empty()).collect()
}

/// Joins a child name onto a cleaned virtual directory path.
pub fn join_virtual(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{}/{name}", parent.trim_end_matches('/'))
    }
}

/// Splits a cleaned virtual path into (parent, final segment).
///
/// Returns `None` for the root.
pub fn split_parent(cleaned: &str) -> Option<(&str, &str)> {
    if cleaned == "/" {
        return None;
    }
    let idx = cleaned.rfind('/')?;
    let parent = if idx == 0 { "/" } else { &cleaned[..idx] };
    Some((parent, &cleaned[idx + 1..]))
}

/// True when `path` is `ancestor` itself or lies strictly beneath it.
///
/// Both arguments are cleaned virtual paths. The separator is part of the comparison so that
/// `/home/reports-old` is not considered to lie under `/home/reports`.
pub fn is_same_or_under(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return true;
    }
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

/// Root containment check on absolute filesystem paths.
///
/// Accepts `candidate` only if it equals `root` or starts with `root` followed by the
/// platform separator. A sibling whose name merely shares a prefix with the root
/// (`users` vs `users_evil`) is rejected.
pub fn is_within_root(candidate: &Path, root: &Path) -> bool {
    let candidate = candidate.to_string_lossy();
    let root = root.to_string_lossy();
    let root = root.trim_end_matches(MAIN_SEPARATOR);
    if candidate == root {
        return true;
    }
    let mut prefix = String::with_capacity(root.len() + 1);
    prefix.push_str(root);
    prefix.push(MAIN_SEPARATOR);
    candidate.starts_with(&prefix)
}
