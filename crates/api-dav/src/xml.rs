//! Response bodies: `207 Multi-Status` property listings and lock discovery.
//!
//! Request bodies are barely read (PROPFIND always answers with every live property), so the
//! XML written here is small and built directly.

use crate::headers::{href, Depth};
use chrono::{DateTime, Utc};
use drivefs_core::locks::LockInfo;
use drivefs_core::vfs::FileInfo;
use std::fmt::Write;

const XML_DECL: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Escapes text for element content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// RFC 1123 date as used by `getlastmodified` and `Last-Modified`.
pub fn http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn supported_lock() -> &'static str {
    "<D:supportedlock><D:lockentry><D:lockscope><D:exclusive/></D:lockscope>\
     <D:locktype><D:write/></D:locktype></D:lockentry></D:supportedlock>"
}

fn response(out: &mut String, entry: &FileInfo) {
    let _ = write!(
        out,
        "<D:response><D:href>{}</D:href><D:propstat><D:prop>",
        escape(&href(&entry.path, entry.is_dir))
    );
    let _ = write!(out, "<D:displayname>{}</D:displayname>", escape(entry.label()));
    if entry.is_dir {
        out.push_str("<D:resourcetype><D:collection/></D:resourcetype>");
    } else {
        out.push_str("<D:resourcetype/>");
        let _ = write!(out, "<D:getcontentlength>{}</D:getcontentlength>", entry.size);
        out.push_str("<D:getcontenttype>application/octet-stream</D:getcontenttype>");
    }
    if let Some(modified) = entry.modified {
        let _ = write!(
            out,
            "<D:getlastmodified>{}</D:getlastmodified>",
            http_date(modified)
        );
    }
    out.push_str(supported_lock());
    out.push_str("</D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>");
}

/// `207 Multi-Status` body listing `entries`.
pub fn multistatus<'a>(entries: impl IntoIterator<Item = &'a FileInfo>) -> String {
    let mut out = format!(r#"{XML_DECL}<D:multistatus xmlns:D="DAV:">"#);
    for entry in entries {
        response(&mut out, entry);
    }
    out.push_str("</D:multistatus>");
    out
}

/// Lock discovery body returned by `LOCK`.
pub fn lock_discovery(lock: &LockInfo, is_dir: bool) -> String {
    let depth = if lock.deep { Depth::Infinity } else { Depth::Zero };
    let mut out = format!(
        r#"{XML_DECL}<D:prop xmlns:D="DAV:"><D:lockdiscovery><D:activelock>"#
    );
    out.push_str("<D:locktype><D:write/></D:locktype><D:lockscope><D:exclusive/></D:lockscope>");
    let _ = write!(out, "<D:depth>{}</D:depth>", depth.as_str());
    if let Some(note) = &lock.owner_note {
        let _ = write!(out, "<D:owner>{}</D:owner>", escape(note));
    }
    let _ = write!(
        out,
        "<D:timeout>Second-{}</D:timeout><D:locktoken><D:href>{}</D:href></D:locktoken>",
        lock.timeout.as_secs(),
        escape(&lock.token)
    );
    let _ = write!(
        out,
        "<D:lockroot><D:href>{}</D:href></D:lockroot>",
        escape(&href(&lock.display_path, is_dir))
    );
    out.push_str("</D:activelock></D:lockdiscovery></D:prop>");
    out
}

/// Text content of the `owner` element of a LOCK request body, if any.
///
/// Nested markup (an `<D:href>` inside the owner, say) is flattened to its text.
pub fn lock_owner(body: &str) -> Option<String> {
    let start = find_tag(body, "owner", false)?;
    let inner = &body[start..];
    let end = find_tag(inner, "owner", true)?;
    let raw = &inner[..end];

    let mut text = String::new();
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Byte offset just after an opening tag named `local` (any namespace prefix), or the offset
/// of the matching closing tag when `closing`.
fn find_tag(haystack: &str, local: &str, closing: bool) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = haystack[from..].find('<') {
        let open = from + rel;
        let close = open + haystack[open..].find('>')?;
        let tag = &haystack[open + 1..close];
        let is_closing = tag.starts_with('/');
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");
        let name = name.rsplit(':').next().unwrap_or(name);
        if name == local && is_closing == closing {
            return Some(if closing { open } else { close + 1 });
        }
        from = close + 1;
    }
    None
}
