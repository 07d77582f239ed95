//! WebDAV request headers and the mapping between request URIs and virtual paths.

use axum::http::{HeaderMap, Uri};
use drivefs_core::constants::MAX_LOCK_TIMEOUT;
use drivefs_core::{DriveError, DriveResult};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::time::Duration;

/// URI prefix the endpoint is mounted under.
pub const DAV_PREFIX: &str = "/dav";

/// Everything except RFC 3986 unreserved characters is escaped in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Virtual path addressed by a request URI path, or `None` outside the mount point.
///
/// The path is percent-decoded exactly once; anything still encoded afterwards is left for the
/// path resolver to reject.
pub fn virtual_path(uri_path: &str) -> Option<DriveResult<String>> {
    let rest = uri_path.strip_prefix(DAV_PREFIX)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let decoded = percent_decode_str(rest)
        .decode_utf8()
        .map(|p| if p.is_empty() { "/".to_string() } else { p.into_owned() })
        .map_err(|_| DriveError::invalid_input("path is not valid UTF-8"));
    Some(decoded)
}

/// The href a client uses for `path`. Collections end in `/`.
pub fn href(path: &str, is_dir: bool) -> String {
    let mut out = String::from(DAV_PREFIX);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.extend(utf8_percent_encode(segment, SEGMENT));
    }
    if is_dir {
        out.push('/');
    }
    out
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

/// `Depth` header. Anything but `0` means the resource and its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    /// Parses the header, falling back to `default` when it is absent or unrecognised.
    pub fn from_headers(headers: &HeaderMap, default: Depth) -> Depth {
        match header(headers, "depth") {
            Some("0") => Depth::Zero,
            Some("1") => Depth::One,
            Some(v) if v.eq_ignore_ascii_case("infinity") => Depth::Infinity,
            _ => default,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

/// Requested lock lifetime from a `Timeout` header such as `Second-3600, Infinite`.
///
/// The first usable value wins; `Infinite` maps onto the longest lock the table grants.
pub fn lock_timeout(headers: &HeaderMap) -> Option<Duration> {
    header(headers, "timeout")?
        .split(',')
        .map(str::trim)
        .find_map(|value| {
            if value.eq_ignore_ascii_case("infinite") {
                return Some(MAX_LOCK_TIMEOUT);
            }
            let secs = value
                .strip_prefix("Second-")
                .or_else(|| value.strip_prefix("second-"))?;
            secs.parse::<u64>().ok().map(Duration::from_secs)
        })
}

/// Every lock token mentioned in an `If` header.
///
/// Tagged lists and `Not` conditions are not evaluated; a submitted token only proves the
/// client knows it.
pub fn if_tokens(headers: &HeaderMap) -> Vec<String> {
    let Some(value) = header(headers, "if") else {
        return Vec::new();
    };
    value
        .split('<')
        .skip(1)
        .filter_map(|chunk| chunk.split_once('>').map(|(inner, _)| inner.trim()))
        .filter(|inner| inner.starts_with("opaquelocktoken:"))
        .map(str::to_string)
        .collect()
}

/// Token of a `Lock-Token: <opaquelocktoken:...>` header.
pub fn lock_token(headers: &HeaderMap) -> Option<String> {
    let value = header(headers, "lock-token")?;
    let token = value.trim_start_matches('<').trim_end_matches('>').trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Virtual path named by a `Destination` header, which may be an absolute URL or a path.
pub fn destination(headers: &HeaderMap) -> DriveResult<String> {
    let value =
        header(headers, "destination").ok_or_else(|| DriveError::invalid_input("missing Destination"))?;
    let uri: Uri = value
        .parse()
        .map_err(|_| DriveError::invalid_input("malformed Destination"))?;
    virtual_path(uri.path()).unwrap_or_else(|| Err(DriveError::invalid_input("Destination outside the endpoint")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn uri_paths_map_onto_virtual_paths() {
        assert_eq!(virtual_path("/dav").unwrap().unwrap(), "/");
        assert_eq!(virtual_path("/dav/").unwrap().unwrap(), "/");
        assert_eq!(
            virtual_path("/dav/home/Q1%20report.pdf").unwrap().unwrap(),
            "/home/Q1 report.pdf"
        );
        // Double encoding survives one decode and is left for the resolver to reject.
        assert_eq!(virtual_path("/dav/home/%252e%252e").unwrap().unwrap(), "/home/%2e%2e");
        assert!(virtual_path("/davx/home").is_none());
        assert!(virtual_path("/api/files").is_none());
        assert!(virtual_path("/dav/%ff").unwrap().is_err());
    }

    #[test]
    fn hrefs_escape_segments() {
        assert_eq!(href("/", true), "/dav/");
        assert_eq!(href("/home/Q1 report.pdf", false), "/dav/home/Q1%20report.pdf");
        assert_eq!(href("/shared/design", true), "/dav/shared/design/");
    }

    #[test]
    fn depth_and_timeout() {
        assert_eq!(Depth::from_headers(&headers(&[("depth", "0")]), Depth::One), Depth::Zero);
        assert_eq!(Depth::from_headers(&HeaderMap::new(), Depth::One), Depth::One);
        assert_eq!(
            Depth::from_headers(&headers(&[("depth", "Infinity")]), Depth::Zero),
            Depth::Infinity
        );
        assert_eq!(
            lock_timeout(&headers(&[("timeout", "Second-600, Infinite")])),
            Some(Duration::from_secs(600))
        );
        assert_eq!(lock_timeout(&headers(&[("timeout", "Infinite")])), Some(MAX_LOCK_TIMEOUT));
        assert_eq!(lock_timeout(&HeaderMap::new()), None);
    }

    #[test]
    fn lock_tokens_from_headers() {
        let h = headers(&[(
            "if",
            "<http://host/dav/home/a> (<opaquelocktoken:abc> [\"etag\"]) (Not <opaquelocktoken:def>)",
        )]);
        assert_eq!(if_tokens(&h), ["opaquelocktoken:abc", "opaquelocktoken:def"]);
        assert_eq!(
            lock_token(&headers(&[("lock-token", "<opaquelocktoken:abc>")])).as_deref(),
            Some("opaquelocktoken:abc")
        );
    }

    #[test]
    fn destinations() {
        let h = headers(&[("destination", "http://files.example/dav/home/new%20name.txt")]);
        assert_eq!(destination(&h).unwrap(), "/home/new name.txt");
        let h = headers(&[("destination", "/dav/shared/design/x")]);
        assert_eq!(destination(&h).unwrap(), "/shared/design/x");
        let h = headers(&[("destination", "http://files.example/elsewhere")]);
        assert!(destination(&h).is_err());
        assert!(destination(&HeaderMap::new()).is_err());
    }
}
