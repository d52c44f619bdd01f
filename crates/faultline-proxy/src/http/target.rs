//! Target URL extraction from the proxy's request convention.
//!
//! A client sends its request to the proxy with the absolute upstream URL
//! percent-encoded into the request path: `GET /https%3A%2F%2Fapi.example.com%2Fv1%2Fusers`.
//! The leading slash is stripped and the remainder percent-decoded to
//! recover the real target.

/// Recover the absolute target URL from an incoming request path (and its
/// query string, which travels alongside unencoded).
pub fn extract_target(path: &str, query: Option<&str>) -> Option<String> {
    let encoded = path.strip_prefix('/')?;
    if encoded.is_empty() {
        return None;
    }
    let decoded = percent_decode(encoded);
    if !(decoded.starts_with("http://") || decoded.starts_with("https://")) {
        return None;
    }
    match query {
        Some(q) if !q.is_empty() => Some(format!("{decoded}?{q}")),
        _ => Some(decoded),
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_percent_encoded_https_target() {
        let target = extract_target("/https%3A%2F%2Fapi.example.com%2Fv1%2Fusers", None);
        assert_eq!(target, Some("https://api.example.com/v1/users".to_string()));
    }

    #[test]
    fn preserves_query_string() {
        let target = extract_target(
            "/https%3A%2F%2Fapi.example.com%2Fv1",
            Some("page=2&limit=10"),
        );
        assert_eq!(
            target,
            Some("https://api.example.com/v1?page=2&limit=10".to_string())
        );
    }

    #[test]
    fn rejects_non_url_paths() {
        assert_eq!(extract_target("/healthz", None), None);
        assert_eq!(extract_target("/", None), None);
    }

    #[test]
    fn accepts_plain_http_target() {
        let target = extract_target("/http%3A%2F%2Finternal.local%2Fping", None);
        assert_eq!(target, Some("http://internal.local/ping".to_string()));
    }
}
