//! HTTP Headers
//!
//! Header name validation and response head parsing.

use crate::NetError;

/// Request headers a script may never set
pub const FORBIDDEN_HEADERS: &[&str] = &[
    "accept-charset",
    "accept-encoding",
    "access-control-request-headers",
    "access-control-request-method",
    "connection",
    "content-length",
    "cookie",
    "cookie2",
    "date",
    "dnt",
    "expect",
    "host",
    "keep-alive",
    "origin",
    "referer",
    "set-cookie",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "via",
];

/// Check if a request header is forbidden to scripts
pub fn is_forbidden_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    FORBIDDEN_HEADERS.contains(&lower.as_str()) || lower.starts_with("proxy-") || lower.starts_with("sec-")
}

/// Check header name syntax: visible ASCII without separators
pub fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| (33..127).contains(&b) && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}

/// Strip leading and trailing HTTP whitespace from a header value
pub fn normalize_value(value: &str) -> &str {
    value.trim_matches(|c| matches!(c, '\r' | '\n' | '\t' | ' '))
}

/// Header list with case-insensitive names.
///
/// A repeated name is merged into the first occurrence with `", "`; the first
/// spelling of the name is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, merging with an existing header of the same name
    pub fn append(&mut self, name: &str, value: &str) {
        let value = normalize_value(value);
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as `name: value` lines, each ending in CRLF
    pub fn to_raw(&self) -> String {
        let mut result = String::new();
        for (name, value) in &self.entries {
            result.push_str(name);
            result.push_str(": ");
            result.push_str(value);
            result.push_str("\r\n");
        }
        result
    }
}

/// Status line plus headers of a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub status_text: String,
    pub headers: ResponseHeaders,
}

impl ResponseHead {
    /// Parse a raw response head (`HTTP/1.1 200 OK` followed by header lines).
    /// Parsing stops at the first empty line; lines without a colon are skipped.
    pub fn parse(raw: &str) -> Result<Self, NetError> {
        let mut lines = raw.lines();
        let status_line = lines
            .next()
            .map(normalize_value)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| NetError::Malformed("empty response head".into()))?;

        let mut parts = status_line.splitn(3, ' ');
        let _version = parts.next();
        let status = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| NetError::Malformed(format!("bad status line: {}", status_line)))?;
        let status_text = parts.next().unwrap_or("").trim().to_string();

        let mut headers = ResponseHeaders::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                if !name.is_empty() {
                    headers.append(name, value);
                }
            }
        }

        Ok(Self { status, status_text, headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_headers() {
        assert!(is_forbidden_header("Content-Length"));
        assert!(is_forbidden_header("Proxy-Authorization"));
        assert!(is_forbidden_header("sec-fetch-mode"));
        assert!(!is_forbidden_header("X-Requested-With"));
    }

    #[test]
    fn test_header_name_validation() {
        assert!(is_valid_header_name("X-Custom"));
        assert!(!is_valid_header_name(""));
        assert!(!is_valid_header_name("Bad Name"));
        assert!(!is_valid_header_name("a:b"));
        assert!(!is_valid_header_name("naïve"));
    }

    #[test]
    fn test_parse_head() {
        let head = ResponseHead::parse(
            "HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\nset-cookie: a=1\r\nSet-Cookie:  b=2 \r\n\r\nignored: yes",
        )
        .unwrap();
        assert_eq!(head.status, 404);
        assert_eq!(head.status_text, "Not Found");
        assert_eq!(head.headers.get("content-type"), Some("text/html"));
        assert_eq!(head.headers.get("SET-COOKIE"), Some("a=1, b=2"));
        assert_eq!(head.headers.get("ignored"), None);
        assert_eq!(head.headers.len(), 2);
    }

    #[test]
    fn test_parse_bad_status() {
        assert!(ResponseHead::parse("").is_err());
        assert!(ResponseHead::parse("HTTP/1.1 abc").is_err());
    }
}
