//! Edge case tests for kestrel-net
//!
//! Unusual response heads and header names.

use kestrel_net::{ResponseHead, ResponseHeaders, is_forbidden_header, is_valid_header_name};

// ============================================================================
// RESPONSE HEADS
// ============================================================================

#[test]
fn test_head_with_lf_only() {
    let head = ResponseHead::parse("HTTP/1.0 200 OK\nA: 1\nB: 2\n").unwrap();
    assert_eq!(head.headers.get("a"), Some("1"));
    assert_eq!(head.headers.get("b"), Some("2"));
}

#[test]
fn test_head_without_reason_phrase() {
    let head = ResponseHead::parse("HTTP/1.1 204\r\n\r\n").unwrap();
    assert_eq!(head.status, 204);
    assert_eq!(head.status_text, "");
    assert!(head.headers.is_empty());
}

#[test]
fn test_value_with_colons() {
    let head = ResponseHead::parse("HTTP/1.1 302 Found\r\nLocation: http://example.com:8080/x\r\n").unwrap();
    assert_eq!(head.headers.get("location"), Some("http://example.com:8080/x"));
}

#[test]
fn test_line_without_colon_skipped() {
    let head = ResponseHead::parse("HTTP/1.1 200 OK\r\ngarbage\r\nX: y\r\n").unwrap();
    assert_eq!(head.headers.len(), 1);
}

// ============================================================================
// HEADER LISTS
// ============================================================================

#[test]
fn test_merge_keeps_first_spelling() {
    let mut headers = ResponseHeaders::new();
    headers.append("X-Test", "one");
    headers.append("x-test", "two");
    headers.append("X-TEST", "three");
    assert_eq!(headers.to_raw(), "X-Test: one, two, three\r\n");
}

#[test]
fn test_empty_value() {
    let mut headers = ResponseHeaders::new();
    headers.append("X-Empty", "   ");
    assert_eq!(headers.get("x-empty"), Some(""));
}

#[test]
fn test_name_rules() {
    for bad in ["a b", "a(b", "a\"b", "a/b", "a=b", "{x}", "tab\t"] {
        assert!(!is_valid_header_name(bad), "{bad}");
    }
    assert!(is_valid_header_name("X-Custom_Header.1"));
    assert!(is_forbidden_header("HOST"));
    assert!(!is_forbidden_header("Content-Type"));
}
