//! Forms
//!
//! Form records and submission encoding.

use crate::{ControlKey, ElementKey, FormKey};
use url::Url;

/// Form submission method. The POST variants carry the encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormMethod {
    #[default]
    Get,
    Post,
    PostMultipart,
    PostTextPlain,
}

impl FormMethod {
    /// Parse a `method` attribute
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("post") { Self::Post } else { Self::Get }
    }

    /// `GET` or `POST`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post | Self::PostMultipart | Self::PostTextPlain => "POST",
        }
    }

    /// Content type of the submitted body
    pub fn encoding(&self) -> &'static str {
        match self {
            Self::Get | Self::Post => "application/x-www-form-urlencoded",
            Self::PostMultipart => "multipart/form-data",
            Self::PostTextPlain => "text/plain",
        }
    }

    /// Apply a method name. Unknown names leave the method unchanged.
    pub fn with_method_name(self, name: &str) -> Self {
        if name.eq_ignore_ascii_case("GET") {
            Self::Get
        } else if name.eq_ignore_ascii_case("POST") {
            Self::Post
        } else {
            self
        }
    }

    /// Apply an encoding. The url-encoded type keeps GET as GET, every other
    /// known type implies a POST. Unknown types leave the method unchanged.
    pub fn with_encoding(self, encoding: &str) -> Self {
        if encoding.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            if self == Self::Get { Self::Get } else { Self::Post }
        } else if encoding.eq_ignore_ascii_case("multipart/form-data") {
            Self::PostMultipart
        } else if encoding.eq_ignore_ascii_case("text/plain") {
            Self::PostTextPlain
        } else {
            self
        }
    }
}

/// Form record
#[derive(Debug, Clone)]
pub struct Form {
    pub element: ElementKey,
    /// Action as written; resolved against the document URL on read
    pub action: String,
    pub method: FormMethod,
    pub target: String,
    pub(crate) controls: Vec<ControlKey>,
}

impl Form {
    /// Controls in document order
    pub fn controls(&self) -> &[ControlKey] {
        &self.controls
    }
}

/// Builder for a new form
#[derive(Debug, Clone, Default)]
pub struct FormSpec {
    pub id: Option<String>,
    pub name: Option<String>,
    pub action: String,
    pub method: FormMethod,
    pub target: String,
}

impl FormSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_method(mut self, method: FormMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

/// A submission recorded for the session
#[derive(Debug, Clone, PartialEq)]
pub struct FormSubmission {
    pub form: FormKey,
    pub action: Url,
    pub method: FormMethod,
    pub target: String,
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    /// Fields as `application/x-www-form-urlencoded`
    pub fn to_url_encoded(&self) -> String {
        self.fields
            .iter()
            .map(|(name, value)| format!("{}={}", url_encode(name), url_encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Target URL; a GET submission carries the fields in the query
    pub fn url(&self) -> Url {
        let mut url = self.action.clone();
        if self.method == FormMethod::Get {
            let query = self.to_url_encoded();
            url.set_query(if query.is_empty() { None } else { Some(&query) });
        }
        url
    }
}

fn url_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b' ' => result.push('+'),
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_and_encoding() {
        assert_eq!(FormMethod::PostMultipart.as_str(), "POST");
        assert_eq!(FormMethod::Get.encoding(), "application/x-www-form-urlencoded");

        let method = FormMethod::Get.with_encoding("text/plain");
        assert_eq!(method, FormMethod::PostTextPlain);
        assert_eq!(method.with_encoding("application/x-www-form-urlencoded"), FormMethod::Post);
        assert_eq!(FormMethod::Get.with_encoding("application/x-www-form-urlencoded"), FormMethod::Get);
        assert_eq!(FormMethod::Post.with_method_name("get"), FormMethod::Get);
        assert_eq!(FormMethod::Post.with_method_name("put"), FormMethod::Post);
    }

    #[test]
    fn test_url_encoding() {
        assert_eq!(url_encode("hello world"), "hello+world");
        assert_eq!(url_encode("a&b=ç"), "a%26b%3D%C3%A7");
    }

    #[test]
    fn test_get_submission_url() {
        let submission = FormSubmission {
            form: FormKey(crate::Arena::<()>::new().insert(())),
            action: Url::parse("http://example.com/search?old=1").unwrap(),
            method: FormMethod::Get,
            target: String::new(),
            fields: vec![("q".into(), "rust lang".into())],
        };
        assert_eq!(submission.url().as_str(), "http://example.com/search?q=rust+lang");
    }
}
