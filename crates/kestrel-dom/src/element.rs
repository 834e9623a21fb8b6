//! Elements
//!
//! Flat element records in document order. Forms and form controls are
//! elements too; their element carries the `id`/`name` attributes.

use crate::{ControlKey, FormKey};

/// What an element is backed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Plain,
    Form(FormKey),
    Control(ControlKey),
}

/// Element record
#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    id: Option<String>,
    name: Option<String>,
    attributes: Vec<(String, String)>,
    pub(crate) kind: ElementKind,
}

impl Element {
    pub(crate) fn new(tag: &str, kind: ElementKind) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            id: None,
            name: None,
            attributes: Vec::new(),
            kind,
        }
    }

    /// Lowercase tag name
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// `id` attribute, `None` when absent or empty
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|s| !s.is_empty())
    }

    /// `name` attribute, `None` when absent or empty
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|s| !s.is_empty())
    }

    /// Get an attribute (ASCII case-insensitive name)
    pub fn attribute(&self, name: &str) -> Option<&str> {
        if name.eq_ignore_ascii_case("id") {
            return self.id.as_deref();
        }
        if name.eq_ignore_ascii_case("name") {
            return self.name.as_deref();
        }
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("id") {
            self.id = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("name") {
            self.name = Some(value.to_string());
        } else if let Some(slot) = self.attributes.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            slot.1 = value.to_string();
        } else {
            self.attributes.push((name.to_ascii_lowercase(), value.to_string()));
        }
    }
}
