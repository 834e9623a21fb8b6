//! Form Controls
//!
//! Control definitions plus the mutable per-control form state.

use crate::{ElementKey, FormKey};

/// Form control types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ControlType {
    #[default]
    Text,
    Password,
    File,
    Checkbox,
    Radio,
    Submit,
    Image,
    Reset,
    Button,
    Hidden,
    Select,
}

impl ControlType {
    /// Parse an `<input type>` attribute; unknown types are text
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "password" => Self::Password,
            "file" => Self::File,
            "checkbox" => Self::Checkbox,
            "radio" => Self::Radio,
            "submit" => Self::Submit,
            "image" => Self::Image,
            "reset" => Self::Reset,
            "button" => Self::Button,
            "hidden" => Self::Hidden,
            "select" => Self::Select,
            _ => Self::Text,
        }
    }

    /// Text entry with a caret
    pub fn is_text_like(&self) -> bool {
        matches!(self, Self::Text | Self::Password)
    }

    /// Has a checked flag
    pub fn is_checkable(&self) -> bool {
        matches!(self, Self::Checkbox | Self::Radio)
    }

    /// Submits its form when activated
    pub fn is_submit(&self) -> bool {
        matches!(self, Self::Submit | Self::Image)
    }

    pub(crate) fn tag(&self) -> &'static str {
        match self {
            Self::Select => "select",
            _ => "input",
        }
    }
}

/// Mutable state of one control
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    value: String,
    caret: usize,
    checked: bool,
    selected_index: Option<usize>,
}

impl FormState {
    /// Current value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Caret position in characters. Script writes park it at the end.
    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn checked(&self) -> bool {
        self.checked
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected_index
    }

    /// Replace the value. Text-like controls move the caret to the end in the
    /// same write.
    pub fn set_value(&mut self, kind: ControlType, value: &str) {
        self.value = value.to_string();
        if kind.is_text_like() {
            self.caret = self.value.chars().count();
        }
    }

    pub fn set_checked(&mut self, checked: bool) {
        self.checked = checked;
    }

    /// Select `options[index]`. Out-of-range indexes are rejected.
    pub fn select(&mut self, options: &[String], index: usize) -> bool {
        match options.get(index) {
            Some(option) => {
                self.selected_index = Some(index);
                self.value = option.clone();
                true
            }
            None => false,
        }
    }

    /// Move the caret; clamped to the value length
    pub fn set_caret(&mut self, caret: usize) {
        self.caret = caret.min(self.value.chars().count());
    }
}

/// A form control
#[derive(Debug, Clone)]
pub struct FormControl {
    pub kind: ControlType,
    pub form: FormKey,
    pub element: ElementKey,
    pub default_value: String,
    pub default_checked: bool,
    pub default_selected: Option<usize>,
    /// Option values of a select control
    pub options: Vec<String>,
    pub disabled: bool,
    pub readonly: bool,
    pub max_length: Option<u32>,
    pub size: u32,
    pub alt: String,
    pub access_key: String,
    pub src: String,
    pub tab_index: i32,
    pub state: FormState,
}

impl FormControl {
    pub(crate) fn from_spec(spec: ControlSpec, form: FormKey, element: ElementKey) -> Self {
        let mut control = Self {
            kind: spec.kind,
            form,
            element,
            default_value: spec.value,
            default_checked: spec.checked,
            default_selected: spec.selected,
            options: spec.options,
            disabled: spec.disabled,
            readonly: spec.readonly,
            max_length: spec.max_length,
            size: spec.size,
            alt: spec.alt,
            access_key: spec.access_key,
            src: spec.src,
            tab_index: spec.tab_index,
            state: FormState::default(),
        };
        control.reset();
        control
    }

    /// Restore the default state
    pub fn reset(&mut self) {
        self.state = FormState::default();
        self.state.set_value(self.kind, &self.default_value);
        self.state.set_checked(self.default_checked);
        if self.kind == ControlType::Select {
            let index = self.default_selected.unwrap_or(0);
            if !self.state.select(&self.options, index) {
                self.state.selected_index = None;
            }
        }
    }
}

/// Builder for a new control
#[derive(Debug, Clone, Default)]
pub struct ControlSpec {
    pub kind: ControlType,
    pub id: Option<String>,
    pub name: Option<String>,
    pub value: String,
    pub checked: bool,
    pub options: Vec<String>,
    pub selected: Option<usize>,
    pub disabled: bool,
    pub readonly: bool,
    pub max_length: Option<u32>,
    pub size: u32,
    pub alt: String,
    pub access_key: String,
    pub src: String,
    pub tab_index: i32,
}

impl ControlSpec {
    pub fn new(kind: ControlType) -> Self {
        Self { kind, ..Default::default() }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Option values for a select; `selected` defaults to the first
    pub fn with_options<I, S>(mut self, options: I, selected: Option<usize>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self.selected = selected;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_type_parse() {
        assert_eq!(ControlType::parse("CHECKBOX"), ControlType::Checkbox);
        assert_eq!(ControlType::parse("password"), ControlType::Password);
        assert_eq!(ControlType::parse("email"), ControlType::Text);
    }

    #[test]
    fn test_set_value_moves_caret_for_text() {
        let mut state = FormState::default();
        state.set_value(ControlType::Text, "héllo");
        assert_eq!(state.value(), "héllo");
        assert_eq!(state.caret(), 5);

        let mut hidden = FormState::default();
        hidden.set_value(ControlType::Hidden, "abc");
        assert_eq!(hidden.caret(), 0);
    }

    #[test]
    fn test_select_bounds() {
        let options = vec!["a".to_string(), "b".to_string()];
        let mut state = FormState::default();
        assert!(state.select(&options, 1));
        assert_eq!(state.value(), "b");
        assert!(!state.select(&options, 2));
        assert_eq!(state.selected_index(), Some(1));
        assert_eq!(state.value(), "b");
    }
}
