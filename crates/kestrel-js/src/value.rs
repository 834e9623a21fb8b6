//! Script Values
//!
//! Engine-neutral value representation. `O` is the backend's object handle.

/// A script value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScriptValue<O> {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(O),
}

impl<O> ScriptValue<O> {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_object(&self) -> Option<&O> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// ToBoolean
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Object(_) => true,
        }
    }

    /// ToNumber for primitives; objects are NaN
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => string_to_number(s),
            Self::Object(_) => f64::NAN,
        }
    }

    /// ToString for primitives. Objects need the engine; `None` here.
    pub fn primitive_string(&self) -> Option<String> {
        Some(match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => number_to_string(*n),
            Self::String(s) => s.clone(),
            Self::Object(_) => return None,
        })
    }

    /// `typeof` for everything but callables
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null | Self::Object(_) => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }
}

impl<O> From<bool> for ScriptValue<O> {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<O> From<f64> for ScriptValue<O> {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl<O> From<i32> for ScriptValue<O> {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl<O> From<u32> for ScriptValue<O> {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl<O> From<usize> for ScriptValue<O> {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl<O> From<&str> for ScriptValue<O> {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl<O> From<String> for ScriptValue<O> {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<O> From<Option<String>> for ScriptValue<O> {
    fn from(s: Option<String>) -> Self {
        s.map_or(Self::Null, Self::String)
    }
}

/// Number formatting as script sees it: integers print without a fraction
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type V = ScriptValue<u32>;

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(V::from("42").to_number(), 42.0);
        assert_eq!(V::from(" ").to_number(), 0.0);
        assert!(V::from("4x").to_number().is_nan());
        assert!(!V::from("").truthy());
        assert!(V::Object(1).truthy());
        assert_eq!(V::Null.primitive_string().as_deref(), Some("null"));
        assert_eq!(V::Object(1).primitive_string(), None);
    }
}
