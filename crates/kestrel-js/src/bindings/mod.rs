//! Script Façades
//!
//! Façade objects over the native document. Every accessor and method
//! resolves `this` through the binding registry first; a detached or foreign
//! `this` reads as `null`, and writes through it are dropped.

pub(crate) mod collection;
pub(crate) mod document;
pub(crate) mod element;
pub(crate) mod form;
pub(crate) mod input;
pub(crate) mod location;
pub(crate) mod window;
pub(crate) mod xhr;

use std::rc::Rc;

use kestrel_dom::{ControlKey, ElementKey, EntityId, FormKey, NodeSetKey};

use crate::engine::{NativeFn, ScriptEngine, Value};
use crate::error::ScriptError;
use crate::host::Host;
use crate::registry::BindingKey;
use crate::value::ScriptValue;
use crate::xhr::XhrId;

/// Property and method names collections never shadow
pub(crate) const RESERVED_NAMES: [&str; 2] = ["item", "namedItem"];

pub(crate) fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Key type a façade resolves `this` to
pub(crate) trait FacadeKey: Copy + 'static {
    fn from_binding(key: BindingKey) -> Option<Self>;
}

/// Key of the document façade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DocumentEntity;

impl FacadeKey for DocumentEntity {
    fn from_binding(key: BindingKey) -> Option<Self> {
        matches!(key, BindingKey::Entity(EntityId::Document)).then_some(DocumentEntity)
    }
}

macro_rules! facade_key {
    ($ty:ty, $variant:ident) => {
        impl FacadeKey for $ty {
            fn from_binding(key: BindingKey) -> Option<Self> {
                match key {
                    BindingKey::Entity(EntityId::$variant(k)) => Some(k),
                    _ => None,
                }
            }
        }
    };
}

facade_key!(FormKey, Form);
facade_key!(ControlKey, Control);
facade_key!(ElementKey, Element);
facade_key!(NodeSetKey, NodeSet);

/// Key of a `form.elements` collection: the form it enumerates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ElementsOf(pub(crate) FormKey);

impl FacadeKey for ElementsOf {
    fn from_binding(key: BindingKey) -> Option<Self> {
        match key {
            BindingKey::Elements(form, _) => Some(ElementsOf(form)),
            _ => None,
        }
    }
}

impl FacadeKey for XhrId {
    fn from_binding(key: BindingKey) -> Option<Self> {
        match key {
            BindingKey::Xhr(id) => Some(id),
            _ => None,
        }
    }
}

/// Getter that reads through a live `this`
pub(crate) fn getter<E, K, F>(host: &Rc<Host<E>>, f: F) -> NativeFn<E>
where
    E: ScriptEngine,
    K: FacadeKey,
    F: Fn(&Rc<Host<E>>, &mut E, K) -> Result<Value<E>, ScriptError> + 'static,
{
    let host = host.clone();
    Rc::new(move |engine, this, _| match host.resolve::<K>(engine, this) {
        Some(key) => f(&host, engine, key),
        None => Ok(ScriptValue::Null),
    })
}

/// Setter that writes through a live `this`; a detached `this` drops the write
pub(crate) fn setter<E, K, F>(host: &Rc<Host<E>>, f: F) -> NativeFn<E>
where
    E: ScriptEngine,
    K: FacadeKey,
    F: Fn(&Rc<Host<E>>, &mut E, K, &Value<E>) -> Result<(), ScriptError> + 'static,
{
    let host = host.clone();
    Rc::new(move |engine, this, args| {
        if let Some(key) = host.resolve::<K>(engine, this) {
            let value = args.first().cloned().unwrap_or_default();
            f(&host, engine, key, &value)?;
        }
        Ok(ScriptValue::Undefined)
    })
}

/// Method on a live `this`; `null` when detached
pub(crate) fn method<E, K, F>(host: &Rc<Host<E>>, f: F) -> NativeFn<E>
where
    E: ScriptEngine,
    K: FacadeKey,
    F: Fn(&Rc<Host<E>>, &mut E, K, &[Value<E>]) -> Result<Value<E>, ScriptError> + 'static,
{
    let host = host.clone();
    Rc::new(move |engine, this, args| match host.resolve::<K>(engine, this) {
        Some(key) => f(&host, engine, key, args),
        None => Ok(ScriptValue::Null),
    })
}

/// Define a read-only accessor
pub(crate) fn define_getter<E: ScriptEngine>(
    engine: &mut E,
    object: &E::Object,
    name: &str,
    get: NativeFn<E>,
) -> Result<(), ScriptError> {
    engine.define_accessor(object, name, get, None, true)
}

/// Define a read/write accessor
pub(crate) fn define_property<E: ScriptEngine>(
    engine: &mut E,
    object: &E::Object,
    name: &str,
    get: NativeFn<E>,
    set: NativeFn<E>,
) -> Result<(), ScriptError> {
    engine.define_accessor(object, name, get, Some(set), true)
}

/// Define a function-valued data property
pub(crate) fn define_method<E: ScriptEngine>(
    engine: &mut E,
    object: &E::Object,
    name: &str,
    f: NativeFn<E>,
) -> Result<(), ScriptError> {
    let function = engine.create_function(name, f)?;
    engine.set(object, name, ScriptValue::Object(function))
}

/// String argument `index`; `undefined` and missing arguments are `None`
pub(crate) fn string_arg<E: ScriptEngine>(
    engine: &mut E,
    args: &[Value<E>],
    index: usize,
) -> Result<Option<String>, ScriptError> {
    match args.get(index) {
        None | Some(ScriptValue::Undefined) => Ok(None),
        Some(value) => engine.to_string(value).map(Some),
    }
}

/// ToString of a setter value
pub(crate) fn string_value<E: ScriptEngine>(engine: &mut E, value: &Value<E>) -> Result<String, ScriptError> {
    engine.to_string(value)
}

/// Array index, if `name` is one
pub(crate) fn index_of(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    name.parse().ok()
}

/// Index argument as an integer; non-numbers are `None`
pub(crate) fn index_arg<E: ScriptEngine>(args: &[Value<E>]) -> Option<usize> {
    let n = args.first()?.to_number();
    (n.is_finite() && n >= 0.0).then_some(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of() {
        assert_eq!(index_of("0"), Some(0));
        assert_eq!(index_of("12"), Some(12));
        assert_eq!(index_of("01"), None);
        assert_eq!(index_of("x"), None);
        assert_eq!(index_of(""), None);
    }

    #[test]
    fn test_reserved() {
        assert!(is_reserved("item"));
        assert!(is_reserved("namedItem"));
        assert!(!is_reserved("items"));
    }
}
