//! Element Façade
//!
//! Plain elements. Forms and controls use their own façades.

use std::rc::Rc;

use kestrel_dom::ElementKey;

use super::{define_getter, define_method, getter, method, string_arg};
use crate::engine::ScriptEngine;
use crate::error::ScriptError;
use crate::host::Host;
use crate::value::ScriptValue;

pub(crate) fn build<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E, _element: ElementKey) -> Result<E::Object, ScriptError> {
    let object = engine.create_object()?;

    define_getter(
        engine,
        &object,
        "tagName",
        getter(host, |host, _, key: ElementKey| {
            let document = host.document.borrow();
            Ok(document.element(key).map(|e| e.tag().to_ascii_uppercase()).into())
        }),
    )?;

    define_getter(
        engine,
        &object,
        "id",
        getter(host, |host, _, key: ElementKey| {
            let document = host.document.borrow();
            Ok(ScriptValue::from(document.element(key).and_then(|e| e.id()).unwrap_or("")))
        }),
    )?;

    define_getter(
        engine,
        &object,
        "name",
        getter(host, |host, _, key: ElementKey| {
            let document = host.document.borrow();
            Ok(ScriptValue::from(document.element(key).and_then(|e| e.name()).unwrap_or("")))
        }),
    )?;

    define_method(
        engine,
        &object,
        "getAttribute",
        method(host, |host, engine, key: ElementKey, args| {
            let Some(name) = string_arg(engine, args, 0)? else { return Ok(ScriptValue::Null) };
            let document = host.document.borrow();
            let value = document.element(key).and_then(|e| e.attribute(&name)).map(str::to_string);
            Ok(value.into())
        }),
    )?;

    Ok(object)
}
