//! Form Façade
//!
//! `HTMLFormElement` over a native form. Controls are reachable by index and
//! by name directly on the form (`form[0]`, `form.user`), resolved live.

use std::rc::Rc;

use kestrel_dom::{DomError, FormKey};
use tracing::debug;

use super::collection::{self, Source};
use super::{define_getter, define_method, define_property, getter, method, setter, string_value};
use crate::engine::{ScriptEngine, Value};
use crate::error::ScriptError;
use crate::host::Host;
use crate::value::ScriptValue;

fn attribute<E: ScriptEngine>(host: &Host<E>, form: FormKey, name: &str) -> Value<E> {
    let document = host.document.borrow();
    ScriptValue::from(document.form_element(form).and_then(|e| e.attribute(name)).unwrap_or(""))
}

fn log_failure(what: &str, result: Result<(), DomError>) {
    if let Err(err) = result {
        debug!("Form {} failed: {}", what, err);
    }
}

pub(crate) fn build<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E, _form: FormKey) -> Result<E::Object, ScriptError> {
    let object = engine.create_object()?;

    define_property(
        engine,
        &object,
        "action",
        getter(host, |host, _, form: FormKey| {
            let document = host.document.borrow();
            Ok(match document.form_action_url(form) {
                Ok(url) => ScriptValue::from(url.as_str()),
                Err(_) => ScriptValue::from(document.form(form).map_or("", |f| f.action.as_str())),
            })
        }),
        setter(host, |host, engine, form: FormKey, value| {
            let action = string_value(engine, value)?;
            if let Some(f) = host.document.borrow_mut().form_mut(form) {
                f.action = action;
            }
            Ok(())
        }),
    )?;

    define_getter(
        engine,
        &object,
        "elements",
        getter(host, |host, engine, form: FormKey| {
            collection::build_form_elements(host, engine, form).map(ScriptValue::Object)
        }),
    )?;

    define_property(
        engine,
        &object,
        "encoding",
        getter(host, |host, _, form: FormKey| {
            let document = host.document.borrow();
            Ok(document.form(form).map_or(ScriptValue::Null, |f| ScriptValue::from(f.method.encoding())))
        }),
        setter(host, |host, engine, form: FormKey, value| {
            let encoding = string_value(engine, value)?;
            if let Some(f) = host.document.borrow_mut().form_mut(form) {
                f.method = f.method.with_encoding(&encoding);
            }
            Ok(())
        }),
    )?;

    define_getter(
        engine,
        &object,
        "length",
        getter(host, |host, _, form: FormKey| Ok(ScriptValue::from(host.document.borrow().controls_of(form).len()))),
    )?;

    define_property(
        engine,
        &object,
        "method",
        getter(host, |host, _, form: FormKey| {
            let document = host.document.borrow();
            Ok(document.form(form).map_or(ScriptValue::Null, |f| ScriptValue::from(f.method.as_str())))
        }),
        setter(host, |host, engine, form: FormKey, value| {
            let method = string_value(engine, value)?;
            if let Some(f) = host.document.borrow_mut().form_mut(form) {
                f.method = f.method.with_method_name(&method);
            }
            Ok(())
        }),
    )?;

    define_property(
        engine,
        &object,
        "name",
        getter(host, |host, _, form: FormKey| Ok(attribute(host, form, "name"))),
        setter(host, |host, engine, form: FormKey, value| {
            let name = string_value(engine, value)?;
            if let Some(element) = host.document.borrow_mut().form_element_mut(form) {
                element.set_attribute("name", &name);
            }
            Ok(())
        }),
    )?;

    define_property(
        engine,
        &object,
        "target",
        getter(host, |host, _, form: FormKey| {
            let document = host.document.borrow();
            Ok(ScriptValue::from(document.form(form).map_or("", |f| f.target.as_str())))
        }),
        setter(host, |host, engine, form: FormKey, value| {
            let target = string_value(engine, value)?;
            if let Some(f) = host.document.borrow_mut().form_mut(form) {
                f.target = target;
            }
            Ok(())
        }),
    )?;

    define_getter(engine, &object, "id", getter(host, |host, _, form: FormKey| Ok(attribute(host, form, "id"))))?;

    define_method(
        engine,
        &object,
        "reset",
        method(host, |host, _, form: FormKey, _| {
            log_failure("reset", host.document.borrow_mut().reset_form(form));
            Ok(ScriptValue::Undefined)
        }),
    )?;

    define_method(
        engine,
        &object,
        "submit",
        method(host, |host, _, form: FormKey, _| {
            log_failure("submission", host.document.borrow_mut().submit_form(form));
            Ok(ScriptValue::Undefined)
        }),
    )?;

    let h = host.clone();
    engine.set_named_resolver(
        &object,
        Rc::new(move |engine, object, name| {
            let this = ScriptValue::Object(object.clone());
            match h.resolve::<FormKey>(engine, &this) {
                Some(form) => collection::lookup(&h, engine, Source::FormElements(form), name),
                None => Ok(None),
            }
        }),
    )?;

    Ok(object)
}
