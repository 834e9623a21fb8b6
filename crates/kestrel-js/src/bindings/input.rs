//! Input Façade
//!
//! `HTMLInputElement` (and `select`) over a native form control. Reads and
//! writes go straight to the control's form state; writes that make no sense
//! for the control type are ignored.

use std::rc::Rc;

use kestrel_dom::{ControlKey, ControlType, EntityId, FormControl};
use tracing::debug;

use super::{define_getter, define_method, define_property, getter, method, setter, string_value};
use crate::engine::{NativeFn, ScriptEngine, Value};
use crate::error::ScriptError;
use crate::host::Host;
use crate::value::ScriptValue;

/// Script name of a control type
fn type_name(kind: ControlType) -> Result<&'static str, ScriptError> {
    Ok(match kind {
        ControlType::Text => "text",
        ControlType::Password => "password",
        ControlType::File => "file",
        ControlType::Checkbox => "checkbox",
        ControlType::Radio => "radio",
        ControlType::Submit => "submit",
        ControlType::Image => "image",
        ControlType::Reset => "reset",
        ControlType::Button => "button",
        ControlType::Hidden => "hidden",
        ControlType::Select => "select",
        other => return Err(ScriptError::internal(format!("control type {:?} has no script name", other))),
    })
}

/// Getter over the native control
fn read<E, F>(host: &Rc<Host<E>>, f: F) -> NativeFn<E>
where
    E: ScriptEngine,
    F: Fn(&FormControl) -> Value<E> + 'static,
{
    getter(host, move |host, _, key: ControlKey| {
        Ok(host.document.borrow().control(key).map(&f).unwrap_or_default())
    })
}

/// Setter over the native control
fn write<E, F>(host: &Rc<Host<E>>, f: F) -> NativeFn<E>
where
    E: ScriptEngine,
    F: Fn(&mut E, &mut FormControl, &Value<E>) -> Result<(), ScriptError> + 'static,
{
    setter(host, move |host, engine, key: ControlKey, value| {
        // Convert first; ToString may run script
        let value = match value {
            ScriptValue::Object(_) => ScriptValue::String(string_value(engine, value)?),
            other => other.clone(),
        };
        let mut document = host.document.borrow_mut();
        match document.control_mut(key) {
            Some(control) => f(engine, control, &value),
            None => Ok(()),
        }
    })
}

/// Read/write string attribute of the control's element
fn element_string<E: ScriptEngine>(
    engine: &mut E,
    host: &Rc<Host<E>>,
    object: &E::Object,
    name: &'static str,
) -> Result<(), ScriptError> {
    define_property(
        engine,
        object,
        name,
        getter(host, move |host, _, key: ControlKey| {
            let document = host.document.borrow();
            Ok(ScriptValue::from(document.control_element(key).and_then(|e| e.attribute(name)).unwrap_or("")))
        }),
        setter(host, move |host, engine, key: ControlKey, value| {
            let value = string_value(engine, value)?;
            if let Some(element) = host.document.borrow_mut().control_element_mut(key) {
                element.set_attribute(name, &value);
            }
            Ok(())
        }),
    )
}

pub(crate) fn build<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E, _control: ControlKey) -> Result<E::Object, ScriptError> {
    let object = engine.create_object()?;

    define_property(
        engine,
        &object,
        "accessKey",
        read(host, |c| ScriptValue::from(c.access_key.as_str())),
        write(host, |engine, c, value| {
            c.access_key = string_value(engine, value)?;
            Ok(())
        }),
    )?;

    define_property(
        engine,
        &object,
        "alt",
        read(host, |c| ScriptValue::from(c.alt.as_str())),
        write(host, |engine, c, value| {
            c.alt = string_value(engine, value)?;
            Ok(())
        }),
    )?;

    define_property(
        engine,
        &object,
        "checked",
        read(host, |c| ScriptValue::from(c.state.checked())),
        write(host, |_, c, value| {
            if c.kind.is_checkable() {
                c.state.set_checked(value.truthy());
            }
            Ok(())
        }),
    )?;

    define_getter(engine, &object, "defaultChecked", read(host, |c| ScriptValue::from(c.default_checked)))?;
    define_getter(engine, &object, "defaultValue", read(host, |c| ScriptValue::from(c.default_value.as_str())))?;

    define_property(
        engine,
        &object,
        "disabled",
        read(host, |c| ScriptValue::from(c.disabled)),
        write(host, |_, c, value| {
            c.disabled = value.truthy();
            Ok(())
        }),
    )?;

    define_getter(
        engine,
        &object,
        "form",
        getter(host, |host, engine, key: ControlKey| {
            let form = host.document.borrow().control(key).map(|c| EntityId::Form(c.form));
            host.optional_entity(engine, form)
        }),
    )?;

    define_property(
        engine,
        &object,
        "maxLength",
        read(host, |c| c.max_length.map_or(ScriptValue::from(-1_i32), ScriptValue::from)),
        write(host, |_, c, value| {
            let n = value.to_number();
            c.max_length = (n.is_finite() && n >= 0.0).then_some(n as u32);
            Ok(())
        }),
    )?;

    element_string(engine, host, &object, "name")?;

    define_property(
        engine,
        &object,
        "readonly",
        read(host, |c| ScriptValue::from(c.readonly)),
        write(host, |_, c, value| {
            c.readonly = value.truthy();
            Ok(())
        }),
    )?;

    define_property(
        engine,
        &object,
        "selectedIndex",
        read(host, |c| match c.kind {
            ControlType::Select => c.state.selected_index().map_or(ScriptValue::from(-1_i32), ScriptValue::from),
            _ => ScriptValue::Undefined,
        }),
        write(host, |_, c, value| {
            let n = value.to_number();
            if c.kind == ControlType::Select && n.is_finite() && n >= 0.0 && n.fract() == 0.0 {
                let options = c.options.clone();
                if !c.state.select(&options, n as usize) {
                    debug!("Ignoring out-of-range selectedIndex {}", n);
                }
            }
            Ok(())
        }),
    )?;

    define_getter(engine, &object, "size", read(host, |c| ScriptValue::from(c.size)))?;

    define_property(
        engine,
        &object,
        "src",
        read(host, |c| ScriptValue::from(c.src.as_str())),
        write(host, |engine, c, value| {
            c.src = string_value(engine, value)?;
            Ok(())
        }),
    )?;

    define_getter(engine, &object, "tabIndex", read(host, |c| ScriptValue::from(c.tab_index)))?;

    define_getter(
        engine,
        &object,
        "tagName",
        getter(host, |host, _, key: ControlKey| {
            let document = host.document.borrow();
            Ok(document.control_element(key).map_or(ScriptValue::Null, |e| ScriptValue::from(e.tag().to_ascii_uppercase())))
        }),
    )?;

    define_getter(
        engine,
        &object,
        "type",
        getter(host, |host, _, key: ControlKey| {
            let kind = host.document.borrow().control(key).map(|c| c.kind);
            match kind {
                Some(kind) => type_name(kind).map(ScriptValue::from),
                None => Ok(ScriptValue::Null),
            }
        }),
    )?;

    define_property(
        engine,
        &object,
        "value",
        read(host, |c| ScriptValue::from(c.state.value())),
        write(host, |engine, c, value| {
            if c.kind == ControlType::File {
                debug!("Ignoring script write to a file control");
                return Ok(());
            }
            let value = string_value(engine, value)?;
            c.state.set_value(c.kind, &value);
            Ok(())
        }),
    )?;

    define_getter(
        engine,
        &object,
        "id",
        getter(host, |host, _, key: ControlKey| {
            let document = host.document.borrow();
            Ok(ScriptValue::from(document.control_element(key).and_then(|e| e.id()).unwrap_or("")))
        }),
    )?;

    define_method(
        engine,
        &object,
        "blur",
        method(host, |host, _, key: ControlKey, _| {
            host.document.borrow_mut().blur(key);
            Ok(ScriptValue::Undefined)
        }),
    )?;

    define_method(
        engine,
        &object,
        "click",
        method(host, |host, _, key: ControlKey, _| {
            if let Err(err) = host.document.borrow_mut().activate_control(key) {
                debug!("Control activation failed: {}", err);
            }
            Ok(ScriptValue::Undefined)
        }),
    )?;

    // select() only takes focus; there is no selection model
    for name in ["focus", "select"] {
        define_method(
            engine,
            &object,
            name,
            method(host, |host, _, key: ControlKey, _| {
                if let Err(err) = host.document.borrow_mut().focus(key) {
                    debug!("Focus failed: {}", err);
                }
                Ok(ScriptValue::Undefined)
            }),
        )?;
    }

    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(type_name(ControlType::Password), Ok("password"));
        assert_eq!(type_name(ControlType::Select), Ok("select"));
        assert_eq!(type_name(ControlType::parse("IMAGE")), Ok("image"));
    }
}
