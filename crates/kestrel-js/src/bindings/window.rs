//! Window Object
//!
//! The global object doubles as `window`. Properties that need the host
//! (status, document, location) are accessors on it; alerts, popups and
//! navigations turn into session requests.

use std::rc::Rc;

use kestrel_dom::{EntityId, SessionRequest};
use tracing::{debug, info};

use super::{define_getter, define_method, define_property, string_arg, string_value};
use crate::bridge::Task;
use crate::engine::{NativeFn, RootId, ScriptEngine, Value};
use crate::error::ScriptError;
use crate::host::Host;
use crate::value::ScriptValue;

/// Root of a registered listener equal to `listener`
pub(crate) fn find_listener<E: ScriptEngine>(
    engine: &E,
    listeners: &[(String, RootId)],
    kind: &str,
    listener: &Value<E>,
) -> Option<usize> {
    listeners
        .iter()
        .position(|(t, root)| t == kind && engine.root_value(*root).as_ref() == Some(listener))
}

fn post_message<E: ScriptEngine>(host: &Host<E>, engine: &mut E, args: &[Value<E>]) -> Result<Value<E>, ScriptError> {
    let origin = host.document.borrow().url().origin().ascii_serialization();
    let target = string_arg(engine, args, 1)?.unwrap_or_else(|| "*".to_string());
    if target != "*" && target != "/" && target != origin {
        debug!("postMessage to {} dropped, window origin is {}", target, origin);
        return Ok(ScriptValue::Undefined);
    }
    let data = engine.add_root(args.first().cloned().unwrap_or_default());
    host.bridge.borrow_mut().push(Task::Message { data, origin });
    Ok(ScriptValue::Undefined)
}

fn add_listener<E: ScriptEngine>(host: &Host<E>, engine: &mut E, args: &[Value<E>]) -> Result<Value<E>, ScriptError> {
    let Some(kind) = string_arg(engine, args, 0)? else { return Ok(ScriptValue::Undefined) };
    let Some(listener) = args.get(1).filter(|l| engine.is_callable(l)) else {
        return Ok(ScriptValue::Undefined);
    };
    let known = find_listener(&*engine, &host.bridge.borrow().window_listeners, &kind, listener).is_some();
    if !known {
        let root = engine.add_root(listener.clone());
        host.bridge.borrow_mut().window_listeners.push((kind, root));
    }
    Ok(ScriptValue::Undefined)
}

fn remove_listener<E: ScriptEngine>(host: &Host<E>, engine: &mut E, args: &[Value<E>]) -> Result<Value<E>, ScriptError> {
    let Some(kind) = string_arg(engine, args, 0)? else { return Ok(ScriptValue::Undefined) };
    let Some(listener) = args.get(1) else { return Ok(ScriptValue::Undefined) };
    let removed = {
        let mut bridge = host.bridge.borrow_mut();
        find_listener(&*engine, &bridge.window_listeners, &kind, listener).map(|i| bridge.window_listeners.remove(i))
    };
    if let Some((_, root)) = removed {
        engine.remove_root(root);
    }
    Ok(ScriptValue::Undefined)
}

/// Install window properties into the global object
pub(crate) fn install_window<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E) -> Result<(), ScriptError> {
    let global = engine.global();

    for name in ["window", "self", "top", "parent"] {
        engine.set(&global, name, ScriptValue::Object(global.clone()))?;
    }
    engine.set(&global, "closed", ScriptValue::Bool(false))?;

    let h = host.clone();
    let get_status: NativeFn<E> = Rc::new(move |_, _, _| Ok(ScriptValue::from(h.document.borrow().status())));
    let h = host.clone();
    let set_status: NativeFn<E> = Rc::new(move |engine, _, args| {
        let status = string_value(engine, &args.first().cloned().unwrap_or_default())?;
        h.document.borrow_mut().set_status(status);
        Ok(ScriptValue::Undefined)
    });
    define_property(engine, &global, "status", get_status, set_status)?;

    let h = host.clone();
    define_getter(engine, &global, "document", Rc::new(move |engine, _, _| h.entity_value(engine, EntityId::Document)))?;

    let h = host.clone();
    let get_location: NativeFn<E> = Rc::new(move |engine, _, _| Ok(h.location_value(engine)));
    let h = host.clone();
    let set_location: NativeFn<E> = Rc::new(move |engine, _, args| {
        let href = string_value(engine, &args.first().cloned().unwrap_or_default())?;
        h.navigate(&href, false);
        Ok(ScriptValue::Undefined)
    });
    define_property(engine, &global, "location", get_location, set_location)?;

    let h = host.clone();
    define_method(
        engine,
        &global,
        "alert",
        Rc::new(move |engine, _, args| {
            let message = string_arg(engine, args, 0)?.unwrap_or_default();
            info!("Script alert: {}", message);
            h.document.borrow_mut().request(SessionRequest::Alert(message));
            Ok(ScriptValue::Undefined)
        }),
    )?;

    let h = host.clone();
    define_method(
        engine,
        &global,
        "open",
        Rc::new(move |engine, _, args| {
            if h.config.block_window_opening {
                debug!("window.open blocked by configuration");
                return Ok(ScriptValue::Null);
            }
            let href = string_arg(engine, args, 0)?.unwrap_or_default();
            let target = string_arg(engine, args, 1)?.unwrap_or_else(|| "_blank".to_string());
            let mut document = h.document.borrow_mut();
            match document.resolve(&href) {
                Ok(url) => document.request(SessionRequest::OpenWindow { url, target }),
                Err(err) => debug!("Ignoring window.open of '{}': {}", href, err),
            }
            Ok(ScriptValue::Null)
        }),
    )?;

    let h = host.clone();
    define_method(engine, &global, "postMessage", Rc::new(move |engine, _, args| post_message(&h, engine, args)))?;

    let h = host.clone();
    define_method(engine, &global, "addEventListener", Rc::new(move |engine, _, args| add_listener(&h, engine, args)))?;

    let h = host.clone();
    define_method(
        engine,
        &global,
        "removeEventListener",
        Rc::new(move |engine, _, args| remove_listener(&h, engine, args)),
    )?;

    define_method(engine, &global, "toString", Rc::new(|_, _, _| Ok(ScriptValue::from("[object Window]"))))?;

    Ok(())
}
