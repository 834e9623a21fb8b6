//! XMLHttpRequest
//!
//! Script constructor and instance surface. The native request state lives in
//! the bridge; every event, including the one `open()` triggers, is delivered
//! from the bottom-half queue.

use std::rc::Rc;

use kestrel_net::{Completion, Request};
use tracing::{debug, trace};

use super::window::find_listener;
use super::{define_getter, define_method, define_property, getter, setter, string_arg};
use crate::bridge::Task;
use crate::engine::{NativeFn, ScriptEngine, Value};
use crate::error::ScriptError;
use crate::host::Host;
use crate::registry::BindingKey;
use crate::value::ScriptValue;
use crate::xhr::{NetStep, Outcome, ReadyState, Transition, XhrEvent, XhrId, XhrState};

fn with_state<E: ScriptEngine, R>(host: &Host<E>, id: XhrId, f: impl FnOnce(&mut XhrState) -> R) -> Result<R, ScriptError> {
    let mut bridge = host.bridge.borrow_mut();
    let state = bridge
        .xhr_mut(id)
        .ok_or_else(|| ScriptError::internal(format!("request {:?} has no native state", id)))?;
    Ok(f(state))
}

/// Queue transitions under the current request generation
fn queue<E: ScriptEngine>(host: &Host<E>, id: XhrId, steps: Vec<Transition>) {
    let mut bridge = host.bridge.borrow_mut();
    let Some(seq) = bridge.xhr(id).map(|state| state.seq) else { return };
    for step in steps {
        bridge.push(Task::Xhr { xhr: id, seq, step });
    }
}

/// Root the script object until its outstanding events are delivered
fn keep_alive<E: ScriptEngine>(host: &Host<E>, engine: &mut E, id: XhrId, this: &Value<E>) -> Result<(), ScriptError> {
    if with_state(host, id, |state| state.keep_alive.is_none())? {
        let root = engine.add_root(this.clone());
        with_state(host, id, |state| state.keep_alive = Some(root))?;
    }
    Ok(())
}

/// Instance method; `this` must be a live XMLHttpRequest
fn xhr_method<E, F>(host: &Rc<Host<E>>, f: F) -> NativeFn<E>
where
    E: ScriptEngine,
    F: Fn(&Host<E>, &mut E, XhrId, &Value<E>, &[Value<E>]) -> Result<Value<E>, ScriptError> + 'static,
{
    let host = host.clone();
    Rc::new(move |engine, this, args| match host.resolve::<XhrId>(engine, this) {
        Some(id) => f(&host, engine, id, this, args),
        None => Ok(ScriptValue::Null),
    })
}

fn open<E: ScriptEngine>(host: &Host<E>, engine: &mut E, id: XhrId, this: &Value<E>, args: &[Value<E>]) -> Result<Value<E>, ScriptError> {
    let method = string_arg(engine, args, 0)?.unwrap_or_default();
    let href = string_arg(engine, args, 1)?.unwrap_or_default();
    let url = host
        .document
        .borrow()
        .resolve(&href)
        .map_err(|err| ScriptError::Syntax(format!("invalid request URL '{}': {}", href, err)))?;
    trace!("XMLHttpRequest {:?} opened: {} {}", id, method, url);
    let previous = with_state(host, id, |state| state.open(&method, url))??;
    if let Some(load) = previous {
        host.loader.cancel(load);
    }
    keep_alive(host, engine, id, this)?;
    queue(host, id, vec![Transition::enter(ReadyState::Opened)]);
    Ok(ScriptValue::Undefined)
}

fn start_load<E: ScriptEngine>(host: &Host<E>, id: XhrId, request: Request) -> Result<(), ScriptError> {
    let (seq, inbox) = {
        let bridge = host.bridge.borrow();
        (bridge.xhr(id).map(|state| state.seq), bridge.inbox())
    };
    let seq = seq.ok_or_else(|| ScriptError::internal(format!("request {:?} has no native state", id)))?;
    let completion: Completion = Box::new(move |event| inbox.borrow_mut().push(NetStep { xhr: id, seq, event }));
    let handle = host.loader.load(request, completion);
    with_state(host, id, |state| state.load = Some(handle))
}

fn send<E: ScriptEngine>(host: &Host<E>, engine: &mut E, id: XhrId, this: &Value<E>, args: &[Value<E>]) -> Result<Value<E>, ScriptError> {
    host.check_capacity()?;
    let body = match args.first() {
        None | Some(ScriptValue::Undefined) | Some(ScriptValue::Null) => None,
        Some(value) => Some(engine.to_string(value)?),
    };
    let referrer = Some(host.document.borrow().url().clone());
    let request = with_state(host, id, |state| state.request(body, referrer))??;
    keep_alive(host, engine, id, this)?;

    let refused = request.url.scheme() == "file" && !host.config.allow_xhr_file;
    let steps = with_state(host, id, |state| {
        state.in_flight = true;
        let mut steps = vec![Transition::fire(XhrEvent::LoadStart)];
        if refused {
            steps.extend(state.finish(Outcome::Error));
        }
        steps
    })?;
    queue(host, id, steps);

    if refused {
        debug!("Refusing XMLHttpRequest to {}", request.url);
        return Ok(ScriptValue::Undefined);
    }
    start_load(host, id, request)?;
    Ok(ScriptValue::Undefined)
}

fn abort<E: ScriptEngine>(host: &Host<E>, id: XhrId) -> Result<Value<E>, ScriptError> {
    let (load, steps) = with_state(host, id, XhrState::abort)?;
    if let Some(load) = load {
        debug!("XMLHttpRequest {:?} aborted", id);
        host.loader.cancel(load);
    }
    queue(host, id, steps);
    Ok(ScriptValue::Undefined)
}

fn add_listener<E: ScriptEngine>(host: &Host<E>, engine: &mut E, id: XhrId, args: &[Value<E>]) -> Result<Value<E>, ScriptError> {
    let Some(kind) = string_arg(engine, args, 0)? else { return Ok(ScriptValue::Undefined) };
    let Some(listener) = args.get(1).filter(|l| engine.is_callable(l)) else {
        return Ok(ScriptValue::Undefined);
    };
    let known = {
        let bridge = host.bridge.borrow();
        bridge.xhr(id).is_some_and(|state| find_listener(&*engine, &state.listeners, &kind, listener).is_some())
    };
    if !known {
        let root = engine.add_root(listener.clone());
        with_state(host, id, |state| state.listeners.push((kind, root)))?;
    }
    Ok(ScriptValue::Undefined)
}

fn remove_listener<E: ScriptEngine>(host: &Host<E>, engine: &mut E, id: XhrId, args: &[Value<E>]) -> Result<Value<E>, ScriptError> {
    let Some(kind) = string_arg(engine, args, 0)? else { return Ok(ScriptValue::Undefined) };
    let Some(listener) = args.get(1) else { return Ok(ScriptValue::Undefined) };
    let removed = with_state(host, id, |state| {
        find_listener(&*engine, &state.listeners, &kind, listener).map(|i| state.listeners.remove(i))
    })?;
    if let Some((_, root)) = removed {
        engine.remove_root(root);
    }
    Ok(ScriptValue::Undefined)
}

fn define_constants<E: ScriptEngine>(engine: &mut E, object: &E::Object) -> Result<(), ScriptError> {
    for (name, state) in ReadyState::ALL {
        engine.set(object, name, ScriptValue::from(u32::from(state as u8)))?;
    }
    Ok(())
}

/// Getter over the native request state
fn read<E, F>(host: &Rc<Host<E>>, f: F) -> NativeFn<E>
where
    E: ScriptEngine,
    F: Fn(&XhrState) -> Value<E> + 'static,
{
    getter(host, move |host, _, id: XhrId| with_state(host, id, |state| f(state)))
}

/// Set up a freshly constructed instance
fn construct<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E, object: &E::Object) -> Result<(), ScriptError> {
    let id = host.bridge.borrow_mut().create_xhr();
    host.registry.borrow_mut().register(engine, BindingKey::Xhr(id), object.clone());
    trace!("XMLHttpRequest {:?} created", id);

    define_constants(engine, object)?;
    for handler in XhrEvent::HANDLERS {
        engine.set(object, handler, ScriptValue::Null)?;
    }

    define_getter(engine, object, "readyState", read(host, |s| ScriptValue::from(u32::from(s.ready_state as u8))))?;
    define_getter(engine, object, "status", read(host, |s| ScriptValue::from(u32::from(s.status))))?;
    define_getter(engine, object, "statusText", read(host, |s| ScriptValue::from(s.status_text.as_str())))?;
    define_getter(engine, object, "responseText", read(host, |s| ScriptValue::from(s.response_text())))?;
    define_getter(engine, object, "response", read(host, |s| ScriptValue::from(s.response_text())))?;
    define_getter(
        engine,
        object,
        "responseURL",
        read(host, |s| match (&s.url, s.ready_state >= ReadyState::HeadersReceived) {
            (Some(url), true) => ScriptValue::from(url.as_str()),
            _ => ScriptValue::from(""),
        }),
    )?;

    define_property(
        engine,
        object,
        "timeout",
        read(host, |s| ScriptValue::from(s.timeout_ms as f64)),
        setter(host, |host, _, id: XhrId, value| {
            let ms = value.to_number();
            with_state(host, id, |state| {
                state.timeout_ms = if ms.is_finite() && ms > 0.0 { ms as u64 } else { 0 };
            })
        }),
    )?;

    define_property(
        engine,
        object,
        "withCredentials",
        read(host, |s| ScriptValue::from(s.with_credentials)),
        setter(host, |host, _, id: XhrId, value| {
            let with_credentials = value.truthy();
            with_state(host, id, |state| state.with_credentials = with_credentials)
        }),
    )?;

    define_method(engine, object, "open", xhr_method(host, open))?;
    define_method(engine, object, "send", xhr_method(host, send))?;
    define_method(engine, object, "abort", xhr_method(host, |host, _, id, _, _| abort(host, id)))?;

    define_method(
        engine,
        object,
        "setRequestHeader",
        xhr_method(host, |host, engine, id, _, args| {
            let name = string_arg(engine, args, 0)?.unwrap_or_default();
            let value = string_arg(engine, args, 1)?.unwrap_or_default();
            with_state(host, id, |state| state.set_request_header(&name, &value))??;
            Ok(ScriptValue::Undefined)
        }),
    )?;

    define_method(
        engine,
        object,
        "getResponseHeader",
        xhr_method(host, |host, engine, id, _, args| {
            let Some(name) = string_arg(engine, args, 0)? else { return Ok(ScriptValue::Null) };
            let value = with_state(host, id, |state| state.response_header(&name).map(str::to_string))?;
            Ok(value.into())
        }),
    )?;

    define_method(
        engine,
        object,
        "getAllResponseHeaders",
        xhr_method(host, |host, _, id, _, _| {
            with_state(host, id, |state| state.all_response_headers()).map(ScriptValue::from)
        }),
    )?;

    define_method(
        engine,
        object,
        "overrideMimeType",
        xhr_method(host, |_, _, _, _, _| Err(ScriptError::type_error("overrideMimeType is not supported"))),
    )?;

    define_method(
        engine,
        object,
        "addEventListener",
        xhr_method(host, |host, engine, id, _, args| add_listener(host, engine, id, args)),
    )?;
    define_method(
        engine,
        object,
        "removeEventListener",
        xhr_method(host, |host, engine, id, _, args| remove_listener(host, engine, id, args)),
    )?;

    Ok(())
}

/// Install the `XMLHttpRequest` constructor into the global object
pub(crate) fn install_xhr<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E) -> Result<(), ScriptError> {
    let global = engine.global();

    let h = host.clone();
    let constructor = engine.create_function(
        "XMLHttpRequest",
        Rc::new(move |engine, this, _| {
            let global = engine.global();
            let instance = match this.as_object() {
                Some(object) if *object != global && h.registry.borrow_mut().lookup(engine, object).is_none() => {
                    object.clone()
                }
                _ => return Err(ScriptError::type_error("XMLHttpRequest must be called with new")),
            };
            construct(&h, engine, &instance)?;
            Ok(ScriptValue::Undefined)
        }),
    )?;
    define_constants(engine, &constructor)?;
    engine.set(&global, "XMLHttpRequest", ScriptValue::Object(constructor))
}
