//! Location API
//!
//! `window.location` and `document.location`, read from the document URL.
//! Navigation is only recorded; the session carries it out later.

use std::rc::Rc;

use kestrel_dom::{SessionRequest, Url};

use super::{define_getter, define_method, string_arg, string_value};
use crate::engine::{NativeFn, ScriptEngine};
use crate::error::ScriptError;
use crate::host::Host;
use crate::value::ScriptValue;

fn part<E: ScriptEngine>(host: &Rc<Host<E>>, f: fn(&Url) -> String) -> NativeFn<E> {
    let h = host.clone();
    Rc::new(move |_, _, _| Ok(ScriptValue::from(f(h.document.borrow().url()))))
}

fn host_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Create the location object and root it for the life of the context
pub(crate) fn install_location<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E) -> Result<(), ScriptError> {
    let location = engine.create_object()?;

    let h = host.clone();
    let navigate: NativeFn<E> = Rc::new(move |engine, _, args| {
        let href = match args.first() {
            Some(value) => string_value(engine, value)?,
            None => return Ok(ScriptValue::Undefined),
        };
        h.navigate(&href, false);
        Ok(ScriptValue::Undefined)
    });
    engine.define_accessor(&location, "href", part(host, |url| url.to_string()), Some(navigate), true)?;

    define_getter(engine, &location, "protocol", part(host, |url| format!("{}:", url.scheme())))?;
    define_getter(engine, &location, "host", part(host, host_port))?;
    define_getter(engine, &location, "hostname", part(host, |url| url.host_str().unwrap_or("").to_string()))?;
    define_getter(engine, &location, "port", part(host, |url| url.port().map(|p| p.to_string()).unwrap_or_default()))?;
    define_getter(engine, &location, "pathname", part(host, |url| url.path().to_string()))?;
    define_getter(engine, &location, "search", part(host, |url| url.query().map(|q| format!("?{}", q)).unwrap_or_default()))?;
    define_getter(engine, &location, "hash", part(host, |url| url.fragment().map(|f| format!("#{}", f)).unwrap_or_default()))?;
    define_getter(engine, &location, "origin", part(host, |url| url.origin().ascii_serialization()))?;

    for (name, replace) in [("assign", false), ("replace", true)] {
        let h = host.clone();
        define_method(
            engine,
            &location,
            name,
            Rc::new(move |engine, _, args| {
                if let Some(href) = string_arg(engine, args, 0)? {
                    h.navigate(&href, replace);
                }
                Ok(ScriptValue::Undefined)
            }),
        )?;
    }

    let h = host.clone();
    define_method(
        engine,
        &location,
        "reload",
        Rc::new(move |_, _, _| {
            h.document.borrow_mut().request(SessionRequest::Reload);
            Ok(ScriptValue::Undefined)
        }),
    )?;

    define_method(engine, &location, "toString", part(host, |url| url.to_string()))?;

    let root = engine.add_root(ScriptValue::Object(location));
    if let Some(previous) = host.location_root.replace(Some(root)) {
        engine.remove_root(previous);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_port() {
        assert_eq!(host_port(&Url::parse("http://example.com:8080/a").unwrap()), "example.com:8080");
        assert_eq!(host_port(&Url::parse("https://example.com/").unwrap()), "example.com");
    }
}
