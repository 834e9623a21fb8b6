//! Document Façade
//!
//! `document` as seen by page scripts.

use std::rc::Rc;

use kestrel_dom::{EntityId, NodeQuery};

use super::{DocumentEntity, collection, define_getter, define_method, define_property, getter, method, setter, string_arg, string_value};
use crate::engine::ScriptEngine;
use crate::error::ScriptError;
use crate::host::Host;
use crate::value::ScriptValue;

pub(crate) fn build<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E) -> Result<E::Object, ScriptError> {
    let document = engine.create_object()?;

    define_getter(
        engine,
        &document,
        "forms",
        getter(host, |host, engine, _: DocumentEntity| {
            collection::build_forms(host, engine).map(ScriptValue::Object)
        }),
    )?;

    define_property(
        engine,
        &document,
        "title",
        getter(host, |host, _, _: DocumentEntity| Ok(ScriptValue::from(host.document.borrow().title()))),
        setter(host, |host, engine, _: DocumentEntity, value| {
            let title = string_value(engine, value)?;
            host.document.borrow_mut().set_title(title);
            Ok(())
        }),
    )?;

    define_getter(
        engine,
        &document,
        "URL",
        getter(host, |host, _, _: DocumentEntity| Ok(ScriptValue::from(host.document.borrow().url().as_str()))),
    )?;

    define_getter(
        engine,
        &document,
        "referrer",
        getter(host, |host, _, _: DocumentEntity| {
            let document = host.document.borrow();
            Ok(ScriptValue::from(document.referrer().map_or("", |url| url.as_str())))
        }),
    )?;

    define_property(
        engine,
        &document,
        "location",
        getter(host, |host, engine, _: DocumentEntity| Ok(host.location_value(engine))),
        setter(host, |host, engine, _: DocumentEntity, value| {
            let href = string_value(engine, value)?;
            host.navigate(&href, false);
            Ok(())
        }),
    )?;

    define_method(
        engine,
        &document,
        "getElementById",
        method(host, |host, engine, _: DocumentEntity, args| {
            let Some(id) = string_arg(engine, args, 0)? else { return Ok(ScriptValue::Null) };
            let entity = {
                let document = host.document.borrow();
                document.get_element_by_id(&id).and_then(|key| document.entity_of(key))
            };
            host.optional_entity(engine, entity)
        }),
    )?;

    define_method(
        engine,
        &document,
        "getElementsByTagName",
        method(host, |host, engine, _: DocumentEntity, args| {
            let tag = string_arg(engine, args, 0)?.unwrap_or_default();
            let set = host.document.borrow_mut().create_node_set(NodeQuery::TagName(tag));
            host.entity_value(engine, EntityId::NodeSet(set))
        }),
    )?;

    define_method(
        engine,
        &document,
        "getElementsByName",
        method(host, |host, engine, _: DocumentEntity, args| {
            let name = string_arg(engine, args, 0)?.unwrap_or_default();
            let set = host.document.borrow_mut().create_node_set(NodeQuery::Name(name));
            host.entity_value(engine, EntityId::NodeSet(set))
        }),
    )?;

    Ok(document)
}
