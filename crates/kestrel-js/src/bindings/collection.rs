//! Live Collections
//!
//! `document.forms`, `form.elements` and the node lists returned by element
//! queries. Membership is computed from the document on every access, so a
//! collection never holds a snapshot.

use std::rc::Rc;

use kestrel_dom::{Document, EntityId, FormKey, NodeSetKey};

use super::{ElementsOf, index_arg, index_of, is_reserved, string_arg};
use crate::engine::{NativeFn, ScriptEngine, Value};
use crate::error::ScriptError;
use crate::host::Host;
use crate::registry::BindingKey;
use crate::value::ScriptValue;

/// What a collection enumerates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Forms,
    FormElements(FormKey),
    NodeSet(NodeSetKey),
}

struct Entry {
    entity: EntityId,
    id: Option<String>,
    name: Option<String>,
}

impl Source {
    /// Current members in document order; `None` once the node set is gone
    fn entries(self, document: &Document) -> Option<Vec<Entry>> {
        let entries = match self {
            Source::Forms => document
                .forms()
                .into_iter()
                .filter_map(|form| {
                    let element = document.form_element(form)?;
                    Some(Entry {
                        entity: EntityId::Form(form),
                        id: element.id().map(str::to_string),
                        name: element.name().map(str::to_string),
                    })
                })
                .collect(),
            Source::FormElements(form) => {
                document.form(form)?;
                document
                    .controls_of(form)
                    .into_iter()
                    .filter_map(|control| {
                        let element = document.control_element(control)?;
                        Some(Entry {
                            entity: EntityId::Control(control),
                            id: element.id().map(str::to_string),
                            name: element.name().map(str::to_string),
                        })
                    })
                    .collect()
            }
            Source::NodeSet(set) => document
                .node_set_items(set)?
                .into_iter()
                .filter_map(|key| {
                    let element = document.element(key)?;
                    Some(Entry {
                        entity: document.entity_of(key)?,
                        id: element.id().map(str::to_string),
                        name: element.name().map(str::to_string),
                    })
                })
                .collect(),
        };
        Some(entries)
    }

    /// Member answering to `name` as a named property (exact case)
    fn named(self, entries: &[Entry], name: &str) -> Option<EntityId> {
        match self {
            Source::Forms => entries
                .iter()
                .find(|e| e.name.as_deref().or(e.id.as_deref()) == Some(name))
                .map(|e| e.entity),
            // Later duplicates overwrite earlier ones
            Source::FormElements(_) => entries
                .iter()
                .rev()
                .find(|e| e.id.as_deref().or(e.name.as_deref()) == Some(name))
                .map(|e| e.entity),
            Source::NodeSet(_) => entries
                .iter()
                .find(|e| e.id.as_deref() == Some(name))
                .or_else(|| entries.iter().find(|e| e.name.as_deref() == Some(name)))
                .map(|e| e.entity),
        }
    }
}

/// `namedItem()`: `id` across the whole list first, then `name`
fn named_item(entries: &[Entry], name: &str) -> Option<EntityId> {
    let matches = |value: &Option<String>| value.as_deref().is_some_and(|v| v.eq_ignore_ascii_case(name));
    entries
        .iter()
        .find(|e| matches(&e.id))
        .or_else(|| entries.iter().find(|e| matches(&e.name)))
        .map(|e| e.entity)
}

/// Indexed or named member of `source`. Reserved names never resolve.
pub(crate) fn lookup<E: ScriptEngine>(
    host: &Rc<Host<E>>,
    engine: &mut E,
    source: Source,
    name: &str,
) -> Result<Option<Value<E>>, ScriptError> {
    if is_reserved(name) {
        return Ok(None);
    }
    let entity = {
        let document = host.document.borrow();
        let Some(entries) = source.entries(&document) else { return Ok(None) };
        match index_of(name) {
            Some(index) => entries.get(index).map(|e| e.entity),
            None => source.named(&entries, name),
        }
    };
    match entity {
        Some(entity) => host.entity_value(engine, entity).map(Some),
        None => Ok(None),
    }
}

/// Resolves a collection's `this` to what it enumerates
type Locate<E> = Rc<dyn Fn(&Host<E>, &mut E, &Value<E>) -> Option<Source>>;

fn build<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E, locate: Locate<E>) -> Result<E::Object, ScriptError> {
    let object = engine.create_object()?;

    let (h, l) = (host.clone(), locate.clone());
    let length: NativeFn<E> = Rc::new(move |engine, this, _| {
        let Some(source) = l(&h, engine, this) else { return Ok(ScriptValue::Null) };
        let count = source.entries(&h.document.borrow()).map_or(0, |entries| entries.len());
        Ok(ScriptValue::from(count))
    });
    engine.define_accessor(&object, "length", length, None, false)?;

    let (h, l) = (host.clone(), locate.clone());
    let item = engine.create_function(
        "item",
        Rc::new(move |engine, this, args| {
            let Some(source) = l(&h, engine, this) else { return Ok(ScriptValue::Null) };
            let entity = index_arg::<E>(args).and_then(|index| {
                let entries = source.entries(&h.document.borrow())?;
                entries.get(index).map(|e| e.entity)
            });
            h.optional_entity(engine, entity)
        }),
    )?;
    engine.set(&object, "item", ScriptValue::Object(item))?;

    let (h, l) = (host.clone(), locate.clone());
    let named = engine.create_function(
        "namedItem",
        Rc::new(move |engine, this, args| {
            let Some(source) = l(&h, engine, this) else { return Ok(ScriptValue::Null) };
            let Some(name) = string_arg(engine, args, 0)? else { return Ok(ScriptValue::Null) };
            let entity = source.entries(&h.document.borrow()).and_then(|entries| named_item(&entries, &name));
            h.optional_entity(engine, entity)
        }),
    )?;
    engine.set(&object, "namedItem", ScriptValue::Object(named))?;

    let (h, l) = (host.clone(), locate);
    engine.set_named_resolver(
        &object,
        Rc::new(move |engine, object, name| {
            let this = ScriptValue::Object(object.clone());
            match l(&h, engine, &this) {
                Some(source) => lookup(&h, engine, source, name),
                None => Ok(None),
            }
        }),
    )?;

    Ok(object)
}

/// Fresh `document.forms`
pub(crate) fn build_forms<E: ScriptEngine>(host: &Rc<Host<E>>, engine: &mut E) -> Result<E::Object, ScriptError> {
    build(host, engine, Rc::new(|_, _, _| Some(Source::Forms)))
}

/// Fresh `form.elements`, bound so it detaches along with its form
pub(crate) fn build_form_elements<E: ScriptEngine>(
    host: &Rc<Host<E>>,
    engine: &mut E,
    form: FormKey,
) -> Result<E::Object, ScriptError> {
    let object = build(
        host,
        engine,
        Rc::new(|host, engine, this| host.resolve::<ElementsOf>(engine, this).map(|e| Source::FormElements(e.0))),
    )?;
    let key = BindingKey::Elements(form, host.next_collection());
    host.registry.borrow_mut().register(engine, key, object.clone());
    Ok(object)
}

/// Node list façade over a registered node set
pub(crate) fn build_node_list<E: ScriptEngine>(
    host: &Rc<Host<E>>,
    engine: &mut E,
    _set: NodeSetKey,
) -> Result<E::Object, ScriptError> {
    build(host, engine, Rc::new(|host, engine, this| host.resolve::<NodeSetKey>(engine, this).map(Source::NodeSet)))
}
