//! Host State
//!
//! Everything the façades share: the live document, the loader, the binding
//! registry and the async bridge. Native closures hold an `Rc<Host>`; borrows
//! of its cells are kept short and never span a call back into script.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use kestrel_dom::{Document, EntityId, EntityObserver, SessionRequest};
use kestrel_net::Loader;
use tracing::{debug, error};

use crate::bindings::{self, FacadeKey};
use crate::bridge::Bridge;
use crate::config::JsConfig;
use crate::engine::{RootId, ScriptEngine, Value};
use crate::error::ScriptError;
use crate::registry::{BindingKey, Registry};
use crate::value::ScriptValue;

/// Shared state of one interpreter context
pub(crate) struct Host<E: ScriptEngine> {
    pub(crate) document: Rc<RefCell<Document>>,
    pub(crate) loader: Rc<dyn Loader>,
    pub(crate) config: JsConfig,
    pub(crate) registry: RefCell<Registry<E>>,
    pub(crate) bridge: RefCell<Bridge>,
    /// Root of the document façade
    pub(crate) document_root: Cell<Option<RootId>>,
    /// Root of the location object
    pub(crate) location_root: Cell<Option<RootId>>,
    next_collection: Cell<u64>,
}

impl<E: ScriptEngine> Host<E> {
    pub(crate) fn new(document: Rc<RefCell<Document>>, loader: Rc<dyn Loader>, config: JsConfig) -> Self {
        Self {
            document,
            loader,
            config,
            registry: RefCell::new(Registry::new()),
            bridge: RefCell::new(Bridge::new()),
            document_root: Cell::new(None),
            location_root: Cell::new(None),
            next_collection: Cell::new(1),
        }
    }

    /// Serial for a new bound collection
    pub(crate) fn next_collection(&self) -> u64 {
        let serial = self.next_collection.get();
        self.next_collection.set(serial + 1);
        serial
    }

    /// Entity behind `this`, if it is a live façade of the expected kind
    pub(crate) fn resolve<K: FacadeKey>(&self, engine: &mut E, this: &Value<E>) -> Option<K> {
        let object = this.as_object()?;
        let key = self.registry.borrow_mut().lookup(engine, object)?;
        K::from_binding(key)
    }

    /// Memoized façade for `key`, built by `factory` on first use
    pub(crate) fn bind(
        &self,
        engine: &mut E,
        key: BindingKey,
        factory: impl FnOnce(&mut E) -> Result<E::Object, ScriptError>,
    ) -> Result<Value<E>, ScriptError> {
        let existing = self.registry.borrow_mut().handle_of(key);
        if let Some(handle) = existing {
            return Ok(ScriptValue::Object(handle));
        }
        // The registry stays unborrowed while the façade is built
        let handle = factory(engine)?;
        self.registry.borrow_mut().register(engine, key, handle.clone());
        Ok(ScriptValue::Object(handle))
    }

    /// Script value for a native entity
    pub(crate) fn entity_value(self: &Rc<Self>, engine: &mut E, entity: EntityId) -> Result<Value<E>, ScriptError> {
        let key = BindingKey::Entity(entity);
        match entity {
            EntityId::Document => self.bind(engine, key, |engine| bindings::document::build(self, engine)),
            EntityId::Form(form) => self.bind(engine, key, |engine| bindings::form::build(self, engine, form)),
            EntityId::Control(control) => self.bind(engine, key, |engine| bindings::input::build(self, engine, control)),
            EntityId::Element(element) => {
                self.bind(engine, key, |engine| bindings::element::build(self, engine, element))
            }
            EntityId::NodeSet(set) => self.bind(engine, key, |engine| bindings::collection::build_node_list(self, engine, set)),
        }
    }

    /// Script value for an entity, `null` for none
    pub(crate) fn optional_entity(self: &Rc<Self>, engine: &mut E, entity: Option<EntityId>) -> Result<Value<E>, ScriptError> {
        match entity {
            Some(entity) => self.entity_value(engine, entity),
            None => Ok(ScriptValue::Null),
        }
    }

    /// The location object
    pub(crate) fn location_value(&self, engine: &E) -> Value<E> {
        self.location_root.get().and_then(|root| engine.root_value(root)).unwrap_or_default()
    }

    /// Record a navigation to `href`, resolved against the document URL.
    /// Unresolvable references are dropped.
    pub(crate) fn navigate(&self, href: &str, replace: bool) {
        let mut document = self.document.borrow_mut();
        match document.resolve(href) {
            Ok(url) => document.request(SessionRequest::Navigate { url, replace }),
            Err(err) => debug!("Ignoring navigation to '{}': {}", href, err),
        }
    }

    /// RangeError once the page holds too many timers and requests
    pub(crate) fn check_capacity(&self) -> Result<(), ScriptError> {
        let pending = self.bridge.borrow().pending_operations();
        if pending >= self.config.max_pending_operations {
            return Err(ScriptError::range_error(format!("too many pending operations ({})", pending)));
        }
        Ok(())
    }
}

/// Document observer forwarding lifecycle notifications to the registry
pub(crate) struct HostObserver<E: ScriptEngine> {
    host: Weak<Host<E>>,
}

impl<E: ScriptEngine> HostObserver<E> {
    pub(crate) fn new(host: &Rc<Host<E>>) -> Self {
        Self { host: Rc::downgrade(host) }
    }

    fn with_registry(&self, f: impl FnOnce(&mut Registry<E>)) {
        let Some(host) = self.host.upgrade() else { return };
        match host.registry.try_borrow_mut() {
            Ok(mut registry) => f(&mut registry),
            Err(_) => error!("Entity notification while the binding registry is busy"),
        };
    }
}

impl<E: ScriptEngine> EntityObserver for HostObserver<E> {
    fn detached(&self, entity: EntityId) {
        self.with_registry(|registry| registry.detach(BindingKey::Entity(entity)));
    }

    fn retargeted(&self, old: EntityId, new: EntityId) {
        self.with_registry(|registry| registry.retarget(BindingKey::Entity(old), BindingKey::Entity(new)));
    }
}
