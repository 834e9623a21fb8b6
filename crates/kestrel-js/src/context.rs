//! Interpreter Context
//!
//! One per document view. Owns the engine, the binding registry and the
//! async bridge, and references the live document and the network loader.
//! Dropping the context detaches every binding it handed out, cancels its
//! pending work and unregisters its document observer.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use kestrel_dom::{Document, EntityId, ObserverId};
use kestrel_net::Loader;
use tracing::{debug, error, info};

use crate::bindings;
use crate::bridge;
use crate::config::JsConfig;
use crate::console;
use crate::engine::{ScriptEngine, Value};
use crate::error::JsError;
use crate::heap::{HeapEngine, HeapLimits};
use crate::host::{Host, HostObserver};
use crate::registry::{BindingKey, RegistryStats};
use crate::timers;
use crate::value::ScriptValue;

/// Script context of one document view
pub struct InterpreterContext<E: ScriptEngine = HeapEngine> {
    engine: E,
    host: Rc<Host<E>>,
    observer: Option<ObserverId>,
}

impl InterpreterContext<HeapEngine> {
    /// Create a context on the reference engine
    pub fn new(document: Rc<RefCell<Document>>, loader: Rc<dyn Loader>, config: JsConfig) -> Result<Self, JsError> {
        let limits = HeapLimits { max_objects: config.heap_max_objects, ..HeapLimits::default() };
        Self::with_engine(HeapEngine::new(limits), document, loader, config)
    }
}

impl<E: ScriptEngine> InterpreterContext<E> {
    /// Create a context on `engine` with all browser APIs installed
    pub fn with_engine(
        mut engine: E,
        document: Rc<RefCell<Document>>,
        loader: Rc<dyn Loader>,
        config: JsConfig,
    ) -> Result<Self, JsError> {
        info!("Creating interpreter context for {}", document.borrow().url());
        let host = Rc::new(Host::new(document.clone(), loader, config));

        console::install_console(&mut engine)?;
        timers::install_timers(&host, &mut engine)?;
        bindings::window::install_window(&host, &mut engine)?;
        bindings::location::install_location(&host, &mut engine)?;
        bindings::xhr::install_xhr(&host, &mut engine)?;

        let document_value = host.entity_value(&mut engine, EntityId::Document)?;
        host.document_root.set(Some(engine.add_root(document_value)));

        let observer = document.borrow_mut().add_observer(Rc::new(HostObserver::new(&host)));
        Ok(Self { engine, host, observer: Some(observer) })
    }

    /// Evaluate source text in the global scope.
    ///
    /// A disabled configuration makes this a no-op returning `undefined`.
    pub fn eval(&mut self, source: &str) -> Result<Value<E>, JsError> {
        if !self.host.config.enabled {
            debug!("Scripting disabled, skipping {} bytes of source", source.len());
            return Ok(ScriptValue::Undefined);
        }
        self.host.registry.borrow_mut().flush(&mut self.engine);
        self.engine.eval(source).map_err(|err| {
            if err.is_catchable() {
                debug!("Uncaught {}", err);
            } else {
                error!("Internal fault during script run: {}", err);
            }
            JsError::from(err)
        })
    }

    /// Evaluate and convert the result with ToString
    pub fn eval_to_string(&mut self, source: &str) -> Result<String, JsError> {
        let value = self.eval(source)?;
        Ok(self.engine.to_string(&value)?)
    }

    /// Move the virtual clock forward. Returns the number of timers that
    /// became due; they run on the next [`run_bottom_halves`].
    ///
    /// [`run_bottom_halves`]: InterpreterContext::run_bottom_halves
    pub fn advance(&mut self, by: Duration) -> usize {
        self.host.bridge.borrow_mut().advance(by)
    }

    /// Deliver queued timers, network results and messages
    pub fn run_bottom_halves(&mut self) -> Result<usize, JsError> {
        Ok(bridge::run_bottom_halves(&self.host, &mut self.engine)?)
    }

    /// Whether timers, requests or queued events are outstanding
    pub fn has_pending_work(&self) -> bool {
        self.host.bridge.borrow().has_pending_work()
    }

    /// Time until the next timer is due
    pub fn time_until_next_timer(&self) -> Option<Duration> {
        let bridge = self.host.bridge.borrow();
        bridge.timers.time_until_next(bridge.now())
    }

    /// Run the collector and drop native state nobody can reach any more
    pub fn collect_garbage(&mut self) -> usize {
        let freed = self.engine.collect_garbage();
        let released = {
            let mut registry = self.host.registry.borrow_mut();
            registry.flush(&mut self.engine);
            registry.take_released()
        };
        for key in released {
            self.release(key);
        }
        freed
    }

    fn release(&mut self, key: BindingKey) {
        match key {
            BindingKey::Entity(EntityId::NodeSet(set)) => self.host.document.borrow_mut().release_node_set(set),
            BindingKey::Xhr(id) => {
                let (roots, load) = self.host.bridge.borrow_mut().remove_xhr(id);
                for root in roots {
                    self.engine.remove_root(root);
                }
                if let Some(load) = load {
                    self.host.loader.cancel(load);
                }
            }
            BindingKey::Entity(_) | BindingKey::Elements(..) => {}
        }
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.host.registry.borrow_mut().stats()
    }

    pub fn document(&self) -> &Rc<RefCell<Document>> {
        &self.host.document
    }

    pub fn config(&self) -> &JsConfig {
        &self.host.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    fn teardown(&mut self) {
        let bound = {
            let mut registry = self.host.registry.borrow_mut();
            let bound = registry.detach_all();
            registry.flush(&mut self.engine);
            bound
        };

        let (roots, loads) = self.host.bridge.borrow_mut().teardown();
        for load in loads {
            self.host.loader.cancel(load);
        }
        let own = [self.host.document_root.take(), self.host.location_root.take()];
        for root in roots.into_iter().chain(own.into_iter().flatten()) {
            self.engine.remove_root(root);
        }

        let Ok(mut document) = self.host.document.try_borrow_mut() else {
            error!("Document busy during interpreter teardown; observer left registered");
            return;
        };
        if let Some(observer) = self.observer.take() {
            document.remove_observer(observer);
        }
        for key in bound {
            if let BindingKey::Entity(EntityId::NodeSet(set)) = key {
                document.release_node_set(set);
            }
        }
        debug!("Interpreter context torn down");
    }
}

impl<E: ScriptEngine> Drop for InterpreterContext<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_net::ScriptedLoader;

    fn context() -> InterpreterContext {
        let document = Rc::new(RefCell::new(Document::parse("http://example.com/").unwrap()));
        InterpreterContext::new(document, Rc::new(ScriptedLoader::new()), JsConfig::default()).unwrap()
    }

    #[test]
    fn test_eval_simple() {
        let mut ctx = context();
        assert_eq!(ctx.eval("1 + 1").unwrap(), ScriptValue::Number(2.0));
    }

    #[test]
    fn test_uncaught_error() {
        let mut ctx = context();
        assert!(matches!(ctx.eval("undefinedThing()"), Err(JsError::Script(_))));
    }

    #[test]
    fn test_disabled_eval_is_noop() {
        let document = Rc::new(RefCell::new(Document::parse("http://example.com/").unwrap()));
        let config = JsConfig { enabled: false, ..JsConfig::default() };
        let mut ctx = InterpreterContext::new(document, Rc::new(ScriptedLoader::new()), config).unwrap();
        assert!(ctx.eval("document.title = 'x'").unwrap().is_undefined());
        assert_eq!(ctx.document().borrow().title(), "");
    }

    #[test]
    fn test_globals_installed() {
        let mut ctx = context();
        let kinds = ctx
            .eval_to_string("typeof document + typeof setTimeout + typeof XMLHttpRequest + typeof console")
            .unwrap();
        assert_eq!(kinds, "objectfunctionfunctionobject");
        assert_eq!(ctx.eval_to_string("window === self").unwrap(), "true");
        assert_eq!(ctx.eval_to_string("'' + window").unwrap(), "[object Window]");
    }

    #[test]
    fn test_teardown_unregisters_observer() {
        let document = Rc::new(RefCell::new(Document::parse("http://example.com/").unwrap()));
        let ctx = InterpreterContext::new(document.clone(), Rc::new(ScriptedLoader::new()), JsConfig::default()).unwrap();
        assert_eq!(document.borrow().observer_count(), 1);
        drop(ctx);
        assert_eq!(document.borrow().observer_count(), 0);
    }
}
