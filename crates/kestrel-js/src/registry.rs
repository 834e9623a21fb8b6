//! Binding Registry
//!
//! Two-way mapping between native entities and the script objects that stand
//! for them. The forward map memoizes one handle per live entity; the backward
//! direction goes through the object's private slot, which holds a
//! [`SlotToken`].
//!
//! A binding is *detached* when its entity goes away: the object stays valid
//! to the collector, its slot is cleared, and every lookup through it fails.
//! Finalize hooks never touch the registry directly; they push their token
//! into a shared queue that the registry drains on its next operation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use kestrel_dom::{EntityId, FormKey};
use tracing::{debug, trace};

use crate::engine::{ScriptEngine, SlotToken};
use crate::xhr::XhrId;

/// What a binding stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingKey {
    Entity(EntityId),
    Xhr(XhrId),
    /// One `form.elements` collection; detached together with its form
    Elements(FormKey, u64),
}

impl From<EntityId> for BindingKey {
    fn from(entity: EntityId) -> Self {
        Self::Entity(entity)
    }
}

impl From<XhrId> for BindingKey {
    fn from(xhr: XhrId) -> Self {
        Self::Xhr(xhr)
    }
}

struct Binding<O> {
    key: BindingKey,
    handle: O,
    detached: bool,
}

/// Binding counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Bindings whose entity is alive
    pub live: usize,
    /// Detached bindings whose object was not collected yet
    pub detached: usize,
}

/// Entity to script-handle registry
pub struct Registry<E: ScriptEngine> {
    by_key: HashMap<BindingKey, SlotToken>,
    by_token: HashMap<SlotToken, Binding<E::Object>>,
    next_token: u64,
    finalized: Rc<RefCell<Vec<SlotToken>>>,
    pending_clears: Vec<E::Object>,
    released: Vec<BindingKey>,
}

impl<E: ScriptEngine> Default for Registry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ScriptEngine> Registry<E> {
    pub fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            by_token: HashMap::new(),
            next_token: 1,
            finalized: Rc::new(RefCell::new(Vec::new())),
            pending_clears: Vec::new(),
            released: Vec::new(),
        }
    }

    /// Drain finalize notifications into the tables
    fn drain_finalized(&mut self) {
        let tokens = std::mem::take(&mut *self.finalized.borrow_mut());
        for token in tokens {
            let Some(binding) = self.by_token.remove(&token) else { continue };
            trace!("Binding {:?} finalized", binding.key);
            if !binding.detached && self.by_key.get(&binding.key) == Some(&token) {
                self.by_key.remove(&binding.key);
                self.released.push(binding.key);
            }
        }
    }

    /// Memoized handle of a live binding
    pub fn handle_of(&mut self, key: BindingKey) -> Option<E::Object> {
        self.drain_finalized();
        let token = self.by_key.get(&key)?;
        self.by_token.get(token).map(|b| b.handle.clone())
    }

    /// Record a freshly built façade for `key`.
    ///
    /// Writes the slot token and installs the finalize hook. An existing
    /// binding for `key` is detached first.
    pub fn register(&mut self, engine: &mut E, key: BindingKey, handle: E::Object) {
        self.drain_finalized();
        if self.by_key.contains_key(&key) {
            self.detach(key);
        }
        let token = SlotToken(self.next_token);
        self.next_token += 1;

        engine.set_private_slot(&handle, Some(token));
        let queue = self.finalized.clone();
        engine.set_finalizer(&handle, Box::new(move |_| queue.borrow_mut().push(token)));

        debug!("Bound {:?} as {:?}", key, token);
        self.by_key.insert(key, token);
        self.by_token.insert(token, Binding { key, handle, detached: false });
    }

    /// Resolve a handle. `None` for detached, finalized or foreign objects.
    pub fn lookup(&mut self, engine: &mut E, handle: &E::Object) -> Option<BindingKey> {
        self.flush(engine);
        let token = engine.private_slot(handle)?;
        let binding = self.by_token.get(&token)?;
        if binding.detached || binding.handle != *handle {
            return None;
        }
        Some(binding.key)
    }

    /// Detach the binding of `key`, and of every collection over it when
    /// `key` is a form. Idempotent.
    pub fn detach(&mut self, key: BindingKey) {
        if let BindingKey::Entity(EntityId::Form(form)) = key {
            let dependents: Vec<BindingKey> = self
                .by_key
                .keys()
                .filter(|k| matches!(k, BindingKey::Elements(f, _) if *f == form))
                .copied()
                .collect();
            for dependent in dependents {
                self.detach_one(dependent);
            }
        }
        self.detach_one(key);
    }

    fn detach_one(&mut self, key: BindingKey) {
        let Some(token) = self.by_key.remove(&key) else { return };
        if let Some(binding) = self.by_token.get_mut(&token) {
            binding.detached = true;
            self.pending_clears.push(binding.handle.clone());
        }
        debug!("Detached {:?}", key);
    }

    /// Move a live binding to `new`, keeping its handle
    pub fn retarget(&mut self, old: BindingKey, new: BindingKey) {
        self.drain_finalized();
        if old == new {
            return;
        }
        if self.by_key.contains_key(&new) {
            self.detach(new);
        }
        let Some(token) = self.by_key.remove(&old) else { return };
        if let Some(binding) = self.by_token.get_mut(&token) {
            binding.key = new;
        }
        self.by_key.insert(new, token);
        debug!("Retargeted {:?} to {:?}", old, new);
    }

    /// Detach every binding. Returns the keys that were bound.
    pub fn detach_all(&mut self) -> Vec<BindingKey> {
        let keys: Vec<BindingKey> = self.by_key.keys().copied().collect();
        for key in &keys {
            self.detach(*key);
        }
        keys
    }

    /// Apply queued slot clears and drain finalize notifications
    pub fn flush(&mut self, engine: &mut E) {
        for handle in self.pending_clears.drain(..) {
            if engine.is_alive(&handle) {
                engine.set_private_slot(&handle, None);
            }
        }
        self.drain_finalized();
    }

    /// Live bindings whose objects were collected since the last call
    pub fn take_released(&mut self) -> Vec<BindingKey> {
        self.drain_finalized();
        std::mem::take(&mut self.released)
    }

    pub fn stats(&mut self) -> RegistryStats {
        self.drain_finalized();
        let detached = self.by_token.values().filter(|b| b.detached).count();
        RegistryStats { live: self.by_token.len() - detached, detached }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{HeapEngine, ObjectId};
    use crate::value::ScriptValue;
    use kestrel_dom::{Document, FormSpec};

    fn form_key() -> BindingKey {
        let mut doc = Document::parse("http://example.com/").unwrap();
        BindingKey::Entity(EntityId::Form(doc.add_form(FormSpec::new())))
    }

    fn bind(registry: &mut Registry<HeapEngine>, engine: &mut HeapEngine, key: BindingKey) -> ObjectId {
        let handle = engine.create_object().unwrap();
        registry.register(engine, key, handle);
        handle
    }

    fn keys(n: usize) -> Vec<BindingKey> {
        let mut doc = Document::parse("http://example.com/").unwrap();
        (0..n).map(|_| BindingKey::Entity(EntityId::Form(doc.add_form(FormSpec::new())))).collect()
    }

    #[test]
    fn test_register_then_resolve() {
        let mut engine = HeapEngine::default();
        let mut registry = Registry::<HeapEngine>::new();
        let key = form_key();
        let handle = bind(&mut registry, &mut engine, key);
        assert_eq!(registry.handle_of(key), Some(handle));
        assert_eq!(registry.lookup(&mut engine, &handle), Some(key));
    }

    #[test]
    fn test_register_over_live_binding_detaches_it() {
        let mut engine = HeapEngine::default();
        let mut registry = Registry::<HeapEngine>::new();
        let key = form_key();
        let old = bind(&mut registry, &mut engine, key);
        let new = bind(&mut registry, &mut engine, key);
        assert_eq!(registry.lookup(&mut engine, &old), None);
        assert_eq!(registry.lookup(&mut engine, &new), Some(key));
    }

    #[test]
    fn test_form_detach_takes_its_collections() {
        let mut engine = HeapEngine::default();
        let mut registry = Registry::<HeapEngine>::new();
        let k = keys(2);
        let (BindingKey::Entity(EntityId::Form(form)), BindingKey::Entity(EntityId::Form(other))) = (k[0], k[1]) else {
            unreachable!()
        };
        let mine = bind(&mut registry, &mut engine, BindingKey::Elements(form, 1));
        let theirs = bind(&mut registry, &mut engine, BindingKey::Elements(other, 2));

        // The form itself never had a façade
        registry.detach(k[0]);
        assert_eq!(registry.lookup(&mut engine, &mine), None);
        assert_eq!(registry.lookup(&mut engine, &theirs), Some(BindingKey::Elements(other, 2)));
    }

    #[test]
    fn test_detach_clears_slot() {
        let mut engine = HeapEngine::default();
        let mut registry = Registry::<HeapEngine>::new();
        let key = form_key();
        let handle = bind(&mut registry, &mut engine, key);

        registry.detach(key);
        registry.detach(key);
        assert_eq!(registry.lookup(&mut engine, &handle), None);
        assert_eq!(engine.private_slot(&handle), None);
        assert!(engine.is_alive(&handle));
        assert_eq!(registry.stats(), RegistryStats { live: 0, detached: 1 });

        let fresh = bind(&mut registry, &mut engine, key);
        assert_ne!(fresh, handle);
    }

    #[test]
    fn test_foreign_object() {
        let mut engine = HeapEngine::default();
        let mut registry = Registry::<HeapEngine>::new();
        let plain = engine.create_object().unwrap();
        assert_eq!(registry.lookup(&mut engine, &plain), None);
    }

    #[test]
    fn test_retarget_keeps_handle() {
        let mut engine = HeapEngine::default();
        let mut registry = Registry::<HeapEngine>::new();
        let k = keys(3);
        let (old, new, other) = (k[0], k[1], k[2]);

        let handle = bind(&mut registry, &mut engine, old);
        let displaced = bind(&mut registry, &mut engine, new);
        registry.retarget(old, new);

        assert_eq!(registry.lookup(&mut engine, &handle), Some(new));
        assert_eq!(registry.lookup(&mut engine, &displaced), None);
        assert_eq!(registry.handle_of(old), None);
        assert_eq!(registry.handle_of(new), Some(handle));

        // Unbound source is a no-op
        registry.retarget(other, old);
        assert_eq!(registry.handle_of(old), None);
    }

    #[test]
    fn test_finalized_binding_is_removed() {
        let mut engine = HeapEngine::default();
        let mut registry = Registry::<HeapEngine>::new();
        let key = form_key();
        let handle = bind(&mut registry, &mut engine, key);

        assert_eq!(engine.collect_garbage(), 1);
        assert!(!engine.is_alive(&handle));
        assert_eq!(registry.take_released(), vec![key]);
        assert_eq!(registry.stats(), RegistryStats::default());

        let fresh = bind(&mut registry, &mut engine, key);
        assert!(engine.is_alive(&fresh));
    }

    #[test]
    fn test_rooted_binding_survives() {
        let mut engine = HeapEngine::default();
        let mut registry = Registry::<HeapEngine>::new();
        let key = form_key();
        let handle = bind(&mut registry, &mut engine, key);
        let root = engine.add_root(ScriptValue::Object(handle));

        engine.collect_garbage();
        assert_eq!(registry.handle_of(key), Some(handle));
        engine.remove_root(root);
    }

    #[test]
    fn test_detach_all() {
        let mut engine = HeapEngine::default();
        let mut registry = Registry::<HeapEngine>::new();
        let handles: Vec<_> =
            keys(4).into_iter().map(|k| bind(&mut registry, &mut engine, k)).collect();
        registry.detach_all();
        for handle in &handles {
            assert_eq!(registry.lookup(&mut engine, handle), None);
        }
        assert_eq!(registry.stats().detached, 4);

        // Detached objects still finalize cleanly
        engine.collect_garbage();
        assert_eq!(registry.stats(), RegistryStats::default());
        assert!(registry.take_released().is_empty());
    }
}
