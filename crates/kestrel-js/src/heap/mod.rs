//! Heap Engine
//!
//! Reference [`ScriptEngine`] backend: a slot heap addressed by generational
//! ids, a non-moving mark/sweep collector and a tree-walking evaluator for a
//! small JavaScript subset.
//!
//! Collection only happens on request and never while script frames are live.
//! Object handles captured by native closures are invisible to the collector;
//! the host roots them with [`ScriptEngine::add_root`].

mod ast;
mod interp;
mod lexer;
mod parser;

use std::collections::HashMap;
use std::rc::Rc;

use kestrel_dom::{Arena, Key};
use tracing::{debug, trace};

use crate::engine::{FinalizeHook, NamedResolver, NativeFn, RootId, ScriptEngine, SlotToken};
use crate::error::ScriptError;
use crate::value::ScriptValue;

use ast::{Ast, NodeId};

pub use parser::{ParseError, ParseErrorKind};

/// Handle of a heap object: slot index plus generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Key);

impl ObjectId {
    pub fn index(self) -> u32 {
        self.0.index()
    }

    pub fn generation(self) -> u32 {
        self.0.generation().value()
    }
}

type HeapValue = ScriptValue<ObjectId>;

/// Heap limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapLimits {
    pub max_objects: usize,
    pub max_call_depth: usize,
    /// Statement and expression nesting accepted by the parser
    pub max_nesting_depth: usize,
    /// Evaluator recursion, summed over every active call
    pub max_eval_depth: usize,
}

impl Default for HeapLimits {
    fn default() -> Self {
        Self { max_objects: 1 << 20, max_call_depth: 256, max_nesting_depth: 256, max_eval_depth: 256 }
    }
}

/// GC statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: u64,
    pub objects_freed: u64,
}

enum Property {
    Data { value: HeapValue, enumerable: bool },
    Accessor { getter: NativeFn<HeapEngine>, setter: Option<NativeFn<HeapEngine>>, enumerable: bool },
}

enum ObjectKind {
    Plain,
    Native { name: Box<str>, function: NativeFn<HeapEngine> },
    Closure { name: Option<Box<str>>, ast: Rc<Ast>, params: Rc<[Box<str>]>, body: NodeId, scope: Option<ObjectId> },
    /// Variable environment of a call; `None` parent is the global scope
    Scope { parent: Option<ObjectId> },
}

struct HeapObject {
    properties: Vec<(Box<str>, Property)>,
    kind: ObjectKind,
    slot: Option<SlotToken>,
    finalizer: Option<FinalizeHook>,
    resolver: Option<NamedResolver<HeapEngine>>,
    marked: bool,
}

impl HeapObject {
    fn new(kind: ObjectKind) -> Self {
        Self { properties: Vec::new(), kind, slot: None, finalizer: None, resolver: None, marked: false }
    }

    fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|(n, _)| &**n == name).map(|(_, p)| p)
    }

    fn set_property(&mut self, name: &str, property: Property) {
        match self.properties.iter_mut().find(|(n, _)| &**n == name) {
            Some((_, slot)) => *slot = property,
            None => self.properties.push((name.into(), property)),
        }
    }

    fn references(&self, out: &mut Vec<ObjectId>) {
        for (_, property) in &self.properties {
            if let Property::Data { value: ScriptValue::Object(id), .. } = property {
                out.push(*id);
            }
        }
        match &self.kind {
            ObjectKind::Closure { scope: Some(scope), .. } => out.push(*scope),
            ObjectKind::Scope { parent: Some(parent) } => out.push(*parent),
            _ => {}
        }
    }
}

/// Reference script engine
pub struct HeapEngine {
    objects: Arena<HeapObject>,
    global: ObjectId,
    roots: HashMap<RootId, HeapValue>,
    next_root: u64,
    limits: HeapLimits,
    depth: usize,
    nesting: usize,
    stats: GcStats,
}

impl Default for HeapEngine {
    fn default() -> Self {
        Self::new(HeapLimits::default())
    }
}

impl HeapEngine {
    pub fn new(limits: HeapLimits) -> Self {
        let mut objects = Arena::new();
        let global = ObjectId(objects.insert(HeapObject::new(ObjectKind::Plain)));
        Self { objects, global, roots: HashMap::new(), next_root: 1, limits, depth: 0, nesting: 0, stats: GcStats::default() }
    }

    /// Live object count, including the global object
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    pub fn limits(&self) -> HeapLimits {
        self.limits
    }

    fn alloc(&mut self, kind: ObjectKind) -> Result<ObjectId, ScriptError> {
        if self.objects.len() >= self.limits.max_objects {
            debug!("Heap limit of {} objects reached", self.limits.max_objects);
            return Err(ScriptError::OutOfMemory);
        }
        Ok(ObjectId(self.objects.insert(HeapObject::new(kind))))
    }

    fn object(&self, id: ObjectId) -> Result<&HeapObject, ScriptError> {
        self.objects.get(id.0).ok_or_else(|| ScriptError::internal(format!("stale object handle {:?}", id)))
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut HeapObject, ScriptError> {
        self.objects.get_mut(id.0).ok_or_else(|| ScriptError::internal(format!("stale object handle {:?}", id)))
    }

    fn has_own(&self, id: ObjectId, name: &str) -> bool {
        self.objects.get(id.0).is_some_and(|o| o.property(name).is_some())
    }

    /// Define or overwrite a data property without running setters
    fn define_data(&mut self, id: ObjectId, name: &str, value: HeapValue) -> Result<(), ScriptError> {
        self.object_mut(id)?.set_property(name, Property::Data { value, enumerable: true });
        Ok(())
    }

    fn describe_function(&self, id: ObjectId) -> Option<String> {
        match &self.objects.get(id.0)?.kind {
            ObjectKind::Native { name, .. } => Some(format!("function {}() {{ [native code] }}", name)),
            ObjectKind::Closure { name, .. } => {
                Some(format!("function {}() {{ [code] }}", name.as_deref().unwrap_or("")))
            }
            _ => None,
        }
    }

    fn mark(&mut self) {
        let mut worklist = vec![self.global];
        worklist.extend(self.roots.values().filter_map(|v| v.as_object().copied()));
        let mut refs = Vec::new();
        while let Some(id) = worklist.pop() {
            let Some(object) = self.objects.get_mut(id.0) else { continue };
            if object.marked {
                continue;
            }
            object.marked = true;
            object.references(&mut refs);
            worklist.append(&mut refs);
        }
    }

    fn sweep(&mut self) -> Vec<(FinalizeHook, Option<SlotToken>)> {
        let mut hooks = Vec::new();
        for key in self.objects.keys() {
            let Some(object) = self.objects.get_mut(key) else { continue };
            if object.marked {
                object.marked = false;
                continue;
            }
            if let Some(mut freed) = self.objects.remove(key) {
                if let Some(hook) = freed.finalizer.take() {
                    hooks.push((hook, freed.slot));
                }
            }
            self.stats.objects_freed += 1;
        }
        hooks
    }
}

impl ScriptEngine for HeapEngine {
    type Object = ObjectId;

    fn global(&self) -> ObjectId {
        self.global
    }

    fn create_object(&mut self) -> Result<ObjectId, ScriptError> {
        self.alloc(ObjectKind::Plain)
    }

    fn create_function(&mut self, name: &str, function: NativeFn<Self>) -> Result<ObjectId, ScriptError> {
        self.alloc(ObjectKind::Native { name: name.into(), function })
    }

    fn define_accessor(
        &mut self,
        object: &ObjectId,
        name: &str,
        getter: NativeFn<Self>,
        setter: Option<NativeFn<Self>>,
        enumerable: bool,
    ) -> Result<(), ScriptError> {
        self.object_mut(*object)?.set_property(name, Property::Accessor { getter, setter, enumerable });
        Ok(())
    }

    fn get(&mut self, object: &ObjectId, name: &str) -> Result<HeapValue, ScriptError> {
        let obj = self.object(*object)?;
        match obj.property(name) {
            Some(Property::Data { value, .. }) => Ok(value.clone()),
            Some(Property::Accessor { getter, .. }) => {
                let getter = getter.clone();
                getter(self, &ScriptValue::Object(*object), &[])
            }
            None => match obj.resolver.clone() {
                Some(resolver) => Ok(resolver(self, object, name)?.unwrap_or_default()),
                None => Ok(ScriptValue::Undefined),
            },
        }
    }

    fn set(&mut self, object: &ObjectId, name: &str, value: HeapValue) -> Result<(), ScriptError> {
        let obj = self.object_mut(*object)?;
        match obj.properties.iter_mut().find(|(n, _)| &**n == name) {
            Some((_, Property::Data { value: slot, .. })) => {
                *slot = value;
                Ok(())
            }
            Some((_, Property::Accessor { setter, .. })) => match setter.clone() {
                Some(setter) => setter(self, &ScriptValue::Object(*object), &[value]).map(|_| ()),
                None => Ok(()),
            },
            None => {
                obj.properties.push((name.into(), Property::Data { value, enumerable: true }));
                Ok(())
            }
        }
    }

    fn set_named_resolver(&mut self, object: &ObjectId, resolver: NamedResolver<Self>) -> Result<(), ScriptError> {
        self.object_mut(*object)?.resolver = Some(resolver);
        Ok(())
    }

    fn private_slot(&self, object: &ObjectId) -> Option<SlotToken> {
        self.objects.get(object.0).and_then(|o| o.slot)
    }

    fn set_private_slot(&mut self, object: &ObjectId, token: Option<SlotToken>) {
        if let Some(o) = self.objects.get_mut(object.0) {
            o.slot = token;
        }
    }

    fn set_finalizer(&mut self, object: &ObjectId, hook: FinalizeHook) {
        if let Some(o) = self.objects.get_mut(object.0) {
            o.finalizer = Some(hook);
        }
    }

    fn is_alive(&self, object: &ObjectId) -> bool {
        self.objects.contains(object.0)
    }

    fn is_callable(&self, value: &HeapValue) -> bool {
        match value {
            ScriptValue::Object(id) => self
                .objects
                .get(id.0)
                .is_some_and(|o| matches!(o.kind, ObjectKind::Native { .. } | ObjectKind::Closure { .. })),
            _ => false,
        }
    }

    fn call(&mut self, function: &HeapValue, this: &HeapValue, args: &[HeapValue]) -> Result<HeapValue, ScriptError> {
        self.call_function(function, this, args)
    }

    fn eval(&mut self, source: &str) -> Result<HeapValue, ScriptError> {
        let ast = parser::parse(source, self.limits.max_nesting_depth).map_err(|e| match e.kind {
            ParseErrorKind::Syntax => ScriptError::Syntax(e.to_string()),
            ParseErrorKind::TooDeep => ScriptError::range_error(e.to_string()),
        })?;
        self.run_program(Rc::new(ast))
    }

    fn to_string(&mut self, value: &HeapValue) -> Result<String, ScriptError> {
        if let Some(s) = value.primitive_string() {
            return Ok(s);
        }
        let ScriptValue::Object(id) = value else {
            return Ok(String::new());
        };
        let method = self.get(id, "toString")?;
        if self.is_callable(&method) {
            let result = self.call(&method, value, &[])?;
            if let Some(s) = result.primitive_string() {
                return Ok(s);
            }
        }
        Ok(self.describe_function(*id).unwrap_or_else(|| "[object Object]".to_string()))
    }

    fn add_root(&mut self, value: HeapValue) -> RootId {
        let id = RootId(self.next_root);
        self.next_root += 1;
        self.roots.insert(id, value);
        id
    }

    fn remove_root(&mut self, root: RootId) {
        self.roots.remove(&root);
    }

    fn root_value(&self, root: RootId) -> Option<HeapValue> {
        self.roots.get(&root).cloned()
    }

    fn collect_garbage(&mut self) -> usize {
        if self.depth > 0 {
            trace!("Collection deferred, {} frames live", self.depth);
            return 0;
        }
        let before = self.objects.len();
        self.mark();
        let hooks = self.sweep();
        let freed = before - self.objects.len();
        self.stats.collections += 1;
        debug!("GC freed {} objects, {} finalizers", freed, hooks.len());
        for (hook, slot) in hooks {
            hook(slot);
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn eval(engine: &mut HeapEngine, source: &str) -> HeapValue {
        engine.eval(source).unwrap()
    }

    #[test]
    fn test_arithmetic_and_strings() {
        let mut engine = HeapEngine::default();
        assert_eq!(eval(&mut engine, "1 + 2 * 3"), ScriptValue::Number(7.0));
        assert_eq!(eval(&mut engine, "'a' + 1 + 2"), ScriptValue::String("a12".into()));
        assert_eq!(eval(&mut engine, "'abc'.length"), ScriptValue::Number(3.0));
        assert_eq!(eval(&mut engine, "typeof null"), ScriptValue::String("object".into()));
    }

    #[test]
    fn test_functions_and_closures() {
        let mut engine = HeapEngine::default();
        let result = eval(
            &mut engine,
            "function counter() { var n = 0; return function() { n += 1; return n; }; }
             var c = counter(); c(); c(); c()",
        );
        assert_eq!(result, ScriptValue::Number(3.0));
        assert_eq!(eval(&mut engine, "typeof counter"), ScriptValue::String("function".into()));
    }

    #[test]
    fn test_hoisting() {
        let mut engine = HeapEngine::default();
        assert_eq!(eval(&mut engine, "var r = f(); function f() { return 5; } r"), ScriptValue::Number(5.0));
    }

    #[test]
    fn test_loops() {
        let mut engine = HeapEngine::default();
        assert_eq!(eval(&mut engine, "var s = 0; for (var i = 0; i < 5; i++) { s += i; } s"), ScriptValue::Number(10.0));
        assert_eq!(eval(&mut engine, "var n = 3; while (n > 0) n--; n"), ScriptValue::Number(0.0));
    }

    #[test]
    fn test_native_this() {
        let mut engine = HeapEngine::default();
        let global = engine.global();
        let f: NativeFn<HeapEngine> = Rc::new(|engine, this, _| {
            let ScriptValue::Object(obj) = this else { return Ok(ScriptValue::Null) };
            engine.get(obj, "tag")
        });
        let func = engine.create_function("whoami", f).unwrap();
        engine.set(&global, "whoami", ScriptValue::Object(func)).unwrap();
        assert_eq!(eval(&mut engine, "var o = {tag: 'x', who: whoami}; o.who()"), ScriptValue::String("x".into()));
    }

    #[test]
    fn test_try_catch() {
        let mut engine = HeapEngine::default();
        let result = eval(&mut engine, "var m; try { null.x } catch (e) { m = e.name } m");
        assert_eq!(result, ScriptValue::String("TypeError".into()));
        assert!(matches!(engine.eval("missing()"), Err(ScriptError::Reference(_))));
    }

    #[test]
    fn test_internal_error_not_catchable() {
        let mut engine = HeapEngine::default();
        let global = engine.global();
        let f: NativeFn<HeapEngine> = Rc::new(|_, _, _| Err(ScriptError::internal("broken")));
        let func = engine.create_function("boom", f).unwrap();
        engine.set(&global, "boom", ScriptValue::Object(func)).unwrap();
        assert!(matches!(engine.eval("try { boom() } catch (e) {}"), Err(ScriptError::Internal(_))));
    }

    #[test]
    fn test_gc_and_finalizer() {
        let mut engine = HeapEngine::default();
        let finalized = Rc::new(RefCell::new(Vec::new()));
        let obj = engine.create_object().unwrap();
        engine.set_private_slot(&obj, Some(SlotToken(7)));
        let sink = finalized.clone();
        engine.set_finalizer(&obj, Box::new(move |slot| sink.borrow_mut().push(slot)));

        let root = engine.add_root(ScriptValue::Object(obj));
        assert_eq!(engine.collect_garbage(), 0);
        assert!(engine.is_alive(&obj));

        engine.remove_root(root);
        assert_eq!(engine.collect_garbage(), 1);
        assert!(!engine.is_alive(&obj));
        assert_eq!(*finalized.borrow(), vec![Some(SlotToken(7))]);

        // Stale handle fails soft for slots
        assert_eq!(engine.private_slot(&obj), None);
        assert!(matches!(engine.get(&obj, "x"), Err(ScriptError::Internal(_))));
    }

    #[test]
    fn test_closure_scope_reachable() {
        let mut engine = HeapEngine::default();
        eval(&mut engine, "var keep = (function() { var inner = {v: 1}; return function() { return inner.v; }; })()");
        engine.collect_garbage();
        assert_eq!(eval(&mut engine, "keep()"), ScriptValue::Number(1.0));
    }

    #[test]
    fn test_heap_limit() {
        let mut engine = HeapEngine::new(HeapLimits { max_objects: 8, max_call_depth: 16, ..HeapLimits::default() });
        let result = engine.eval("var caught = false; try { for (var i = 0; i < 100; i++) { var o = {}; window_keep = o; } } catch (e) { caught = e.name } caught");
        match result {
            Ok(v) => assert_eq!(v, ScriptValue::String("RangeError".into())),
            Err(e) => assert_eq!(e, ScriptError::OutOfMemory),
        }
    }

    #[test]
    fn test_call_depth_limit() {
        let mut engine = HeapEngine::new(HeapLimits { max_objects: 1 << 16, max_call_depth: 32, ..HeapLimits::default() });
        assert!(matches!(engine.eval("function f() { return f(); } f()"), Err(ScriptError::Range(_))));
    }

    #[test]
    fn test_deep_source_is_range_error() {
        let mut engine = HeapEngine::default();
        let n = 100_000;
        let deep = format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert!(matches!(engine.eval(&deep), Err(ScriptError::Range(_))));
        // The engine stays usable
        assert_eq!(eval(&mut engine, "(((1)))"), ScriptValue::Number(1.0));
    }

    #[test]
    fn test_long_operator_chain_is_range_error() {
        // Parsed in a loop but left-nested in the tree
        let mut engine = HeapEngine::default();
        let chain = vec!["1"; 50_000].join(" + ");
        assert!(matches!(engine.eval(&chain), Err(ScriptError::Range(_))));
        let members = format!("var o = {{}}; o{}", ".a".repeat(50_000));
        assert!(matches!(engine.eval(&members), Err(ScriptError::Range(_))));
        assert_eq!(eval(&mut engine, "1 + 2"), ScriptValue::Number(3.0));
    }

    #[test]
    fn test_eval_depth_error_is_catchable() {
        let mut engine = HeapEngine::default();
        let chain = vec!["1"; 5_000].join(" + ");
        let source = format!("var caught = 'none'; try {{ {} }} catch (e) {{ caught = e.name }} caught", chain);
        assert_eq!(eval(&mut engine, &source), ScriptValue::String("RangeError".into()));
    }

    #[test]
    fn test_named_resolver() {
        let mut engine = HeapEngine::default();
        let global = engine.global();
        let obj = engine.create_object().unwrap();
        let resolver: NamedResolver<HeapEngine> =
            Rc::new(|_, _, name| Ok(name.parse::<usize>().ok().map(|i| ScriptValue::Number(i as f64 * 10.0))));
        engine.set_named_resolver(&obj, resolver).unwrap();
        engine.set(&global, "list", ScriptValue::Object(obj)).unwrap();
        assert_eq!(eval(&mut engine, "list[2]"), ScriptValue::Number(20.0));
        assert_eq!(eval(&mut engine, "list.other"), ScriptValue::Undefined);
    }
}
