//! Script Engine Trait
//!
//! Capability interface a script backend implements. Bindings are written
//! once against [`ScriptEngine`] and instantiated per backend.

use std::fmt::Debug;
use std::rc::Rc;

use crate::error::ScriptError;
use crate::value::ScriptValue;

/// Value type of engine `E`
pub type Value<E> = ScriptValue<<E as ScriptEngine>::Object>;

/// Native function: `(engine, this, args) -> result`
pub type NativeFn<E> = Rc<dyn Fn(&mut E, &Value<E>, &[Value<E>]) -> Result<Value<E>, ScriptError>>;

/// Fallback lookup for property names an object does not own.
/// `Ok(None)` means the name is not there.
pub type NamedResolver<E> =
    Rc<dyn Fn(&mut E, &<E as ScriptEngine>::Object, &str) -> Result<Option<Value<E>>, ScriptError>>;

/// Called once after the object became unreachable and was swept.
/// Gets the private slot content; has no engine access.
pub type FinalizeHook = Box<dyn FnOnce(Option<SlotToken>)>;

/// Opaque token stored in an object's private slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotToken(pub u64);

/// Persistent root handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(pub u64);

/// Abstract script engine interface.
///
/// Single-threaded. Natives receive `&mut Self` and may re-enter the engine.
pub trait ScriptEngine: Sized + 'static {
    /// GC-owned object handle
    type Object: Clone + PartialEq + Debug + 'static;

    /// The global object
    fn global(&self) -> Self::Object;

    /// Create a plain object
    fn create_object(&mut self) -> Result<Self::Object, ScriptError>;

    /// Wrap a native function as a callable object
    fn create_function(&mut self, name: &str, function: NativeFn<Self>) -> Result<Self::Object, ScriptError>;

    /// Define an accessor property
    fn define_accessor(
        &mut self,
        object: &Self::Object,
        name: &str,
        getter: NativeFn<Self>,
        setter: Option<NativeFn<Self>>,
        enumerable: bool,
    ) -> Result<(), ScriptError>;

    /// Read a property, running getters and the named resolver
    fn get(&mut self, object: &Self::Object, name: &str) -> Result<Value<Self>, ScriptError>;

    /// Write a property, running setters
    fn set(&mut self, object: &Self::Object, name: &str, value: Value<Self>) -> Result<(), ScriptError>;

    /// Install the fallback lookup for missing names
    fn set_named_resolver(&mut self, object: &Self::Object, resolver: NamedResolver<Self>) -> Result<(), ScriptError>;

    /// Content of the object's single private slot
    fn private_slot(&self, object: &Self::Object) -> Option<SlotToken>;

    /// Replace the private slot content
    fn set_private_slot(&mut self, object: &Self::Object, token: Option<SlotToken>);

    /// Register the finalize hook; replaces an earlier one
    fn set_finalizer(&mut self, object: &Self::Object, hook: FinalizeHook);

    /// Whether the handle still refers to a live object
    fn is_alive(&self, object: &Self::Object) -> bool;

    /// Whether a value can be called
    fn is_callable(&self, value: &Value<Self>) -> bool;

    /// Call `function` with `this` and `args`
    fn call(&mut self, function: &Value<Self>, this: &Value<Self>, args: &[Value<Self>]) -> Result<Value<Self>, ScriptError>;

    /// Evaluate source text in the global scope
    fn eval(&mut self, source: &str) -> Result<Value<Self>, ScriptError>;

    /// ToString, including objects
    fn to_string(&mut self, value: &Value<Self>) -> Result<String, ScriptError>;

    /// Keep a value alive until `remove_root`
    fn add_root(&mut self, value: Value<Self>) -> RootId;

    fn remove_root(&mut self, root: RootId);

    fn root_value(&self, root: RootId) -> Option<Value<Self>>;

    /// Run a full collection and the finalize hooks of swept objects.
    /// Returns the number of objects freed; a no-op while script is running.
    fn collect_garbage(&mut self) -> usize;
}
