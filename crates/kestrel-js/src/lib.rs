//! Kestrel Script Hosting
//!
//! Connects page scripts to the browser's native document model.
//!
//! Features:
//! - Engine-neutral binding layer over [`ScriptEngine`], with [`HeapEngine`]
//!   as the in-tree reference engine
//! - Identity-preserving façades for the document, forms, controls and node lists
//! - window, location, console and timers (setTimeout, setInterval)
//! - XMLHttpRequest over the browser [`Loader`](kestrel_net::Loader)
//!
//! Script only runs when the host calls [`InterpreterContext::eval`] or
//! [`InterpreterContext::run_bottom_halves`]; timers and network results
//! wait in a queue until then.

mod bindings;
mod bridge;
pub mod config;
mod console;
mod context;
pub mod engine;
pub mod error;
pub mod heap;
mod host;
mod registry;
mod timers;
pub mod value;
mod xhr;

pub use config::JsConfig;
pub use context::InterpreterContext;
pub use engine::{NativeFn, RootId, ScriptEngine, SlotToken, Value};
pub use error::{JsError, ScriptError};
pub use heap::{HeapEngine, HeapLimits};
pub use registry::{BindingKey, RegistryStats};
pub use timers::TimerId;
pub use value::ScriptValue;
pub use xhr::{ReadyState, XhrId};
