//! Kestrel DOM - native document model
//!
//! The document/session state that page scripts reach through the
//! script-hosting layer: forms, form controls with their mutable state,
//! elements and live node sets. Everything is stored in generational arenas,
//! so entity identities survive storage growth and never alias after removal.
//!
//! The model owns entity lifetimes. Whoever hands entity ids to someone else
//! (the script layer) gets told through [`EntityObserver`] before an entity is
//! destroyed or re-created under a new key.

pub mod arena;
mod control;
mod document;
mod element;
mod form;
mod observer;
mod session;

pub use arena::{Arena, Generation, Key};
pub use control::{ControlSpec, ControlType, FormControl, FormState};
pub use document::{Document, NodeQuery, NodeSet};
pub use element::{Element, ElementKind};
pub use form::{Form, FormMethod, FormSpec, FormSubmission};
pub use observer::{EntityObserver, ObserverId};
pub use session::SessionRequest;

pub use url::Url;

macro_rules! entity_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) Key);

        impl $name {
            /// Underlying arena key
            #[inline]
            pub fn key(self) -> Key {
                self.0
            }
        }
    };
}

entity_key!(
    /// Key of a form
    FormKey
);
entity_key!(
    /// Key of a form control
    ControlKey
);
entity_key!(
    /// Key of an element
    ElementKey
);
entity_key!(
    /// Key of a live query result
    NodeSetKey
);

/// Identity of a native entity that script may hold a handle to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Document,
    Form(FormKey),
    Control(ControlKey),
    Element(ElementKey),
    NodeSet(NodeSetKey),
}

/// DOM errors
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("unknown form")]
    UnknownForm,

    #[error("unknown form control")]
    UnknownControl,

    #[error("unknown element")]
    UnknownElement,

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
