//! Entity Lifecycle Observers
//!
//! Notification hook the document calls before it destroys, or re-creates
//! under a new key, any entity it may have handed out.

use crate::EntityId;

/// Receiver of entity lifecycle notifications.
///
/// Calls arrive synchronously from the mutating `Document` method, before the
/// entity is gone, so an observer never sees a half-invalidated state.
pub trait EntityObserver {
    /// The entity is about to be destroyed or superseded.
    fn detached(&self, entity: EntityId);

    /// The entity now lives under a new key and is the same logical entity.
    fn retargeted(&self, old: EntityId, new: EntityId);
}

/// Registration handle returned by `Document::add_observer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u32);
