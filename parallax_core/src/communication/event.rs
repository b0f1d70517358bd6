//! Event model.
//!
//! An event is any `Send + Sync + 'static` value. On publish it is wrapped
//! in an `Arc` and type-erased; the owning topic keeps the `TypeId` so
//! typed handles can be validated once at construction and then downcast
//! unchecked on the hot path. Events are immutable after publish — the bus
//! only ever hands out shared references.

use std::any::Any;
use std::sync::Arc;

/// Marker for types that can travel on a topic.
///
/// Blanket-implemented; a plugin never implements this by hand.
pub trait Event: Any + Send + Sync {}

impl<T: Any + Send + Sync> Event for T {}

/// Shared reference to a published event of a known type.
pub type EventRef<E> = Arc<E>;

/// Type-erased shared reference, as stored in rings and subscriber queues.
pub(crate) type DynEventRef = Arc<dyn Any + Send + Sync>;

/// Downcast a type-erased event back to its concrete type.
///
/// The topic's type tag was checked when the handle was created, so a
/// failure here is an internal invariant violation, not a user error.
pub(crate) fn downcast<E: Event>(event: DynEventRef) -> Option<EventRef<E>> {
    event.downcast::<E>().ok()
}
