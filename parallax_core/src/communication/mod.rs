//! The event bus: topics, readers, writers, and scheduled callbacks.
//!
//! Everything in-process, everything typed. Publishers never block on
//! subscribers; polling readers get the freshest value wait-free in the
//! steady state; scheduled callbacks run on dedicated worker threads in
//! strict publication order per subscription.

pub mod event;
mod ring;
mod subscription;
mod switchboard;
mod topic;

pub use event::{Event, EventRef};
pub use switchboard::{Reader, Switchboard, Writer};
