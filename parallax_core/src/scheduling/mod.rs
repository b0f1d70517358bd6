//! Worker-thread primitives.
//!
//! Parallax schedules with parallel OS threads only: no async runtime, no
//! shared worker pool. Each switchboard subscription owns exactly one
//! [`ManagedThread`]; plugins that are themselves a loop build on
//! [`Threadloop`].

pub mod managed_thread;
pub mod signal;
pub mod threadloop;

pub use managed_thread::{ManagedThread, ManagedThreadBuilder, ThreadState};
pub use signal::Signal;
pub use threadloop::{SkipOption, Threadloop, ThreadloopDriver};
