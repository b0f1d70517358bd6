//! # Parallax Core
//!
//! The core runtime of the Parallax extended-reality framework.
//!
//! An XR runtime is a set of loosely coupled plugins — SLAM, IMU
//! integration, rendering, audio — exchanging data at perception-loop
//! rates. This crate provides the pieces that mediate that exchange:
//!
//! - **Switchboard**: typed, named event topics with latest-value polling
//!   and per-event scheduled callbacks
//! - **Phonebook**: process-wide service registry used to bootstrap the bus
//! - **Scheduling**: managed worker threads and the reusable plugin
//!   tick-loop
//! - **Plugin API**: the lifecycle trait and the dynamic-loading factory
//!   symbol
//! - **Telemetry**: no-op-by-default instrumentation hooks on the bus hot
//!   paths
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use parallax_core::{Phonebook, Switchboard};
//!
//! let pb = Phonebook::new();
//! pb.register(Arc::new(Switchboard::new())).unwrap();
//! pb.seal();
//!
//! let sb = pb.lookup::<Switchboard>().unwrap();
//! sb.schedule::<u64>("printer", "ticks", |tick, iteration| {
//!     println!("tick {} (#{})", tick, iteration);
//! }).unwrap();
//!
//! let writer = sb.get_writer::<u64>("ticks").unwrap();
//! writer.put_value(1);
//! sb.stop();
//! ```
//!
//! Everything lives in one address space: no wire protocol, no
//! persistence, no async runtime — parallel OS threads only.

pub mod communication;
pub mod config;
pub mod error;
pub mod phonebook;
pub mod plugin;
pub mod scheduling;
pub mod telemetry;

pub use communication::{Event, EventRef, Reader, Switchboard, Writer};
pub use config::{OverflowPolicy, SubscriptionConfig, SwitchboardConfig};
pub use error::{ParallaxError, ParallaxResult};
pub use phonebook::Phonebook;
pub use plugin::{Plugin, PluginEntryFn, PLUGIN_ENTRY_SYMBOL};
pub use scheduling::{ManagedThread, Signal, SkipOption, Threadloop, ThreadloopDriver};
pub use telemetry::{JsonlTelemetry, LogTelemetry, NullTelemetry, SubscriptionStats, Telemetry};
