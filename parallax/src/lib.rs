//! # Parallax
//!
//! An extended-reality runtime built from loosely coupled plugins whose
//! data exchange and scheduling are mediated by the switchboard event bus.
//!
//! This umbrella crate re-exports [`parallax_core`]; depend on it and
//! `use parallax::prelude::*` to get started.
//!
//! ```rust
//! use parallax::prelude::*;
//! use std::sync::Arc;
//!
//! let pb = Phonebook::new();
//! pb.register(Arc::new(Switchboard::new())).unwrap();
//! let sb = pb.lookup::<Switchboard>().unwrap();
//!
//! let writer = sb.get_writer::<u32>("frames").unwrap();
//! writer.put_value(1);
//! sb.stop();
//! ```

pub use parallax_core::{self, *};

/// Everything you need to write a plugin.
pub mod prelude {
    pub use parallax_core::communication::{Event, EventRef, Reader, Switchboard, Writer};
    pub use parallax_core::config::{OverflowPolicy, SubscriptionConfig, SwitchboardConfig};
    pub use parallax_core::error::{ParallaxError, ParallaxResult};
    pub use parallax_core::phonebook::Phonebook;
    pub use parallax_core::plugin::Plugin;
    pub use parallax_core::scheduling::{SkipOption, Threadloop, ThreadloopDriver};
    pub use parallax_core::telemetry::Telemetry;
}
