//! Plugin API.
//!
//! A plugin is a unit that looks up the switchboard (and any other
//! services it needs) in the phonebook, acquires readers/writers or
//! schedules callbacks, and runs until stopped. Plugins can be linked
//! statically or built as shared libraries exporting a factory symbol the
//! loader resolves at runtime.
//!
//! # Implementing a plugin
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use parallax_core::{declare_plugin, Phonebook, Plugin, ParallaxResult, Switchboard};
//!
//! struct GyroIntegrator {
//!     pb: Arc<Phonebook>,
//! }
//!
//! impl GyroIntegrator {
//!     fn new(pb: &Arc<Phonebook>) -> Self {
//!         Self { pb: Arc::clone(pb) }
//!     }
//! }
//!
//! impl Plugin for GyroIntegrator {
//!     fn name(&self) -> &str { "gyro_integrator" }
//!
//!     fn start(&mut self) -> ParallaxResult<()> {
//!         let sb = self.pb.lookup::<Switchboard>()?;
//!         sb.schedule::<[f32; 3]>(self.name(), "imu", |sample, _| {
//!             let _ = sample;
//!         })
//!     }
//! }
//!
//! // Export for dynamic loading
//! declare_plugin!(GyroIntegrator);
//! ```

#[cfg(feature = "dynamic-plugins")]
pub mod loader;

#[cfg(feature = "dynamic-plugins")]
pub use loader::{LoadedPlugin, PluginLoader};

use std::sync::Arc;

use crate::error::ParallaxResult;
use crate::phonebook::Phonebook;

/// A loadable runtime unit.
///
/// Constructed by the factory with a phonebook handle; `start` runs after
/// every service is registered, `stop` before teardown. Both hooks default
/// to no-ops for plugins whose constructor does all the work.
pub trait Plugin: Send {
    /// Short name, used in logs and as the default account label.
    fn name(&self) -> &str;

    /// Called once after the phonebook is sealed and before events flow.
    fn start(&mut self) -> ParallaxResult<()> {
        Ok(())
    }

    /// Called once at shutdown, before the switchboard stops.
    fn stop(&mut self) -> ParallaxResult<()> {
        Ok(())
    }
}

/// Factory signature every dynamically loadable plugin exports.
#[allow(improper_ctypes_definitions)]
pub type PluginEntryFn = unsafe extern "C" fn(pb: &Arc<Phonebook>) -> Box<dyn Plugin>;

/// Name of the factory symbol resolved by the loader.
pub const PLUGIN_ENTRY_SYMBOL: &str = "parallax_plugin_entry";

/// Emit the `#[no_mangle]` factory symbol for a plugin type.
///
/// The type must provide `fn new(pb: &Arc<Phonebook>) -> Self`.
#[macro_export]
macro_rules! declare_plugin {
    ($plugin:ty) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn parallax_plugin_entry(
            pb: &std::sync::Arc<$crate::Phonebook>,
        ) -> Box<dyn $crate::Plugin> {
            Box::new(<$plugin>::new(pb))
        }
    };
}
