//! Dynamic plugin loading via `dlopen`.
//!
//! Resolves the [`PLUGIN_ENTRY_SYMBOL`] factory in a shared library and
//! instantiates the plugin with a phonebook handle. The library handle is
//! kept alive alongside the plugin instance — dropping it while plugin
//! code can still run would unmap that code.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;

use crate::error::{ParallaxError, ParallaxResult};
use crate::phonebook::Phonebook;

use super::{Plugin, PluginEntryFn, PLUGIN_ENTRY_SYMBOL};

/// A plugin instantiated from a shared library.
pub struct LoadedPlugin {
    plugin: Box<dyn Plugin>,
    path: PathBuf,
    /// Keeps the mapped library alive for as long as the plugin exists.
    _library: Library,
}

impl LoadedPlugin {
    pub fn plugin(&mut self) -> &mut dyn Plugin {
        self.plugin.as_mut()
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Loader for shared-library plugins.
pub struct PluginLoader {
    search_paths: Vec<PathBuf>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
        }
    }

    /// Add a directory searched by [`load`](Self::load). Searched in
    /// insertion order.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// Load a plugin by library stem (e.g. `"gyro_integrator"` finds
    /// `libgyro_integrator.so` in the search paths).
    pub fn load(&self, stem: &str, pb: &Arc<Phonebook>) -> ParallaxResult<LoadedPlugin> {
        let file_name = format!(
            "{}{}{}",
            std::env::consts::DLL_PREFIX,
            stem,
            std::env::consts::DLL_SUFFIX
        );
        for dir in &self.search_paths {
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                return self.load_file(&candidate, pb);
            }
        }
        Err(ParallaxError::plugin(format!(
            "no '{}' found in {} search path(s)",
            file_name,
            self.search_paths.len()
        )))
    }

    /// Load a plugin from an explicit library path.
    pub fn load_file(&self, path: &Path, pb: &Arc<Phonebook>) -> ParallaxResult<LoadedPlugin> {
        // SAFETY: loading a library runs its initializers; the deployment
        // vouches for the plugins it points the loader at.
        let library = unsafe { Library::new(path) }
            .map_err(|e| ParallaxError::plugin(format!("dlopen '{}': {}", path.display(), e)))?;

        let plugin = unsafe {
            let entry = library
                .get::<PluginEntryFn>(PLUGIN_ENTRY_SYMBOL.as_bytes())
                .map_err(|e| {
                    ParallaxError::plugin(format!(
                        "'{}' exports no {}: {}",
                        path.display(),
                        PLUGIN_ENTRY_SYMBOL,
                        e
                    ))
                })?;
            entry(pb)
        };
        log::info!("loaded plugin '{}' from {}", plugin.name(), path.display());

        Ok(LoadedPlugin {
            plugin,
            path: path.to_path_buf(),
            _library: library,
        })
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}
