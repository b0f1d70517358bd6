//! The phonebook: a process-wide registry of singleton services.
//!
//! Services are keyed by the [`TypeId`] of an abstract service kind, which
//! may be a concrete type or a `dyn Trait`. The launcher populates the
//! phonebook before any plugin starts (the switchboard itself is the first
//! entry), then calls [`Phonebook::seal`] to end the registration phase.
//! Lookup is thread-safe at all times; registration is only expected while
//! single-threaded during bootstrap, and is refused once sealed.
//!
//! ```rust
//! use std::sync::Arc;
//! use parallax_core::Phonebook;
//!
//! trait PosePredictor: Send + Sync {
//!     fn predict(&self) -> [f32; 3];
//! }
//!
//! struct Linear;
//! impl PosePredictor for Linear {
//!     fn predict(&self) -> [f32; 3] { [0.0; 3] }
//! }
//!
//! let pb = Phonebook::new();
//! let service: Arc<dyn PosePredictor> = Arc::new(Linear);
//! pb.register::<dyn PosePredictor>(service).unwrap();
//! let found = pb.lookup::<dyn PosePredictor>().unwrap();
//! assert_eq!(found.predict(), [0.0; 3]);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ParallaxError, ParallaxResult};
use crate::parallax_internal;

struct ServiceEntry {
    /// Human-readable kind name, for diagnostics only.
    kind: &'static str,
    /// The `Arc<S>` itself, boxed behind `Any` so heterogeneous kinds share
    /// one map. Downcast back to `Arc<S>` on lookup.
    service: Box<dyn Any + Send + Sync>,
}

/// Process-wide service registry.
pub struct Phonebook {
    services: RwLock<HashMap<TypeId, ServiceEntry>>,
    sealed: AtomicBool,
}

impl Phonebook {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            sealed: AtomicBool::new(false),
        }
    }

    /// Register the implementation of service kind `S`.
    ///
    /// Fails with [`ParallaxError::AlreadyRegistered`] if the kind is
    /// present, and with [`ParallaxError::RegistrySealed`] after [`seal`]
    /// has been called.
    ///
    /// [`seal`]: Phonebook::seal
    pub fn register<S>(&self, service: Arc<S>) -> ParallaxResult<()>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let kind = std::any::type_name::<S>();
        if self.sealed.load(Ordering::Acquire) {
            return Err(ParallaxError::RegistrySealed(kind));
        }
        let mut services = self.services.write();
        if services.contains_key(&TypeId::of::<S>()) {
            return Err(ParallaxError::AlreadyRegistered(kind));
        }
        services.insert(
            TypeId::of::<S>(),
            ServiceEntry {
                kind,
                service: Box::new(service),
            },
        );
        log::debug!("phonebook: registered service '{}'", kind);
        Ok(())
    }

    /// Register the implementation of kind `S`, replacing any existing one.
    ///
    /// Still refused once sealed.
    pub fn register_or_replace<S>(&self, service: Arc<S>) -> ParallaxResult<()>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let kind = std::any::type_name::<S>();
        if self.sealed.load(Ordering::Acquire) {
            return Err(ParallaxError::RegistrySealed(kind));
        }
        self.services.write().insert(
            TypeId::of::<S>(),
            ServiceEntry {
                kind,
                service: Box::new(service),
            },
        );
        Ok(())
    }

    /// Look up the implementation of service kind `S`.
    ///
    /// Fails with [`ParallaxError::NotRegistered`] if absent — a bootstrap
    /// failure for core services like the switchboard.
    pub fn lookup<S>(&self) -> ParallaxResult<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let services = self.services.read();
        let entry = services
            .get(&TypeId::of::<S>())
            .ok_or_else(|| ParallaxError::NotRegistered(std::any::type_name::<S>()))?;
        let service = entry
            .service
            .downcast_ref::<Arc<S>>()
            .ok_or_else(|| parallax_internal!("phonebook entry for '{}' has wrong stored type", entry.kind))?;
        Ok(Arc::clone(service))
    }

    /// Whether kind `S` has been registered.
    pub fn contains<S>(&self) -> bool
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.services.read().contains_key(&TypeId::of::<S>())
    }

    /// End the registration phase. Lookups remain valid; any further
    /// registration fails.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl Default for Phonebook {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Phonebook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let services = self.services.read();
        let kinds: Vec<&str> = services.values().map(|e| e.kind).collect();
        f.debug_struct("Phonebook")
            .field("sealed", &self.sealed.load(Ordering::Relaxed))
            .field("services", &kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Clock {
        now_ns: u64,
    }

    trait Predictor: Send + Sync {
        fn horizon_ms(&self) -> u32;
    }

    struct FixedPredictor;

    impl Predictor for FixedPredictor {
        fn horizon_ms(&self) -> u32 {
            16
        }
    }

    #[test]
    fn test_register_and_lookup_concrete() {
        let pb = Phonebook::new();
        pb.register(Arc::new(Clock { now_ns: 42 })).unwrap();
        let clock = pb.lookup::<Clock>().unwrap();
        assert_eq!(clock.now_ns, 42);
    }

    #[test]
    fn test_register_and_lookup_trait_object() {
        let pb = Phonebook::new();
        let service: Arc<dyn Predictor> = Arc::new(FixedPredictor);
        pb.register::<dyn Predictor>(service).unwrap();
        assert_eq!(pb.lookup::<dyn Predictor>().unwrap().horizon_ms(), 16);
    }

    #[test]
    fn test_lookup_missing_fails() {
        let pb = Phonebook::new();
        let err = pb.lookup::<Clock>().unwrap_err();
        assert!(matches!(err, ParallaxError::NotRegistered(_)));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let pb = Phonebook::new();
        pb.register(Arc::new(Clock { now_ns: 1 })).unwrap();
        let err = pb.register(Arc::new(Clock { now_ns: 2 })).unwrap_err();
        assert!(matches!(err, ParallaxError::AlreadyRegistered(_)));
        // First registration is untouched
        assert_eq!(pb.lookup::<Clock>().unwrap().now_ns, 1);
    }

    #[test]
    fn test_register_or_replace() {
        let pb = Phonebook::new();
        pb.register(Arc::new(Clock { now_ns: 1 })).unwrap();
        pb.register_or_replace(Arc::new(Clock { now_ns: 2 })).unwrap();
        assert_eq!(pb.lookup::<Clock>().unwrap().now_ns, 2);
    }

    #[test]
    fn test_sealed_refuses_registration() {
        let pb = Phonebook::new();
        pb.register(Arc::new(Clock { now_ns: 1 })).unwrap();
        pb.seal();
        let err = pb.register(Arc::new(Clock { now_ns: 2 })).unwrap_err();
        assert!(matches!(err, ParallaxError::RegistrySealed(_)));
        // Lookup still works after sealing
        assert_eq!(pb.lookup::<Clock>().unwrap().now_ns, 1);
    }

    #[test]
    fn test_concurrent_lookup_after_seal() {
        let pb = Arc::new(Phonebook::new());
        pb.register(Arc::new(Clock { now_ns: 9 })).unwrap();
        pb.seal();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pb = Arc::clone(&pb);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert_eq!(pb.lookup::<Clock>().unwrap().now_ns, 9);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
