//! The switchboard: typed, named event topics with two consumption
//! disciplines.
//!
//! Plugins obtain the switchboard from the phonebook, then either poll the
//! freshest value through a [`Reader`], publish through a [`Writer`], or
//! [`schedule`](Switchboard::schedule) a callback that a dedicated worker
//! thread invokes once per published event. Topics are created lazily on
//! first reference; all participants on a name must agree on its event
//! type.
//!
//! ```rust
//! use std::sync::Arc;
//! use parallax_core::{Phonebook, Switchboard};
//!
//! #[derive(Clone)]
//! struct ImuSample { gyro: [f32; 3] }
//!
//! let pb = Phonebook::new();
//! pb.register(Arc::new(Switchboard::new())).unwrap();
//!
//! let sb = pb.lookup::<Switchboard>().unwrap();
//! let writer = sb.get_writer::<ImuSample>("imu").unwrap();
//! let reader = sb.get_reader::<ImuSample>("imu").unwrap();
//!
//! writer.put(writer.allocate(ImuSample { gyro: [0.0; 3] }));
//! assert!(reader.get_ro_nullable().is_some());
//! sb.stop();
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{SubscriptionConfig, SwitchboardConfig};
use crate::error::{ParallaxError, ParallaxResult};
use crate::phonebook::Phonebook;
use crate::telemetry::{NullTelemetry, Telemetry};

use super::event::{downcast, Event, EventRef};
use super::topic::Topic;

/// Manager of typed, named event streams.
pub struct Switchboard {
    registry: RwLock<HashMap<String, Arc<Topic>>>,
    config: SwitchboardConfig,
    telemetry: Arc<dyn Telemetry>,
    stopped: AtomicBool,
}

impl Switchboard {
    /// Switchboard with default configuration and no telemetry sink.
    pub fn new() -> Self {
        Self::with_config(SwitchboardConfig::default())
    }

    pub fn with_config(config: SwitchboardConfig) -> Self {
        Self::with_telemetry(config, Arc::new(NullTelemetry))
    }

    pub fn with_telemetry(config: SwitchboardConfig, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            config,
            telemetry,
            stopped: AtomicBool::new(false),
        }
    }

    /// Build from an already-populated phonebook: picks up an
    /// `Arc<dyn Telemetry>` sink if one is registered, no-op otherwise.
    pub fn from_phonebook(pb: &Phonebook) -> Self {
        let telemetry = pb
            .lookup::<dyn Telemetry>()
            .unwrap_or_else(|_| Arc::new(NullTelemetry));
        Self::with_telemetry(SwitchboardConfig::default(), telemetry)
    }

    /// Look up or lazily create the topic `name` carrying events of type
    /// `E`. The single entry point for readers, writers, and schedules;
    /// fails with [`ParallaxError::TypeMismatch`] if the topic exists with
    /// a different event type.
    fn try_register<E: Event>(&self, name: &str) -> ParallaxResult<Arc<Topic>> {
        let check = |topic: &Arc<Topic>| -> ParallaxResult<Arc<Topic>> {
            if topic.ty() == TypeId::of::<E>() {
                Ok(Arc::clone(topic))
            } else {
                Err(ParallaxError::TypeMismatch {
                    topic: name.to_string(),
                    registered: topic.ty_name(),
                    requested: std::any::type_name::<E>(),
                })
            }
        };

        if let Some(topic) = self.registry.read().get(name) {
            return check(topic);
        }

        let mut registry = self.registry.write();
        // Re-check: another thread may have created it between locks
        if let Some(topic) = registry.get(name) {
            return check(topic);
        }
        let topic = Arc::new(Topic::new(
            name.to_string(),
            TypeId::of::<E>(),
            std::any::type_name::<E>(),
            Arc::clone(&self.telemetry),
        ));
        registry.insert(name.to_string(), Arc::clone(&topic));
        log::debug!(
            "switchboard: created topic '{}' [{}]",
            name,
            topic.ty_name()
        );
        Ok(topic)
    }

    /// Typed handle to poll the latest event on `name`.
    pub fn get_reader<E: Event>(&self, name: &str) -> ParallaxResult<Reader<E>> {
        Ok(Reader {
            topic: self.try_register::<E>(name)?,
            _marker: PhantomData,
        })
    }

    /// Typed handle to publish events to `name`.
    pub fn get_writer<E: Event>(&self, name: &str) -> ParallaxResult<Writer<E>> {
        Ok(Writer {
            topic: self.try_register::<E>(name)?,
            _marker: PhantomData,
        })
    }

    /// Run `callback` on a dedicated worker thread for every event
    /// published to `name`, with this switchboard's default subscription
    /// configuration.
    ///
    /// `account` is a short label for the logical consumer, used in the
    /// worker's thread name and in telemetry.
    pub fn schedule<E: Event>(
        &self,
        account: &str,
        name: &str,
        callback: impl Fn(EventRef<E>, u64) + Send + Sync + 'static,
    ) -> ParallaxResult<()> {
        self.schedule_with(account, name, self.config.subscription.clone(), callback)
    }

    /// [`schedule`](Self::schedule) with an explicit per-subscription
    /// queue configuration (capacity and overflow policy).
    pub fn schedule_with<E: Event>(
        &self,
        account: &str,
        name: &str,
        config: SubscriptionConfig,
        callback: impl Fn(EventRef<E>, u64) + Send + Sync + 'static,
    ) -> ParallaxResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ParallaxError::stopped(format!(
                "switchboard is stopped; cannot schedule '{}' on '{}'",
                account, name
            )));
        }
        let topic = self.try_register::<E>(name)?;
        let topic_name = name.to_string();
        topic.schedule(
            account.to_string(),
            Box::new(move |event, iteration| match downcast::<E>(event) {
                Some(event) => callback(event, iteration),
                None => {
                    // Topic type identity was checked at registration
                    log::error!(
                        "topic '{}': event failed downcast to {}",
                        topic_name,
                        std::any::type_name::<E>()
                    );
                    debug_assert!(false, "scheduled callback received foreign event type");
                }
            }),
            &config,
        )
    }

    /// Stop every topic. After return no callback fires; later `put`s
    /// still update latest-value rings, and outstanding reader/writer
    /// handles stay valid but quiescent. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let registry = self.registry.read();
        for topic in registry.values() {
            topic.stop();
        }
        log::info!("switchboard stopped ({} topics)", registry.len());
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of topics created so far.
    pub fn topic_count(&self) -> usize {
        self.registry.read().len()
    }
}

impl Default for Switchboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Switchboard {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Typed handle returning the latest event on a topic on demand.
///
/// Cheap to clone-by-recreation and safe to use from any thread. The event
/// type was validated against the topic when the reader was created.
pub struct Reader<E: Event> {
    topic: Arc<Topic>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Event> std::fmt::Debug for Reader<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("topic", &self.topic.name())
            .finish()
    }
}

impl<E: Event> Reader<E> {
    /// Snapshot the latest event, or `None` before the first publish.
    /// Zero-copy: the returned reference shares ownership with the bus.
    pub fn get_ro_nullable(&self) -> Option<EventRef<E>> {
        let event = self.topic.get()?;
        let typed = downcast::<E>(event);
        debug_assert!(typed.is_some(), "reader observed foreign event type");
        typed
    }

    /// Snapshot the latest event; fails with [`ParallaxError::NoEvent`]
    /// before the first publish.
    pub fn get_ro(&self) -> ParallaxResult<EventRef<E>> {
        self.get_ro_nullable()
            .ok_or_else(|| ParallaxError::NoEvent(self.topic.name().to_string()))
    }

    /// Deep copy of the latest event for private mutation. The copy has no
    /// relation to the topic after return.
    pub fn get_rw(&self) -> ParallaxResult<E>
    where
        E: Clone,
    {
        Ok((*self.get_ro()?).clone())
    }

    /// Name of the topic this reader snapshots.
    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }
}

/// Typed handle that constructs and publishes events to a topic.
///
/// One writer per topic: serial numbers assume a single publisher, and
/// concurrent writers to the same topic are unsupported.
pub struct Writer<E: Event> {
    topic: Arc<Topic>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Event> std::fmt::Debug for Writer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("topic", &self.topic.name())
            .finish()
    }
}

impl<E: Event> Writer<E> {
    /// Construct a new event. The canonical allocation point — a pooling
    /// allocator can be slotted in here without touching call sites.
    pub fn allocate(&self, value: E) -> EventRef<E> {
        Arc::new(value)
    }

    /// Publish an event. Ownership transfers to the topic; the latest-value
    /// ring and every subscriber queue share it from here on.
    pub fn put(&self, event: EventRef<E>) {
        self.topic.put(event);
    }

    /// Allocate and publish in one call.
    pub fn put_value(&self, value: E) {
        self.put(self.allocate(value));
    }

    /// Name of the topic this writer publishes to.
    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }
}
