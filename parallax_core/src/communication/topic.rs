//! A named, typed event channel.
//!
//! A topic owns the latest-value ring its readers snapshot and the list of
//! subscriptions its publishes fan out to. The type tag is fixed at
//! creation; the switchboard's registry guarantees every reader, writer,
//! and schedule on the same name agrees with it.
//!
//! Concurrency discipline: the subscription list is behind a
//! reader/writer lock — shared for fan-out on every `put`, exclusive only
//! for `schedule` and `stop` (startup and shutdown). `stop` flips the
//! stopped flag under the exclusive lock, so any `put` that acquires the
//! shared lock afterwards sees it and skips delivery; joins happen with
//! the lock released so a callback publishing to this topic cannot
//! deadlock shutdown.

use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::SubscriptionConfig;
use crate::error::{ParallaxError, ParallaxResult};
use crate::telemetry::Telemetry;

use super::event::DynEventRef;
use super::ring::LatestRing;
use super::subscription::{DynCallback, TopicSubscription};

pub(crate) struct Topic {
    name: String,
    ty: TypeId,
    ty_name: &'static str,
    ring: LatestRing,
    subscriptions: RwLock<Vec<TopicSubscription>>,
    stopped: AtomicBool,
    telemetry: Arc<dyn Telemetry>,
}

impl Topic {
    pub fn new(
        name: String,
        ty: TypeId,
        ty_name: &'static str,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            name,
            ty,
            ty_name,
            ring: LatestRing::new(),
            subscriptions: RwLock::new(Vec::new()),
            stopped: AtomicBool::new(false),
            telemetry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn ty_name(&self) -> &'static str {
        self.ty_name
    }

    /// Publish an event: ring first, then fan-out.
    ///
    /// Single writer per topic; the serial bumps by exactly one. A stopped
    /// topic still updates its ring so late readers see the freshest
    /// value, but delivers no callbacks.
    pub fn put(&self, event: DynEventRef) {
        let serial = self.ring.publish(event.clone());
        self.telemetry.topic_put(&self.name, serial);

        let subscriptions = self.subscriptions.read();
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        for subscription in subscriptions.iter() {
            if let Err(err) = subscription.enqueue(event.clone()) {
                log::error!(
                    "topic '{}': delivery to '{}' failed: {}",
                    self.name,
                    subscription.account(),
                    err
                );
            }
        }
    }

    /// Snapshot the latest event, or `None` before the first publish.
    pub fn get(&self) -> Option<DynEventRef> {
        let (serial, event) = self.ring.latest()?;
        self.telemetry.topic_get(&self.name, serial);
        Some(event)
    }

    /// Attach a callback served by a dedicated worker thread.
    pub fn schedule(
        &self,
        account: String,
        callback: DynCallback,
        config: &SubscriptionConfig,
    ) -> ParallaxResult<()> {
        let mut subscriptions = self.subscriptions.write();
        if self.stopped.load(Ordering::Acquire) {
            return Err(ParallaxError::stopped(format!(
                "topic '{}' is stopped; cannot schedule '{}'",
                self.name, account
            )));
        }
        let subscription = TopicSubscription::start(
            account,
            self.name.clone(),
            callback,
            config,
            Arc::clone(&self.telemetry),
        )?;
        subscriptions.push(subscription);
        Ok(())
    }

    /// Stop every subscription: request stop on all, then drain and join
    /// each. Idempotent; after return no callback fires.
    pub fn stop(&self) {
        let mut subscriptions = {
            let mut guard = self.subscriptions.write();
            if self.stopped.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *guard)
        };
        // Signal all workers before joining any, so their drains overlap
        // and shutdown stays bounded by one dequeue timeout.
        for subscription in subscriptions.iter() {
            subscription.request_stop();
        }
        for subscription in subscriptions.iter_mut() {
            subscription.stop();
        }
        log::debug!("topic '{}' stopped", self.name);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubscriptionConfig;
    use crate::telemetry::NullTelemetry;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn new_topic(name: &str) -> Topic {
        Topic::new(
            name.into(),
            TypeId::of::<u64>(),
            std::any::type_name::<u64>(),
            Arc::new(NullTelemetry),
        )
    }

    fn fast_config() -> SubscriptionConfig {
        SubscriptionConfig {
            dequeue_timeout_ms: 10,
            ..SubscriptionConfig::default()
        }
    }

    #[test]
    fn test_get_none_before_first_put() {
        let topic = new_topic("fresh");
        assert!(topic.get().is_none());
    }

    #[test]
    fn test_put_then_get_returns_latest() {
        let topic = new_topic("latest");
        topic.put(Arc::new(1u64));
        topic.put(Arc::new(2u64));
        let event = topic.get().unwrap();
        assert_eq!(*event.downcast_ref::<u64>().unwrap(), 2);
    }

    #[test]
    fn test_two_subscribers_see_same_prefix_independently() {
        let topic = new_topic("shared");
        let seen_a: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_b: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));

        for seen in [&seen_a, &seen_b] {
            let seen = Arc::clone(seen);
            topic
                .schedule(
                    "acct".into(),
                    Box::new(move |event, iteration| {
                        let payload = *event.downcast_ref::<u64>().unwrap();
                        seen.lock().push((iteration, payload));
                    }),
                    &fast_config(),
                )
                .unwrap();
        }

        for n in 1..=4u64 {
            topic.put(Arc::new(n));
        }
        while seen_a.lock().len() < 4 || seen_b.lock().len() < 4 {
            std::thread::sleep(Duration::from_millis(1));
        }
        topic.stop();

        let expected: Vec<(u64, u64)> = (1..=4).map(|n| (n, n)).collect();
        assert_eq!(*seen_a.lock(), expected);
        assert_eq!(*seen_b.lock(), expected);
    }

    #[test]
    fn test_put_after_stop_updates_ring_without_callbacks() {
        let topic = new_topic("quiescent");
        let delivered = Arc::new(Mutex::new(0u64));
        let cb_delivered = Arc::clone(&delivered);
        topic
            .schedule(
                "acct".into(),
                Box::new(move |_, _| *cb_delivered.lock() += 1),
                &fast_config(),
            )
            .unwrap();

        topic.put(Arc::new(1u64));
        while *delivered.lock() < 1 {
            std::thread::sleep(Duration::from_millis(1));
        }
        topic.stop();

        topic.put(Arc::new(2u64));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(*delivered.lock(), 1, "callback fired after stop");
        // The ring still advanced
        let event = topic.get().unwrap();
        assert_eq!(*event.downcast_ref::<u64>().unwrap(), 2);
    }

    #[test]
    fn test_schedule_after_stop_fails() {
        let topic = new_topic("done");
        topic.stop();
        let err = topic
            .schedule("late".into(), Box::new(|_, _| {}), &fast_config())
            .unwrap_err();
        assert!(matches!(err, ParallaxError::Stopped(_)));
        assert_eq!(topic.subscription_count(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let topic = new_topic("twice");
        topic
            .schedule("acct".into(), Box::new(|_, _| {}), &fast_config())
            .unwrap();
        topic.stop();
        topic.stop();
        assert!(topic.is_stopped());
    }
}
