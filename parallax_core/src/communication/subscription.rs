//! Per-callback subscription workers.
//!
//! Each subscription owns a bounded queue of event references and one
//! [`ManagedThread`] that dequeues with a timeout and invokes the
//! callback. The publisher side enqueues without ever blocking unboundedly:
//! under the default `DropOldest` policy a full queue sheds its oldest
//! entry instead of stalling the publisher.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::config::{OverflowPolicy, SubscriptionConfig};
use crate::error::{ParallaxError, ParallaxResult};
use crate::scheduling::ManagedThread;
use crate::telemetry::{SubscriptionStats, Telemetry};

use super::event::DynEventRef;

/// Type-erased callback: receives the shared event and the 1-based count
/// of events this subscription has observed.
pub(crate) type DynCallback = Box<dyn Fn(DynEventRef, u64) + Send + Sync + 'static>;

/// Counters shared between the publisher side, the worker body, and the
/// stop-time drain.
#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    /// Events shed by the publisher under `DropOldest`.
    dropped: AtomicU64,
    /// Events delivered to the callback.
    dequeued: AtomicU64,
    /// Timed dequeues that found the queue empty.
    idle_cycles: AtomicU64,
}

pub(crate) struct TopicSubscription {
    account: String,
    topic: String,
    tx: Sender<DynEventRef>,
    /// Receiver clone held on the publisher side for `DropOldest`
    /// shedding; also keeps the channel connected across worker exit.
    shed_rx: Receiver<DynEventRef>,
    policy: OverflowPolicy,
    counters: Arc<Counters>,
    worker: ManagedThread,
}

impl TopicSubscription {
    /// Create the subscription and start its worker thread.
    pub fn start(
        account: String,
        topic: String,
        callback: DynCallback,
        config: &SubscriptionConfig,
        telemetry: Arc<dyn Telemetry>,
    ) -> ParallaxResult<Self> {
        let (tx, rx) = channel::bounded::<DynEventRef>(config.capacity.max(1));
        let counters = Arc::new(Counters::default());

        let timeout = config.dequeue_timeout();
        let body_rx = rx.clone();
        let body_counters = Arc::clone(&counters);
        let body_account = account.clone();
        let body_topic = topic.clone();
        let body_telemetry = Arc::clone(&telemetry);

        let drain_rx = rx.clone();
        let drain_counters = Arc::clone(&counters);
        let drain_account = account.clone();
        let drain_topic = topic.clone();

        let worker = ManagedThread::builder()
            .name(worker_thread_name(&account, &topic))
            .on_stop(move || {
                drain(
                    &drain_rx,
                    &drain_counters,
                    &drain_account,
                    &drain_topic,
                    telemetry.as_ref(),
                );
            })
            .spawn(move || {
                match body_rx.recv_timeout(timeout) {
                    Ok(event) => {
                        let iteration = body_counters.dequeued.fetch_add(1, Ordering::Relaxed) + 1;
                        body_telemetry.callback(&body_account, &body_topic, iteration);
                        callback(event, iteration);
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        body_counters.idle_cycles.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(RecvTimeoutError::Disconnected) => return ControlFlow::Break(()),
                }
                ControlFlow::Continue(())
            })?;

        Ok(Self {
            account,
            topic,
            tx,
            shed_rx: rx,
            policy: config.overflow,
            counters,
            worker,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Hand a shared event reference to this subscription's queue.
    ///
    /// Called on the publisher's thread with the topic's subscription lock
    /// held shared. Never blocks under `DropOldest`.
    pub fn enqueue(&self, event: DynEventRef) -> ParallaxResult<()> {
        if !self.worker.is_running() {
            // The topic checks its stopped flag before fan-out, so a
            // non-running worker here is an ordering bug, not a race.
            return Err(ParallaxError::WorkerNotRunning {
                account: self.account.clone(),
                topic: self.topic.clone(),
            });
        }
        match self.policy {
            OverflowPolicy::DropOldest => {
                let mut event = event;
                loop {
                    match self.tx.try_send(event) {
                        Ok(()) => break,
                        Err(TrySendError::Full(rejected)) => {
                            if self.shed_rx.try_recv().is_ok() {
                                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                            }
                            event = rejected;
                        }
                        Err(TrySendError::Disconnected(_)) => return Ok(()),
                    }
                }
            }
            OverflowPolicy::BlockPublisher => {
                if self.tx.send(event).is_err() {
                    return Ok(());
                }
            }
            OverflowPolicy::Assert => match self.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let err = ParallaxError::QueueFull {
                        account: self.account.clone(),
                        topic: self.topic.clone(),
                    };
                    log::error!("{}", err);
                    debug_assert!(false, "subscription queue overflow under assert policy");
                    return Err(err);
                }
                Err(TrySendError::Disconnected(_)) => return Ok(()),
            },
        }
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Ask the worker to stop without joining. Lets several subscriptions
    /// wind down concurrently before [`stop`](Self::stop) joins each.
    pub fn request_stop(&self) {
        self.worker.request_stop();
    }

    /// Stop the worker and join it. The drain runs on the worker thread
    /// between the loop exit and the join.
    pub fn stop(&mut self) {
        self.worker.stop();
    }
}

/// Pop everything still queued without invoking the callback, releasing
/// each reference, and verify the accounting. Runs on the worker thread.
fn drain(
    rx: &Receiver<DynEventRef>,
    counters: &Counters,
    account: &str,
    topic: &str,
    telemetry: &dyn Telemetry,
) {
    let mut unprocessed = 0u64;
    while rx.try_recv().is_ok() {
        unprocessed += 1;
    }

    let processed = counters.dequeued.load(Ordering::Relaxed);
    let expected = counters
        .enqueued
        .load(Ordering::Relaxed)
        .saturating_sub(counters.dropped.load(Ordering::Relaxed))
        .saturating_sub(processed);
    if unprocessed != expected {
        let err = ParallaxError::DrainFailure {
            topic: topic.to_string(),
            expected,
            drained: unprocessed,
        };
        log::error!("{}", err);
        debug_assert!(false, "subscription drain accounting mismatch");
    }

    telemetry.subscription_stop(
        account,
        topic,
        &SubscriptionStats {
            processed,
            unprocessed,
            idle_cycles: counters.idle_cycles.load(Ordering::Relaxed),
        },
    );
}

/// OS thread name for a subscription worker: `"s" + account + topic[:12]`,
/// clamped to the 15 bytes Linux allows for thread names.
fn worker_thread_name(account: &str, topic: &str) -> String {
    let mut name = String::with_capacity(15);
    name.push('s');
    name.extend(account.chars());
    name.extend(topic.chars().take(12));
    while name.len() > 15 {
        name.pop();
    }
    name
}
