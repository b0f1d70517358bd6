//! A reusable tick-loop for plugins.
//!
//! Most perception plugins are a single loop: wait until there is work,
//! run one iteration, repeat. `Threadloop` factors that shape out so a
//! plugin only writes the iteration body and an optional gate, and gets a
//! [`ManagedThread`]-backed worker with iteration counting for free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ParallaxResult;
use crate::scheduling::{ManagedThread, ThreadState};

/// Decision returned by [`Threadloop::should_skip`] before each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOption {
    /// Run the iteration now.
    Run,
    /// Skip but retry immediately. Busy-waits; use only when the next
    /// iteration is expected within microseconds.
    SkipAndSpin,
    /// Skip and yield the scheduling quantum to other threads.
    SkipAndYield,
    /// Stop the loop.
    Stop,
}

/// A loop body hosted on a managed worker thread.
pub trait Threadloop: Send + 'static {
    /// Called once on the worker thread before the first iteration.
    fn setup(&mut self) {}

    /// Gate for the next iteration. Defaults to always running.
    fn should_skip(&mut self) -> SkipOption {
        SkipOption::Run
    }

    /// One iteration of the loop body.
    fn one_iteration(&mut self);
}

/// Handle to a running [`Threadloop`].
pub struct ThreadloopDriver {
    thread: ManagedThread,
    iterations: Arc<AtomicU64>,
    skips: Arc<AtomicU64>,
}

impl ThreadloopDriver {
    /// Launch `body` on a managed thread named `name`.
    pub fn start(name: &str, mut body: impl Threadloop) -> ParallaxResult<Self> {
        let iterations = Arc::new(AtomicU64::new(0));
        let skips = Arc::new(AtomicU64::new(0));
        let (iter_counter, skip_counter) = (Arc::clone(&iterations), Arc::clone(&skips));

        let mut started = false;
        let thread = ManagedThread::builder().name(name).spawn(move || {
            if !started {
                body.setup();
                started = true;
            }
            match body.should_skip() {
                SkipOption::Run => {
                    body.one_iteration();
                    iter_counter.fetch_add(1, Ordering::Relaxed);
                }
                SkipOption::SkipAndSpin => {
                    skip_counter.fetch_add(1, Ordering::Relaxed);
                    std::hint::spin_loop();
                }
                SkipOption::SkipAndYield => {
                    skip_counter.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(Duration::from_millis(2));
                }
                SkipOption::Stop => return std::ops::ControlFlow::Break(()),
            }
            std::ops::ControlFlow::Continue(())
        })?;

        Ok(Self {
            thread,
            iterations,
            skips,
        })
    }

    /// Iterations run so far.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Gated-out cycles so far.
    pub fn skips(&self) -> u64 {
        self.skips.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ThreadState {
        self.thread.state()
    }

    /// Access the underlying worker, e.g. to pin it or raise its priority.
    pub fn thread(&self) -> &ManagedThread {
        &self.thread
    }

    /// Ask the loop to stop without joining.
    pub fn request_stop(&self) {
        self.thread.request_stop();
    }

    /// Stop the loop and join the worker.
    pub fn stop(&mut self) {
        self.thread.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountTo {
        limit: u64,
        count: u64,
        observed: Arc<AtomicU64>,
    }

    impl Threadloop for CountTo {
        fn should_skip(&mut self) -> SkipOption {
            if self.count >= self.limit {
                SkipOption::Stop
            } else {
                SkipOption::Run
            }
        }

        fn one_iteration(&mut self) {
            self.count += 1;
            self.observed.store(self.count, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_loop_runs_to_self_stop() {
        let observed = Arc::new(AtomicU64::new(0));
        let mut driver = ThreadloopDriver::start(
            "count-loop",
            CountTo {
                limit: 10,
                count: 0,
                observed: Arc::clone(&observed),
            },
        )
        .unwrap();

        while driver.state() == ThreadState::Running {
            std::thread::sleep(Duration::from_millis(1));
        }
        driver.stop();

        assert_eq!(observed.load(Ordering::Relaxed), 10);
        assert_eq!(driver.iterations(), 10);
    }

    struct YieldOnce {
        yielded: bool,
    }

    impl Threadloop for YieldOnce {
        fn should_skip(&mut self) -> SkipOption {
            if self.yielded {
                SkipOption::Stop
            } else {
                self.yielded = true;
                SkipOption::SkipAndYield
            }
        }

        fn one_iteration(&mut self) {
            unreachable!("gate never returns Run");
        }
    }

    #[test]
    fn test_skips_are_counted() {
        let mut driver = ThreadloopDriver::start("yield-loop", YieldOnce { yielded: false }).unwrap();
        while driver.state() == ThreadState::Running {
            std::thread::sleep(Duration::from_millis(1));
        }
        driver.stop();
        assert_eq!(driver.skips(), 1);
        assert_eq!(driver.iterations(), 0);
    }
}
