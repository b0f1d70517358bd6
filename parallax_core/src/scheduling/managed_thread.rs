//! A worker thread with a stop flag and a managed lifecycle.
//!
//! `ManagedThread` runs a body closure in a tight loop until asked to
//! stop, with optional `on_start`/`on_stop` hooks running on the worker
//! thread itself. The constructor handshakes with the worker so that by
//! the time `spawn` returns the thread is running and its OS tid is known,
//! which lets callers pin it to a core or raise its scheduling priority.
//!
//! Subscription workers in the switchboard are built on this primitive;
//! plugins reuse it through [`Threadloop`](crate::scheduling::Threadloop).

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::{ParallaxError, ParallaxResult};
use crate::scheduling::Signal;

/// Lifecycle of a [`ManagedThread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// The worker loop is executing the body.
    Running,
    /// Stop has been requested but the thread has not been joined.
    Stopping,
    /// The thread has been joined.
    Stopped,
}

struct Shared {
    stop: AtomicBool,
    /// OS tid of the worker, recorded during the startup handshake.
    /// 0 until the worker has announced itself.
    tid: AtomicI32,
    started: Signal,
}

/// Builder for [`ManagedThread`].
pub struct ManagedThreadBuilder {
    name: Option<String>,
    on_start: Option<Box<dyn FnMut() + Send>>,
    on_stop: Option<Box<dyn FnMut() + Send>>,
}

impl ManagedThreadBuilder {
    /// OS thread name. Truncated to 15 bytes by the platform.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Hook run once on the worker thread before the first body call.
    pub fn on_start(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    /// Hook run once on the worker thread after the loop exits.
    pub fn on_stop(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_stop = Some(Box::new(f));
        self
    }

    /// Launch the worker. `body` runs in a loop until a stop is requested
    /// or the body itself returns [`ControlFlow::Break`].
    ///
    /// Blocks until the worker has started and recorded its tid.
    pub fn spawn(
        self,
        mut body: impl FnMut() -> ControlFlow<()> + Send + 'static,
    ) -> ParallaxResult<ManagedThread> {
        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            tid: AtomicI32::new(0),
            started: Signal::new(),
        });

        let mut builder = std::thread::Builder::new();
        let name = self.name.unwrap_or_else(|| "parallax-worker".into());
        builder = builder.name(name.clone());

        let thread_shared = Arc::clone(&shared);
        let mut on_start = self.on_start;
        let mut on_stop = self.on_stop;
        let handle = builder
            .spawn(move || {
                thread_shared.tid.store(current_tid(), Ordering::Release);
                thread_shared.started.set();
                if let Some(f) = on_start.as_mut() {
                    f();
                }
                while !thread_shared.stop.load(Ordering::Acquire) {
                    if body().is_break() {
                        thread_shared.stop.store(true, Ordering::Release);
                        break;
                    }
                }
                if let Some(f) = on_stop.as_mut() {
                    f();
                }
            })
            .map_err(|e| ParallaxError::thread(format!("failed to spawn '{}': {}", name, e)))?;

        shared.started.wait();
        Ok(ManagedThread {
            shared,
            handle: Some(handle),
            name,
        })
    }
}

/// A thread that joins on drop and exposes a start/running/stopping/stopped
/// state machine.
pub struct ManagedThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    name: String,
}

impl ManagedThread {
    pub fn builder() -> ManagedThreadBuilder {
        ManagedThreadBuilder {
            name: None,
            on_start: None,
            on_stop: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        if self.handle.is_none() {
            ThreadState::Stopped
        } else if self.shared.stop.load(Ordering::Acquire) {
            ThreadState::Stopping
        } else {
            ThreadState::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ThreadState::Running
    }

    /// Ask the worker to stop. Observed at the next body return; does not
    /// join. Safe to call from any thread, including the worker itself.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Request stop and join. Idempotent.
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("managed thread '{}' panicked", self.name);
            }
        }
    }

    /// OS tid of the worker.
    pub fn tid(&self) -> i32 {
        self.shared.tid.load(Ordering::Acquire)
    }

    /// Pin the worker to a CPU core.
    #[cfg(target_os = "linux")]
    pub fn set_cpu(&self, core: usize) -> ParallaxResult<()> {
        let cpu_count = std::thread::available_parallelism().map(|p| p.get()).unwrap_or(1);
        if core >= cpu_count {
            return Err(ParallaxError::thread(format!(
                "CPU {} does not exist (max: {})",
                core,
                cpu_count - 1
            )));
        }
        // SAFETY: CPU_SET manipulation and sched_setaffinity are safe libc calls
        unsafe {
            let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut cpuset);
            libc::CPU_SET(core, &mut cpuset);
            let ret = libc::sched_setaffinity(
                self.tid(),
                std::mem::size_of::<libc::cpu_set_t>(),
                &cpuset,
            );
            if ret == 0 {
                Ok(())
            } else {
                Err(std::io::Error::last_os_error().into())
            }
        }
    }

    /// CPU pinning is not supported off Linux; succeeds without effect.
    #[cfg(not(target_os = "linux"))]
    pub fn set_cpu(&self, _core: usize) -> ParallaxResult<()> {
        Ok(())
    }

    /// Give the worker a SCHED_FIFO real-time priority. Usually requires
    /// CAP_SYS_NICE.
    #[cfg(target_os = "linux")]
    pub fn set_priority(&self, priority: i32) -> ParallaxResult<()> {
        let param = libc::sched_param {
            sched_priority: priority,
        };
        // SAFETY: sched_setscheduler with a valid tid and param struct
        let ret = unsafe { libc::sched_setscheduler(self.tid(), libc::SCHED_FIFO, &param) };
        if ret == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error().into())
        }
    }

    /// Scheduling priority is not supported off Linux; succeeds without effect.
    #[cfg(not(target_os = "linux"))]
    pub fn set_priority(&self, _priority: i32) -> ParallaxResult<()> {
        Ok(())
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(target_os = "linux")]
fn current_tid() -> i32 {
    // SAFETY: gettid has no failure modes
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

#[cfg(not(target_os = "linux"))]
fn current_tid() -> i32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    #[test]
    fn test_body_runs_until_stopped() {
        let count = Arc::new(AtomicU64::new(0));
        let body_count = Arc::clone(&count);
        let mut thread = ManagedThread::builder()
            .name("mt-test")
            .spawn(move || {
                body_count.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(Duration::from_millis(1));
                ControlFlow::Continue(())
            })
            .unwrap();

        assert_eq!(thread.state(), ThreadState::Running);
        while count.load(Ordering::Relaxed) < 3 {
            std::thread::yield_now();
        }
        thread.stop();
        assert_eq!(thread.state(), ThreadState::Stopped);

        let after_stop = count.load(Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::Relaxed), after_stop);
    }

    #[test]
    fn test_hooks_run_on_worker_in_order() {
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (start_events, stop_events) = (Arc::clone(&events), Arc::clone(&events));
        let body_events = Arc::clone(&events);

        let mut thread = ManagedThread::builder()
            .on_start(move || start_events.lock().push("start"))
            .on_stop(move || stop_events.lock().push("stop"))
            .spawn(move || {
                let mut events = body_events.lock();
                if events.last() != Some(&"body") {
                    events.push("body");
                }
                ControlFlow::Continue(())
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(5));
        thread.stop();

        let events = events.lock();
        assert_eq!(events.first(), Some(&"start"));
        assert_eq!(events.last(), Some(&"stop"));
        assert!(events.contains(&"body"));
    }

    #[test]
    fn test_body_break_stops_the_loop() {
        let count = Arc::new(AtomicU64::new(0));
        let body_count = Arc::clone(&count);
        let mut thread = ManagedThread::builder()
            .spawn(move || {
                if body_count.fetch_add(1, Ordering::Relaxed) + 1 == 5 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();

        // The worker stops itself after 5 iterations
        while thread.state() == ThreadState::Running {
            std::thread::sleep(Duration::from_millis(1));
        }
        thread.stop();
        assert_eq!(count.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_tid_recorded_after_spawn() {
        let mut thread = ManagedThread::builder()
            .spawn(|| {
                std::thread::sleep(Duration::from_millis(1));
                ControlFlow::Continue(())
            })
            .unwrap();
        if cfg!(target_os = "linux") {
            assert!(thread.tid() > 0);
        }
        thread.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut thread = ManagedThread::builder()
            .spawn(|| ControlFlow::Continue(()))
            .unwrap();
        thread.stop();
        thread.stop();
        assert_eq!(thread.state(), ThreadState::Stopped);
    }
}
