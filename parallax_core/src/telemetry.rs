//! Instrumentation hooks for the switchboard hot paths.
//!
//! The bus emits timing events at three points: topic `put`, topic `get`,
//! and subscription callback invocation, plus a summary record when a
//! subscription drains at stop time. A deployment attaches a sink by
//! registering an `Arc<dyn Telemetry>` in the phonebook (or passing one to
//! [`Switchboard::with_telemetry`](crate::Switchboard::with_telemetry));
//! with no sink attached every hook is a no-op.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ParallaxResult;

/// Stop-time summary of one subscription's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStats {
    /// Events delivered to the callback.
    pub processed: u64,
    /// Events drained unprocessed at stop time.
    pub unprocessed: u64,
    /// Dequeue timeouts where the queue was empty.
    pub idle_cycles: u64,
}

/// Sink for switchboard instrumentation events.
///
/// All methods default to no-ops so sinks implement only what they care
/// about. Implementations are called from publisher and worker threads and
/// must not block on the switchboard itself.
pub trait Telemetry: Send + Sync {
    /// A publish landed on `topic` with the given serial number.
    fn topic_put(&self, topic: &str, serial_no: u64) {
        let _ = (topic, serial_no);
    }

    /// A reader snapshotted `topic` at the given serial number.
    fn topic_get(&self, topic: &str, serial_no: u64) {
        let _ = (topic, serial_no);
    }

    /// A subscription callback is being invoked for its `iteration`-th event.
    fn callback(&self, account: &str, topic: &str, iteration: u64) {
        let _ = (account, topic, iteration);
    }

    /// A subscription worker drained and stopped.
    fn subscription_stop(&self, account: &str, topic: &str, stats: &SubscriptionStats) {
        let _ = (account, topic, stats);
    }
}

/// The default sink: every hook is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {}

/// Sink that forwards every hook to the `log` facade at trace level
/// (stop summaries at debug level, since they fire once per subscription).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn topic_put(&self, topic: &str, serial_no: u64) {
        log::trace!(target: "parallax::telemetry", "put topic={} serial={}", topic, serial_no);
    }

    fn topic_get(&self, topic: &str, serial_no: u64) {
        log::trace!(target: "parallax::telemetry", "get topic={} serial={}", topic, serial_no);
    }

    fn callback(&self, account: &str, topic: &str, iteration: u64) {
        log::trace!(
            target: "parallax::telemetry",
            "callback account={} topic={} iteration={}",
            account,
            topic,
            iteration
        );
    }

    fn subscription_stop(&self, account: &str, topic: &str, stats: &SubscriptionStats) {
        log::debug!(
            target: "parallax::telemetry",
            "subscription stopped account={} topic={} processed={} unprocessed={} idle_cycles={}",
            account,
            topic,
            stats.processed,
            stats.unprocessed,
            stats.idle_cycles
        );
    }
}

/// One JSON-lines telemetry record.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "point", rename_all = "snake_case")]
enum Record<'a> {
    TopicPut {
        timestamp_ns: u128,
        topic: &'a str,
        serial_no: u64,
    },
    TopicGet {
        timestamp_ns: u128,
        topic: &'a str,
        serial_no: u64,
    },
    Callback {
        timestamp_ns: u128,
        account: &'a str,
        topic: &'a str,
        iteration: u64,
    },
    SubscriptionStop {
        timestamp_ns: u128,
        account: &'a str,
        topic: &'a str,
        #[serde(flatten)]
        stats: SubscriptionStats,
    },
}

/// Sink that appends one JSON object per hook invocation to a file.
///
/// Intended for offline analysis of perception-loop timing; writes are
/// buffered and serialized through a mutex, so attach it only when the
/// extra latency on the hot paths is acceptable.
pub struct JsonlTelemetry {
    out: Mutex<BufWriter<File>>,
}

impl JsonlTelemetry {
    /// Create (truncating) the record file at `path`.
    pub fn create(path: impl AsRef<Path>) -> ParallaxResult<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write(&self, record: &Record<'_>) {
        // Hot-path hook: swallow serialization/IO failures after logging
        // them once at error level rather than surfacing to the bus.
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(err) => {
                log::error!("telemetry record serialization failed: {}", err);
                return;
            }
        };
        let mut out = self.out.lock();
        if writeln!(out, "{}", line).is_err() {
            log::error!("telemetry record write failed");
        }
    }

    /// Flush buffered records to disk.
    pub fn flush(&self) -> ParallaxResult<()> {
        self.out.lock().flush()?;
        Ok(())
    }
}

fn now_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

impl Telemetry for JsonlTelemetry {
    fn topic_put(&self, topic: &str, serial_no: u64) {
        self.write(&Record::TopicPut {
            timestamp_ns: now_ns(),
            topic,
            serial_no,
        });
    }

    fn topic_get(&self, topic: &str, serial_no: u64) {
        self.write(&Record::TopicGet {
            timestamp_ns: now_ns(),
            topic,
            serial_no,
        });
    }

    fn callback(&self, account: &str, topic: &str, iteration: u64) {
        self.write(&Record::Callback {
            timestamp_ns: now_ns(),
            account,
            topic,
            iteration,
        });
    }

    fn subscription_stop(&self, account: &str, topic: &str, stats: &SubscriptionStats) {
        self.write(&Record::SubscriptionStop {
            timestamp_ns: now_ns(),
            account,
            topic,
            stats: *stats,
        });
        let _ = self.flush();
    }
}

impl Drop for JsonlTelemetry {
    fn drop(&mut self) {
        let _ = self.out.lock().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_telemetry_is_a_no_op() {
        let sink = NullTelemetry;
        sink.topic_put("imu", 1);
        sink.topic_get("imu", 1);
        sink.callback("integrator", "imu", 1);
        sink.subscription_stop(
            "integrator",
            "imu",
            &SubscriptionStats {
                processed: 1,
                unprocessed: 0,
                idle_cycles: 0,
            },
        );
    }

    #[test]
    fn test_jsonl_records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let sink = JsonlTelemetry::create(&path).unwrap();

        sink.topic_put("imu", 7);
        sink.callback("integrator", "imu", 1);
        sink.subscription_stop(
            "integrator",
            "imu",
            &SubscriptionStats {
                processed: 1,
                unprocessed: 2,
                idle_cycles: 3,
            },
        );
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);

        let put: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(put["point"], "topic_put");
        assert_eq!(put["topic"], "imu");
        assert_eq!(put["serial_no"], 7);

        let stop: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(stop["point"], "subscription_stop");
        assert_eq!(stop["account"], "integrator");
        assert_eq!(stop["unprocessed"], 2);
    }
}
