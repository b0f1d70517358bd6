//! Unified error handling for Parallax.
//!
//! One error enum covers the whole runtime. Operational conditions the bus
//! absorbs (empty topic, full subscriber queue) get their own recoverable
//! variants; invariant violations carry source location via
//! [`parallax_internal!`].

use thiserror::Error;

/// Main error type for Parallax operations.
#[derive(Debug, Error)]
pub enum ParallaxError {
    /// I/O related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A topic was referenced with an event type that disagrees with the
    /// type it was created with.
    #[error("Type mismatch on topic '{topic}': registered as {registered}, requested as {requested}")]
    TypeMismatch {
        topic: String,
        registered: &'static str,
        requested: &'static str,
    },

    /// `get_ro` on a topic that has never been published to.
    /// Callers that tolerate an empty topic use `get_ro_nullable` instead.
    #[error("No event has been published to topic '{0}'")]
    NoEvent(String),

    /// Phonebook lookup for a service kind nobody registered.
    #[error("Service '{0}' is not registered in the phonebook")]
    NotRegistered(&'static str),

    /// Phonebook registration of a service kind that is already present.
    #[error("Service '{0}' is already registered in the phonebook")]
    AlreadyRegistered(&'static str),

    /// Phonebook registration after the registration phase ended.
    #[error("Phonebook is sealed; cannot register service '{0}'")]
    RegistrySealed(&'static str),

    /// Enqueue attempted on a subscription whose worker is not running.
    #[error("Subscription worker for '{account}' on topic '{topic}' is not running")]
    WorkerNotRunning { account: String, topic: String },

    /// Subscription queue over its configured capacity under the `assert`
    /// overflow policy.
    #[error("Subscription queue full for '{account}' on topic '{topic}'")]
    QueueFull { account: String, topic: String },

    /// Stop-time drain accounting disagreed with the enqueue/dequeue
    /// counters. Signals an internal ordering bug.
    #[error("Drain failure on topic '{topic}': expected {expected} queued events, drained {drained}")]
    DrainFailure {
        topic: String,
        expected: u64,
        drained: u64,
    },

    /// Operation on a switchboard or topic that has been stopped.
    #[error("Stopped: {0}")]
    Stopped(String),

    /// Thread spawn or thread control errors
    #[error("Thread error: {0}")]
    Thread(String),

    /// Plugin loading or lifecycle errors
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Internal errors with source location for debugging.
    /// Use the `parallax_internal!()` macro to create these.
    #[error("Internal error: {message} (at {file}:{line})")]
    Internal {
        message: String,
        file: &'static str,
        line: u32,
    },
}

/// Create an internal error with automatic file/line capture.
///
/// ```rust,ignore
/// return Err(parallax_internal!("unexpected worker state: {:?}", state));
/// ```
#[macro_export]
macro_rules! parallax_internal {
    ($($arg:tt)*) => {
        $crate::error::ParallaxError::Internal {
            message: format!($($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Convenience type alias for Results using ParallaxError.
pub type ParallaxResult<T> = std::result::Result<T, ParallaxError>;

impl From<toml::de::Error> for ParallaxError {
    fn from(err: toml::de::Error) -> Self {
        ParallaxError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<serde_json::Error> for ParallaxError {
    fn from(err: serde_json::Error) -> Self {
        ParallaxError::Internal {
            message: format!("JSON error: {}", err),
            file: file!(),
            line: line!(),
        }
    }
}

impl ParallaxError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        ParallaxError::Config(msg.into())
    }

    /// Create a thread error
    pub fn thread<S: Into<String>>(msg: S) -> Self {
        ParallaxError::Thread(msg.into())
    }

    /// Create a plugin error
    pub fn plugin<S: Into<String>>(msg: S) -> Self {
        ParallaxError::Plugin(msg.into())
    }

    /// Create a stopped error
    pub fn stopped<S: Into<String>>(msg: S) -> Self {
        ParallaxError::Stopped(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_message_names_both_types() {
        let err = ParallaxError::TypeMismatch {
            topic: "imu".into(),
            registered: "ImuSample",
            requested: "CameraFrame",
        };
        let msg = err.to_string();
        assert!(msg.contains("imu"));
        assert!(msg.contains("ImuSample"));
        assert!(msg.contains("CameraFrame"));
    }

    #[test]
    fn test_internal_macro_captures_location() {
        let err = parallax_internal!("bad state {}", 3);
        match err {
            ParallaxError::Internal { message, file, line } => {
                assert_eq!(message, "bad state 3");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("expected Internal, got {:?}", other),
        }
    }
}
