//! Operator-facing diagnostics
//!
//! Session builders never format or route log output themselves, they
//! report through a [`Diagnostics`] implementation. [`TracingDiagnostics`]
//! forwards to `tracing`, [`MemoryDiagnostics`] keeps events around for
//! whoever needs to inspect them afterwards.

use std::error::Error as _;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use tracing::level_filters::LevelFilter;

use super::config::TlsError;
use super::session::Role;

/// Sink for the events emitted while building sessions
pub trait Diagnostics: Send + Sync {
    /// Progress notices
    fn debug(&self, role: Role, message: &str);

    /// Non-fatal anomalies, such as a certificate outside its validity window
    fn warning(&self, role: Role, message: &str);

    /// A session build failed; `tag` names the build that failed
    fn failure(&self, tag: &'static str, error: &TlsError);
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn debug(&self, role: Role, message: &str) {
        tracing::debug!(role = role.log_prefix(), "{message}");
    }

    fn warning(&self, role: Role, message: &str) {
        tracing::warn!(role = role.log_prefix(), "{}: {message}", role.log_prefix());
    }

    fn failure(&self, tag: &'static str, error: &TlsError) {
        let mut detail = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        tracing::error!(tag, "{tag}: {detail}");
    }
}

/// Severity of a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warning,
    Failure,
}

/// One recorded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub severity: Severity,
    pub text: String,
}

/// Records events in memory
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    events: Mutex<Vec<Event>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, severity: Severity, text: String) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Event { severity, text });
    }

    /// Everything recorded so far, oldest first
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn texts(&self, severity: Severity) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|event| event.severity == severity)
            .map(|event| event.text)
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.texts(Severity::Warning)
    }

    pub fn failures(&self) -> Vec<String> {
        self.texts(Severity::Failure)
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Diagnostics for MemoryDiagnostics {
    fn debug(&self, role: Role, message: &str) {
        self.push(Severity::Debug, format!("{}: {message}", role.log_prefix()));
    }

    fn warning(&self, role: Role, message: &str) {
        self.push(Severity::Warning, format!("{}: {message}", role.log_prefix()));
    }

    fn failure(&self, tag: &'static str, error: &TlsError) {
        self.push(Severity::Failure, format!("{tag}: {error}"));
    }
}

/// Install a `tracing` subscriber writing to stderr.
///
/// The level comes from `LOG_LEVEL`, defaulting to `TRACE` in debug builds
/// and `INFO` otherwise. Fails if a global subscriber is already set.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    });

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
}
