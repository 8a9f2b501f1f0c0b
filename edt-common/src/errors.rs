//! Error catalog for the dispatch subsystem.
//!
//! Steady-state errors (`BadInput`, `Timeout`, `Contention`) are handled
//! locally by the worker or ingress loop and never propagate; only
//! `Infrastructural` failures are meant to bubble up to `main` via `anyhow`.

use thiserror::Error;

/// A steady-state error raised anywhere in the dispatch subsystem.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed or unvalidatable request: dropped with a log line, never fatal.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Allocation / table-full / task-spawn failure: aborts the one affected
    /// emergency, never the process.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// Reachability or absolute deadline exceeded: terminal `TIMEOUT`.
    #[error("emergency {0} timed out: {1}")]
    Timeout(u64, String),

    /// Recoverable lock contention or arbitration denial: caller retries.
    #[error("contention: {0}")]
    Contention(String),

    /// Startup-only failure (bus bind, log file open, config parse): fatal.
    #[error("infrastructural failure: {0}")]
    Infrastructural(#[source] anyhow::Error),
}

impl DispatchError {
    pub fn infrastructural(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        DispatchError::Infrastructural(source.into().context(context.into()))
    }
}

/// Errors parsing a single configuration file, kept separate from
/// [`DispatchError`] since they carry file/line context useful at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as TOML: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("{path}: rescuer type '{name}' is referenced but not declared in the rescuer catalog")]
    UnknownRescuerType { path: String, name: String },

    #[error("{path}: too many rescuer types ({count}), limit is {limit}")]
    TooManyRescuerTypes {
        path: String,
        count: usize,
        limit: usize,
    },

    #[error("{path}: too many digital twins ({count}), limit is {limit}")]
    TooManyTwins {
        path: String,
        count: usize,
        limit: usize,
    },
}
