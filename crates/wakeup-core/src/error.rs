//! Error types.
//!
//! Two layers: [`ConnectError`] is the cause of a single failed connection
//! attempt, [`Error`] is the terminal outcome reported to the caller once the
//! retry scheduler has stopped.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Cause of a single failed connection attempt.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// Error reported by the SQL Server driver, including server error tokens.
    #[error(transparent)]
    Driver(#[from] tiberius::error::Error),

    /// Socket-level failure while dialing the server.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection pool could not hand out a connection.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// The liveness probe did not complete in time.
    #[error("liveness probe timed out after {0:?}")]
    TimedOut(Duration),

    /// The connection string could not be turned into a driver configuration.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Failure known only by its textual description.
    #[error("{0}")]
    Message(String),
}

impl ConnectError {
    /// Create a failure from a plain message.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// Numeric server error code, when the failure carries a server error token.
    #[must_use]
    pub fn server_code(&self) -> Option<u32> {
        match self {
            Self::Driver(tiberius::error::Error::Server(token)) => Some(token.code()),
            _ => None,
        }
    }
}

impl From<bb8_tiberius::Error> for ConnectError {
    fn from(err: bb8_tiberius::Error) -> Self {
        match err {
            bb8_tiberius::Error::Tiberius(e) => Self::Driver(e),
            bb8_tiberius::Error::Io(e) => Self::Io(e),
        }
    }
}

impl From<bb8::RunError<bb8_tiberius::Error>> for ConnectError {
    fn from(err: bb8::RunError<bb8_tiberius::Error>) -> Self {
        match err {
            bb8::RunError::User(e) => e.into(),
            bb8::RunError::TimedOut => {
                Self::Pool("timed out waiting for a pooled connection".into())
            }
        }
    }
}

/// Why a retry sequence stopped before reaching a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The overall deadline elapsed.
    Deadline,
    /// The caller's cancellation token fired.
    Signal,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => f.write_str("overall deadline exceeded"),
            Self::Signal => f.write_str("cancelled by caller"),
        }
    }
}

/// Terminal error of a connection-establishment sequence.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No usable connection target was supplied, or the retry policy is invalid.
    ///
    /// Raised before any attempt is made.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A non-throttling failure; no further attempts were made.
    #[error("error connecting to database (attempt {attempt}, {elapsed:.1?} elapsed): {source}")]
    Fatal {
        /// Attempt that failed.
        attempt: u32,
        /// Time since the first attempt started.
        elapsed: Duration,
        /// The failure as reported by the connector.
        source: ConnectError,
    },

    /// Every attempt hit the throttling condition.
    #[error("database still unavailable after {attempts} attempts ({elapsed:.1?} elapsed): {source}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Time since the first attempt started.
        elapsed: Duration,
        /// The last transient failure.
        source: ConnectError,
    },

    /// The deadline or the caller's cancellation fired mid-sequence.
    #[error(
        "connection {reason} after {attempts} attempts ({elapsed:.1?} elapsed){}",
        last_cause(.last)
    )]
    Cancelled {
        /// What stopped the sequence.
        reason: CancelReason,
        /// Number of attempts started.
        attempts: u32,
        /// Time since the first attempt started.
        elapsed: Duration,
        /// The last transient failure seen, if any.
        last: Option<ConnectError>,
    },
}

fn last_cause(last: &Option<ConnectError>) -> String {
    match last {
        Some(e) => format!("; last error: {e}"),
        None => String::new(),
    }
}

impl Error {
    /// Whether this is a configuration error raised before any attempt.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Number of attempts made before the sequence stopped.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Configuration(_) => 0,
            Self::Fatal { attempt, .. } => *attempt,
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
        }
    }
}
