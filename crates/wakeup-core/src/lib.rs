//! # wakeup-core
//!
//! Resilient connection establishment for Azure SQL databases that may be
//! auto-paused.
//!
//! A paused serverless database rejects logins with error 40613 while it
//! resumes. This crate keeps connecting until the database answers a
//! liveness probe, retrying only that error and failing fast on everything
//! else.
//!
//! ## Components
//!
//! - [`dsn`]: connection-string assembly, dialect detection and redaction
//! - [`throttle`]: recognises the paused/resuming condition
//! - [`connector`]: connect-and-verify with a bounded pool
//! - [`retry`]: attempt loop with backoff, jitter, deadline and cancellation
//!
//! ## Example
//!
//! ```rust,ignore
//! use tokio_util::sync::CancellationToken;
//! use wakeup_core::{ConnectionParameters, RetryPolicy};
//!
//! let params = ConnectionParameters::new()
//!     .server("myserver.database.windows.net")
//!     .database("orders")
//!     .credentials("app", "secret");
//!
//! let handle = wakeup_core::wake(&params, &RetryPolicy::default(), &CancellationToken::new()).await?;
//! handle.close();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connector;
pub mod dsn;
pub mod error;
pub mod params;
pub mod policy;
pub mod retry;
pub mod throttle;

pub use connector::{Connect, ConnectionHandle, SqlServerConnector};
pub use dsn::{ConnectionString, Dialect};
pub use error::{CancelReason, ConnectError, Error, Result};
pub use params::{ConnectionParameters, ConnectionSource};
pub use policy::{Backoff, RetryPolicy};
pub use retry::{AttemptOutcome, RetryState};
pub use throttle::is_throttling;

use tokio_util::sync::CancellationToken;

/// Connect to the database described by `params`, waking it if paused.
///
/// Uses [`SqlServerConnector`]. See [`wake_with`].
pub async fn wake(
    params: &ConnectionParameters,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<ConnectionHandle> {
    wake_with(&SqlServerConnector::new(), params, policy, cancel).await
}

/// Connect through `connector`, retrying per `policy`.
///
/// Empty parameters fail with [`Error::Configuration`] before any attempt.
/// Each attempt is allowed up to the overall deadline to verify; the
/// scheduler's deadline race bounds it further.
pub async fn wake_with<C: Connect>(
    connector: &C,
    params: &ConnectionParameters,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<C::Handle> {
    policy.validate()?;

    let conn = dsn::build(params, policy.overall_deadline);
    if conn.is_unconfigured() {
        return Err(Error::Configuration(
            "no connection string provided via DSN or connection parameters".into(),
        ));
    }

    tracing::debug!(
        dsn = %conn,
        dialect = ?conn.dialect(),
        max_attempts = policy.max_attempts,
        deadline_s = policy.overall_deadline.as_secs(),
        worst_case_backoff_s = retry::worst_case_backoff(policy).as_secs(),
        "resolved connection target"
    );

    let verify_timeout = policy.overall_deadline;
    let conn = &conn;
    retry::retry(policy, cancel, move |_attempt| {
        connector.connect_and_verify(conn, verify_timeout)
    })
    .await
}
