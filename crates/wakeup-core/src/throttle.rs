//! Detection of the "database is paused / resuming" condition.
//!
//! Azure SQL serverless databases reject logins with error 40613
//! ("Database '…' on server '…' is not currently available") while they
//! resume from auto-pause. That error is the only one worth retrying.

use crate::error::ConnectError;

/// Server error number for "database not currently available".
pub const THROTTLING_ERROR_CODE: u32 = 40613;

const THROTTLING_MARKER: &str = "40613";

/// Whether `failure` is the throttling condition.
///
/// Server error tokens are checked by number. Failures that only survive as
/// text (wrapped by the pool, re-surfaced as I/O errors) fall back to a
/// search for the marker in their description.
#[must_use]
pub fn is_throttling(failure: Option<&ConnectError>) -> bool {
    let Some(failure) = failure else {
        return false;
    };

    match failure.server_code() {
        Some(code) => code == THROTTLING_ERROR_CODE,
        None => is_throttling_message(&failure.to_string()),
    }
}

/// Whether a textual failure description carries the throttling marker.
#[must_use]
pub fn is_throttling_message(message: &str) -> bool {
    message.contains(THROTTLING_MARKER)
}
