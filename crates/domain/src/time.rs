//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for state expirations and notification payloads.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}
