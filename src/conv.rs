//! Conversion utilities

use chrono::{DateTime, Utc};

/// Environment variable that pins the writer timestamp, for reproducible
/// output
pub(crate) const TIMESTAMP_ENV: &str = "KEYTAB_TIMESTAMP";

/// Convert an on-wire 32-bit timestamp to a [`DateTime<Utc>`]
pub(crate) fn ts_to_dt(ts: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.into(), 0)
}

/// Convert a [`DateTime<Utc>`] to an on-wire timestamp, truncating to 32 bits
pub(crate) fn dt_to_ts(dt: DateTime<Utc>) -> u32 {
    dt.timestamp() as u32
}

/// Timestamp newly built entries carry: the pinned value from
/// `KEYTAB_TIMESTAMP` if set, otherwise the current wall time
pub(crate) fn default_timestamp() -> u32 {
    if let Ok(pinned) = std::env::var(TIMESTAMP_ENV) {
        if let Ok(ts) = pinned.parse::<u32>() {
            return ts;
        }
        log::warn!("ignoring unparseable {TIMESTAMP_ENV}={pinned:?}");
    }
    dt_to_ts(Utc::now())
}
