//! Wall-clock helpers.

/// Milliseconds since the Unix epoch, as stored in persisted records.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
