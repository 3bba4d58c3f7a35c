use chrono::Utc;

/// Milliseconds since the Unix epoch, the timestamp unit of every persisted record
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;
