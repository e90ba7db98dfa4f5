use chrono::{DateTime, TimeZone, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Provider timestamps are unix seconds encoded as strings.
pub fn from_unix_str(raw: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = raw.trim().parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}
