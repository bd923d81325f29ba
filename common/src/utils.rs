use chrono::{Duration, NaiveDateTime, Utc};

/// The current time as stored in the database.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub fn secs_to_human(duration: i64) -> String {
    let secs = duration % 60;
    let mins = duration / 60;
    let hours = mins / 60;
    let mins = mins % 60;

    let mut out = Vec::new();
    if hours > 0 {
        out.push(format!("{:2}h", hours));
    }
    if mins > 0 || hours > 0 {
        out.push(format!("{:2}m", mins));
    }
    out.push(format!("{:2}s", secs));

    out.join(" ")
}

/// Format a duration for humans, negative durations are clamped to zero.
pub fn duration_to_human(duration: Duration) -> String {
    secs_to_human(duration.num_seconds().max(0))
}
