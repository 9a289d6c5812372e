use chrono::{Duration, NaiveDate, Utc};

/// Week buckets are elastic polling periods, not calendar weeks: a new
/// bucket opens on the first observation at least 7 days after the current
/// anchor, and gaps longer than 7 days never create intermediate weeks.
pub fn assign_week(last: Option<(i32, NaiveDate)>, today: NaiveDate) -> (i32, NaiveDate) {
    match last {
        None => (1, today),
        Some((last_week, last_start)) => {
            let elapsed_days = (today - last_start).num_days();
            if elapsed_days >= 7 {
                (last_week + 1, today)
            } else {
                (last_week, last_start)
            }
        }
    }
}

/// Snapshot and feature rows older than this many days are purged at the
/// start of each ingestion run.
pub const RETENTION_DAYS: i64 = 30;

pub fn retention_cutoff(today: NaiveDate) -> NaiveDate {
    today - Duration::days(RETENTION_DAYS)
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}
