//! Reduced cron expressions.
//!
//! Only `"<minute> <hour> * * *"` is understood: a daily occurrence at a
//! fixed UTC time. Day-of-month, month and weekday fields must be `*`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::warn;

use crate::error::RotationError;

/// A daily time of day parsed from a reduced cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    minute: u32,
    hour: u32,
}

impl CronSchedule {
    /// Creates a schedule at `hour:minute` UTC.
    pub fn new(minute: u32, hour: u32) -> Result<Self, RotationError> {
        if minute > 59 || hour > 23 {
            return Err(RotationError::InvalidPolicy(format!(
                "cron time {hour:02}:{minute:02} out of range"
            )));
        }
        Ok(Self { minute, hour })
    }

    /// Next occurrence strictly after `now`: today if still ahead, else tomorrow.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN);
        let today = now.date_naive().and_time(time).and_utc();
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

impl FromStr for CronSchedule {
    type Err = RotationError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let invalid = || RotationError::InvalidPolicy(format!("unsupported cron expression '{expr}'"));

        if fields.len() != 5 || fields[2..].iter().any(|f| *f != "*") {
            return Err(invalid());
        }
        let minute = fields[0].parse().map_err(|_| invalid())?;
        let hour = fields[1].parse().map_err(|_| invalid())?;
        Self::new(minute, hour)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} * * *", self.minute, self.hour)
    }
}

/// Next occurrence of `expr` after `now`.
///
/// Malformed expressions log a warning and fall back to `now + 1 day`.
pub fn next_occurrence(expr: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    match expr.parse::<CronSchedule>() {
        Ok(schedule) => schedule.next_after(now),
        Err(e) => {
            warn!(cron = expr, error = %e, "Falling back to daily rotation");
            now + Duration::days(1)
        },
    }
}
