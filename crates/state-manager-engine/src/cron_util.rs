//! Cron fire-time computation (spec.md §6 "Cron expression grammar").
//! Grounded on `original_source/.../tasks/trigger_cron.py`'s use of
//! `croniter` for "next fire strictly after a given instant, in the
//! trigger's own IANA timezone". The standard 5-field expression is widened
//! to the `cron` crate's 6-field (seconds-first) grammar by prefixing a
//! constant zero-seconds field.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("invalid cron expression '{0}': {1}")]
    InvalidExpression(String, String),
    #[error("unknown IANA timezone '{0}'")]
    InvalidTimezone(String),
    #[error("cron expression '{0}' has no upcoming fire time")]
    NoUpcomingFire(String),
}

/// Compute the first fire time strictly after `after`, in `timezone`,
/// returned back in UTC for storage on `DatabaseTrigger::trigger_time`.
pub fn next_fire(expression: &str, timezone: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| CronError::InvalidTimezone(timezone.to_string()))?;

    let schedule = Schedule::from_str(&format!("0 {expression}"))
        .map_err(|e| CronError::InvalidExpression(expression.to_string(), e.to_string()))?;

    let after_local = after.with_timezone(&tz);
    schedule
        .after(&after_local)
        .next()
        .map(|fire| fire.with_timezone(&Utc))
        .ok_or_else(|| CronError::NoUpcomingFire(expression.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_five_minutes_lands_on_a_boundary() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap();
        let fire = next_fire("*/5 * * * *", "UTC", after).unwrap();
        assert_eq!(fire, Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn fire_is_strictly_after_the_given_instant() {
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let fire = next_fire("*/5 * * * *", "UTC", after).unwrap();
        assert!(fire > after);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let after = Utc::now();
        let err = next_fire("* * * * *", "Not/AZone", after).unwrap_err();
        assert!(matches!(err, CronError::InvalidTimezone(_)));
    }

    #[test]
    fn malformed_expression_is_rejected() {
        let after = Utc::now();
        let err = next_fire("not a cron", "UTC", after).unwrap_err();
        assert!(matches!(err, CronError::InvalidExpression(_, _)));
    }
}
