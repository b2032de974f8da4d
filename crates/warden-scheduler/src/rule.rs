use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, Utc, Weekday};
use croner::Cron;

use crate::error::{Result, SchedulerError};

/// When and how often an agent fires.
///
/// Calendar variants (`Daily`, `Weekly`, `Cron`) are evaluated in the
/// process's local time zone; `Interval` is a pure duration anchored at the
/// previous fire, so it never drifts toward wall-clock boundaries.
#[derive(Debug, Clone)]
pub enum ScheduleRule {
    /// Repeat a fixed duration after each fire.
    Interval { every: Duration },

    /// Fire every day at the given local time.
    Daily { hour: u8, minute: u8 },

    /// Fire on a specific weekday at the given local time.
    Weekly {
        weekday: Weekday,
        hour: u8,
        minute: u8,
    },

    /// Fire according to a 5-field cron expression (minute, hour,
    /// day-of-month, month, day-of-week; day fields combine with OR per
    /// cron convention).
    Cron { expr: String, parsed: Cron },
}

impl ScheduleRule {
    pub fn every_seconds(n: u64) -> Self {
        Self::Interval {
            every: Duration::from_secs(n),
        }
    }

    pub fn every_minutes(n: u64) -> Self {
        Self::Interval {
            every: Duration::from_secs(n * 60),
        }
    }

    pub fn every_hours(n: u64) -> Self {
        Self::Interval {
            every: Duration::from_secs(n * 3600),
        }
    }

    /// Every day at `"HH:MM"` local time.
    pub fn daily(time: &str) -> Result<Self> {
        let (hour, minute) = parse_hhmm(time)?;
        Ok(Self::Daily { hour, minute })
    }

    /// Every week on `weekday` at `"HH:MM"` local time.
    pub fn weekly(weekday: Weekday, time: &str) -> Result<Self> {
        let (hour, minute) = parse_hhmm(time)?;
        Ok(Self::Weekly {
            weekday,
            hour,
            minute,
        })
    }

    /// A standard 5-field cron expression. Malformed expressions fail here,
    /// at construction, never at fire time.
    pub fn cron(expr: &str) -> Result<Self> {
        let parsed = Cron::new(expr)
            .parse()
            .map_err(|e| SchedulerError::InvalidSchedule(format!("cron {expr:?}: {e}")))?;
        Ok(Self::Cron {
            expr: expr.to_string(),
            parsed,
        })
    }

    /// Registration-time validation for variants whose constructors cannot
    /// reject bad values (a zero interval would livelock the tick loop).
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Interval { every } if every.is_zero() => Err(SchedulerError::InvalidSchedule(
                "interval must be non-zero".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Compute the next fire instant strictly after `from`.
    ///
    /// `None` means the schedule has no further occurrence (possible only
    /// for cron expressions whose bounded search finds no match, and for a
    /// zero interval, which is rejected at registration anyway).
    pub fn next_fire(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Interval { every } => {
                if every.is_zero() {
                    return None;
                }
                Some(from + chrono::Duration::from_std(*every).ok()?)
            }

            Self::Daily { hour, minute } => {
                let base = from.with_timezone(&Local).date_naive();
                // Today, tomorrow, then one spare day for a DST gap that
                // swallows the target time.
                for d in 0..=2 {
                    let date = base.checked_add_days(Days::new(d))?;
                    if let Some(candidate) = local_instant(date, *hour, *minute) {
                        if candidate > from {
                            return Some(candidate);
                        }
                    }
                }
                None
            }

            Self::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let base = from.with_timezone(&Local).date_naive();
                // Two weeks covers "already fired this week" plus a DST gap
                // on the target day.
                for d in 0..=14 {
                    let date = base.checked_add_days(Days::new(d))?;
                    if date.weekday() != *weekday {
                        continue;
                    }
                    if let Some(candidate) = local_instant(date, *hour, *minute) {
                        if candidate > from {
                            return Some(candidate);
                        }
                    }
                }
                None
            }

            Self::Cron { parsed, .. } => {
                let local = from.with_timezone(&Local);
                let next = parsed.find_next_occurrence(&local, false).ok()?;
                Some(next.with_timezone(&Utc))
            }
        }
    }
}

/// Resolve a local date + HH:MM to an instant. Ambiguous local times (DST
/// fall-back) take the earlier occurrence; nonexistent ones (spring-forward
/// gap) yield `None` and the caller advances a day.
fn local_instant(date: NaiveDate, hour: u8, minute: u8) -> Option<DateTime<Utc>> {
    date.and_hms_opt(u32::from(hour), u32::from(minute), 0)?
        .and_local_timezone(Local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_hhmm(time: &str) -> Result<(u8, u8)> {
    let bad = || SchedulerError::InvalidSchedule(format!("expected HH:MM, got {time:?}"));
    let (h, m) = time.split_once(':').ok_or_else(bad)?;
    let hour: u8 = h.parse().map_err(|_| bad())?;
    let minute: u8 = m.parse().map_err(|_| bad())?;
    if hour > 23 || minute > 59 {
        return Err(bad());
    }
    Ok((hour, minute))
}

impl fmt::Display for ScheduleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval { every } => {
                let secs = every.as_secs();
                if secs == 0 {
                    write!(f, "every {}ms", every.as_millis())
                } else if secs % 3600 == 0 {
                    write!(f, "every {}h", secs / 3600)
                } else if secs % 60 == 0 {
                    write!(f, "every {}m", secs / 60)
                } else {
                    write!(f, "every {secs}s")
                }
            }
            Self::Daily { hour, minute } => write!(f, "every day at {hour:02}:{minute:02}"),
            Self::Weekly {
                weekday,
                hour,
                minute,
            } => write!(f, "every {weekday} at {hour:02}:{minute:02}"),
            Self::Cron { expr, .. } => write!(f, "cron({expr})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn interval_is_exact() {
        let from = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let rule = ScheduleRule::every_seconds(30);
        assert_eq!(
            rule.next_fire(from).unwrap() - from,
            chrono::Duration::seconds(30)
        );

        let rule = ScheduleRule::every_minutes(5);
        assert_eq!(
            rule.next_fire(from).unwrap() - from,
            chrono::Duration::minutes(5)
        );

        let rule = ScheduleRule::every_hours(2);
        assert_eq!(
            rule.next_fire(from).unwrap() - from,
            chrono::Duration::hours(2)
        );
    }

    #[test]
    fn interval_is_anchored_not_aligned() {
        // 10:00:17 + 1m is 10:01:17, not 10:01:00
        let from = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 17).unwrap();
        let next = ScheduleRule::every_minutes(1).next_fire(from).unwrap();
        assert_eq!(next, from + chrono::Duration::minutes(1));
    }

    #[test]
    fn zero_interval_never_fires_and_fails_validation() {
        let rule = ScheduleRule::every_seconds(0);
        assert!(rule.next_fire(Utc::now()).is_none());
        assert!(matches!(
            rule.validate(),
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn daily_fires_at_requested_local_time() {
        let rule = ScheduleRule::daily("12:34").unwrap();
        let from = Utc::now();
        let next = rule.next_fire(from).unwrap();
        assert!(next > from);
        let local = next.with_timezone(&Local);
        assert_eq!((local.hour(), local.minute()), (12, 34));
        // today or tomorrow, DST shift margin included
        assert!(next - from <= chrono::Duration::hours(25));
    }

    #[test]
    fn daily_advances_a_full_day() {
        let rule = ScheduleRule::daily("06:00").unwrap();
        let first = rule.next_fire(Utc::now()).unwrap();
        let second = rule.next_fire(first).unwrap();
        assert!(second > first);
        let gap = second - first;
        assert!(gap >= chrono::Duration::hours(23) && gap <= chrono::Duration::hours(25));
    }

    #[test]
    fn weekly_lands_on_requested_weekday() {
        let rule = ScheduleRule::weekly(Weekday::Mon, "09:00").unwrap();
        let from = Utc::now();
        let next = rule.next_fire(from).unwrap();
        assert!(next > from);
        let local = next.with_timezone(&Local);
        assert_eq!(local.weekday(), Weekday::Mon);
        assert_eq!((local.hour(), local.minute()), (9, 0));
        assert!(next - from <= chrono::Duration::days(7) + chrono::Duration::hours(2));
    }

    #[test]
    fn weekly_wraps_a_full_week() {
        let rule = ScheduleRule::weekly(Weekday::Fri, "17:30").unwrap();
        let first = rule.next_fire(Utc::now()).unwrap();
        let second = rule.next_fire(first).unwrap();
        let gap = second - first;
        assert!(
            gap >= chrono::Duration::days(7) - chrono::Duration::hours(2)
                && gap <= chrono::Duration::days(7) + chrono::Duration::hours(2)
        );
    }

    #[test]
    fn cron_next_satisfies_expression() {
        let rule = ScheduleRule::cron("*/5 * * * *").unwrap();
        let from = Utc::now();
        let next = rule.next_fire(from).unwrap();
        assert!(next > from);
        let local = next.with_timezone(&Local);
        assert_eq!(local.minute() % 5, 0);
        assert_eq!(local.second(), 0);
        assert!(next - from <= chrono::Duration::minutes(5));
    }

    #[test]
    fn cron_daily_time() {
        let rule = ScheduleRule::cron("30 14 * * *").unwrap();
        let next = rule.next_fire(Utc::now()).unwrap();
        let local = next.with_timezone(&Local);
        assert_eq!((local.hour(), local.minute()), (14, 30));
    }

    #[test]
    fn cron_is_strictly_monotonic() {
        let rule = ScheduleRule::cron("* * * * *").unwrap();
        let mut t = Utc::now();
        for _ in 0..5 {
            let next = rule.next_fire(t).unwrap();
            assert!(next > t);
            t = next;
        }
    }

    #[test]
    fn malformed_cron_rejected_at_construction() {
        for expr in ["not a cron", "* * * *", "99 * * * *", "* 25 * * *"] {
            assert!(
                matches!(
                    ScheduleRule::cron(expr),
                    Err(SchedulerError::InvalidSchedule(_))
                ),
                "expected rejection for {expr:?}"
            );
        }
    }

    #[test]
    fn bad_time_strings_rejected() {
        assert!(ScheduleRule::daily("3pm").is_err());
        assert!(ScheduleRule::daily("25:00").is_err());
        assert!(ScheduleRule::daily("12:60").is_err());
        assert!(ScheduleRule::weekly(Weekday::Tue, "12").is_err());
    }

    #[test]
    fn display_forms() {
        assert_eq!(ScheduleRule::every_seconds(30).to_string(), "every 30s");
        assert_eq!(ScheduleRule::every_minutes(5).to_string(), "every 5m");
        assert_eq!(ScheduleRule::every_hours(2).to_string(), "every 2h");
        assert_eq!(
            ScheduleRule::daily("03:00").unwrap().to_string(),
            "every day at 03:00"
        );
        assert_eq!(
            ScheduleRule::weekly(Weekday::Mon, "09:00").unwrap().to_string(),
            "every Mon at 09:00"
        );
        assert_eq!(
            ScheduleRule::cron("*/5 * * * *").unwrap().to_string(),
            "cron(*/5 * * * *)"
        );
    }
}
