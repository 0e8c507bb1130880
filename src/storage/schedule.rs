//! Sweep Schedules
//!
//! The sweeper runs on a schedule given as a string in the configuration.
//! Three forms are accepted:
//!
//! | Form | Example | Meaning |
//! |------|---------|---------|
//! | 5-field cron | `*/1 * * * *` | minute hour day-of-month month day-of-week |
//! | 6-field cron | `*/10 * * * * *` | a leading seconds field, then the five above |
//! | fixed interval | `@every 30s` | `ms`, `s`, `m` or `h` units |
//!
//! Cron fields accept `*`, `n`, `a-b`, `*/step`, `a-b/step` and comma lists.
//! Day-of-week runs 0-6 from Sunday (7 is also Sunday). When both day fields are
//! restricted a day matches if either does, as in classic cron. Times are UTC.

use crate::error::CacheError;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on search steps when looking for the next cron match.
/// Each step advances at least one field boundary, so this covers several years.
const MAX_SEARCH_STEPS: usize = 100_000;

/// A set of allowed values for one cron field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
    /// True if the field was written as a bare `*`
    any: bool,
}

impl FieldSet {
    #[inline]
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1 << value) != 0
    }

    /// Parses one cron field whose values lie in `min..=max`.
    fn parse(field: &str, min: u32, max: u32, name: &str) -> Result<Self, String> {
        let mut bits = 0u64;

        for part in field.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step
                        .parse()
                        .map_err(|_| format!("invalid step '{}' in {} field", step, name))?;
                    if step == 0 {
                        return Err(format!("step must be positive in {} field", name));
                    }
                    (range, step)
                }
                None => (part, 1),
            };

            let (start, end) = if range == "*" {
                (min, max)
            } else if let Some((a, b)) = range.split_once('-') {
                (parse_value(a, name)?, parse_value(b, name)?)
            } else {
                let v = parse_value(range, name)?;
                // `5/15` means "from 5 to the end, every 15"
                if step > 1 {
                    (v, max)
                } else {
                    (v, v)
                }
            };

            if start < min || end > max || start > end {
                return Err(format!(
                    "value out of range in {} field: {} (allowed {}-{})",
                    name, range, min, max
                ));
            }

            let mut v = start;
            while v <= end {
                bits |= 1 << v;
                match v.checked_add(step) {
                    Some(next) => v = next,
                    None => break,
                }
            }
        }

        Ok(Self {
            bits,
            any: field == "*",
        })
    }
}

fn parse_value(s: &str, name: &str) -> Result<u32, String> {
    s.parse()
        .map_err(|_| format!("invalid value '{}' in {} field", s, name))
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CronSpec {
    seconds: FieldSet,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
}

impl CronSpec {
    fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();

        let (seconds, rest) = match fields.len() {
            5 => (FieldSet::parse("0", 0, 59, "second")?, &fields[..]),
            6 => (FieldSet::parse(fields[0], 0, 59, "second")?, &fields[1..]),
            n => return Err(format!("expected 5 or 6 fields, found {}", n)),
        };

        let mut days_of_week = FieldSet::parse(rest[4], 0, 7, "day-of-week")?;
        if days_of_week.contains(7) {
            days_of_week.bits |= 1;
        }

        Ok(Self {
            seconds,
            minutes: FieldSet::parse(rest[0], 0, 59, "minute")?,
            hours: FieldSet::parse(rest[1], 0, 23, "hour")?,
            days_of_month: FieldSet::parse(rest[2], 1, 31, "day-of-month")?,
            months: FieldSet::parse(rest[3], 1, 12, "month")?,
            days_of_week,
        })
    }

    fn day_matches(&self, t: &NaiveDateTime) -> bool {
        let dom = self.days_of_month.contains(t.day());
        let dow = self
            .days_of_week
            .contains(t.weekday().num_days_from_sunday());

        match (self.days_of_month.any, self.days_of_week.any) {
            (false, false) => dom || dow,
            _ => dom && dow,
        }
    }

    /// Finds the first matching instant strictly after `after`.
    fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut t = after.with_nanosecond(0)? + TimeDelta::seconds(1);

        for _ in 0..MAX_SEARCH_STEPS {
            if !self.months.contains(t.month()) {
                t = first_of_next_month(&t)?;
                continue;
            }
            if !self.day_matches(&t) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.with_minute(0)?.with_second(0)? + TimeDelta::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t = t.with_second(0)? + TimeDelta::minutes(1);
                continue;
            }
            if !self.seconds.contains(t.second()) {
                t += TimeDelta::seconds(1);
                continue;
            }
            return Some(t);
        }

        None
    }
}

fn first_of_next_month(t: &NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScheduleKind {
    Cron(Box<CronSpec>),
    Every(Duration),
}

/// When the sweeper should run.
///
/// # Example
///
/// ```
/// use cacheflow::storage::Schedule;
/// use std::time::Duration;
///
/// let every_minute: Schedule = "*/1 * * * *".parse().unwrap();
/// assert_eq!(every_minute.to_string(), "*/1 * * * *");
///
/// let fast: Schedule = "@every 250ms".parse().unwrap();
/// assert_eq!(fast.interval(), Some(Duration::from_millis(250)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    source: String,
    kind: ScheduleKind,
}

impl Schedule {
    /// Creates a fixed-interval schedule.
    pub fn every(interval: Duration) -> Self {
        Self {
            source: format!("@every {}ms", interval.as_millis()),
            kind: ScheduleKind::Every(interval),
        }
    }

    /// Returns the fixed interval if this is an `@every` schedule.
    pub fn interval(&self) -> Option<Duration> {
        match self.kind {
            ScheduleKind::Every(d) => Some(d),
            ScheduleKind::Cron(_) => None,
        }
    }

    /// Returns the next run time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.kind {
            ScheduleKind::Every(d) => TimeDelta::from_std(*d)
                .ok()
                .and_then(|d| after.checked_add_signed(d)),
            ScheduleKind::Cron(spec) => spec.next_after(after.naive_utc()).map(|t| t.and_utc()),
        }
    }

    /// Returns how long to wait from `now` until the next run.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Option<Duration> {
        if let ScheduleKind::Every(d) = self.kind {
            return Some(d);
        }
        let next = self.next_after(now)?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

impl FromStr for Schedule {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let source = s.trim();
        let invalid = |reason: String| {
            CacheError::Validation(format!("invalid sweeper schedule '{}': {}", source, reason))
        };

        let kind = match source.strip_prefix("@every") {
            Some(rest) => {
                let interval = parse_interval(rest.trim()).map_err(invalid)?;
                ScheduleKind::Every(interval)
            }
            None => ScheduleKind::Cron(Box::new(CronSpec::parse(source).map_err(invalid)?)),
        };

        Ok(Self {
            source: source.to_string(),
            kind,
        })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in '{}'", s))?;
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid interval '{}'", s))?;

    let too_large = || format!("interval '{}' is too large", s);
    let interval = match unit {
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n.checked_mul(60).ok_or_else(too_large)?),
        "h" => Duration::from_secs(n.checked_mul(3600).ok_or_else(too_large)?),
        other => return Err(format!("unknown unit '{}'", other)),
    };

    if interval.is_zero() {
        return Err("interval must be positive".to_string());
    }
    // next_after must be able to add it to a calendar time
    if TimeDelta::from_std(interval).is_err() {
        return Err(too_large());
    }
    Ok(interval)
}
