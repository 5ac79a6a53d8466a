//! Five-field cron expressions, evaluated minute by minute.
//!
//! Fields are minute (0-59), hour (0-23), day of month (1-31), month (1-12)
//! and weekday (0-6, Monday = 0). An instant matches only when every field
//! matches; day of month and weekday are ANDed like the other fields, unlike
//! POSIX cron which ORs them when both are restricted.

use std::{collections::BTreeSet, fmt, str::FromStr};

use {
    chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc},
    chrono_tz::Tz,
};

use crate::{Error, Result};

/// How far ahead [`next_execution`] scans before returning the horizon itself.
pub const SCAN_HORIZON_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u8,
    max: u8,
}

const FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        name: "minute",
        min: 0,
        max: 59,
    },
    FieldSpec {
        name: "hour",
        min: 0,
        max: 23,
    },
    FieldSpec {
        name: "day",
        min: 1,
        max: 31,
    },
    FieldSpec {
        name: "month",
        min: 1,
        max: 12,
    },
    FieldSpec {
        name: "weekday",
        min: 0,
        max: 6,
    },
];

// ── CronFieldSet ────────────────────────────────────────────────────────────

/// The five parsed integer sets of a cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronFieldSet {
    pub minutes: BTreeSet<u8>,
    pub hours: BTreeSet<u8>,
    pub days: BTreeSet<u8>,
    pub months: BTreeSet<u8>,
    pub weekdays: BTreeSet<u8>,
}

impl CronFieldSet {
    /// Parse `minute hour day month weekday`.
    ///
    /// Each field accepts `*`, single values, `a-b` ranges, `*/n` and `a-b/n`
    /// steps, `a/n` (from `a` to the field maximum), and comma-separated
    /// unions of those.
    pub fn parse(expr: &str) -> Result<Self> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != FIELDS.len() {
            return Err(Error::invalid_cron(
                expr,
                format!("expected 5 fields, got {}", parts.len()),
            ));
        }

        let mut sets = Vec::with_capacity(FIELDS.len());
        for (raw, spec) in parts.iter().zip(FIELDS) {
            sets.push(parse_field(raw, spec).map_err(|reason| Error::invalid_cron(expr, reason))?);
        }
        let [minutes, hours, days, months, weekdays]: [BTreeSet<u8>; 5] = sets
            .try_into()
            .map_err(|_| Error::invalid_cron(expr, "expected 5 fields"))?;

        Ok(Self {
            minutes,
            hours,
            days,
            months,
            weekdays,
        })
    }

    /// Whether `at` (in its own timezone) is a member of all five sets.
    pub fn matches<Z: TimeZone>(&self, at: &DateTime<Z>) -> bool {
        self.minutes.contains(&(at.minute() as u8))
            && self.hours.contains(&(at.hour() as u8))
            && self.day_matches(at)
    }

    fn day_matches<Z: TimeZone>(&self, at: &DateTime<Z>) -> bool {
        self.days.contains(&(at.day() as u8))
            && self.months.contains(&(at.month() as u8))
            && self
                .weekdays
                .contains(&(at.weekday().num_days_from_monday() as u8))
    }
}

impl FromStr for CronFieldSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_field(raw: &str, spec: FieldSpec) -> std::result::Result<BTreeSet<u8>, String> {
    let mut values = BTreeSet::new();

    for item in raw.split(',') {
        if item.is_empty() {
            return Err(format!("empty list item in {} field", spec.name));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u8 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}' in {} field", spec.name))?;
                if step == 0 {
                    return Err(format!("step must be > 0 in {} field", spec.name));
                }
                (range, Some(step))
            },
            None => (item, None),
        };

        let (lo, hi) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, spec)?, parse_value(b, spec)?)
        } else {
            let v = parse_value(range, spec)?;
            if step.is_some() {
                (v, spec.max)
            } else {
                (v, v)
            }
        };

        if lo > hi {
            return Err(format!("range {lo}-{hi} is inverted in {} field", spec.name));
        }
        values.extend((lo..=hi).step_by(usize::from(step.unwrap_or(1))));
    }

    Ok(values)
}

fn parse_value(raw: &str, spec: FieldSpec) -> std::result::Result<u8, String> {
    let v: u8 = raw
        .parse()
        .map_err(|_| format!("invalid value '{raw}' in {} field", spec.name))?;
    if v < spec.min || v > spec.max {
        return Err(format!(
            "{v} out of range {}-{} in {} field",
            spec.min, spec.max, spec.name
        ));
    }
    Ok(v)
}

// ── Next execution ──────────────────────────────────────────────────────────

/// First instant after `now` whose wall-clock time in `tz` matches `fields`.
///
/// The scan starts at the minute following `now` (seconds truncated) and stops
/// at `now + 365 days`; if nothing matches by then, the horizon is returned.
pub fn next_execution(fields: &CronFieldSet, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let horizon = now + Duration::days(SCAN_HORIZON_DAYS);
    let secs = now.timestamp();
    let Some(mut candidate) = DateTime::from_timestamp(secs - secs.rem_euclid(60) + 60, 0) else {
        return horizon;
    };

    while candidate <= horizon {
        let local = candidate.with_timezone(&tz);
        if !fields.day_matches(&local) || !fields.hours.contains(&(local.hour() as u8)) {
            // Skip the rest of this wall-clock hour.
            candidate += Duration::minutes(60 - i64::from(local.minute()));
            continue;
        }
        if fields.minutes.contains(&(local.minute() as u8)) {
            return candidate;
        }
        candidate += Duration::minutes(1);
    }

    horizon
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| Error::unknown_timezone(name))
}

// ── CronExpr ────────────────────────────────────────────────────────────────

/// A parsed expression bound to the timezone it is evaluated in.
#[derive(Debug, Clone)]
pub struct CronExpr {
    source: String,
    fields: CronFieldSet,
    tz: Tz,
}

impl CronExpr {
    /// Parse `expr`, evaluating it in `tz` (UTC when `None`).
    pub fn parse(expr: &str, tz: Option<&str>) -> Result<Self> {
        let tz = match tz {
            Some(name) => parse_timezone(name)?,
            None => Tz::UTC,
        };
        Self::with_timezone(expr, tz)
    }

    pub fn with_timezone(expr: &str, tz: Tz) -> Result<Self> {
        Ok(Self {
            source: expr.trim().to_string(),
            fields: CronFieldSet::parse(expr)?,
            tz,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn fields(&self) -> &CronFieldSet {
        &self.fields
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_execution(&self.fields, now, self.tz)
    }

    /// [`Self::next_after`] on epoch milliseconds.
    pub fn next_after_ms(&self, now_ms: u64) -> u64 {
        let now = DateTime::from_timestamp_millis(now_ms as i64).unwrap_or(DateTime::UNIX_EPOCH);
        self.next_after(now).timestamp_millis().max(0) as u64
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source, self.tz)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse::<DateTime<Utc>>().unwrap()
    }

    fn set(values: &[u8]) -> BTreeSet<u8> {
        values.iter().copied().collect()
    }

    #[rstest]
    #[case("2024-03-10T10:00:00Z", "2024-03-10T10:01:00Z")]
    #[case("2024-03-10T10:00:59.999Z", "2024-03-10T10:01:00Z")]
    #[case("2024-03-10T23:59:30Z", "2024-03-11T00:00:00Z")]
    #[case("2024-12-31T23:59:01Z", "2025-01-01T00:00:00Z")]
    fn all_wildcards_fire_at_next_minute(#[case] now: &str, #[case] expected: &str) {
        let fields = CronFieldSet::parse("* * * * *").unwrap();
        assert_eq!(next_execution(&fields, utc(now), Tz::UTC), utc(expected));
    }

    #[rstest]
    #[case("*/15", &[0, 15, 30, 45])]
    #[case("1-10/3", &[1, 4, 7, 10])]
    #[case("5/20", &[5, 25, 45])]
    #[case("1,2,5-6", &[1, 2, 5, 6])]
    #[case("59", &[59])]
    fn minute_field_forms(#[case] field: &str, #[case] expected: &[u8]) {
        let fields = CronFieldSet::parse(&format!("{field} * * * *")).unwrap();
        assert_eq!(fields.minutes, set(expected));
    }

    #[test]
    fn wildcard_expands_to_full_ranges() {
        let fields = CronFieldSet::parse("* * * * *").unwrap();
        assert_eq!(fields.minutes.len(), 60);
        assert_eq!(fields.hours.len(), 24);
        assert_eq!(fields.days, (1..=31).collect::<BTreeSet<u8>>());
        assert_eq!(fields.months, (1..=12).collect::<BTreeSet<u8>>());
        assert_eq!(fields.weekdays, (0..=6).collect::<BTreeSet<u8>>());
    }

    #[rstest]
    #[case("* * * *")]
    #[case("* * * * * *")]
    #[case("60 * * * *")]
    #[case("* 24 * * *")]
    #[case("* * 0 * *")]
    #[case("* * * 13 *")]
    #[case("* * * * 7")]
    #[case("*/0 * * * *")]
    #[case("10-5 * * * *")]
    #[case("a * * * *")]
    #[case("1,,2 * * * *")]
    #[case("")]
    fn malformed_expressions_rejected(#[case] expr: &str) {
        let err = CronFieldSet::parse(expr).unwrap_err();
        assert!(err.is_validation(), "{err}");
    }

    #[test]
    fn weekday_zero_is_monday() {
        // 2024-01-07 is a Sunday.
        let fields = CronFieldSet::parse("0 9 * * 0").unwrap();
        let next = next_execution(&fields, utc("2024-01-07T12:00:00Z"), Tz::UTC);
        assert_eq!(next, utc("2024-01-08T09:00:00Z"));
    }

    #[test]
    fn day_and_weekday_are_anded() {
        // Friday the 13th only: first one in 2024 is September.
        let fields = CronFieldSet::parse("0 0 13 * 4").unwrap();
        let next = next_execution(&fields, utc("2024-01-01T00:00:00Z"), Tz::UTC);
        assert_eq!(next, utc("2024-09-13T00:00:00Z"));
    }

    #[test]
    fn impossible_expression_returns_horizon() {
        let fields = CronFieldSet::parse("0 0 31 2 *").unwrap();
        let now = utc("2024-01-01T00:00:00Z");
        assert_eq!(
            next_execution(&fields, now, Tz::UTC),
            now + Duration::days(SCAN_HORIZON_DAYS)
        );
    }

    #[test]
    fn hourly_expression_skips_to_matching_hour() {
        let fields = CronFieldSet::parse("30 14 * * *").unwrap();
        let next = next_execution(&fields, utc("2024-05-01T14:30:00Z"), Tz::UTC);
        assert_eq!(next, utc("2024-05-02T14:30:00Z"));
    }

    #[test]
    fn evaluates_in_named_timezone() {
        let expr = CronExpr::parse("0 9 * * *", Some("Asia/Tehran")).unwrap();
        // 03:30 local, next 09:00 local is 05:30 UTC.
        let next = expr.next_after(utc("2024-06-01T00:00:00Z"));
        assert_eq!(next, utc("2024-06-01T05:30:00Z"));
    }

    #[test]
    fn unknown_timezone_rejected() {
        let err = CronExpr::parse("* * * * *", Some("Nowhere/City")).unwrap_err();
        assert!(matches!(err, Error::UnknownTimezone { .. }));
    }

    #[test]
    fn next_after_ms_matches_datetime_variant() {
        let expr = CronExpr::parse("*/5 * * * *", None).unwrap();
        let now = utc("2024-03-10T10:02:10Z");
        assert_eq!(
            expr.next_after_ms(now.timestamp_millis() as u64),
            utc("2024-03-10T10:05:00Z").timestamp_millis() as u64
        );
    }

    #[test]
    fn matches_checks_every_field() {
        let fields = CronFieldSet::parse("15 8 1 1 *").unwrap();
        assert!(fields.matches(&utc("2024-01-01T08:15:00Z")));
        assert!(!fields.matches(&utc("2024-01-01T08:16:00Z")));
        assert!(!fields.matches(&utc("2024-02-01T08:15:00Z")));
    }
}
