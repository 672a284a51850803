//! TTL Normalization Module
//!
//! Converts the accepted TTL representations into a single seconds-based
//! contract: a non-negative number of seconds, or "no expiry".
//!
//! Bare integers are always relative seconds. Absolute instants are only
//! expressed through date strings, [`Ttl::At`] or intervals, so an integer's
//! magnitude never changes its meaning.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::{CacheError, Result};

// == TTL Input ==
/// A TTL as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Ttl {
    /// No TTL given: the client's default applies
    #[default]
    Default,
    /// Relative seconds; negative values are rejected
    Seconds(i64),
    /// Relative expression (`"+1 week"`) or absolute date (`"2030-01-01"`)
    Expr(String),
    /// Absolute expiry instant
    At(DateTime<Utc>),
    /// Structured calendar duration
    Interval(TtlInterval),
}

impl Ttl {
    // == Dynamic Input ==
    /// Interprets a JSON-typed TTL.
    ///
    /// Booleans, arrays and objects are never TTLs. Floats are truncated to whole
    /// seconds unless `strict` is set, in which case they are rejected too.
    pub fn from_value(value: &Value, strict: bool) -> Result<Self> {
        match value {
            Value::Null => Ok(Ttl::Default),
            Value::String(text) => Ok(Ttl::Expr(text.clone())),
            Value::Number(number) => {
                if let Some(seconds) = number.as_i64() {
                    Ok(Ttl::Seconds(seconds))
                } else if let Some(seconds) = number.as_u64() {
                    Ok(Ttl::Seconds(i64::try_from(seconds).unwrap_or(i64::MAX)))
                } else if strict {
                    Err(CacheError::TypeMismatch(
                        "TTL must be an integer when strict typing is enabled".to_string(),
                    ))
                } else {
                    let seconds = number.as_f64().unwrap_or_default();
                    Ok(Ttl::Seconds(seconds.trunc() as i64))
                }
            }
            Value::Bool(_) => Err(CacheError::TypeMismatch("TTL cannot be a boolean".to_string())),
            Value::Array(_) => Err(CacheError::TypeMismatch("TTL cannot be an array".to_string())),
            Value::Object(_) => {
                Err(CacheError::TypeMismatch("TTL cannot be an object".to_string()))
            }
        }
    }
}

impl From<i64> for Ttl {
    fn from(seconds: i64) -> Self {
        Ttl::Seconds(seconds)
    }
}

impl From<i32> for Ttl {
    fn from(seconds: i32) -> Self {
        Ttl::Seconds(i64::from(seconds))
    }
}

impl From<u64> for Ttl {
    fn from(seconds: u64) -> Self {
        Ttl::Seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
    }
}

impl From<u32> for Ttl {
    fn from(seconds: u32) -> Self {
        Ttl::Seconds(i64::from(seconds))
    }
}

impl From<&str> for Ttl {
    fn from(expr: &str) -> Self {
        Ttl::Expr(expr.to_string())
    }
}

impl From<String> for Ttl {
    fn from(expr: String) -> Self {
        Ttl::Expr(expr)
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::from(duration.as_secs())
    }
}

impl From<chrono::Duration> for Ttl {
    fn from(duration: chrono::Duration) -> Self {
        Ttl::Seconds(duration.num_seconds())
    }
}

impl From<DateTime<Utc>> for Ttl {
    fn from(at: DateTime<Utc>) -> Self {
        Ttl::At(at)
    }
}

impl From<TtlInterval> for Ttl {
    fn from(interval: TtlInterval) -> Self {
        Ttl::Interval(interval)
    }
}

impl<T: Into<Ttl>> From<Option<T>> for Ttl {
    fn from(ttl: Option<T>) -> Self {
        ttl.map(Into::into).unwrap_or_default()
    }
}

// == TTL Interval ==
/// Calendar duration with signed components, resolved against "now".
///
/// `invert` negates the whole interval, mirroring ISO-8601's leading `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TtlInterval {
    pub invert: bool,
    pub years: i64,
    pub months: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl TtlInterval {
    /// Interval of whole days.
    pub fn days(days: i64) -> Self {
        Self { days, ..Self::default() }
    }

    /// Interval of whole hours.
    pub fn hours(hours: i64) -> Self {
        Self { hours, ..Self::default() }
    }

    /// Resolves the interval to an instant relative to `now`.
    /// Returns None if the result falls outside the representable range.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let sign = if self.invert { -1 } else { 1 };

        let months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let shifted = add_months(now, months.checked_mul(sign)?)?;

        let seconds = self
            .days
            .checked_mul(24)?
            .checked_add(self.hours)?
            .checked_mul(60)?
            .checked_add(self.minutes)?
            .checked_mul(60)?
            .checked_add(self.seconds)?
            .checked_mul(sign)?;
        shifted.checked_add_signed(chrono::Duration::try_seconds(seconds)?)
    }
}

impl FromStr for TtlInterval {
    type Err = CacheError;

    /// Parses an ISO-8601 duration such as `P3DT4H`, `P1Y2M`, `P2W` or `-PT90S`.
    fn from_str(text: &str) -> Result<Self> {
        let invalid = || CacheError::InvalidTtl(format!("'{}' is not an ISO-8601 duration", text));

        let trimmed = text.trim();
        let (invert, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let rest = rest
            .strip_prefix('P')
            .or_else(|| rest.strip_prefix('p'))
            .ok_or_else(invalid)?;
        if rest.is_empty() {
            return Err(invalid());
        }

        let mut interval = TtlInterval { invert, ..TtlInterval::default() };
        let mut in_time = false;
        let mut components = 0;
        let mut digits = String::new();

        for c in rest.chars() {
            let c = c.to_ascii_uppercase();
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            if c == 'T' {
                if in_time || !digits.is_empty() {
                    return Err(invalid());
                }
                in_time = true;
                continue;
            }
            let amount: i64 = digits.parse().map_err(|_| invalid())?;
            digits.clear();
            components += 1;
            match (in_time, c) {
                (false, 'Y') => interval.years = amount,
                (false, 'M') => interval.months = amount,
                (false, 'W') => interval.days = amount.checked_mul(7).ok_or_else(invalid)?,
                (false, 'D') => interval.days = amount,
                (true, 'H') => interval.hours = amount,
                (true, 'M') => interval.minutes = amount,
                (true, 'S') => interval.seconds = amount,
                _ => return Err(invalid()),
            }
        }

        if !digits.is_empty() || components == 0 {
            return Err(invalid());
        }
        Ok(interval)
    }
}

// == Normalized TTL ==
/// Normalized TTL handed to the store layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlSeconds {
    /// Keep until evicted or deleted
    NoExpiry,
    /// Expire after this many seconds; zero means "the store's own default"
    Seconds(u64),
}

impl fmt::Display for TtlSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtlSeconds::NoExpiry => write!(f, "no expiry"),
            TtlSeconds::Seconds(seconds) => write!(f, "{}s", seconds),
        }
    }
}

// == TTL Normalizer ==
/// Normalizes TTL inputs, applying a configurable default.
#[derive(Debug, Clone)]
pub struct TtlNormalizer {
    default: TtlSeconds,
}

impl Default for TtlNormalizer {
    fn default() -> Self {
        Self {
            default: TtlSeconds::NoExpiry,
        }
    }
}

impl TtlNormalizer {
    // == Constructor ==
    /// Creates a normalizer whose default is "no expiry".
    pub fn new() -> Self {
        Self::default()
    }

    /// The TTL applied to writes that pass [`Ttl::Default`].
    pub fn default_ttl(&self) -> TtlSeconds {
        self.default
    }

    // == Set Default ==
    /// Sets the default TTL. The value is normalized once, now.
    pub fn set_default(&mut self, ttl: &Ttl) -> Result<()> {
        if matches!(ttl, Ttl::Default) {
            return Err(CacheError::TypeMismatch(
                "default TTL must be a concrete value".to_string(),
            ));
        }
        self.default = self.normalize(ttl)?;
        Ok(())
    }

    // == Normalize ==
    /// Normalizes against the current time.
    pub fn normalize(&self, ttl: &Ttl) -> Result<TtlSeconds> {
        self.normalize_at(ttl, Utc::now())
    }

    /// Normalizes against a caller-supplied clock.
    pub fn normalize_at(&self, ttl: &Ttl, now: DateTime<Utc>) -> Result<TtlSeconds> {
        match ttl {
            Ttl::Default => Ok(self.default),
            Ttl::Seconds(seconds) => u64::try_from(*seconds)
                .map(TtlSeconds::Seconds)
                .map_err(|_| CacheError::InvalidTtl(format!("TTL of {}s is negative", seconds))),
            Ttl::Expr(expr) => {
                let target = parse_expr(expr, now)?;
                seconds_until(target, now, expr)
            }
            Ttl::At(at) => seconds_until(*at, now, &at.to_rfc3339()),
            Ttl::Interval(interval) => {
                let target = interval.resolve(now).ok_or_else(|| {
                    CacheError::InvalidTtl("interval is out of range".to_string())
                })?;
                seconds_until(target, now, "interval")
            }
        }
    }
}

/// Whole seconds from `now` to `target`, rounded up so that an instant a
/// fraction of a second ahead still expires instead of becoming `Seconds(0)`.
fn seconds_until(target: DateTime<Utc>, now: DateTime<Utc>, source: &str) -> Result<TtlSeconds> {
    if target < now {
        return Err(CacheError::InvalidTtl(format!("'{}' resolves to the past", source)));
    }
    let millis = u64::try_from(target.signed_duration_since(now).num_milliseconds())
        .map_err(|_| CacheError::InvalidTtl(format!("'{}' is out of range", source)))?;
    Ok(TtlSeconds::Seconds(millis.div_ceil(1000)))
}

fn add_months(at: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        at.checked_add_months(magnitude)
    } else {
        at.checked_sub_months(magnitude)
    }
}

// == Expression Parsing ==
fn parse_expr(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed = expr.trim();
    parse_relative(trimmed, now)
        .or_else(|| parse_absolute(trimmed))
        .ok_or_else(|| CacheError::InvalidTtl(format!("cannot parse '{}' as a date", expr)))
}

/// Relative phrases: `now`, `tomorrow`, `yesterday`, and sums of `[+-]N unit`
/// terms (`+1 week`, `2 days 4 hours`, `3days`, `1 hour ago`).
fn parse_relative(expr: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lowered = expr.to_ascii_lowercase();
    let mut tokens = lowered.split_whitespace().peekable();
    tokens.peek()?;

    let mut months: i64 = 0;
    let mut seconds: i64 = 0;

    while let Some(token) = tokens.next() {
        match token {
            "now" => continue,
            "tomorrow" => {
                seconds = seconds.checked_add(86_400)?;
                continue;
            }
            "yesterday" => {
                seconds = seconds.checked_sub(86_400)?;
                continue;
            }
            _ => {}
        }

        let split = token
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '+' || *c == '-'))))
            .map(|(i, _)| i)
            .unwrap_or(token.len());
        let (number, unit) = token.split_at(split);
        let mut amount: i64 = number.parse().ok()?;
        let unit = if unit.is_empty() { tokens.next()? } else { unit };

        if tokens.peek() == Some(&"ago") {
            tokens.next();
            amount = amount.checked_neg()?;
        }

        // Calendar units shift the date; everything else is a fixed span.
        match unit {
            "month" | "months" => months = months.checked_add(amount)?,
            "year" | "years" | "y" => months = months.checked_add(amount.checked_mul(12)?)?,
            "fortnight" | "fortnights" => {
                seconds = seconds.checked_add(amount.checked_mul(1_209_600)?)?
            }
            _ => seconds = seconds.checked_add(span_seconds(amount, unit)?)?,
        }
    }

    add_months(now, months)?.checked_add_signed(chrono::Duration::try_seconds(seconds)?)
}

/// Signed seconds of `amount` fixed-length `unit`s (`90 minutes`, `3days`).
fn span_seconds(amount: i64, unit: &str) -> Option<i64> {
    let span = humantime::parse_duration(&format!("{}{}", amount.unsigned_abs(), unit)).ok()?;
    let seconds = i64::try_from(span.as_secs()).ok()?;
    if amount < 0 {
        seconds.checked_neg()
    } else {
        Some(seconds)
    }
}

const NAIVE_DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Absolute dates; values without an offset are taken as UTC.
fn parse_absolute(expr: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(expr) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = DateTime::parse_from_rfc2822(expr) {
        return Some(at.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(expr, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(expr, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
