//! Date/time functions
//!
//! Instants travel through formulas as ISO-8601 text in UTC: `NOW()` yields
//! `2024-05-01T09:30:00.000Z` and `TODAY()` yields `2024-05-01`. Both sort
//! correctly as text, so `[Due] < TODAY()` works on ISO date fields.

use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use formflow_core::Value;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// NOW() - evaluation instant
pub fn fn_now(_args: &[Value], ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Text(
        ctx.now.to_rfc3339_opts(SecondsFormat::Millis, true),
    ))
}

/// TODAY() - start of the evaluation day
pub fn fn_today(_args: &[Value], ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Text(ctx.now.date_naive().format("%Y-%m-%d").to_string()))
}

/// DATEDIFF(date1, date2, [unit]) - absolute difference.
///
/// Units are `days`, `hours`, `minutes` or `seconds` (whole units, truncated);
/// without a unit the raw millisecond delta is returned.
pub fn fn_datediff(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let start = to_timestamp_millis(&args[0])?;
    let end = to_timestamp_millis(&args[1])?;
    // Any two i64 instants are at most u64::MAX apart
    let delta = end.abs_diff(start);

    let unit = args
        .get(2)
        .map(|v| v.to_text().trim().to_lowercase())
        .unwrap_or_default();
    let divisor = match unit.trim_end_matches('s') {
        "day" => MS_PER_DAY,
        "hour" => MS_PER_HOUR,
        "minute" => MS_PER_MINUTE,
        "second" => MS_PER_SECOND,
        _ => 1,
    };

    Ok(Value::Number((delta / divisor) as f64))
}

/// Interpret a value as an instant, in milliseconds since the Unix epoch.
///
/// Numbers (and numeric text) are taken as epoch milliseconds; text may be
/// RFC 3339, `YYYY-MM-DDTHH:MM:SS` (UTC) or a plain `YYYY-MM-DD` date (UTC midnight).
pub fn to_timestamp_millis(value: &Value) -> FormulaResult<i64> {
    if let Some(n) = value.as_numeric() {
        return Ok(n as i64);
    }

    let text = value.to_text();
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight).timestamp_millis());
        }
    }

    Err(FormulaError::Evaluation(format!(
        "Cannot interpret '{}' as a date",
        text
    )))
}
