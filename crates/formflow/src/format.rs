//! Display formatting for calculated values
//!
//! Calculation fields store a raw [`Value`]; what the form shows is produced
//! here from the field's [`FormatOptions`].

use chrono::{TimeZone, Utc};
use formflow_core::Value;
use formflow_formula::functions::date::to_timestamp_millis;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// How a calculated value is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    /// Plain number
    Number,
    /// Money amount; `$` prefix and 2 decimals unless configured otherwise
    Currency,
    /// Percentage; the value is shown as is with a `%` suffix (not multiplied by 100)
    Percentage,
    /// Date (`YYYY-MM-DD`) from an ISO date/time or epoch milliseconds
    Date,
    /// Numbers as numbers, everything else as text
    #[default]
    Auto,
}

/// Format policy of a calculation field
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatOptions {
    pub format_type: FormatType,
    /// Decimal places; `None` keeps the value's own precision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Group the integer part in thousands with `,`
    pub thousands_separator: bool,
}

impl FormatOptions {
    pub fn new(format_type: FormatType) -> Self {
        Self {
            format_type,
            ..Self::default()
        }
    }

    /// Currency with the default `$` prefix and 2 decimals
    pub fn currency() -> Self {
        Self::new(FormatType::Currency)
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_thousands_separator(mut self) -> Self {
        self.thousands_separator = true;
        self
    }

    fn effective_precision(&self) -> Option<u32> {
        match (self.format_type, self.precision) {
            (_, Some(p)) => Some(p),
            (FormatType::Currency, None) => Some(2),
            _ => None,
        }
    }

    fn effective_prefix(&self) -> &str {
        match (self.format_type, &self.prefix) {
            (_, Some(p)) => p,
            (FormatType::Currency, None) => "$",
            _ => "",
        }
    }

    fn effective_suffix(&self) -> &str {
        match (self.format_type, &self.suffix) {
            (_, Some(s)) => s,
            (FormatType::Percentage, None) => "%",
            _ => "",
        }
    }
}

/// Render a value for display.
///
/// Null renders as empty text. Values that cannot be read as the configured
/// type are shown as plain text without prefix or suffix.
pub fn format_value(value: &Value, options: &FormatOptions) -> String {
    if value.is_null() {
        return String::new();
    }

    let body = match options.format_type {
        FormatType::Date => match format_date(value) {
            Some(date) => date,
            None => return value.to_text(),
        },
        FormatType::Auto => match value {
            Value::Number(n) => format_number(*n, options),
            other => other.to_text(),
        },
        FormatType::Number | FormatType::Currency | FormatType::Percentage => {
            match value.as_numeric() {
                Some(n) => format_number(n, options),
                None => return value.to_text(),
            }
        }
    };

    // Keep the sign in front of a currency symbol: -$5.00
    let (sign, body) = match body.strip_prefix('-') {
        Some(rest) if !options.effective_prefix().is_empty() => ("-", rest.to_string()),
        _ => ("", body),
    };

    format!(
        "{}{}{}{}",
        sign,
        options.effective_prefix(),
        body,
        options.effective_suffix()
    )
}

fn format_number(n: f64, options: &FormatOptions) -> String {
    let text = match (options.effective_precision(), Decimal::from_f64(n)) {
        (Some(precision), Some(decimal)) => {
            let mut rounded =
                decimal.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
            rounded.rescale(precision);
            rounded.to_string()
        }
        _ => Value::Number(n).to_text(),
    };

    if options.thousands_separator {
        group_thousands(&text)
    } else {
        text
    }
}

/// Insert `,` every three digits of the integer part
fn group_thousands(text: &str) -> String {
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (int_part, frac_part) = match unsigned.find('.') {
        Some(dot) => unsigned.split_at(dot),
        None => (unsigned, ""),
    };
    if !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return text.to_string();
    }

    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}{}{}", sign, grouped, frac_part)
}

fn format_date(value: &Value) -> Option<String> {
    let millis = to_timestamp_millis(value).ok()?;
    let instant = Utc.timestamp_millis_opt(millis).single()?;
    Some(instant.format("%Y-%m-%d").to_string())
}
