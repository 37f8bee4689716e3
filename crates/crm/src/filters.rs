//! Custom Askama template filters.
//!
//! Filters receive values through `Display`, so dates are recognised by the
//! leading `YYYY-MM-DD HH:MM:SS` that chrono prints for both `NaiveDate` and
//! `DateTime<Utc>`.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use merch_crm_core::format_money;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Formats an amount with two decimals and thousands separators.
///
/// The currency symbol is appended by the template from branding.
///
/// Usage in templates: `{{ order.total_amount|money }} {{ branding.currency_symbol }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn money(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(format_amount(&value.to_string()))
}

/// Formats a date as `DD.MM.YYYY`.
///
/// Usage in templates: `{{ client.created_at|date }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn date(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let text = value.to_string();
    Ok(parse_leading(&text).map_or(text, |dt| dt.format("%d.%m.%Y").to_string()))
}

/// Formats a timestamp as `DD.MM.YYYY HH:MM`.
///
/// Usage in templates: `{{ entry.created_at|datetime }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn datetime(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let text = value.to_string();
    Ok(parse_leading(&text).map_or(text, |dt| dt.format("%d.%m.%Y %H:%M").to_string()))
}

fn format_amount(text: &str) -> String {
    text.trim().parse::<Decimal>().map_or_else(
        |_| text.to_owned(),
        |amount| format_money(amount, "").trim_end().to_owned(),
    )
}

fn parse_leading(text: &str) -> Option<NaiveDateTime> {
    if let Some(prefix) = text.get(..19)
        && let Ok(dt) = NaiveDateTime::parse_from_str(prefix, "%Y-%m-%d %H:%M:%S")
    {
        return Some(dt);
    }
    text.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount("12345.5"), "12 345.50");
        assert_eq!(format_amount("-10"), "-10.00");
        assert_eq!(format_amount("n/a"), "n/a");
    }

    #[test]
    fn test_parse_leading_datetime() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 0).single();
        let text = ts.map(|t| t.to_string()).unwrap_or_default();
        let parsed = parse_leading(&text).map(|dt| dt.format("%d.%m.%Y %H:%M").to_string());
        assert_eq!(parsed.as_deref(), Some("09.03.2026 14:05"));
    }

    #[test]
    fn test_parse_leading_date() {
        let date = NaiveDate::from_ymd_opt(2026, 12, 31).map(|d| d.to_string());
        let parsed = date
            .as_deref()
            .and_then(parse_leading)
            .map(|dt| dt.format("%d.%m.%Y").to_string());
        assert_eq!(parsed.as_deref(), Some("31.12.2026"));
        assert!(parse_leading("soon").is_none());
    }
}
