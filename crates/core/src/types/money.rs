//! Decimal money helpers.
//!
//! All amounts are `rust_decimal::Decimal` in the shop currency; rounding is
//! always to kopecks/cents with midpoint-away-from-zero.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round an amount to two decimal places.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount * percent / 100`, rounded.
#[must_use]
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}

/// `part / whole * 100` rounded to one decimal, or zero when `whole` is zero.
#[must_use]
pub fn ratio_percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    (part / whole * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// Format an amount with thousands separators and a currency symbol: `12 345.50 ₽`.
#[must_use]
pub fn format_money(amount: Decimal, symbol: &str) -> String {
    let rounded = round_money(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part} {symbol}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(dec("10.005")), dec("10.01"));
        assert_eq!(round_money(dec("-10.005")), dec("-10.01"));
        assert_eq!(round_money(dec("3")), dec("3"));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(dec("1999"), dec("15")), dec("299.85"));
        assert_eq!(percent_of(dec("100"), dec("0")), Decimal::ZERO);
    }

    #[test]
    fn test_ratio_percent() {
        assert_eq!(ratio_percent(dec("25"), dec("200")), dec("12.5"));
        assert_eq!(ratio_percent(dec("1"), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(dec("0"), "₽"), "0.00 ₽");
        assert_eq!(format_money(dec("999.5"), "₽"), "999.50 ₽");
        assert_eq!(format_money(dec("1234567.891"), "$"), "1 234 567.89 $");
        assert_eq!(format_money(dec("-1500"), "₽"), "-1 500.00 ₽");
    }
}
