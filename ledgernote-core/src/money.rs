//! One formatter for every amount written out, so CSV, HTML and charts
//! always show the same digits.

use rust_decimal::{Decimal, RoundingStrategy};

/// Render an amount with exactly two decimal places (half away from zero).
pub fn format_amount(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded)
}

/// Empty string for a missing value.
pub fn format_optional_amount(value: Option<Decimal>) -> String {
    value.map(format_amount).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pads_and_rounds() {
        assert_eq!(format_amount(Decimal::new(45, 1)), "4.50");
        assert_eq!(format_amount(Decimal::new(2000, 0)), "2000.00");
        assert_eq!(format_amount(Decimal::new(12345, 3)), "12.35");
        assert_eq!(format_amount(Decimal::new(-199550, 2)), "-1995.50");
    }

    #[test]
    fn test_missing_value_is_empty() {
        assert_eq!(format_optional_amount(None), "");
        assert_eq!(format_optional_amount(Some(Decimal::ONE)), "1.00");
    }
}
