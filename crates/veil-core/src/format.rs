//! Value formatter
//!
//! Turns decrypted 18-decimal fixed-point integers into display strings and
//! owns the redacted placeholder. Precision is resolved per [`FieldKind`] once,
//! when the session is built, so a field type never changes precision mid-session.

use crate::ciphertext::FieldKind;
use crate::config::DisplayConfig;
use crate::decryption::DecryptedValue;
use std::collections::BTreeMap;

/// Implicit decimal scale of every plaintext integer.
pub const VALUE_DECIMALS: u32 = 18;

/// Fraction digits used for generic amounts.
pub const DEFAULT_PRECISION: u32 = 4;

/// Canonical redacted placeholder.
pub const DEFAULT_PLACEHOLDER: &str = "••••";

const SCALE: u128 = 10u128.pow(VALUE_DECIMALS);

/// Formats decrypted values with a fixed precision per field kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFormatter {
    placeholder: String,
    default_precision: u32,
    precision: BTreeMap<FieldKind, u32>,
}

impl Default for ValueFormatter {
    fn default() -> Self {
        Self {
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            default_precision: DEFAULT_PRECISION,
            precision: BTreeMap::new(),
        }
    }
}

impl ValueFormatter {
    /// Build a formatter from display configuration.
    ///
    /// Precisions above 18 are clamped to 18.
    pub fn from_config(config: &DisplayConfig) -> Self {
        Self {
            placeholder: config.placeholder.clone(),
            default_precision: config.default_precision.min(VALUE_DECIMALS),
            precision: config
                .precision
                .iter()
                .map(|(kind, digits)| (*kind, (*digits).min(VALUE_DECIMALS)))
                .collect(),
        }
    }

    /// The redacted placeholder shown for any field without a decrypted value.
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Fraction digits used for a field kind
    pub fn precision_for(&self, kind: FieldKind) -> u32 {
        self.precision
            .get(&kind)
            .copied()
            .unwrap_or(self.default_precision)
    }

    /// Format a decrypted value for a field kind
    pub fn format_value(&self, value: &DecryptedValue, kind: FieldKind) -> String {
        match value {
            DecryptedValue::Integer(raw) => format_fixed(*raw, self.precision_for(kind)),
            DecryptedValue::Boolean(flag) => flag.to_string(),
            DecryptedValue::Unavailable => self.placeholder.clone(),
        }
    }

    /// Display string for an optional value: the placeholder when absent
    pub fn display(&self, value: Option<&DecryptedValue>, kind: FieldKind) -> String {
        value.map_or_else(
            || self.placeholder.clone(),
            |value| self.format_value(value, kind),
        )
    }
}

/// Format a raw 18-decimal integer with `precision` fraction digits.
///
/// Rounds half up at the last displayed digit.
pub fn format_fixed(raw: u128, precision: u32) -> String {
    let precision = precision.min(VALUE_DECIMALS);
    let mut whole = raw / SCALE;
    let remainder = raw % SCALE;

    if precision == 0 {
        if remainder >= SCALE / 2 {
            whole += 1;
        }
        return whole.to_string();
    }

    let unit = 10u128.pow(VALUE_DECIMALS - precision);
    let mut fraction = remainder / unit;
    if remainder % unit >= unit / 2 {
        fraction += 1;
    }
    if fraction == 10u128.pow(precision) {
        whole += 1;
        fraction = 0;
    }

    format!("{whole}.{fraction:0width$}", width = precision as usize)
}

/// Parse a formatted string back into a raw 18-decimal integer.
///
/// Returns `None` for placeholders, negative numbers, more than 18 fraction
/// digits or values that overflow `u128`.
pub fn parse_display(text: &str) -> Option<u128> {
    let text = text.trim();
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };
    if whole.is_empty() || fraction.len() > VALUE_DECIMALS as usize {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: u128 = whole.parse().ok()?;
    let fraction_raw: u128 = if fraction.is_empty() {
        0
    } else {
        let digits: u128 = fraction.parse().ok()?;
        digits * 10u128.pow(VALUE_DECIMALS - fraction.len() as u32)
    };

    whole.checked_mul(SCALE)?.checked_add(fraction_raw)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_half_token_at_four_digits() {
        assert_eq!(format_fixed(500_000_000_000_000_000, 4), "0.5000");
    }

    #[test]
    fn test_zero_and_whole_values() {
        assert_eq!(format_fixed(0, 4), "0.0000");
        assert_eq!(format_fixed(3 * SCALE, 4), "3.0000");
        assert_eq!(format_fixed(3 * SCALE, 0), "3");
    }

    #[test]
    fn test_rounding_half_up_at_last_digit() {
        // 1.23455 -> 1.2346, 1.23444 -> 1.2344
        assert_eq!(format_fixed(1_234_550_000_000_000_000, 4), "1.2346");
        assert_eq!(format_fixed(1_234_440_000_000_000_000, 4), "1.2344");
    }

    #[test]
    fn test_rounding_carries_into_whole_part() {
        assert_eq!(format_fixed(999_990_000_000_000_000, 4), "1.0000");
        assert_eq!(format_fixed(SCALE / 2, 0), "1");
    }

    #[test]
    fn test_small_denomination_precision() {
        assert_eq!(format_fixed(12_345_678_900, 8), "0.00000001");
        assert_eq!(format_fixed(1, 18), "0.000000000000000001");
    }

    #[test]
    fn test_largest_value_does_not_overflow() {
        let text = format_fixed(u128::MAX, 4);
        assert!(text.starts_with("340282366920938463463"));
    }

    #[test]
    fn test_parse_display() {
        assert_eq!(parse_display("0.5000"), Some(500_000_000_000_000_000));
        assert_eq!(parse_display("12"), Some(12 * SCALE));
        assert_eq!(parse_display(DEFAULT_PLACEHOLDER), None);
        assert_eq!(parse_display("-1.0"), None);
        assert_eq!(parse_display(".5"), None);
        assert_eq!(parse_display("0.0000000000000000001"), None);
    }

    #[test]
    fn test_precision_per_kind_is_stable() {
        let mut config = DisplayConfig::default();
        config.precision.insert(FieldKind::TotalAssets, 8);
        config.precision.insert(FieldKind::Shares, 40);
        let formatter = ValueFormatter::from_config(&config);

        assert_eq!(formatter.precision_for(FieldKind::Balance), DEFAULT_PRECISION);
        assert_eq!(formatter.precision_for(FieldKind::TotalAssets), 8);
        assert_eq!(formatter.precision_for(FieldKind::Shares), VALUE_DECIMALS);

        let value = DecryptedValue::Integer(SCALE);
        assert_eq!(formatter.format_value(&value, FieldKind::Balance), "1.0000");
        assert_eq!(formatter.format_value(&value, FieldKind::TotalAssets), "1.00000000");
    }

    #[test]
    fn test_absent_and_unavailable_show_placeholder() {
        let formatter = ValueFormatter::default();
        assert_eq!(formatter.display(None, FieldKind::Balance), DEFAULT_PLACEHOLDER);
        assert_eq!(
            formatter.display(Some(&DecryptedValue::Unavailable), FieldKind::Balance),
            DEFAULT_PLACEHOLDER
        );
        assert_eq!(
            formatter.display(Some(&DecryptedValue::Boolean(true)), FieldKind::Balance),
            "true"
        );
    }

    proptest! {
        #[test]
        fn prop_format_round_trip_within_last_digit(raw in 0u128..=u128::MAX / 2, precision in 0u32..=18) {
            let parsed = parse_display(&format_fixed(raw, precision)).unwrap_or(u128::MAX);
            let unit = 10u128.pow(VALUE_DECIMALS - precision);
            let drift = parsed.abs_diff(raw);
            prop_assert!(drift <= unit / 2, "raw={} parsed={} unit={}", raw, parsed, unit);
        }
    }
}
