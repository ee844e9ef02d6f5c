//! Decimal scale normalization
//!
//! The engine stores every DECIMAL at one fixed scale. Comparisons bring
//! both operands to that scale first, so `1.5` and `1.500000000000` agree.
//!
//! A [`Decimal`] holds at most [`EXACT_DIGITS`] significant digits, fewer
//! than the engine's [`MAX_PRECISION`]. Text is parsed with
//! [`parse_exact`], which refuses any value it would have to round.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Fractional digits kept by the engine for every DECIMAL value
pub const DEFAULT_SCALE: u32 = 12;

/// Total digits the engine accepts for a DECIMAL value
pub const MAX_PRECISION: u32 = 38;

/// Significant digits a [`Decimal`] represents without rounding
pub const EXACT_DIGITS: u32 = 28;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecimalError {
    #[error("invalid decimal literal {0:?}")]
    Invalid(String),

    /// More significant digits than [`EXACT_DIGITS`]
    #[error("decimal {0} cannot be held without rounding")]
    Inexact(String),
}

/// Rounding applied when a value carries more than [`DEFAULT_SCALE`] digits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoundingMode {
    /// Round half away from zero (the engine default)
    #[default]
    HalfUp,
    /// Round half toward zero
    HalfDown,
    /// Banker's rounding
    HalfEven,
    /// Away from zero
    Up,
    /// Toward zero (truncate)
    Down,
    /// Toward positive infinity
    Ceiling,
    /// Toward negative infinity
    Floor,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfDown => RoundingStrategy::MidpointTowardZero,
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingMode::Up => RoundingStrategy::AwayFromZero,
            RoundingMode::Down => RoundingStrategy::ToZero,
            RoundingMode::Ceiling => RoundingStrategy::ToPositiveInfinity,
            RoundingMode::Floor => RoundingStrategy::ToNegativeInfinity,
        }
    }
}

impl FromStr for RoundingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HALF_UP" => Ok(RoundingMode::HalfUp),
            "HALF_DOWN" => Ok(RoundingMode::HalfDown),
            "HALF_EVEN" => Ok(RoundingMode::HalfEven),
            "UP" => Ok(RoundingMode::Up),
            "DOWN" => Ok(RoundingMode::Down),
            "CEILING" => Ok(RoundingMode::Ceiling),
            "FLOOR" => Ok(RoundingMode::Floor),
            other => Err(format!("unknown rounding mode: {}", other)),
        }
    }
}

/// Round (or pad) a decimal to the engine's default scale
pub fn normalize(value: Decimal, mode: RoundingMode) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(DEFAULT_SCALE, mode.strategy());
    rounded.rescale(DEFAULT_SCALE);
    rounded
}

/// Digits of a plain decimal literal without sign noise, leading integer
/// zeros or trailing fraction zeros; `None` if it is not a plain literal
fn canonical(text: &str) -> Option<String> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let int = int.trim_start_matches('0');
    let frac = frac.trim_end_matches('0');
    if int.is_empty() && frac.is_empty() {
        return Some("0".to_string());
    }
    let sign = if negative { "-" } else { "" };
    Some(format!("{}{}.{}", sign, int, frac))
}

/// Parse a plain decimal literal, refusing any value that would round
pub fn parse_exact(text: &str) -> Result<Decimal, DecimalError> {
    let wanted = canonical(text).ok_or_else(|| DecimalError::Invalid(text.to_string()))?;
    let inexact = || DecimalError::Inexact(text.trim().to_string());
    let parsed = Decimal::from_str(text.trim().trim_start_matches('+')).map_err(|_| inexact())?;
    if canonical(&parsed.to_string()).as_deref() != Some(wanted.as_str()) {
        return Err(inexact());
    }
    Ok(parsed)
}

/// Parse a decimal literal exactly, then normalize it
pub fn round_decimal_str(text: &str, mode: RoundingMode) -> Result<Decimal, DecimalError> {
    parse_exact(text).map(|d| normalize(d, mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pads_scale() {
        let d = normalize(Decimal::from_str("1.5").unwrap(), RoundingMode::HalfUp);
        assert_eq!(d.scale(), DEFAULT_SCALE);
        assert_eq!(d.to_string(), "1.500000000000");
    }

    #[test]
    fn test_rounding_modes_at_midpoint() {
        let text = "0.0000000000005";
        let up = round_decimal_str(text, RoundingMode::HalfUp).unwrap();
        let down = round_decimal_str(text, RoundingMode::HalfDown).unwrap();
        let even = round_decimal_str(text, RoundingMode::HalfEven).unwrap();
        assert_eq!(up.to_string(), "0.000000000001");
        assert_eq!(down.to_string(), "0.000000000000");
        assert_eq!(even.to_string(), "0.000000000000");

        let neg = round_decimal_str("-9.9999999999995", RoundingMode::Floor).unwrap();
        assert_eq!(neg.to_string(), "-10.000000000000");
    }

    #[test]
    fn test_rounding_is_idempotent() {
        let samples = [
            "9.9999999999999999",
            "-0.00000000000049",
            "123456789.1234567890125",
            "42",
        ];
        let modes = [
            RoundingMode::HalfUp,
            RoundingMode::HalfDown,
            RoundingMode::HalfEven,
            RoundingMode::Up,
            RoundingMode::Down,
            RoundingMode::Ceiling,
            RoundingMode::Floor,
        ];
        for text in samples {
            for mode in modes {
                let once = round_decimal_str(text, mode).unwrap();
                let twice = normalize(once, mode);
                assert_eq!(once, twice, "{} under {:?}", text, mode);
                assert_eq!(once.scale(), twice.scale());
            }
        }
    }

    #[test]
    fn test_parse_exact_keeps_every_digit() {
        let a = parse_exact("1234567890123456.123456789012").unwrap();
        let b = parse_exact("1234567890123456.123456789013").unwrap();
        assert_ne!(normalize(a, RoundingMode::HalfUp), normalize(b, RoundingMode::HalfUp));
        assert_eq!(parse_exact("-000.500").unwrap().to_string(), "-0.500");
        assert_eq!(parse_exact("+7").unwrap(), Decimal::from(7));
        assert!(parse_exact("-0.000").unwrap().is_zero());
    }

    #[test]
    fn test_parse_exact_refuses_wide_values() {
        for text in [
            "99999999999999999999999999.999999999999",
            "1234567890123456789.000000000001",
            "1234567890123456789.000000000002",
            "12345678901234567890123456.123456789012",
        ] {
            assert_eq!(
                parse_exact(text),
                Err(DecimalError::Inexact(text.to_string())),
                "{}",
                text
            );
        }
        assert!(matches!(
            round_decimal_str("99999999999999999999999999.999999999999", RoundingMode::HalfUp),
            Err(DecimalError::Inexact(_))
        ));
    }

    #[test]
    fn test_parse_exact_rejects_garbage() {
        for text in ["", "-", ".", "1.2.3", "1e5", "abc"] {
            assert!(matches!(parse_exact(text), Err(DecimalError::Invalid(_))), "{:?}", text);
        }
    }

    #[test]
    fn test_rounding_mode_from_str() {
        assert_eq!("half_even".parse::<RoundingMode>(), Ok(RoundingMode::HalfEven));
        assert!("sideways".parse::<RoundingMode>().is_err());
    }
}
