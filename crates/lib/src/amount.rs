use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const AMOUNT_WIDTH: usize = 10;
/// Largest amount, in minor units, that fits in [`AMOUNT_WIDTH`] digits.
pub const MAX_MINOR_UNITS: u64 = 9_999_999_999;
pub const AMOUNT_SENTINEL: &str = "0000000000";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount `{0}` is not a decimal number")]
    NotNumeric(String),
    #[error("Amount `{0}` is negative")]
    Negative(String),
    #[error("Amount `{0}` does not fit in 10 digits of minor units")]
    TooLarge(String),
}

/// Parses a decimal amount into whole minor units, truncating anything past the
/// second fraction digit.
pub fn parse_minor_units(text: &str) -> Result<u64, AmountError> {
    let trimmed = text.trim();
    let value =
        Decimal::from_str(trimmed).map_err(|_| AmountError::NotNumeric(text.to_string()))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AmountError::Negative(text.to_string()));
    }

    (value * Decimal::ONE_HUNDRED)
        .trunc()
        .to_u64()
        .filter(|units| *units <= MAX_MINOR_UNITS)
        .ok_or_else(|| AmountError::TooLarge(text.to_string()))
}

/// An amount ready for the wire. A failed parse still renders as
/// [`AMOUNT_SENTINEL`] but keeps the error so callers can tell it apart from a
/// genuine zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAmount {
    minor_units: u64,
    error: Option<AmountError>,
}

impl EncodedAmount {
    pub fn from_minor_units(minor_units: u64) -> Result<Self, AmountError> {
        if minor_units > MAX_MINOR_UNITS {
            return Err(AmountError::TooLarge(minor_units.to_string()));
        }
        Ok(Self {
            minor_units,
            error: None,
        })
    }

    pub fn is_trusted(&self) -> bool {
        self.error.is_none()
    }

    /// Minor units, or `None` when the source text could not be encoded.
    pub fn minor_units(&self) -> Option<u64> {
        self.is_trusted().then_some(self.minor_units)
    }

    pub fn error(&self) -> Option<&AmountError> {
        self.error.as_ref()
    }
}

impl fmt::Display for EncodedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.minor_units, width = AMOUNT_WIDTH)
    }
}

pub fn encode_amount(text: &str) -> EncodedAmount {
    match parse_minor_units(text) {
        Ok(minor_units) => EncodedAmount {
            minor_units,
            error: None,
        },
        Err(error) => EncodedAmount {
            minor_units: 0,
            error: Some(error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_whole_and_fractional_amounts() {
        assert_eq!(encode_amount("321.00").to_string(), "0000032100");
        assert_eq!(encode_amount("275.50").to_string(), "0000027550");
        assert_eq!(encode_amount("1096.85").to_string(), "0000109685");
        assert_eq!(encode_amount("102.30").to_string(), "0000010230");
    }

    #[test]
    fn zero_is_trusted() {
        let zero = encode_amount("0.00");
        assert_eq!(zero.to_string(), AMOUNT_SENTINEL);
        assert!(zero.is_trusted());
        assert_eq!(zero.minor_units(), Some(0));
    }

    #[test]
    fn garbage_renders_as_sentinel_but_is_untrusted() {
        let garbage = encode_amount("abc");
        assert_eq!(garbage.to_string(), encode_amount("0.00").to_string());
        assert!(!garbage.is_trusted());
        assert_eq!(garbage.minor_units(), None);
        assert_eq!(
            garbage.error(),
            Some(&AmountError::NotNumeric("abc".to_string()))
        );
    }

    #[test]
    fn truncates_past_two_fraction_digits() {
        assert_eq!(parse_minor_units("1.239"), Ok(123));
        assert_eq!(parse_minor_units(" 7 "), Ok(700));
    }

    #[test]
    fn rejects_negative_and_oversized_amounts() {
        assert!(matches!(
            parse_minor_units("-1.00"),
            Err(AmountError::Negative(_))
        ));
        assert_eq!(parse_minor_units("99999999.99"), Ok(MAX_MINOR_UNITS));
        assert!(matches!(
            parse_minor_units("100000000.00"),
            Err(AmountError::TooLarge(_))
        ));
        assert!(EncodedAmount::from_minor_units(MAX_MINOR_UNITS + 1).is_err());
    }
}
