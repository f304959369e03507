//! Core-mask parsing.
//!
//! A core mask is ASCII hexadecimal, optionally `0x`-prefixed, interpreted
//! as a 64-bit bitmask where bit `i` selects logical core `i`. Parsing is
//! strict: any trailing non-hex character or overflow is an error. Filtering
//! of offline cores and the master-bit check happen later, at runtime init,
//! with knowledge of the platform.

use std::num::IntErrorKind;

/// Errors from [`parse_core_mask`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaskParseError {
    /// The mask string was empty (or only a `0x` prefix).
    #[error("core mask is empty")]
    Empty,

    /// The mask contained a character outside `[0-9a-fA-F]`.
    #[error("core mask {0:?} contains a non-hex character")]
    InvalidDigit(String),

    /// The mask does not fit in 64 bits.
    #[error("core mask {0:?} overflows 64 bits")]
    Overflow(String),
}

/// Parses a hex core mask into its `u64` bit representation.
///
/// # Errors
///
/// Returns [`MaskParseError`] on an empty string, a non-hex character, or a
/// value wider than 64 bits.
///
/// # Examples
///
/// ```
/// use spindle_core::parse_core_mask;
///
/// assert_eq!(parse_core_mask("0x6").unwrap(), 0x6);
/// assert_eq!(parse_core_mask("ff").unwrap(), 0xff);
/// assert!(parse_core_mask("0xzz").is_err());
/// ```
pub fn parse_core_mask(mask: &str) -> Result<u64, MaskParseError> {
    let digits = mask
        .strip_prefix("0x")
        .or_else(|| mask.strip_prefix("0X"))
        .unwrap_or(mask);

    if digits.is_empty() {
        return Err(MaskParseError::Empty);
    }

    u64::from_str_radix(digits, 16).map_err(|err| match err.kind() {
        IntErrorKind::PosOverflow => MaskParseError::Overflow(mask.to_string()),
        IntErrorKind::Empty => MaskParseError::Empty,
        _ => MaskParseError::InvalidDigit(mask.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_prefixed() {
        assert_eq!(parse_core_mask("6").unwrap(), 0x6);
        assert_eq!(parse_core_mask("0x6").unwrap(), 0x6);
        assert_eq!(parse_core_mask("0X6").unwrap(), 0x6);
        assert_eq!(parse_core_mask("0xDEADbeef").unwrap(), 0xdead_beef);
    }

    #[test]
    fn test_full_width() {
        assert_eq!(
            parse_core_mask("0xffffffffffffffff").unwrap(),
            u64::MAX
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(parse_core_mask(""), Err(MaskParseError::Empty));
        assert_eq!(parse_core_mask("0x"), Err(MaskParseError::Empty));
    }

    #[test]
    fn test_trailing_garbage() {
        assert!(matches!(
            parse_core_mask("0x6g"),
            Err(MaskParseError::InvalidDigit(_))
        ));
        assert!(matches!(
            parse_core_mask("12 "),
            Err(MaskParseError::InvalidDigit(_))
        ));
        // A sign is not a hex digit.
        assert!(matches!(
            parse_core_mask("-1"),
            Err(MaskParseError::InvalidDigit(_))
        ));
    }

    #[test]
    fn test_overflow() {
        assert!(matches!(
            parse_core_mask("0x1ffffffffffffffff"),
            Err(MaskParseError::Overflow(_))
        ));
    }
}
