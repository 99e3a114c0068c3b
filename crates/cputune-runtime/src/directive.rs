//! Decoding of raw directive bytes.
//!
//! Toggle directives are a single byte: `'1'` requests the feature on,
//! anything else (including an empty or unreadable source) requests it off.
//! The HWP request directive is a hexadecimal literal of at most ten bytes,
//! e.g. `0x80002a2a` or `80002A2A`.

use cputune_types::{Feature, TuneError};

/// Bytes read for an on/off directive.
pub const TOGGLE_DIRECTIVE_LEN: usize = 1;
/// Bytes read for the HWP request word.
pub const HWP_DIRECTIVE_LEN: usize = 10;

/// Interpret a toggle directive.
pub fn parse_toggle(bytes: Option<&[u8]>) -> bool {
    matches!(bytes.and_then(|b| b.first()), Some(b'1'))
}

/// Parse a hexadecimal integer literal.
///
/// Leading/trailing ASCII whitespace and NUL padding are ignored, as is an
/// optional `0x`/`0X` prefix.  Anything else that is not a hex digit, an
/// empty literal, or a value that overflows `u64` is rejected.
///
/// # Errors
///
/// Returns [`TuneError::MalformedDirective`] for [`Feature::HwpRequest`].
///
/// # Example
///
/// ```
/// use cputune_runtime::directive::parse_hex_word;
///
/// assert_eq!(parse_hex_word(b"0x80002a2a").unwrap(), 0x8000_2a2a);
/// assert!(parse_hex_word(b"performan").is_err());
/// ```
pub fn parse_hex_word(bytes: &[u8]) -> Result<u64, TuneError> {
    let malformed = |details: String| TuneError::MalformedDirective {
        feature: Feature::HwpRequest,
        details,
    };

    let text = std::str::from_utf8(bytes)
        .map_err(|_| malformed(format!("{bytes:?} is not valid UTF-8")))?;
    let trimmed = text.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0');
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed(format!(
            "{trimmed:?} is not a valid hexadecimal constant"
        )));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| malformed(format!("{trimmed:?} is out of range: {e}")))
}
