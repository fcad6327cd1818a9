//! Reversible `OBF:` encoding for casual protection of values at rest.
//!
//! This is the byte-pair scheme used by the Jetty password utility, so values
//! produced here can be pasted into (or read from) its configuration files.
//! It hides text from a glance at a file; it does not keep a secret from
//! anyone who reads this module.
//!
//! Each input byte `b1 = b[i]` is paired with its mirror `b2 = b[l-1-i]` and
//! written as four base-36 digits of `(127 + b1 + b2) * 256 + (127 + b1 - b2)`.
//! Decoding a chunk gives back `b1` alone.
//!
//! Only ASCII input is accepted. The external tool switches to a `U`-prefixed
//! five-digit form for wider characters; that form is not produced or read.

use crate::types::{MstarError, Result};

/// Marker prefixed to every obfuscated value
pub const OBF_PREFIX: &str = "OBF:";

const CHUNK: usize = 4;
const RADIX: u32 = 36;

/// Check whether a stored value is obfuscated
pub fn is_obfuscated(value: &str) -> bool {
    value.starts_with(OBF_PREFIX)
}

/// Encode ASCII text into its `OBF:` form
pub fn obfuscate(plain: &str) -> Result<String> {
    if !plain.is_ascii() {
        return Err(MstarError::Obfuscation(
            "only ASCII text can be obfuscated".to_string(),
        ));
    }

    let bytes = plain.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(OBF_PREFIX.len() + len * CHUNK);
    out.push_str(OBF_PREFIX);

    for i in 0..len {
        let b1 = bytes[i] as i32;
        let b2 = bytes[len - 1 - i] as i32;
        let i1 = 127 + b1 + b2;
        let i2 = 127 + b1 - b2;
        let i0 = (i1 * 256 + i2) as u32;

        let digits = to_base36(i0);
        for _ in digits.len()..CHUNK {
            out.push('0');
        }
        out.push_str(&digits);
    }

    Ok(out)
}

/// Decode an `OBF:` value. The marker is optional.
pub fn deobfuscate(encoded: &str) -> Result<String> {
    let body = encoded.strip_prefix(OBF_PREFIX).unwrap_or(encoded);
    if !body.is_ascii() || body.len() % CHUNK != 0 {
        return Err(MstarError::Obfuscation(format!(
            "expected groups of {} base-36 digits, got {} characters",
            CHUNK,
            body.len()
        )));
    }

    let mut out = Vec::with_capacity(body.len() / CHUNK);
    for chunk in body.as_bytes().chunks(CHUNK) {
        // ASCII was checked above, so every chunk is valid UTF-8
        let digits = std::str::from_utf8(chunk).unwrap_or_default();
        if !digits.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(MstarError::Obfuscation(format!("'{}' is not base-36", digits)));
        }
        let i0 = i32::from_str_radix(digits, RADIX)
            .map_err(|_| MstarError::Obfuscation(format!("'{}' is not base-36", digits)))?;
        let i1 = i0 / 256;
        let i2 = i0 % 256;
        let x = (i1 + i2 - 254) >> 1;
        let byte = u8::try_from(x)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| MstarError::Obfuscation(format!("chunk '{}' is out of range", digits)))?;
        out.push(byte);
    }

    String::from_utf8(out).map_err(|e| MstarError::Obfuscation(e.to_string()))
}

fn to_base36(mut value: u32) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let digit = value % RADIX;
        digits.push(char::from_digit(digit, RADIX).unwrap_or('0'));
        value /= RADIX;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // Jetty's documented example: "password"
        assert_eq!(
            obfuscate("password").unwrap(),
            "OBF:1v2j1uum1xtv1zej1zer1xtn1uvk1v1v"
        );
        assert_eq!(
            deobfuscate("OBF:1v2j1uum1xtv1zej1zer1xtn1uvk1v1v").unwrap(),
            "password"
        );
    }

    #[test]
    fn test_minestar_round_trip() {
        let encoded = obfuscate("MineStar").unwrap();
        assert!(is_obfuscated(&encoded));
        assert_eq!(encoded.len(), OBF_PREFIX.len() + 8 * 4);
        assert_eq!(encoded, obfuscate("MineStar").unwrap());
        assert_eq!(deobfuscate(&encoded).unwrap(), "MineStar");
    }

    #[test]
    fn test_marker_is_optional_on_decode() {
        let encoded = obfuscate("abc").unwrap();
        let bare = encoded.trim_start_matches(OBF_PREFIX);
        assert_eq!(deobfuscate(bare).unwrap(), "abc");
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(obfuscate("").unwrap(), OBF_PREFIX);
        assert_eq!(deobfuscate(OBF_PREFIX).unwrap(), "");
    }

    #[test]
    fn test_rejects_non_ascii() {
        assert!(matches!(obfuscate("pässword"), Err(MstarError::Obfuscation(_))));
    }

    #[test]
    fn test_rejects_ragged_or_bad_digits() {
        assert!(deobfuscate("OBF:1v2").is_err());
        assert!(deobfuscate("OBF:1v2!").is_err());
    }

    #[test]
    fn test_rejects_signed_chunks() {
        // "0tqu" decodes; a sign in place of the leading zero must not
        assert_eq!(deobfuscate("OBF:0tqu").unwrap(), "\u{17}");
        for bad in ["OBF:+tqu", "OBF:-tqu", "OBF:0tqu+1v2"] {
            let err = deobfuscate(bad).unwrap_err();
            assert!(err.to_string().contains("not base-36"), "accepted {bad:?}");
        }
    }

    proptest! {
        #[test]
        fn prop_printable_ascii_round_trips(s in "[ -~]{0,64}") {
            let encoded = obfuscate(&s).unwrap();
            prop_assert!(encoded.starts_with(OBF_PREFIX));
            prop_assert_eq!((encoded.len() - OBF_PREFIX.len()) % 4, 0);
            prop_assert_eq!(deobfuscate(&encoded).unwrap(), s);
        }

        #[test]
        fn prop_any_ascii_round_trips(bytes in proptest::collection::vec(0u8..128, 0..32)) {
            let s = String::from_utf8(bytes).unwrap();
            prop_assert_eq!(deobfuscate(&obfuscate(&s).unwrap()).unwrap(), s);
        }
    }
}
