// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::{DecodeError, EncodeError};

/// Generate a random alphanumeric string with `len` chars.
///
/// Used as client identifier when none is configured.
pub fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// More than 65535 bytes.
    TooLong,

    /// Contains null character or other disallowed code points.
    InvalidChar,

    /// Byte sequence is not well-formed UTF-8.
    InvalidUtf8,
}

/// Check that `s` fits in a two bytes length prefix and contains
/// no disallowed code points.
///
/// The character data in a UTF-8 Encoded String MUST be well-formed UTF-8
/// and MUST NOT include an encoding of the null character U+0000
/// [MQTT-1.5.4-2].
///
/// # Errors
///
/// Returns error if `s` is too long or contains U+0000.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > u16::MAX as usize {
        return Err(StringError::TooLong);
    }
    if s.chars().any(|c| c == '\u{0000}') {
        return Err(StringError::InvalidChar);
    }
    Ok(())
}

/// Convert a byte slice read from packet into an owned string.
///
/// # Errors
///
/// Returns error if `bytes` is not well-formed UTF-8 or contains U+0000.
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, StringError> {
    let s = std::str::from_utf8(bytes).map_err(|_| StringError::InvalidUtf8)?;
    validate_utf8_string(s)?;
    Ok(s.to_string())
}

/// Check binary data fits in a two bytes length prefix.
///
/// # Errors
///
/// Returns error if `data` is longer than 65535 bytes.
pub fn validate_two_bytes_data(data: &[u8]) -> Result<(), EncodeError> {
    if data.len() > u16::MAX as usize {
        Err(EncodeError::TooManyData)
    } else {
        Ok(())
    }
}

/// Check client identifier is acceptable.
///
/// An empty identifier is allowed; the server then assigns one. Non-empty
/// identifiers are restricted to the portable character set so they work
/// with every broker.
///
/// # Errors
///
/// Returns error if `client_id` contains characters outside `[0-9a-zA-Z_-]`.
pub fn validate_client_id(client_id: &str) -> Result<(), DecodeError> {
    if client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(DecodeError::InvalidClientId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string() {
        let s = random_string(12);
        assert_eq!(s.len(), 12);
        assert!(validate_client_id(&s).is_ok());
    }

    #[test]
    fn test_validate_utf8_string() {
        assert!(validate_utf8_string("topic/cars").is_ok());
        assert_eq!(
            validate_utf8_string("nul\u{0000}char"),
            Err(StringError::InvalidChar)
        );
    }
}
