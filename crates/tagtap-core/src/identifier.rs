//! Hardware tag identifiers.
//!
//! Identifiers are displayed as lowercase hex pairs joined by `:` (`04:a2:19:3c`),
//! the same form accepted by [`TagIdentifier::from_str`].

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2})*)?$").expect("identifier pattern is valid")
});

/// Error returned when a string is not a colon-separated hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid tag identifier '{0}'. Expected hex pairs separated by ':' (e.g., '04:a2:19:3c').")]
pub struct IdentifierParseError(pub String);

/// The byte identifier a tag reports to the reader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagIdentifier(Vec<u8>);

impl TagIdentifier {
    /// Wrap identifier bytes as read from hardware.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` if the tag reported no identifier bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TagIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for TagIdentifier {
    type Err = IdentifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !IDENTIFIER_PATTERN.is_match(s) {
            return Err(IdentifierParseError(s.to_string()));
        }
        if s.is_empty() {
            return Ok(Self(Vec::new()));
        }
        s.split(':')
            .map(|pair| u8::from_str_radix(pair, 16))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
            .map_err(|_| IdentifierParseError(s.to_string()))
    }
}

impl TryFrom<String> for TagIdentifier {
    type Error = IdentifierParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TagIdentifier> for String {
    fn from(id: TagIdentifier) -> Self {
        id.to_string()
    }
}

impl From<&[u8]> for TagIdentifier {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_lowercase_colon_hex() {
        let id = TagIdentifier::new([0x04, 0xA2, 0x19, 0x3C]);
        assert_eq!(id.to_string(), "04:a2:19:3c");
    }

    #[test]
    fn test_display_single_and_empty() {
        assert_eq!(TagIdentifier::new([0x00]).to_string(), "00");
        assert_eq!(TagIdentifier::new(Vec::new()).to_string(), "");
    }

    #[test]
    fn test_parse_accepts_either_case() {
        let id: TagIdentifier = "04:A2:19:3c".parse().unwrap();
        assert_eq!(id.as_bytes(), &[0x04, 0xA2, 0x19, 0x3C]);
        assert!("".parse::<TagIdentifier>().unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["4:a2", "04-a2", "04:a2:", "zz", "04a2"] {
            assert!(bad.parse::<TagIdentifier>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_serde_uses_display_form() {
        let id = TagIdentifier::new([0xDE, 0xAD]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"de:ad\"");
        let back: TagIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
