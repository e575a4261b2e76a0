//! Unified error types for the tagtap core library.
//!
//! This module provides a unified error type [`TagtapError`] that covers every failure
//! mode across tagtap. Each module also has its own specific error type
//! ([`NdefError`], [`ChannelError`], [`ConfigError`], [`LegacyWriteError`]) and
//! tag sessions report [`SessionFailure`] values; all of them convert into
//! [`TagtapError`] for callers that want a single type.
//!
//! # Example
//!
//! ```rust
//! use tagtap_core::error::{Result, TagtapError};
//!
//! fn require_tag(present: bool) -> Result<()> {
//!     if !present {
//!         return Err(TagtapError::TagNotPresent);
//!     }
//!     Ok(())
//! }
//!
//! assert_eq!(require_tag(false).unwrap_err().error_code(), "TAG_NOT_PRESENT");
//! ```

use thiserror::Error;

use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::legacy::LegacyWriteError;
use crate::ndef::NdefError;
use crate::session::SessionFailure;

/// The unified error type for all tagtap operations.
#[derive(Debug, Error)]
pub enum TagtapError {
    // =========================================================================
    // DISCOVERY ERRORS
    // =========================================================================
    /// A discovery event arrived without a tag handle.
    #[error("Tag not detected. The discovery event carried no tag.")]
    TagNotPresent,

    // =========================================================================
    // SESSION ERRORS
    // =========================================================================
    /// The platform refused to open a channel to the tag.
    #[error("Failed to connect to tag: {0}. Hold the tag still and tap again.")]
    ConnectFailed(String),

    /// The tag or transport rejected the format operation.
    #[error("Failed to format tag: {0}")]
    FormatFailed(String),

    /// A transport error outside a session.
    #[error("Tag channel error: {0}")]
    Channel(#[from] ChannelError),

    // =========================================================================
    // LEGACY SECTOR ERRORS
    // =========================================================================
    /// The tag has no MIFARE Classic channel.
    #[error("Tag does not support MIFARE Classic sector access")]
    ClassicUnsupported,

    /// Sector authentication failed.
    #[error("Authentication of sector {sector} failed: {reason}")]
    AuthenticationFailed {
        /// Sector index.
        sector: u8,
        /// What went wrong.
        reason: String,
    },

    /// A block write failed or was out of range.
    #[error("Block write failed: {0}")]
    WriteFailed(String),

    // =========================================================================
    // DATA FORMAT ERRORS
    // =========================================================================
    /// NDEF data could not be built or parsed.
    #[error("Invalid NDEF data: {0}")]
    Ndef(#[from] NdefError),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found.
    #[error("Configuration file not found at: {0}")]
    ConfigNotFound(String),

    /// The configuration could not be read, merged or written.
    #[error("Failed to load configuration: {0}")]
    ConfigParseError(String),

    /// The configuration contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for tagtap operations.
pub type Result<T> = std::result::Result<T, TagtapError>;

impl TagtapError {
    /// Returns `true` if this error came from a tag session.
    #[inline]
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::TagNotPresent | Self::ConnectFailed(_) | Self::FormatFailed(_) | Self::Channel(_)
        )
    }

    /// Returns `true` if this error came from the legacy sector write.
    #[inline]
    #[must_use]
    pub const fn is_legacy_error(&self) -> bool {
        matches!(
            self,
            Self::ClassicUnsupported | Self::AuthenticationFailed { .. } | Self::WriteFailed(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if tapping the tag again may succeed.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TagNotPresent
                | Self::ConnectFailed(_)
                | Self::Channel(ChannelError::TagLost | ChannelError::Transport(_))
        )
    }

    /// Returns a machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::TagNotPresent => "TAG_NOT_PRESENT",
            Self::ConnectFailed(_) => "CONNECT_FAILED",
            Self::FormatFailed(_) => "FORMAT_FAILED",
            Self::Channel(_) => "CHANNEL_ERROR",
            Self::ClassicUnsupported => "CLASSIC_UNSUPPORTED",
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            Self::WriteFailed(_) => "WRITE_FAILED",
            Self::Ndef(_) => "INVALID_NDEF",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<SessionFailure> for TagtapError {
    fn from(failure: SessionFailure) -> Self {
        match failure {
            SessionFailure::Connect(message) => Self::ConnectFailed(message),
            SessionFailure::Format(message) => Self::FormatFailed(message),
        }
    }
}

impl From<LegacyWriteError> for TagtapError {
    fn from(err: LegacyWriteError) -> Self {
        match err {
            LegacyWriteError::Unsupported => Self::ClassicUnsupported,
            LegacyWriteError::Connect(e) => Self::ConnectFailed(e.to_string()),
            LegacyWriteError::Authentication { sector, reason } => {
                Self::AuthenticationFailed { sector, reason }
            }
            err @ (LegacyWriteError::BlockOutOfRange { .. } | LegacyWriteError::Write { .. }) => {
                Self::WriteFailed(err.to_string())
            }
        }
    }
}

impl From<ConfigError> for TagtapError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            err @ (ConfigError::ParseError(_)
            | ConfigError::SerializeError(_)
            | ConfigError::WriteError { .. }) => Self::ConfigParseError(err.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_session_error_classification() {
        assert!(TagtapError::TagNotPresent.is_session_error());
        assert!(TagtapError::ConnectFailed("lost".into()).is_session_error());
        assert!(TagtapError::FormatFailed("read-only".into()).is_session_error());
        assert!(!TagtapError::ClassicUnsupported.is_session_error());
    }

    #[test]
    fn test_legacy_error_classification() {
        assert!(TagtapError::ClassicUnsupported.is_legacy_error());
        assert!(TagtapError::AuthenticationFailed {
            sector: 0,
            reason: "key rejected".into()
        }
        .is_legacy_error());
        assert!(!TagtapError::TagNotPresent.is_legacy_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(TagtapError::TagNotPresent.is_recoverable());
        assert!(TagtapError::Channel(ChannelError::TagLost).is_recoverable());
        assert!(!TagtapError::Channel(ChannelError::NotConnected).is_recoverable());
        assert!(!TagtapError::FormatFailed("read-only".into()).is_recoverable());
    }

    #[test]
    fn test_from_session_failure() {
        let err: TagtapError = SessionFailure::Format("read-only".into()).into();
        assert!(matches!(err, TagtapError::FormatFailed(ref m) if m == "read-only"));
        assert_eq!(err.error_code(), "FORMAT_FAILED");
    }

    #[test]
    fn test_from_legacy_error() {
        let err: TagtapError = LegacyWriteError::Write {
            block: 0,
            source: ChannelError::Rejected("locked".into()),
        }
        .into();
        assert_eq!(err.error_code(), "WRITE_FAILED");
        assert!(err.to_string().contains("locked"));

        let err: TagtapError = LegacyWriteError::Authentication {
            sector: 3,
            reason: "key rejected".into(),
        }
        .into();
        assert!(matches!(err, TagtapError::AuthenticationFailed { sector: 3, .. }));
    }

    #[test]
    fn test_from_config_error() {
        let err: TagtapError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "record.text".into(),
                message: "must not be empty".into(),
            },
            ConfigError::ValidationError {
                field: "legacy.key".into(),
                message: "bad hex".into(),
            },
        ])
        .into();
        assert!(err.is_config_error());
        assert_eq!(
            err.to_string(),
            "Configuration validation failed: Invalid record.text: must not be empty; \
             Invalid legacy.key: bad hex"
        );
    }

    #[test]
    fn test_from_io_error() {
        let err: TagtapError = IoErr::new(ErrorKind::NotFound, "missing").into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TagtapError>();
        assert_sync::<TagtapError>();
    }
}
