//! # tagtap-core
//!
//! Core tag-session logic for the tagtap NFC tool.
//!
//! This crate provides:
//! - Discovery event handling with a foreground dispatch gate
//! - Tag capability classification and strategy selection
//! - A connect/format/close tag session with guaranteed channel release
//! - NDEF text record encoding and parsing
//! - A raw block write for legacy MIFARE Classic tags
//! - Configuration loading, saving, and validation
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`dispatch`] - Discovery events in, display updates out
//! - [`session`] - Tag session state machine and outcomes
//! - [`technology`] - Technology list classification
//! - [`channel`] - Tag handle and channel traits, scoped channel release
//! - [`ndef`] - NDEF message wire format
//! - [`legacy`] - MIFARE Classic sector write
//! - [`identifier`] - Tag identifier display and parsing
//! - [`config`] - Application configuration
//! - [`error`] - Unified error types for the crate
//! - `mock` - In-memory tag reader (feature `mock-reader`)

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod identifier;
pub mod legacy;
#[cfg(any(test, feature = "mock-reader"))]
pub mod mock;
pub mod ndef;
pub mod session;
pub mod technology;

// Re-export primary types for convenience
pub use crate::channel::{
    ChannelError, ChannelGuard, ChannelResult, MifareClassicChannel, MifareKey,
    NdefFormatableChannel, Tag, TagChannel, MIFARE_BLOCK_SIZE, MIFARE_KEY_DEFAULT,
};
pub use crate::config::{
    is_valid_language_code, Config, ConfigError, ConfigResult, DispatchConfig, LegacyConfig,
    RecordConfig,
};
pub use crate::dispatch::{ActionKind, DiscoveryDispatcher, DiscoveryEvent, DisplayUpdate};
pub use crate::error::{Result, TagtapError};
pub use crate::identifier::{IdentifierParseError, TagIdentifier};
pub use crate::legacy::{write_classic_block, LegacyWriteError, LegacyWriteRequest};
#[cfg(any(test, feature = "mock-reader"))]
pub use crate::mock::{ChannelStats, MockBehavior, MockProbe, MockTag};
pub use crate::ndef::{
    build_text_message, NdefError, NdefMessage, NdefRecord, TextPayload, TextPayloadFormat, Tnf,
};
pub use crate::session::{SessionFailure, SessionOutcome, SessionState, TagSession};
pub use crate::technology::{classify, Capability, Strategy, TagTechnology};
