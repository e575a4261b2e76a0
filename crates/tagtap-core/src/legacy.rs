//! Raw block write for MIFARE Classic tags.
//!
//! Separate from the NDEF session flow: nothing in discovery dispatch calls it.
//! The write connects on the classic channel, authenticates the sector with key B,
//! writes one block, and closes the channel on every path.

use thiserror::Error;
use tracing::{error, info, warn};

use crate::channel::{
    ChannelError, ChannelGuard, MifareClassicChannel, MifareKey, Tag, MIFARE_BLOCK_SIZE,
    MIFARE_KEY_DEFAULT,
};
use crate::config::{ConfigResult, LegacyConfig};
use crate::identifier::TagIdentifier;

/// Errors from a legacy block write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LegacyWriteError {
    /// The tag has no MIFARE Classic channel.
    #[error("Tag does not expose a MIFARE Classic channel")]
    Unsupported,

    /// The classic channel could not be opened.
    #[error("Failed to connect to MIFARE Classic channel: {0}")]
    Connect(#[source] ChannelError),

    /// The requested block is not part of the sector.
    #[error("Block {block} is outside sector {sector} ({blocks} blocks)")]
    BlockOutOfRange {
        /// Sector index.
        sector: u8,
        /// Requested block within the sector.
        block: u8,
        /// Blocks the sector holds.
        blocks: u8,
    },

    /// The sector refused key B, or the exchange failed.
    #[error("Authentication of sector {sector} with key B failed: {reason}")]
    Authentication {
        /// Sector index.
        sector: u8,
        /// What went wrong.
        reason: String,
    },

    /// The block write failed.
    #[error("Failed to write block {block}: {source}")]
    Write {
        /// Absolute block index.
        block: u16,
        /// Underlying channel error.
        #[source]
        source: ChannelError,
    },
}

/// What to write and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyWriteRequest {
    /// Key B for the sector.
    pub key: MifareKey,
    /// Sector to authenticate.
    pub sector: u8,
    /// Block index within the sector.
    pub block: u8,
    /// Block contents.
    pub data: [u8; MIFARE_BLOCK_SIZE],
}

impl Default for LegacyWriteRequest {
    fn default() -> Self {
        Self {
            key: MIFARE_KEY_DEFAULT,
            sector: 0,
            block: 0,
            data: [0; MIFARE_BLOCK_SIZE],
        }
    }
}

impl LegacyWriteRequest {
    /// Request `data` at sector 0, block 0 with the default key.
    #[must_use]
    pub fn with_data(data: [u8; MIFARE_BLOCK_SIZE]) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Build a request from configuration.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the key or data are not valid hex.
    pub fn from_config(config: &LegacyConfig) -> ConfigResult<Self> {
        Ok(Self {
            key: config.key_bytes()?,
            sector: config.sector,
            block: config.block,
            data: config.data_block()?,
        })
    }
}

/// Write one block to a MIFARE Classic tag.
///
/// The channel is closed exactly once whether or not the write succeeds.
///
/// # Errors
///
/// Returns a [`LegacyWriteError`] describing the first step that failed.
pub fn write_classic_block<T: Tag + ?Sized>(
    tag: &T,
    request: &LegacyWriteRequest,
) -> Result<(), LegacyWriteError> {
    let tag_id = TagIdentifier::from(tag.id());

    let Some(channel) = tag.mifare_classic() else {
        warn!(%tag_id, "Tag does not support MIFARE Classic");
        return Err(LegacyWriteError::Unsupported);
    };
    let mut channel = ChannelGuard::new(channel);

    let result = write_on(&mut *channel, request);

    if let Err(e) = channel.close() {
        warn!(%tag_id, error = %e, "Failed to close MIFARE Classic channel");
    }

    match &result {
        Ok(()) => info!(
            %tag_id,
            sector = request.sector,
            block = request.block,
            "Block written to MIFARE Classic tag"
        ),
        Err(e) => error!(%tag_id, error = %e, "MIFARE Classic write failed"),
    }
    result
}

fn write_on(
    channel: &mut dyn MifareClassicChannel,
    request: &LegacyWriteRequest,
) -> Result<(), LegacyWriteError> {
    channel.connect().map_err(LegacyWriteError::Connect)?;

    let blocks = channel.block_count_in_sector(request.sector);
    if request.block >= blocks {
        return Err(LegacyWriteError::BlockOutOfRange {
            sector: request.sector,
            block: request.block,
            blocks,
        });
    }

    match channel.authenticate_sector_with_key_b(request.sector, &request.key) {
        Ok(true) => {}
        Ok(false) => {
            return Err(LegacyWriteError::Authentication {
                sector: request.sector,
                reason: "key rejected".to_string(),
            })
        }
        Err(e) => {
            return Err(LegacyWriteError::Authentication {
                sector: request.sector,
                reason: e.to_string(),
            })
        }
    }

    let block = channel.sector_to_block(request.sector) + u16::from(request.block);
    channel
        .write_block(block, &request.data)
        .map_err(|source| LegacyWriteError::Write { block, source })
}
