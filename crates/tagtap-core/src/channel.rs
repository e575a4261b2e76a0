//! Tag handles and the technology channels they expose.
//!
//! A [`Tag`] is the platform's reference to one physically present tag. It is only
//! valid while the tag stays in the field. Each technology the tag supports is reached
//! through its own channel, which must be connected before use and closed afterwards.
//! [`ChannelGuard`] ties the close to scope so every exit path releases the channel
//! exactly once.

use std::ops::{Deref, DerefMut};

use thiserror::Error;
use tracing::warn;

use crate::ndef::NdefMessage;

/// Size of a MIFARE Classic data block in bytes.
pub const MIFARE_BLOCK_SIZE: usize = 16;

/// A MIFARE Classic sector key.
pub type MifareKey = [u8; 6];

/// Factory default key shipped on MIFARE Classic tags.
pub const MIFARE_KEY_DEFAULT: MifareKey = [0xFF; 6];

/// Errors reported by a tag channel transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The tag left the field or stopped answering.
    #[error("Tag was lost. Hold the tag against the reader until the operation completes.")]
    TagLost,

    /// An operation was attempted before `connect`.
    #[error("Channel is not connected")]
    NotConnected,

    /// `connect` was called on an open channel.
    #[error("Channel is already connected")]
    AlreadyConnected,

    /// The tag answered but refused the operation.
    #[error("Tag rejected the operation: {0}")]
    Rejected(String),

    /// The reader transport failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Lifecycle shared by every technology channel.
pub trait TagChannel {
    /// Open the channel. A failed connect still requires a `close`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the connection.
    fn connect(&mut self) -> ChannelResult<()>;

    /// Release the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport failed while releasing.
    fn close(&mut self) -> ChannelResult<()>;

    /// Whether the channel is currently connected.
    fn is_connected(&self) -> bool;
}

/// Channel for tags that can be formatted to hold an NDEF message.
pub trait NdefFormatableChannel: TagChannel {
    /// Format the tag and write `message` as its initial content.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag or transport rejects the format.
    fn format(&mut self, message: &NdefMessage) -> ChannelResult<()>;
}

/// Block/sector addressed channel for MIFARE Classic tags.
pub trait MifareClassicChannel: TagChannel {
    /// Authenticate `sector` using key slot B.
    ///
    /// Returns `Ok(false)` when the tag refuses the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange itself failed.
    fn authenticate_sector_with_key_b(
        &mut self,
        sector: u8,
        key: &MifareKey,
    ) -> ChannelResult<bool>;

    /// Write one 16-byte block. The block's sector must be authenticated.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag or transport rejects the write.
    fn write_block(&mut self, block: u16, data: &[u8; MIFARE_BLOCK_SIZE]) -> ChannelResult<()>;

    /// First block index of `sector`.
    ///
    /// Sectors 0-31 hold 4 blocks; sectors 32 and up (4K tags) hold 16.
    fn sector_to_block(&self, sector: u8) -> u16 {
        let sector = u16::from(sector);
        if sector < 32 {
            sector * 4
        } else {
            128 + (sector - 32) * 16
        }
    }

    /// Number of blocks in `sector`.
    fn block_count_in_sector(&self, sector: u8) -> u8 {
        if sector < 32 {
            4
        } else {
            16
        }
    }
}

/// A physically present tag as reported by the platform.
pub trait Tag {
    /// Identifier bytes reported by the hardware.
    fn id(&self) -> &[u8];

    /// Technology names reported at discovery (an unordered set).
    fn tech_list(&self) -> &[String];

    /// The NDEF-formatable channel, if the tag offers one.
    fn ndef_formatable(&self) -> Option<Box<dyn NdefFormatableChannel>>;

    /// The MIFARE Classic channel, if the tag offers one.
    fn mifare_classic(&self) -> Option<Box<dyn MifareClassicChannel>>;
}

/// Closes the wrapped channel exactly once, on [`ChannelGuard::close`] or on drop.
pub struct ChannelGuard<C: TagChannel + ?Sized> {
    channel: Box<C>,
    closed: bool,
}

impl<C: TagChannel + ?Sized> ChannelGuard<C> {
    /// Take ownership of an acquired channel.
    pub const fn new(channel: Box<C>) -> Self {
        Self {
            channel,
            closed: false,
        }
    }

    /// Close the channel now and report the result.
    ///
    /// # Errors
    ///
    /// Returns the channel's close error.
    pub fn close(mut self) -> ChannelResult<()> {
        self.closed = true;
        self.channel.close()
    }
}

impl<C: TagChannel + ?Sized> Deref for ChannelGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.channel
    }
}

impl<C: TagChannel + ?Sized> DerefMut for ChannelGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}

impl<C: TagChannel + ?Sized> Drop for ChannelGuard<C> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(error) = self.channel.close() {
            warn!(%error, "Failed to close tag channel");
        }
    }
}
