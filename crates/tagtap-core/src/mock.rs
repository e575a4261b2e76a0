//! In-memory tag reader for tests and the replay simulator.
//!
//! [`MockTag`] implements [`Tag`] and hands out channels that record every call in a
//! shared [`ChannelStats`], so callers can check that each acquired channel was opened
//! and closed the expected number of times. Failures are injected through
//! [`MockBehavior`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::channel::{
    ChannelError, ChannelResult, MifareClassicChannel, MifareKey, NdefFormatableChannel, Tag,
    TagChannel, MIFARE_BLOCK_SIZE, MIFARE_KEY_DEFAULT,
};
use crate::identifier::TagIdentifier;
use crate::ndef::{NdefError, NdefMessage};
use crate::technology::Capability;

/// Call counters shared by every channel a [`MockTag`] hands out.
#[derive(Debug, Default)]
pub struct ChannelStats {
    connects: AtomicUsize,
    closes: AtomicUsize,
    formats: AtomicUsize,
    authentications: AtomicUsize,
    writes: AtomicUsize,
}

impl ChannelStats {
    /// Number of `connect` attempts, successful or not.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of `format` attempts.
    pub fn formats(&self) -> usize {
        self.formats.load(Ordering::SeqCst)
    }

    /// Number of sector authentication attempts.
    pub fn authentications(&self) -> usize {
        self.authentications.load(Ordering::SeqCst)
    }

    /// Number of block write attempts.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Failure injection for a [`MockTag`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockBehavior {
    /// `connect` fails with [`ChannelError::TagLost`].
    pub fail_connect: bool,
    /// `format` fails with [`ChannelError::Rejected`].
    pub fail_format: bool,
    /// Sector authentication refuses every key.
    pub fail_authentication: bool,
    /// `write_block` fails with [`ChannelError::Rejected`].
    pub fail_write: bool,
    /// `close` reports a transport error (the channel is still released).
    pub fail_close: bool,
    /// The tag advertises technologies but hands out no channels.
    pub withhold_channels: bool,
}

#[derive(Debug, Default)]
struct MockMemory {
    ndef: Option<Vec<u8>>,
    blocks: BTreeMap<u16, [u8; MIFARE_BLOCK_SIZE]>,
}

/// A scripted tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockTag {
    id: TagIdentifier,
    tech_list: Vec<String>,
    #[serde(default)]
    behavior: MockBehavior,
    #[serde(skip)]
    stats: Arc<ChannelStats>,
    #[serde(skip)]
    memory: Arc<Mutex<MockMemory>>,
}

impl MockTag {
    /// Create a well-behaved tag with the given identifier and technology list.
    pub fn new<I, S>(id: impl Into<Vec<u8>>, tech_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: TagIdentifier::new(id),
            tech_list: tech_list.into_iter().map(Into::into).collect(),
            behavior: MockBehavior::default(),
            stats: Arc::default(),
            memory: Arc::default(),
        }
    }

    /// Replace the failure injection settings.
    #[must_use]
    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Shared call counters for this tag's channels.
    #[must_use]
    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }

    /// The identifier this tag reports.
    #[must_use]
    pub const fn identifier(&self) -> &TagIdentifier {
        &self.id
    }

    /// A second handle onto the same tag memory and counters.
    ///
    /// Sessions take ownership of their tag; tests keep a probe to inspect it afterwards.
    #[must_use]
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            stats: self.stats(),
            memory: Arc::clone(&self.memory),
        }
    }

    fn offers(&self, capability: Capability) -> bool {
        !self.behavior.withhold_channels
            && self
                .tech_list
                .iter()
                .any(|name| Capability::from_tech_name(name) == capability)
    }

    fn channel_state(&self) -> MockChannelState {
        MockChannelState {
            behavior: self.behavior.clone(),
            stats: self.stats(),
            memory: Arc::clone(&self.memory),
            connected: false,
        }
    }
}

impl Tag for MockTag {
    fn id(&self) -> &[u8] {
        self.id.as_bytes()
    }

    fn tech_list(&self) -> &[String] {
        &self.tech_list
    }

    fn ndef_formatable(&self) -> Option<Box<dyn NdefFormatableChannel>> {
        self.offers(Capability::NdefFormatable).then(|| {
            Box::new(MockNdefFormatable(self.channel_state())) as Box<dyn NdefFormatableChannel>
        })
    }

    fn mifare_classic(&self) -> Option<Box<dyn MifareClassicChannel>> {
        self.offers(Capability::MifareClassic).then(|| {
            Box::new(MockMifareClassic {
                state: self.channel_state(),
                authenticated: None,
            }) as Box<dyn MifareClassicChannel>
        })
    }
}

/// Read-only view of a [`MockTag`]'s memory and counters.
#[derive(Debug, Clone)]
pub struct MockProbe {
    stats: Arc<ChannelStats>,
    memory: Arc<Mutex<MockMemory>>,
}

impl MockProbe {
    /// Call counters.
    #[must_use]
    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// The NDEF message written by the last successful format, if any, parsed back
    /// from the stored bytes.
    pub fn ndef_message(&self) -> Option<Result<NdefMessage, NdefError>> {
        lock(&self.memory).ndef.as_deref().map(NdefMessage::parse)
    }

    /// Contents of an absolute block, if it was written.
    #[must_use]
    pub fn block(&self, block: u16) -> Option<[u8; MIFARE_BLOCK_SIZE]> {
        lock(&self.memory).blocks.get(&block).copied()
    }
}

fn lock(memory: &Mutex<MockMemory>) -> MutexGuard<'_, MockMemory> {
    memory.lock().unwrap_or_else(PoisonError::into_inner)
}

struct MockChannelState {
    behavior: MockBehavior,
    stats: Arc<ChannelStats>,
    memory: Arc<Mutex<MockMemory>>,
    connected: bool,
}

impl MockChannelState {
    fn connect(&mut self) -> ChannelResult<()> {
        ChannelStats::bump(&self.stats.connects);
        if self.behavior.fail_connect {
            return Err(ChannelError::TagLost);
        }
        if self.connected {
            return Err(ChannelError::AlreadyConnected);
        }
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        ChannelStats::bump(&self.stats.closes);
        self.connected = false;
        if self.behavior.fail_close {
            return Err(ChannelError::Transport("reader reset during close".into()));
        }
        Ok(())
    }

    fn require_connected(&self) -> ChannelResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ChannelError::NotConnected)
        }
    }
}

struct MockNdefFormatable(MockChannelState);

impl TagChannel for MockNdefFormatable {
    fn connect(&mut self) -> ChannelResult<()> {
        self.0.connect()
    }

    fn close(&mut self) -> ChannelResult<()> {
        self.0.close()
    }

    fn is_connected(&self) -> bool {
        self.0.connected
    }
}

impl NdefFormatableChannel for MockNdefFormatable {
    fn format(&mut self, message: &NdefMessage) -> ChannelResult<()> {
        self.0.require_connected()?;
        ChannelStats::bump(&self.0.stats.formats);
        if self.0.behavior.fail_format {
            return Err(ChannelError::Rejected("tag is read-only".into()));
        }
        lock(&self.0.memory).ndef = Some(message.to_bytes());
        Ok(())
    }
}

struct MockMifareClassic {
    state: MockChannelState,
    authenticated: Option<u8>,
}

impl TagChannel for MockMifareClassic {
    fn connect(&mut self) -> ChannelResult<()> {
        self.state.connect()
    }

    fn close(&mut self) -> ChannelResult<()> {
        self.authenticated = None;
        self.state.close()
    }

    fn is_connected(&self) -> bool {
        self.state.connected
    }
}

impl MifareClassicChannel for MockMifareClassic {
    fn authenticate_sector_with_key_b(
        &mut self,
        sector: u8,
        key: &MifareKey,
    ) -> ChannelResult<bool> {
        self.state.require_connected()?;
        ChannelStats::bump(&self.state.stats.authentications);
        if self.state.behavior.fail_authentication || *key != MIFARE_KEY_DEFAULT {
            self.authenticated = None;
            return Ok(false);
        }
        self.authenticated = Some(sector);
        Ok(true)
    }

    fn write_block(&mut self, block: u16, data: &[u8; MIFARE_BLOCK_SIZE]) -> ChannelResult<()> {
        self.state.require_connected()?;
        ChannelStats::bump(&self.state.stats.writes);
        let authorized = self.authenticated.is_some_and(|sector| {
            let first = self.sector_to_block(sector);
            (first..first + u16::from(self.block_count_in_sector(sector))).contains(&block)
        });
        if !authorized {
            return Err(ChannelError::Rejected(format!(
                "block {block} is not in an authenticated sector"
            )));
        }
        if self.state.behavior.fail_write {
            return Err(ChannelError::Rejected("write refused by tag".into()));
        }
        lock(&self.state.memory).blocks.insert(block, *data);
        Ok(())
    }
}
