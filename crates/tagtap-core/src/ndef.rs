//! NDEF message encoding and decoding.
//!
//! This module covers what a tag session needs from the NFC Data Exchange Format:
//! - Building a single well-known text record (`T`) wrapped in a message
//! - Encoding a message to its wire form for a format or write operation
//! - Parsing a message back into records and decoding text payloads
//!
//! Chunked records are rejected; nothing in tagtap produces them.

use thiserror::Error;

/// Record type of a well-known text record.
pub const TEXT_RECORD_TYPE: &[u8] = b"T";

/// Longest language code the text status byte can describe.
pub const MAX_LANGUAGE_CODE_LEN: usize = 0x3F;

const FLAG_MESSAGE_BEGIN: u8 = 0x80;
const FLAG_MESSAGE_END: u8 = 0x40;
const FLAG_CHUNK: u8 = 0x20;
const FLAG_SHORT_RECORD: u8 = 0x10;
const FLAG_ID_LENGTH: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

const TEXT_STATUS_UTF16: u8 = 0x80;
const TEXT_LANGUAGE_LEN_MASK: u8 = 0x3F;

/// Errors produced while building or parsing NDEF data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NdefError {
    /// There were no bytes to parse, or no records to wrap.
    #[error("NDEF message is empty")]
    Empty,

    /// A record ended before all of its declared fields were read.
    #[error("NDEF record truncated at offset {offset}: {needed} more bytes needed")]
    Truncated {
        /// Offset where the short read started.
        offset: usize,
        /// Number of bytes missing.
        needed: usize,
    },

    /// The first record does not carry the message-begin flag.
    #[error("First NDEF record is missing the message-begin flag")]
    MissingMessageBegin,

    /// A record after the first one carries the message-begin flag.
    #[error("NDEF record at offset {offset} sets message-begin inside a message")]
    UnexpectedMessageBegin {
        /// Offset of the offending record header.
        offset: usize,
    },

    /// Input ran out before a record carrying the message-end flag.
    #[error("NDEF message ended without a message-end record")]
    MissingMessageEnd,

    /// Chunked records are not supported.
    #[error("Chunked NDEF records are not supported")]
    ChunkedRecord,

    /// Bytes remain after the message-end record.
    #[error("{count} trailing bytes after the NDEF message-end record")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },

    /// A record type or id does not fit its one-byte length field.
    #[error("NDEF {field} of {len} bytes exceeds the 255 byte limit")]
    FieldTooLong {
        /// Which field overflowed ("type" or "id").
        field: &'static str,
        /// Actual length.
        len: usize,
    },

    /// A payload does not fit the four-byte length field.
    #[error("NDEF payload of {0} bytes exceeds the 32-bit length field")]
    PayloadTooLarge(u64),

    /// Text was requested from a record that is not a well-known text record.
    #[error("NDEF record of type '{0}' is not a text record")]
    NotText(String),

    /// A text record payload could not be decoded.
    #[error("Malformed NDEF text payload: {0}")]
    MalformedText(String),
}

/// Type Name Format of a record (the low three header bits).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tnf {
    /// Record with no type, id or payload.
    Empty,
    /// NFC Forum well-known type (text, URI, ...).
    WellKnown,
    /// RFC 2046 media type.
    Mime,
    /// RFC 3986 absolute URI.
    AbsoluteUri,
    /// NFC Forum external type.
    External,
    /// Unknown payload type.
    Unknown,
    /// Continuation of a chunked payload.
    Unchanged,
    /// Reserved value.
    Reserved,
}

impl Tnf {
    const fn from_header(header: u8) -> Self {
        match header & TNF_MASK {
            0x00 => Self::Empty,
            0x01 => Self::WellKnown,
            0x02 => Self::Mime,
            0x03 => Self::AbsoluteUri,
            0x04 => Self::External,
            0x05 => Self::Unknown,
            0x06 => Self::Unchanged,
            _ => Self::Reserved,
        }
    }

    const fn bits(self) -> u8 {
        match self {
            Self::Empty => 0x00,
            Self::WellKnown => 0x01,
            Self::Mime => 0x02,
            Self::AbsoluteUri => 0x03,
            Self::External => 0x04,
            Self::Unknown => 0x05,
            Self::Unchanged => 0x06,
            Self::Reserved => 0x07,
        }
    }
}

/// Character encoding of a text record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextPayloadFormat {
    /// UTF-8 text (status bit 7 clear).
    Utf8,
    /// UTF-16 text (status bit 7 set).
    Utf16,
}

/// Decoded contents of a well-known text record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPayload {
    /// Encoding the text was stored with.
    pub format: TextPayloadFormat,
    /// IANA language code, e.g. `en`.
    pub language: String,
    /// The text itself.
    pub text: String,
}

/// A single NDEF record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    tnf: Tnf,
    record_type: Vec<u8>,
    id: Vec<u8>,
    payload: Vec<u8>,
}

impl NdefRecord {
    /// Create a record, checking that every field fits its length field.
    ///
    /// # Errors
    ///
    /// Returns [`NdefError::FieldTooLong`] when the type or id exceeds 255 bytes and
    /// [`NdefError::PayloadTooLarge`] when the payload exceeds `u32::MAX` bytes.
    pub fn new(
        tnf: Tnf,
        record_type: Vec<u8>,
        id: Vec<u8>,
        payload: Vec<u8>,
    ) -> Result<Self, NdefError> {
        if record_type.len() > usize::from(u8::MAX) {
            return Err(NdefError::FieldTooLong {
                field: "type",
                len: record_type.len(),
            });
        }
        if id.len() > usize::from(u8::MAX) {
            return Err(NdefError::FieldTooLong {
                field: "id",
                len: id.len(),
            });
        }
        if u32::try_from(payload.len()).is_err() {
            return Err(NdefError::PayloadTooLarge(payload.len() as u64));
        }
        Ok(Self {
            tnf,
            record_type,
            id,
            payload,
        })
    }

    /// Create a UTF-8 well-known text record.
    ///
    /// Language codes longer than [`MAX_LANGUAGE_CODE_LEN`] bytes are cut at the
    /// nearest character boundary below the limit.
    #[must_use]
    pub fn text(language_code: &str, text: &str) -> Self {
        let mut end = language_code.len().min(MAX_LANGUAGE_CODE_LEN);
        while !language_code.is_char_boundary(end) {
            end -= 1;
        }
        let language = &language_code.as_bytes()[..end];

        let mut payload = Vec::with_capacity(1 + language.len() + text.len());
        payload.push(length_byte(end) & TEXT_LANGUAGE_LEN_MASK);
        payload.extend_from_slice(language);
        payload.extend_from_slice(text.as_bytes());

        Self {
            tnf: Tnf::WellKnown,
            record_type: TEXT_RECORD_TYPE.to_vec(),
            id: Vec::new(),
            payload,
        }
    }

    /// Type Name Format of the record.
    #[must_use]
    pub const fn tnf(&self) -> Tnf {
        self.tnf
    }

    /// Record type bytes.
    #[must_use]
    pub fn record_type(&self) -> &[u8] {
        &self.record_type
    }

    /// Record id bytes (empty when the record has none).
    #[must_use]
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns `true` for a well-known `T` record.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.tnf == Tnf::WellKnown && self.record_type == TEXT_RECORD_TYPE
    }

    /// Decode the record as a text record.
    ///
    /// # Errors
    ///
    /// Returns [`NdefError::NotText`] for any other record type and
    /// [`NdefError::MalformedText`] when the payload cannot be decoded.
    pub fn text_payload(&self) -> Result<TextPayload, NdefError> {
        if !self.is_text() {
            return Err(NdefError::NotText(
                String::from_utf8_lossy(&self.record_type).into_owned(),
            ));
        }

        let (&status, rest) = self
            .payload
            .split_first()
            .ok_or_else(|| NdefError::MalformedText("missing status byte".into()))?;

        let language_len = usize::from(status & TEXT_LANGUAGE_LEN_MASK);
        if rest.len() < language_len {
            return Err(NdefError::MalformedText(format!(
                "language code of {language_len} bytes overruns a {} byte payload",
                self.payload.len()
            )));
        }
        let (language, body) = rest.split_at(language_len);
        let language = std::str::from_utf8(language)
            .map_err(|e| NdefError::MalformedText(format!("language code: {e}")))?
            .to_string();

        let (format, text) = if status & TEXT_STATUS_UTF16 == 0 {
            let text = std::str::from_utf8(body)
                .map_err(|e| NdefError::MalformedText(format!("UTF-8 text: {e}")))?;
            (TextPayloadFormat::Utf8, text.to_string())
        } else {
            (TextPayloadFormat::Utf16, decode_utf16(body)?)
        };

        Ok(TextPayload {
            format,
            language,
            text,
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>, begin: bool, end: bool) {
        let short = self.payload.len() <= usize::from(u8::MAX);

        let mut header = self.tnf.bits();
        if begin {
            header |= FLAG_MESSAGE_BEGIN;
        }
        if end {
            header |= FLAG_MESSAGE_END;
        }
        if short {
            header |= FLAG_SHORT_RECORD;
        }
        if !self.id.is_empty() {
            header |= FLAG_ID_LENGTH;
        }

        out.push(header);
        out.push(length_byte(self.record_type.len()));
        if short {
            out.push(length_byte(self.payload.len()));
        } else {
            out.extend_from_slice(&length_word(self.payload.len()).to_be_bytes());
        }
        if !self.id.is_empty() {
            out.push(length_byte(self.id.len()));
        }
        out.extend_from_slice(&self.record_type);
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&self.payload);
    }
}

/// An ordered, non-empty sequence of NDEF records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefMessage {
    records: Vec<NdefRecord>,
}

impl NdefMessage {
    /// Create a message holding a single record.
    #[must_use]
    pub fn new(record: NdefRecord) -> Self {
        Self {
            records: vec![record],
        }
    }

    /// Create a message from a list of records.
    ///
    /// # Errors
    ///
    /// Returns [`NdefError::Empty`] if `records` is empty.
    pub fn from_records(records: Vec<NdefRecord>) -> Result<Self, NdefError> {
        if records.is_empty() {
            return Err(NdefError::Empty);
        }
        Ok(Self { records })
    }

    /// The records in order. Never empty.
    #[must_use]
    pub fn records(&self) -> &[NdefRecord] {
        &self.records
    }

    /// Decode the first record as text.
    ///
    /// # Errors
    ///
    /// Propagates [`NdefRecord::text_payload`] errors.
    pub fn first_text(&self) -> Result<TextPayload, NdefError> {
        self.records[0].text_payload()
    }

    /// Encode the message to its wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let last = self.records.len() - 1;
        for (index, record) in self.records.iter().enumerate() {
            record.encode_into(&mut out, index == 0, index == last);
        }
        out
    }

    /// Parse a message from its wire form.
    ///
    /// # Errors
    ///
    /// Returns an [`NdefError`] describing the first structural problem found.
    pub fn parse(bytes: &[u8]) -> Result<Self, NdefError> {
        if bytes.is_empty() {
            return Err(NdefError::Empty);
        }

        let mut reader = ByteReader::new(bytes);
        let mut records = Vec::new();

        loop {
            let offset = reader.position();
            let header = reader.u8()?;

            if header & FLAG_CHUNK != 0 {
                return Err(NdefError::ChunkedRecord);
            }
            let begins = header & FLAG_MESSAGE_BEGIN != 0;
            if records.is_empty() && !begins {
                return Err(NdefError::MissingMessageBegin);
            }
            if !records.is_empty() && begins {
                return Err(NdefError::UnexpectedMessageBegin { offset });
            }

            let type_len = usize::from(reader.u8()?);
            let payload_len = if header & FLAG_SHORT_RECORD != 0 {
                usize::from(reader.u8()?)
            } else {
                let len = reader.u32()?;
                usize::try_from(len).map_err(|_| NdefError::PayloadTooLarge(u64::from(len)))?
            };
            let id_len = if header & FLAG_ID_LENGTH != 0 {
                usize::from(reader.u8()?)
            } else {
                0
            };

            let record_type = reader.take(type_len)?.to_vec();
            let id = reader.take(id_len)?.to_vec();
            let payload = reader.take(payload_len)?.to_vec();

            records.push(NdefRecord {
                tnf: Tnf::from_header(header),
                record_type,
                id,
                payload,
            });

            if header & FLAG_MESSAGE_END != 0 {
                break;
            }
            if reader.remaining() == 0 {
                return Err(NdefError::MissingMessageEnd);
            }
        }

        match reader.remaining() {
            0 => Ok(Self { records }),
            count => Err(NdefError::TrailingBytes { count }),
        }
    }
}

/// Build the single-record text message written to freshly formatted tags.
#[must_use]
pub fn build_text_message(language_code: &str, text: &str) -> NdefMessage {
    NdefMessage::new(NdefRecord::text(language_code, text))
}

// Callers bound `len` first (`NdefRecord::new`, `MAX_LANGUAGE_CODE_LEN`).
#[allow(clippy::cast_possible_truncation)]
const fn length_byte(len: usize) -> u8 {
    len as u8
}

#[allow(clippy::cast_possible_truncation)]
const fn length_word(len: usize) -> u32 {
    len as u32
}

fn decode_utf16(body: &[u8]) -> Result<String, NdefError> {
    if body.len() % 2 != 0 {
        return Err(NdefError::MalformedText(format!(
            "UTF-16 text has odd length {}",
            body.len()
        )));
    }

    // Big-endian unless a byte order mark says otherwise.
    let (little_endian, body) = match body {
        [0xFF, 0xFE, rest @ ..] => (true, rest),
        [0xFE, 0xFF, rest @ ..] => (false, rest),
        _ => (false, body),
    };

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            let bytes = [pair[0], pair[1]];
            if little_endian {
                u16::from_le_bytes(bytes)
            } else {
                u16::from_be_bytes(bytes)
            }
        })
        .collect();

    String::from_utf16(&units).map_err(|e| NdefError::MalformedText(format!("UTF-16 text: {e}")))
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    const fn position(&self) -> usize {
        self.pos
    }

    const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], NdefError> {
        if len > self.remaining() {
            return Err(NdefError::Truncated {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, NdefError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, NdefError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
