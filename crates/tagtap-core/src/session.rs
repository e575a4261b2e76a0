//! One tag session: connect, format or skip, disconnect.
//!
//! A [`TagSession`] owns the tag handle for a single discovery event. It classifies the
//! tag, runs at most one connect and one format attempt, and always releases the
//! channel it acquired before returning a [`SessionOutcome`]. Errors never escape the
//! session; they become [`SessionOutcome::Failed`].
//!
//! ```text
//! Idle ──connect──▶ Connected ──format──▶ Closed
//!  │                    │
//!  └──connect error──▶ Failed ◀──format error
//! ```

use std::fmt;

use serde::Serialize;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::channel::{ChannelGuard, Tag};
use crate::config::RecordConfig;
use crate::identifier::TagIdentifier;
use crate::ndef::build_text_message;
use crate::technology::{classify, Strategy, TagTechnology};

/// Why a session failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SessionFailure {
    /// The channel could not be opened (tag left the field, technology mismatch).
    Connect(String),
    /// The tag or transport rejected the format operation.
    Format(String),
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(message) => write!(f, "connect failed: {message}"),
            Self::Format(message) => write!(f, "format failed: {message}"),
        }
    }
}

/// Result of one tag session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The tag was formatted with the configured text record.
    Formatted,
    /// The tag already holds NDEF data and is not formatable.
    AlreadyFormatted,
    /// The tag offers no technology tagtap can use.
    Unsupported,
    /// Connect or format failed.
    Failed(SessionFailure),
}

impl SessionOutcome {
    /// Returns `true` only for [`SessionOutcome::Formatted`].
    #[must_use]
    pub const fn is_formatted(&self) -> bool {
        matches!(self, Self::Formatted)
    }

    /// The failure reason, if the session failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&SessionFailure> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Holding the tag and its classification; nothing opened yet.
    Idle,
    /// Channel open.
    Connected,
    /// Session finished and any channel released.
    Closed,
    /// Session ended in failure; any channel has been released.
    Failed(SessionFailure),
}

/// Owns one tag for the duration of one discovery event.
pub struct TagSession<T: Tag> {
    id: Uuid,
    tag: T,
    technology: TagTechnology,
    record: RecordConfig,
    state: SessionState,
}

impl<T: Tag> TagSession<T> {
    /// Start a session for `tag`, writing `record` if the tag gets formatted.
    pub fn new(tag: T, record: RecordConfig) -> Self {
        let technology = classify(&tag);
        Self {
            id: Uuid::new_v4(),
            tag,
            technology,
            record,
            state: SessionState::Idle,
        }
    }

    /// The tag's capability set.
    #[must_use]
    pub const fn technology(&self) -> &TagTechnology {
        &self.technology
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the session to completion. Consumes the session and its tag handle.
    pub fn run(mut self) -> SessionOutcome {
        let tag_id = TagIdentifier::from(self.tag.id());
        let span = info_span!("tag_session", session_id = %self.id, %tag_id);
        let _entered = span.enter();
        self.execute()
    }

    fn execute(&mut self) -> SessionOutcome {
        match self.technology.strategy() {
            Strategy::Format => self.format(),
            Strategy::AlreadyFormatted => {
                info!(technology = %self.technology, "Tag already holds NDEF data, not formatting");
                self.transition(SessionState::Closed);
                SessionOutcome::AlreadyFormatted
            }
            Strategy::Unsupported => {
                info!(technology = %self.technology, "Tag is not NDEF-formatable");
                self.transition(SessionState::Closed);
                SessionOutcome::Unsupported
            }
        }
    }

    fn format(&mut self) -> SessionOutcome {
        let Some(channel) = self.tag.ndef_formatable() else {
            return self.fail(SessionFailure::Connect(
                "tag reported NDEF-formatable but exposed no channel".to_string(),
            ));
        };
        let mut channel = ChannelGuard::new(channel);

        if let Err(e) = channel.connect() {
            drop(channel);
            return self.fail(SessionFailure::Connect(e.to_string()));
        }
        self.transition(SessionState::Connected);

        let message = build_text_message(&self.record.language, &self.record.text);
        let formatted = channel.format(&message);

        if let Err(e) = channel.close() {
            warn!(error = %e, "Failed to close NDEF-formatable channel");
        }

        match formatted {
            Ok(()) => {
                self.transition(SessionState::Closed);
                info!(
                    language = %self.record.language,
                    text = %self.record.text,
                    "Tag formatted"
                );
                SessionOutcome::Formatted
            }
            Err(e) => self.fail(SessionFailure::Format(e.to_string())),
        }
    }

    fn fail(&mut self, reason: SessionFailure) -> SessionOutcome {
        error!(%reason, "Tag session failed");
        self.transition(SessionState::Failed(reason.clone()));
        SessionOutcome::Failed(reason)
    }

    fn transition(&mut self, next: SessionState) {
        info!(from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBehavior, MockTag};
    use crate::ndef::NdefMessage;

    fn session(tag: MockTag) -> TagSession<MockTag> {
        TagSession::new(tag, RecordConfig::default())
    }

    #[test]
    fn test_formatable_tag_is_formatted() {
        let tag = MockTag::new([0x04, 0xA2, 0x19, 0x3C], ["NfcA", "NdefFormatable"]);
        let probe = tag.probe();

        let mut session = session(tag);
        assert_eq!(session.state(), &SessionState::Idle);
        assert_eq!(session.execute(), SessionOutcome::Formatted);
        assert_eq!(session.state(), &SessionState::Closed);

        let written: NdefMessage = probe.ndef_message().unwrap().unwrap();
        assert_eq!(written.records().len(), 1);
        let text = written.first_text().unwrap();
        assert_eq!((text.language.as_str(), text.text.as_str()), ("en", "test"));

        assert_eq!(probe.stats().connects(), 1);
        assert_eq!(probe.stats().closes(), 1);
    }

    #[test]
    fn test_classic_only_tag_is_unsupported() {
        let tag = MockTag::new([0x01], ["MifareClassic"]);
        let probe = tag.probe();

        let mut session = session(tag);
        assert_eq!(session.execute(), SessionOutcome::Unsupported);
        assert_eq!(session.state(), &SessionState::Closed);
        assert_eq!(probe.stats().connects(), 0);
        assert_eq!(probe.stats().closes(), 0);
    }

    #[test]
    fn test_ndef_tag_is_already_formatted() {
        let tag = MockTag::new([0x01], ["NfcA", "Ndef"]);
        let probe = tag.probe();

        assert_eq!(session(tag).run(), SessionOutcome::AlreadyFormatted);
        assert_eq!(probe.stats().connects(), 0);
        assert!(probe.ndef_message().is_none());
    }

    #[test]
    fn test_connect_failure_still_closes_once() {
        let tag = MockTag::new([0x01], ["NdefFormatable"]).with_behavior(MockBehavior {
            fail_connect: true,
            ..MockBehavior::default()
        });
        let probe = tag.probe();

        let mut session = session(tag);
        let outcome = session.execute();
        assert!(matches!(
            outcome,
            SessionOutcome::Failed(SessionFailure::Connect(_))
        ));
        assert!(matches!(session.state(), SessionState::Failed(SessionFailure::Connect(_))));
        assert_eq!(probe.stats().connects(), 1);
        assert_eq!(probe.stats().closes(), 1);
        assert_eq!(probe.stats().formats(), 0);
    }

    #[test]
    fn test_format_failure_closes_once() {
        let tag = MockTag::new([0x01], ["NdefFormatable"]).with_behavior(MockBehavior {
            fail_format: true,
            ..MockBehavior::default()
        });
        let probe = tag.probe();

        let outcome = session(tag).run();
        assert_eq!(
            outcome.failure(),
            Some(&SessionFailure::Format(
                "Tag rejected the operation: tag is read-only".to_string()
            ))
        );
        assert_eq!(probe.stats().connects(), 1);
        assert_eq!(probe.stats().formats(), 1);
        assert_eq!(probe.stats().closes(), 1);
    }

    #[test]
    fn test_close_error_does_not_change_outcome() {
        let tag = MockTag::new([0x01], ["NdefFormatable"]).with_behavior(MockBehavior {
            fail_close: true,
            ..MockBehavior::default()
        });
        let probe = tag.probe();

        assert!(session(tag).run().is_formatted());
        assert_eq!(probe.stats().closes(), 1);
    }

    #[test]
    fn test_missing_channel_is_connect_failure() {
        let tag = MockTag::new([0x01], ["NdefFormatable"]).with_behavior(MockBehavior {
            withhold_channels: true,
            ..MockBehavior::default()
        });
        let probe = tag.probe();

        assert!(matches!(
            session(tag).run(),
            SessionOutcome::Failed(SessionFailure::Connect(_))
        ));
        assert_eq!(probe.stats().connects(), 0);
        assert_eq!(probe.stats().closes(), 0);
    }

    #[test]
    fn test_custom_record_is_written() {
        let tag = MockTag::new([0x01], ["NdefFormatable"]);
        let probe = tag.probe();
        let record = RecordConfig {
            language: "fr".to_string(),
            text: "bonjour".to_string(),
        };

        assert!(TagSession::new(tag, record).run().is_formatted());
        let text = probe.ndef_message().unwrap().unwrap().first_text().unwrap();
        assert_eq!(text.language, "fr");
        assert_eq!(text.text, "bonjour");
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(SessionOutcome::Failed(SessionFailure::Connect(
            "lost".to_string(),
        )))
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"]["kind"], "connect");
        assert_eq!(json["reason"]["message"], "lost");

        let json = serde_json::to_value(SessionOutcome::Formatted).unwrap();
        assert_eq!(json["status"], "formatted");
    }
}
