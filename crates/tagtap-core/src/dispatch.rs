//! Discovery event handling.
//!
//! The host platform delivers one [`DiscoveryEvent`] per tap. The dispatcher filters
//! by action kind and by the foreground dispatch gate, pulls the tag handle out of the
//! event, runs a [`TagSession`] to completion, and hands a [`DisplayUpdate`] back to
//! the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channel::Tag;
use crate::config::{Config, RecordConfig};
use crate::error::TagtapError;
use crate::identifier::TagIdentifier;
use crate::session::{SessionOutcome, TagSession};

/// Notification shown when an event carried no tag.
pub const TAG_NOT_DETECTED: &str = "Tag not detected";

/// Platform action that produced a discovery event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    /// Any tag entered the field.
    TagDiscovered,
    /// A tag with NDEF data entered the field.
    NdefDiscovered,
    /// A tag matching a registered technology entered the field.
    TechDiscovered,
    /// Any other action; ignored.
    Other,
}

impl ActionKind {
    /// Parse a platform action name, with or without the `android.nfc.action.` prefix.
    #[must_use]
    pub fn from_action(action: &str) -> Self {
        match action.rsplit('.').next().unwrap_or(action) {
            "TAG_DISCOVERED" => Self::TagDiscovered,
            "NDEF_DISCOVERED" => Self::NdefDiscovered,
            "TECH_DISCOVERED" => Self::TechDiscovered,
            _ => Self::Other,
        }
    }

    /// Whether this action starts a tag session.
    #[must_use]
    pub const fn is_discovery(self) -> bool {
        !matches!(self, Self::Other)
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::TagDiscovered => "TAG_DISCOVERED",
            Self::NdefDiscovered => "NDEF_DISCOVERED",
            Self::TechDiscovered => "TECH_DISCOVERED",
            Self::Other => "OTHER",
        }
    }
}

impl From<String> for ActionKind {
    fn from(action: String) -> Self {
        Self::from_action(&action)
    }
}

impl From<ActionKind> for String {
    fn from(action: ActionKind) -> Self {
        action.as_str().to_string()
    }
}

/// A tag discovery notification from the platform.
#[derive(Debug, Clone)]
pub struct DiscoveryEvent<T> {
    /// What the platform reported.
    pub action: ActionKind,
    /// The tag handle, absent when the event is malformed.
    pub tag: Option<T>,
}

impl<T> DiscoveryEvent<T> {
    /// Create an event.
    pub const fn new(action: ActionKind, tag: Option<T>) -> Self {
        Self { action, tag }
    }
}

/// What the presentation layer should show after an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayUpdate {
    /// A tag was read and a session ran.
    Scanned {
        /// Identifier as colon-separated lowercase hex.
        tag_id: String,
        /// How the session ended.
        outcome: SessionOutcome,
        /// Transient user-facing message.
        notification: String,
        /// When the session finished.
        scanned_at_utc: DateTime<Utc>,
    },
    /// The event carried no usable tag.
    ExtractionError {
        /// Transient user-facing message.
        notification: String,
    },
}

impl DisplayUpdate {
    /// The user-facing notification text.
    #[must_use]
    pub fn notification(&self) -> &str {
        match self {
            Self::Scanned { notification, .. } | Self::ExtractionError { notification } => {
                notification
            }
        }
    }

    /// The displayed tag identifier, if a tag was read.
    #[must_use]
    pub fn tag_id(&self) -> Option<&str> {
        match self {
            Self::Scanned { tag_id, .. } => Some(tag_id),
            Self::ExtractionError { .. } => None,
        }
    }

    /// The session outcome, if a session ran.
    #[must_use]
    pub const fn outcome(&self) -> Option<&SessionOutcome> {
        match self {
            Self::Scanned { outcome, .. } => Some(outcome),
            Self::ExtractionError { .. } => None,
        }
    }
}

/// Routes discovery events to tag sessions.
#[derive(Debug, Clone)]
pub struct DiscoveryDispatcher {
    record: RecordConfig,
    foreground_enabled: bool,
}

impl DiscoveryDispatcher {
    /// Create a dispatcher with foreground dispatch disabled.
    #[must_use]
    pub const fn new(record: RecordConfig) -> Self {
        Self {
            record,
            foreground_enabled: false,
        }
    }

    /// Create a dispatcher from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            record: config.record.clone(),
            foreground_enabled: config.dispatch.foreground_on_start,
        }
    }

    /// Start accepting discovery events (application moved to the foreground).
    pub fn enable_foreground_dispatch(&mut self) {
        info!("Foreground dispatch enabled");
        self.foreground_enabled = true;
    }

    /// Stop accepting discovery events (application moved to the background).
    pub fn disable_foreground_dispatch(&mut self) {
        info!("Foreground dispatch disabled");
        self.foreground_enabled = false;
    }

    /// Whether discovery events are currently accepted.
    #[must_use]
    pub const fn is_foreground_dispatch_enabled(&self) -> bool {
        self.foreground_enabled
    }

    /// Handle one discovery event.
    ///
    /// Returns `None` when the event is ignored (dispatch disabled or not a discovery
    /// action). Otherwise returns exactly one display update; the session has run and
    /// released its channel by the time this returns.
    pub fn on_tag_discovered<T: Tag>(&self, event: DiscoveryEvent<T>) -> Option<DisplayUpdate> {
        if !self.foreground_enabled {
            debug!(action = ?event.action, "Foreground dispatch disabled, ignoring event");
            return None;
        }
        if !event.action.is_discovery() {
            debug!(action = ?event.action, "Ignoring non-discovery action");
            return None;
        }

        let Some(tag) = event.tag else {
            let error = TagtapError::TagNotPresent;
            warn!(code = error.error_code(), %error, "Discovery event without a tag");
            return Some(DisplayUpdate::ExtractionError {
                notification: TAG_NOT_DETECTED.to_string(),
            });
        };

        debug!(tech_list = %tag.tech_list().join(","), "Tag discovered");
        let tag_id = TagIdentifier::from(tag.id()).to_string();

        let outcome = TagSession::new(tag, self.record.clone()).run();
        info!(%tag_id, ?outcome, "Tag session finished");

        Some(DisplayUpdate::Scanned {
            notification: format!("the tag is {tag_id}"),
            tag_id,
            outcome,
            scanned_at_utc: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBehavior, MockTag};
    use crate::session::SessionFailure;

    fn dispatcher() -> DiscoveryDispatcher {
        DiscoveryDispatcher::from_config(&Config::default())
    }

    #[test]
    fn test_action_kind_parsing() {
        assert_eq!(ActionKind::from_action("TAG_DISCOVERED"), ActionKind::TagDiscovered);
        assert_eq!(
            ActionKind::from_action("android.nfc.action.NDEF_DISCOVERED"),
            ActionKind::NdefDiscovered
        );
        assert_eq!(
            ActionKind::from_action("android.nfc.action.TECH_DISCOVERED"),
            ActionKind::TechDiscovered
        );
        assert_eq!(ActionKind::from_action("android.intent.action.MAIN"), ActionKind::Other);
        assert!(!ActionKind::Other.is_discovery());
    }

    #[test]
    fn test_formattable_tag_update() {
        let tag = MockTag::new([0x04, 0xA2, 0x19, 0x3C], ["NdefFormatable"]);
        let update = dispatcher()
            .on_tag_discovered(DiscoveryEvent::new(ActionKind::TechDiscovered, Some(tag)))
            .unwrap();

        assert_eq!(update.tag_id(), Some("04:a2:19:3c"));
        assert_eq!(update.outcome(), Some(&SessionOutcome::Formatted));
        assert_eq!(update.notification(), "the tag is 04:a2:19:3c");
    }

    #[test]
    fn test_failed_session_still_reports_identifier() {
        let tag = MockTag::new([0xAB], ["NdefFormatable"]).with_behavior(MockBehavior {
            fail_connect: true,
            ..MockBehavior::default()
        });
        let update = dispatcher()
            .on_tag_discovered(DiscoveryEvent::new(ActionKind::TagDiscovered, Some(tag)))
            .unwrap();

        assert_eq!(update.notification(), "the tag is ab");
        assert!(matches!(
            update.outcome(),
            Some(SessionOutcome::Failed(SessionFailure::Connect(_)))
        ));
    }

    #[test]
    fn test_missing_tag_is_extraction_error() {
        let update = dispatcher()
            .on_tag_discovered(DiscoveryEvent::<MockTag>::new(ActionKind::TagDiscovered, None))
            .unwrap();

        assert_eq!(
            update,
            DisplayUpdate::ExtractionError {
                notification: TAG_NOT_DETECTED.to_string()
            }
        );
        assert!(update.tag_id().is_none());
    }

    #[test]
    fn test_other_actions_are_ignored() {
        let tag = MockTag::new([0x01], ["NdefFormatable"]);
        let probe = tag.probe();

        let update =
            dispatcher().on_tag_discovered(DiscoveryEvent::new(ActionKind::Other, Some(tag)));
        assert!(update.is_none());
        assert_eq!(probe.stats().connects(), 0);
    }

    #[test]
    fn test_foreground_gate() {
        let mut dispatcher = DiscoveryDispatcher::new(RecordConfig::default());
        assert!(!dispatcher.is_foreground_dispatch_enabled());

        let tag = MockTag::new([0x01], ["NdefFormatable"]);
        let probe = tag.probe();
        assert!(dispatcher
            .on_tag_discovered(DiscoveryEvent::new(ActionKind::TagDiscovered, Some(tag.clone())))
            .is_none());
        assert_eq!(probe.stats().connects(), 0);

        dispatcher.enable_foreground_dispatch();
        assert!(dispatcher
            .on_tag_discovered(DiscoveryEvent::new(ActionKind::TagDiscovered, Some(tag.clone())))
            .is_some());
        assert_eq!(probe.stats().connects(), 1);

        dispatcher.disable_foreground_dispatch();
        assert!(dispatcher
            .on_tag_discovered(DiscoveryEvent::new(ActionKind::TagDiscovered, Some(tag)))
            .is_none());
        assert_eq!(probe.stats().connects(), 1);
    }

    #[test]
    fn test_action_kind_deserializes_platform_names() {
        let kind: ActionKind =
            serde_json::from_str("\"android.nfc.action.TECH_DISCOVERED\"").unwrap();
        assert_eq!(kind, ActionKind::TechDiscovered);
        let kind: ActionKind = serde_json::from_str("\"SOMETHING_ELSE\"").unwrap();
        assert_eq!(kind, ActionKind::Other);
    }

    #[test]
    fn test_display_update_serialization() {
        let update = DisplayUpdate::ExtractionError {
            notification: TAG_NOT_DETECTED.to_string(),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["kind"], "extraction_error");
        assert_eq!(json["notification"], TAG_NOT_DETECTED);
    }
}
