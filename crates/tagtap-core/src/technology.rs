//! Tag capability classification.
//!
//! The platform reports a list of technology names per tag. [`classify`] maps that list
//! onto the capabilities tagtap knows how to handle, and [`TagTechnology::strategy`]
//! picks the single handling path for a session.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::Tag;

/// A capability derived from one platform technology name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Blank tag that can be formatted to NDEF.
    NdefFormatable,
    /// Tag that already holds NDEF data.
    Ndef,
    /// Legacy sector-addressed MIFARE Classic memory.
    MifareClassic,
    /// Any technology tagtap does not handle.
    Other,
}

impl Capability {
    /// Map a technology name to a capability.
    ///
    /// Accepts short names (`NdefFormatable`) and fully qualified platform names
    /// (`android.nfc.tech.NdefFormatable`).
    #[must_use]
    pub fn from_tech_name(name: &str) -> Self {
        match name.rsplit('.').next().unwrap_or(name) {
            "NdefFormatable" => Self::NdefFormatable,
            "Ndef" => Self::Ndef,
            "MifareClassic" => Self::MifareClassic,
            _ => Self::Other,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::NdefFormatable => "NDEF-FORMATABLE",
            Self::Ndef => "NDEF",
            Self::MifareClassic => "MIFARE-CLASSIC",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a session should treat a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Connect on the NDEF-formatable channel and format.
    Format,
    /// Tag already holds NDEF data and cannot be formatted; leave it alone.
    AlreadyFormatted,
    /// Nothing tagtap can do with this tag.
    Unsupported,
}

/// The capability set of one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagTechnology {
    capabilities: BTreeSet<Capability>,
}

impl TagTechnology {
    /// Build the set from technology names. An empty list yields `{OTHER}`.
    pub fn from_tech_list<I, S>(tech_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut capabilities: BTreeSet<Capability> = tech_list
            .into_iter()
            .map(|name| Capability::from_tech_name(name.as_ref()))
            .collect();
        if capabilities.is_empty() {
            capabilities.insert(Capability::Other);
        }
        Self { capabilities }
    }

    /// Whether the set contains `capability`.
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// The capabilities in a stable order.
    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    /// Select exactly one handling strategy.
    ///
    /// NDEF-FORMATABLE wins over NDEF; everything else is unsupported.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        if self.contains(Capability::NdefFormatable) {
            Strategy::Format
        } else if self.contains(Capability::Ndef) {
            Strategy::AlreadyFormatted
        } else {
            Strategy::Unsupported
        }
    }
}

impl fmt::Display for TagTechnology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, capability) in self.capabilities.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{capability}")?;
        }
        f.write_str("}")
    }
}

/// Classify a tag from its reported technology list. Never opens a connection.
pub fn classify<T: Tag + ?Sized>(tag: &T) -> TagTechnology {
    let technology = TagTechnology::from_tech_list(tag.tech_list());
    debug!(
        tech_list = %tag.tech_list().join(","),
        %technology,
        "Classified tag technology"
    );
    technology
}
