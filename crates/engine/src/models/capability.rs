//! The closed set of external actions the engine can route.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;

/// A category of external action exposed through one contract across vendors.
///
/// The set is closed at compile time. Vendors are keyed by a free-form name
/// inside the registry, but the capability itself is always one of these.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "email.send")]
    EmailSend,
    #[serde(rename = "email.status")]
    EmailStatus,
    #[serde(rename = "object.upload")]
    ObjectUpload,
    #[serde(rename = "object.download")]
    ObjectDownload,
    #[serde(rename = "object.delete")]
    ObjectDelete,
    #[serde(rename = "object.list")]
    ObjectList,
    #[serde(rename = "envelope.create")]
    EnvelopeCreate,
    #[serde(rename = "envelope.status")]
    EnvelopeStatus,
    #[serde(rename = "envelope.void")]
    EnvelopeVoid,
    #[serde(rename = "search.query")]
    SearchQuery,
    #[serde(rename = "document.index")]
    DocumentIndex,
    #[serde(rename = "letter.send")]
    LetterSend,
    #[serde(rename = "letter.status")]
    LetterStatus,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 13] = [
        Capability::EmailSend,
        Capability::EmailStatus,
        Capability::ObjectUpload,
        Capability::ObjectDownload,
        Capability::ObjectDelete,
        Capability::ObjectList,
        Capability::EnvelopeCreate,
        Capability::EnvelopeStatus,
        Capability::EnvelopeVoid,
        Capability::SearchQuery,
        Capability::DocumentIndex,
        Capability::LetterSend,
        Capability::LetterStatus,
    ];

    /// Stable wire name, also used in audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailSend => "email.send",
            Self::EmailStatus => "email.status",
            Self::ObjectUpload => "object.upload",
            Self::ObjectDownload => "object.download",
            Self::ObjectDelete => "object.delete",
            Self::ObjectList => "object.list",
            Self::EnvelopeCreate => "envelope.create",
            Self::EnvelopeStatus => "envelope.status",
            Self::EnvelopeVoid => "envelope.void",
            Self::SearchQuery => "search.query",
            Self::DocumentIndex => "document.index",
            Self::LetterSend => "letter.send",
            Self::LetterStatus => "letter.status",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigurationError::UnknownCapabilityName(s.to_string()))
    }
}
