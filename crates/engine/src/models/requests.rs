//! Typed builders for the common capabilities.
//!
//! These are conveniences over [`RequestEnvelope`]: each serializes into the
//! parameter names the bundled adapters read. Callers that already hold a
//! parameter map can skip them and build the envelope directly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Capability, Params, RequestEnvelope};

/// A request type bound to one capability.
pub trait CapabilityRequest: Serialize {
    const CAPABILITY: Capability;

    fn into_envelope(self) -> RequestEnvelope
    where
        Self: Sized,
    {
        let params = match serde_json::to_value(&self) {
            Ok(Value::Object(map)) => map,
            _ => Params::new(),
        };
        RequestEnvelope::new(Self::CAPABILITY, params)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    /// HTML or plain-text body.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
}

impl EmailMessage {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn from_email(mut self, from: impl Into<String>) -> Self {
        self.from_email = Some(from.into());
        self
    }

    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }
}

impl CapabilityRequest for EmailMessage {
    const CAPABILITY: Capability = Capability::EmailSend;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectUpload {
    pub file_path: PathBuf,
    pub bucket: String,
    /// Defaults to the file name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
}

impl ObjectUpload {
    pub fn new(file_path: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            bucket: bucket.into(),
            object_name: None,
        }
    }

    pub fn object_name(mut self, name: impl Into<String>) -> Self {
        self.object_name = Some(name.into());
        self
    }
}

impl CapabilityRequest for ObjectUpload {
    const CAPABILITY: Capability = Capability::ObjectUpload;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signer {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeRequest {
    pub document_path: PathBuf,
    pub signers: Vec<Signer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl CapabilityRequest for EnvelopeRequest {
    const CAPABILITY: Capability = Capability::EnvelopeCreate;
}

fn default_limit() -> u32 {
    10
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub index: String,
    /// Exact-match term filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Params>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            index: index.into(),
            filters: None,
            limit: default_limit(),
        }
    }
}

impl CapabilityRequest for SearchQuery {
    const CAPABILITY: Capability = Capability::SearchQuery;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub name: String,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "US".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LetterRequest {
    pub to_address: PostalAddress,
    pub from_address: PostalAddress,
    /// Letter body, or a URL / file id understood by the vendor.
    pub content: String,
    #[serde(default)]
    pub color: bool,
}

impl CapabilityRequest for LetterRequest {
    const CAPABILITY: Capability = Capability::LetterSend;
}
