//! DocuSign e-signature provider.
//!
//! Uses the eSignature REST API v2.1. The adapter expects an already issued
//! access token; the OAuth grant that produces it belongs to the caller.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::info;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{ProviderError, ProviderErrorKind};
use crate::models::{Capability, RequestEnvelope};
use crate::provider::http::{self, DEFAULT_TIMEOUT};
use crate::provider::{Provider, ProviderResult};

const BASE_URL: &str = "https://demo.docusign.net/restapi";
const VENDOR: &str = "docusign";
const CAPABILITIES: &[Capability] = &[
    Capability::EnvelopeCreate,
    Capability::EnvelopeStatus,
    Capability::EnvelopeVoid,
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeSummary {
    envelope_id: Option<String>,
    status: Option<String>,
    created_date_time: Option<String>,
    sent_date_time: Option<String>,
    completed_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignerParam {
    email: String,
    name: Option<String>,
}

pub struct DocuSignProvider {
    client: Client,
    access_token: String,
    account_id: String,
    base_url: String,
}

impl DocuSignProvider {
    pub fn new(access_token: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            client: http::build_client(DEFAULT_TIMEOUT),
            access_token: access_token.into(),
            account_id: account_id.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = http::normalize_base_url(base_url);
        self
    }

    fn envelopes_url(&self) -> String {
        format!("{}/v2.1/accounts/{}/envelopes", self.base_url, self.account_id)
    }

    fn signers(request: &RequestEnvelope) -> Result<Vec<SignerParam>, ProviderError> {
        let raw = request.get("signers").cloned().unwrap_or(Value::Null);
        let signers: Vec<SignerParam> = serde_json::from_value(raw).map_err(|e| {
            ProviderError::permanent(
                ProviderErrorKind::InvalidRequest,
                format!("invalid signers: {}", e),
            )
        })?;
        if signers.is_empty() {
            return Err(ProviderError::permanent(
                ProviderErrorKind::InvalidRequest,
                "an envelope needs at least one signer",
            ));
        }
        Ok(signers)
    }

    /// Build the envelope definition from an already-read document.
    fn envelope_definition(
        document: &Path,
        content: &[u8],
        signers: &[SignerParam],
        subject: Option<&str>,
    ) -> Value {
        let name = document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let extension = document
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pdf".to_string());

        let signers: Vec<Value> = signers
            .iter()
            .enumerate()
            .map(|(i, signer)| {
                let id = (i + 1).to_string();
                json!({
                    "email": signer.email,
                    "name": signer.name.as_deref().unwrap_or(&signer.email),
                    "recipientId": id,
                    "routingOrder": id,
                    "tabs": {
                        "signHereTabs": [{
                            "documentId": "1",
                            "pageNumber": "1",
                            "recipientId": id,
                            "xPosition": "100",
                            "yPosition": "100",
                        }]
                    }
                })
            })
            .collect();

        json!({
            "emailSubject": subject.unwrap_or("Please sign this document"),
            "documents": [{
                "documentBase64": BASE64.encode(content),
                "name": name,
                "fileExtension": extension,
                "documentId": "1",
            }],
            "recipients": { "signers": signers },
            "status": "sent",
        })
    }

    async fn create_envelope(&self, request: &RequestEnvelope) -> ProviderResult {
        let document = Path::new(request.require_str("document_path")?);
        let signers = Self::signers(request)?;
        let content = tokio::fs::read(document).await.map_err(|e| {
            ProviderError::permanent(
                ProviderErrorKind::NotFound,
                format!("cannot read document {}: {}", document.display(), e),
            )
        })?;

        let definition =
            Self::envelope_definition(document, &content, &signers, request.str_param("subject"));

        let body = http::send_json(
            VENDOR,
            self.client
                .post(self.envelopes_url())
                .bearer_auth(&self.access_token)
                .json(&definition),
        )
        .await?;

        let summary = parse_summary(body)?;
        let envelope_id = summary.envelope_id.ok_or_else(|| {
            ProviderError::permanent(ProviderErrorKind::Decode, "DocuSign returned no envelopeId")
        })?;

        info!("DocuSign envelope {} created", envelope_id);
        Ok(json!({ "envelope_id": envelope_id, "status": summary.status }))
    }

    async fn envelope_status(&self, request: &RequestEnvelope) -> ProviderResult {
        let envelope_id = request.require_str("envelope_id")?;
        let url = format!(
            "{}/{}",
            self.envelopes_url(),
            urlencoding::encode(envelope_id)
        );

        let body = http::send_json(
            VENDOR,
            self.client.get(url).bearer_auth(&self.access_token),
        )
        .await?;
        let summary = parse_summary(body)?;

        Ok(json!({
            "envelope_id": envelope_id,
            "status": summary.status,
            "created": summary.created_date_time,
            "sent": summary.sent_date_time,
            "completed": summary.completed_date_time,
        }))
    }

    async fn void_envelope(&self, request: &RequestEnvelope) -> ProviderResult {
        let envelope_id = request.require_str("envelope_id")?;
        let reason = request.require_str("reason")?;
        let url = format!(
            "{}/{}",
            self.envelopes_url(),
            urlencoding::encode(envelope_id)
        );

        http::send(
            VENDOR,
            self.client
                .put(url)
                .bearer_auth(&self.access_token)
                .json(&json!({ "status": "voided", "voidedReason": reason })),
        )
        .await?;

        info!("DocuSign envelope {} voided", envelope_id);
        Ok(json!({ "envelope_id": envelope_id, "voided": true }))
    }
}

fn parse_summary(body: Value) -> Result<EnvelopeSummary, ProviderError> {
    serde_json::from_value(body).map_err(|e| {
        ProviderError::permanent(
            ProviderErrorKind::Decode,
            format!("unexpected DocuSign response: {}", e),
        )
    })
}

#[async_trait]
impl Provider for DocuSignProvider {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn invoke(&self, request: &RequestEnvelope) -> ProviderResult {
        match request.capability() {
            Capability::EnvelopeCreate => self.create_envelope(request).await,
            Capability::EnvelopeStatus => self.envelope_status(request).await,
            Capability::EnvelopeVoid => self.void_envelope(request).await,
            other => Err(http::unsupported(VENDOR, other)),
        }
    }
}
