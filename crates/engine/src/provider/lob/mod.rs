//! Lob physical mail provider.
//!
//! Letters are created through `POST /v1/letters`, authenticated with the API
//! key as the basic-auth user and an empty password.

use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::errors::{ProviderError, ProviderErrorKind};
use crate::models::{Capability, PostalAddress, RequestEnvelope};
use crate::provider::http::{self, DEFAULT_TIMEOUT};
use crate::provider::{Provider, ProviderResult};

const BASE_URL: &str = "https://api.lob.com";
const VENDOR: &str = "lob";
const CAPABILITIES: &[Capability] = &[Capability::LetterSend, Capability::LetterStatus];

#[derive(Debug, Deserialize)]
struct LetterResponse {
    id: Option<String>,
    expected_delivery_date: Option<String>,
    tracking_number: Option<String>,
    #[serde(default)]
    tracking_events: Vec<Value>,
}

pub struct LobProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl LobProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http::build_client(DEFAULT_TIMEOUT),
            api_key: api_key.into(),
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

    fn address(request: &RequestEnvelope, key: &str) -> Result<PostalAddress, ProviderError> {
        let raw = request.get(key).cloned().ok_or_else(|| {
            ProviderError::permanent(
                ProviderErrorKind::InvalidRequest,
                format!("missing required parameter '{}' for {}", key, request.capability()),
            )
        })?;
        serde_json::from_value(raw).map_err(|e| {
            ProviderError::permanent(
                ProviderErrorKind::InvalidRequest,
                format!("invalid {}: {}", key, e),
            )
        })
    }

    /// Lob's flat address object.
    fn address_json(address: &PostalAddress) -> Value {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(address.name));
        fields.insert("address_line1".into(), json!(address.address_line1));
        if let Some(line2) = &address.address_line2 {
            fields.insert("address_line2".into(), json!(line2));
        }
        fields.insert("address_city".into(), json!(address.city));
        fields.insert("address_state".into(), json!(address.state));
        fields.insert("address_zip".into(), json!(address.zip));
        fields.insert("address_country".into(), json!(address.country));
        Value::Object(fields)
    }

    fn build_letter(request: &RequestEnvelope) -> Result<Value, ProviderError> {
        let to = Self::address(request, "to_address")?;
        let from = Self::address(request, "from_address")?;
        let content = request.require_str("content")?;

        Ok(json!({
            "to": Self::address_json(&to),
            "from": Self::address_json(&from),
            "file": content,
            "color": request.bool_param("color").unwrap_or(false),
        }))
    }

    async fn send_letter(&self, request: &RequestEnvelope) -> ProviderResult {
        let letter = Self::build_letter(request)?;
        let url = format!("{}/v1/letters", self.base_url);

        let body = http::send_json(
            VENDOR,
            self.client
                .post(url)
                .basic_auth(&self.api_key, Some(""))
                .json(&letter),
        )
        .await?;
        let parsed = parse_letter(body)?;
        let letter_id = parsed.id.ok_or_else(|| {
            ProviderError::permanent(ProviderErrorKind::Decode, "Lob returned no letter id")
        })?;

        info!("Lob letter {} created", letter_id);
        Ok(json!({
            "letter_id": letter_id,
            "expected_delivery_date": parsed.expected_delivery_date,
            "tracking_number": parsed.tracking_number,
        }))
    }

    async fn letter_status(&self, request: &RequestEnvelope) -> ProviderResult {
        let letter_id = request.require_str("letter_id")?;
        let url = format!(
            "{}/v1/letters/{}",
            self.base_url,
            urlencoding::encode(letter_id)
        );

        let body = http::send_json(
            VENDOR,
            self.client.get(url).basic_auth(&self.api_key, Some("")),
        )
        .await?;
        let parsed = parse_letter(body)?;

        let status = parsed
            .tracking_events
            .last()
            .and_then(|e| e.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("created")
            .to_string();

        Ok(json!({
            "letter_id": letter_id,
            "status": status,
            "expected_delivery_date": parsed.expected_delivery_date,
            "tracking_events": parsed.tracking_events,
        }))
    }
}

fn parse_letter(body: Value) -> Result<LetterResponse, ProviderError> {
    serde_json::from_value(body).map_err(|e| {
        ProviderError::permanent(
            ProviderErrorKind::Decode,
            format!("unexpected Lob response: {}", e),
        )
    })
}

#[async_trait]
impl Provider for LobProvider {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn invoke(&self, request: &RequestEnvelope) -> ProviderResult {
        match request.capability() {
            Capability::LetterSend => self.send_letter(request).await,
            Capability::LetterStatus => self.letter_status(request).await,
            other => Err(http::unsupported(VENDOR, other)),
        }
    }
}
