//! SendGrid email provider.
//!
//! Sends through the v3 `/mail/send` endpoint. SendGrid answers 202 with an
//! empty body and reports the message id in the `X-Message-Id` header.
//! API documentation: https://docs.sendgrid.com/api-reference/mail-send

use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::{json, Value};

use crate::errors::ProviderError;
use crate::models::{Capability, RequestEnvelope};
use crate::provider::http::{self, DEFAULT_TIMEOUT};
use crate::provider::{Provider, ProviderResult};

const BASE_URL: &str = "https://api.sendgrid.com";
const VENDOR: &str = "sendgrid";
const CAPABILITIES: &[Capability] = &[Capability::EmailSend, Capability::EmailStatus];

pub struct SendGridProvider {
    client: Client,
    api_key: String,
    from_email: String,
    base_url: String,
}

impl SendGridProvider {
    pub fn new(api_key: impl Into<String>, from_email: impl Into<String>) -> Self {
        Self::with_timeout(api_key, from_email, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        from_email: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: http::build_client(timeout),
            api_key: api_key.into(),
            from_email: from_email.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the adapter at a different host (sandbox or test double).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = http::normalize_base_url(base_url);
        self
    }

    fn build_payload(&self, request: &RequestEnvelope) -> Result<Value, ProviderError> {
        let to = request.require_str("to")?;
        let subject = request.require_str("subject")?;
        let content = request.require_str("content")?;
        let from = request.str_param("from_email").unwrap_or(&self.from_email);

        let mut personalization = json!({ "to": [{ "email": to }] });
        let cc = request.str_list("cc");
        if !cc.is_empty() {
            personalization["cc"] = cc.iter().map(|e| json!({ "email": e })).collect();
        }
        let bcc = request.str_list("bcc");
        if !bcc.is_empty() {
            personalization["bcc"] = bcc.iter().map(|e| json!({ "email": e })).collect();
        }

        Ok(json!({
            "personalizations": [personalization],
            "from": { "email": from },
            "subject": subject,
            "content": [{ "type": "text/html", "value": content }],
        }))
    }

    async fn send_email(&self, request: &RequestEnvelope) -> ProviderResult {
        let payload = self.build_payload(request)?;
        let url = format!("{}/v3/mail/send", self.base_url);

        let response = http::send(
            VENDOR,
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&payload),
        )
        .await?;

        let message_id = response
            .headers()
            .get("X-Message-Id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        info!("SendGrid accepted message {}", message_id);
        Ok(json!({ "message_id": message_id }))
    }
}

#[async_trait]
impl Provider for SendGridProvider {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn invoke(&self, request: &RequestEnvelope) -> ProviderResult {
        match request.capability() {
            Capability::EmailSend => self.send_email(request).await,
            // Delivery status needs the event webhook; there is no polling endpoint.
            Capability::EmailStatus => {
                let message_id = request.require_str("message_id")?;
                Ok(json!({
                    "message_id": message_id,
                    "status": "unknown",
                    "message": "Status retrieval requires webhook configuration",
                }))
            }
            other => Err(http::unsupported(VENDOR, other)),
        }
    }
}
