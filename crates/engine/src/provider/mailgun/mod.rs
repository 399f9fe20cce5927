//! Mailgun email provider.
//!
//! Posts form-encoded messages to `/v3/{domain}/messages` with HTTP basic
//! auth (`api` / key). Also answers `email.status` from the events API.

use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::{ProviderError, ProviderErrorKind};
use crate::models::{Capability, RequestEnvelope};
use crate::provider::http::{self, DEFAULT_TIMEOUT};
use crate::provider::{Provider, ProviderResult};

const BASE_URL: &str = "https://api.mailgun.net";
const VENDOR: &str = "mailgun";
const CAPABILITIES: &[Capability] = &[Capability::EmailSend, Capability::EmailStatus];

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    event: Option<String>,
    timestamp: Option<f64>,
}

pub struct MailgunProvider {
    client: Client,
    api_key: String,
    domain: String,
    from_email: String,
    base_url: String,
}

impl MailgunProvider {
    /// Sender defaults to `noreply@{domain}`.
    pub fn new(api_key: impl Into<String>, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            client: http::build_client(DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            from_email: format!("noreply@{}", domain),
            domain,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_from_email(mut self, from_email: impl Into<String>) -> Self {
        self.from_email = from_email.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = http::normalize_base_url(base_url);
        self
    }

    fn build_form(
        &self,
        request: &RequestEnvelope,
    ) -> Result<Vec<(&'static str, String)>, ProviderError> {
        let mut form = vec![
            (
                "from",
                request
                    .str_param("from_email")
                    .unwrap_or(&self.from_email)
                    .to_string(),
            ),
            ("to", request.require_str("to")?.to_string()),
            ("subject", request.require_str("subject")?.to_string()),
            ("html", request.require_str("content")?.to_string()),
        ];

        let cc = request.str_list("cc");
        if !cc.is_empty() {
            form.push(("cc", cc.join(",")));
        }
        let bcc = request.str_list("bcc");
        if !bcc.is_empty() {
            form.push(("bcc", bcc.join(",")));
        }
        Ok(form)
    }

    async fn send_email(&self, request: &RequestEnvelope) -> ProviderResult {
        let form = self.build_form(request)?;
        let url = format!("{}/v3/{}/messages", self.base_url, self.domain);

        let body = http::send_json(
            VENDOR,
            self.client
                .post(&url)
                .basic_auth("api", Some(&self.api_key))
                .form(&form),
        )
        .await?;

        let parsed: SendResponse = serde_json::from_value(body).map_err(|e| {
            ProviderError::permanent(
                ProviderErrorKind::Decode,
                format!("unexpected Mailgun response: {}", e),
            )
        })?;
        let message_id = parsed.id.unwrap_or_else(|| "unknown".to_string());

        info!("Mailgun queued message {}", message_id);
        Ok(json!({ "message_id": message_id }))
    }

    async fn get_status(&self, request: &RequestEnvelope) -> ProviderResult {
        let message_id = request.require_str("message_id")?;
        let url = format!("{}/v3/{}/events", self.base_url, self.domain);

        let body = http::send_json(
            VENDOR,
            self.client
                .get(&url)
                .basic_auth("api", Some(&self.api_key))
                .query(&[("message-id", message_id)]),
        )
        .await?;

        let events: EventsResponse = serde_json::from_value(body).map_err(|e| {
            ProviderError::permanent(
                ProviderErrorKind::Decode,
                format!("unexpected Mailgun events response: {}", e),
            )
        })?;

        Ok(match events.items.first() {
            Some(latest) => json!({
                "message_id": message_id,
                "status": latest.event.as_deref().unwrap_or("unknown"),
                "timestamp": latest.timestamp,
            }),
            None => json!({ "message_id": message_id, "status": "not_found" }),
        })
    }
}

#[async_trait]
impl Provider for MailgunProvider {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn invoke(&self, request: &RequestEnvelope) -> ProviderResult {
        match request.capability() {
            Capability::EmailSend => self.send_email(request).await,
            Capability::EmailStatus => self.get_status(request).await,
            other => Err(http::unsupported(VENDOR, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CapabilityRequest, EmailMessage};

    #[test]
    fn test_default_sender_uses_domain() {
        let provider = MailgunProvider::new("key", "mg.example.com");
        assert_eq!(provider.from_email, "noreply@mg.example.com");
    }

    #[test]
    fn test_form_joins_copy_lists() {
        let provider = MailgunProvider::new("key", "mg.example.com");
        let request = EmailMessage::new("to@example.com", "S", "<b>B</b>")
            .cc("a@example.com")
            .cc("b@example.com")
            .into_envelope();

        let form = provider.build_form(&request).unwrap();
        assert!(form.contains(&("cc", "a@example.com,b@example.com".to_string())));
        assert!(form.contains(&("html", "<b>B</b>".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "bcc"));
    }

    #[test]
    fn test_events_response_parsing() {
        let json = r#"{"items": [{"event": "delivered", "timestamp": 1704067200.5}]}"#;
        let response: EventsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.items[0].event.as_deref(), Some("delivered"));

        let empty: EventsResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
    }
}
