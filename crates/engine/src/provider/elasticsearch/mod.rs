//! Elasticsearch search provider.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{ProviderError, ProviderErrorKind};
use crate::models::{Capability, Params, RequestEnvelope};
use crate::provider::http::{self, DEFAULT_TIMEOUT};
use crate::provider::{Provider, ProviderResult};

const BASE_URL: &str = "http://localhost:9200";
const VENDOR: &str = "elasticsearch";
const CAPABILITIES: &[Capability] = &[Capability::SearchQuery, Capability::DocumentIndex];
const DEFAULT_LIMIT: u64 = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde(rename = "_id")]
    id: Option<String>,
    result: Option<String>,
}

pub struct ElasticsearchProvider {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl ElasticsearchProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: http::build_client(DEFAULT_TIMEOUT),
            base_url: http::normalize_base_url(base_url),
            credentials: None,
        }
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http::build_client(timeout);
        self
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    /// A `bool` query: full-text `multi_match` plus one `term` filter per entry.
    fn build_query(query: &str, filters: Option<&Params>, limit: u64) -> Value {
        let mut bool_query = json!({
            "must": [{
                "multi_match": {
                    "query": query,
                    "fields": ["*"],
                }
            }]
        });

        if let Some(filters) = filters.filter(|f| !f.is_empty()) {
            bool_query["filter"] = filters
                .iter()
                .map(|(field, value)| json!({ "term": { field: value } }))
                .collect();
        }

        json!({ "query": { "bool": bool_query }, "size": limit })
    }

    async fn search(&self, request: &RequestEnvelope) -> ProviderResult {
        let query = request.require_str("query")?;
        let index = request.require_str("index")?;
        let limit = request.u64_param("limit").unwrap_or(DEFAULT_LIMIT);
        let filters = request.get("filters").and_then(Value::as_object);

        let body = Self::build_query(query, filters, limit);
        let url = format!("{}/{}/_search", self.base_url, urlencoding::encode(index));
        debug!("Elasticsearch search on '{}': {}", index, body);

        let response = http::send_json(VENDOR, self.authorize(self.client.post(url)).json(&body))
            .await?;
        let parsed: SearchResponse = serde_json::from_value(response).map_err(|e| {
            ProviderError::permanent(
                ProviderErrorKind::Decode,
                format!("unexpected Elasticsearch response: {}", e),
            )
        })?;

        let results: Vec<Value> = parsed.hits.hits.into_iter().map(|h| h.source).collect();
        Ok(json!({ "count": results.len(), "results": results }))
    }

    async fn index_document(&self, request: &RequestEnvelope) -> ProviderResult {
        let index = request.require_str("index")?;
        let document_id = request.require_str("document_id")?;
        let document = request
            .get("document")
            .filter(|d| d.is_object())
            .ok_or_else(|| {
                ProviderError::permanent(
                    ProviderErrorKind::InvalidRequest,
                    "document.index requires an object 'document' parameter",
                )
            })?;

        let url = format!(
            "{}/{}/_doc/{}",
            self.base_url,
            urlencoding::encode(index),
            urlencoding::encode(document_id)
        );
        let response =
            http::send_json(VENDOR, self.authorize(self.client.put(url)).json(document)).await?;
        let parsed: IndexResponse = serde_json::from_value(response).map_err(|e| {
            ProviderError::permanent(
                ProviderErrorKind::Decode,
                format!("unexpected Elasticsearch response: {}", e),
            )
        })?;

        info!("Indexed document {} into '{}'", document_id, index);
        Ok(json!({
            "document_id": parsed.id.unwrap_or_else(|| document_id.to_string()),
            "result": parsed.result,
        }))
    }
}

#[async_trait]
impl Provider for ElasticsearchProvider {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn invoke(&self, request: &RequestEnvelope) -> ProviderResult {
        match request.capability() {
            Capability::SearchQuery => self.search(request).await,
            Capability::DocumentIndex => self.index_document(request).await,
            other => Err(http::unsupported(VENDOR, other)),
        }
    }
}

impl Default for ElasticsearchProvider {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_without_filters() {
        let query = ElasticsearchProvider::build_query("invoice", None, 5);
        assert_eq!(query["size"], 5);
        assert_eq!(
            query["query"]["bool"]["must"][0]["multi_match"]["query"],
            "invoice"
        );
        assert!(query["query"]["bool"].get("filter").is_none());
    }

    #[test]
    fn test_query_with_term_filters() {
        let mut filters = Params::new();
        filters.insert("status".to_string(), json!("paid"));

        let query = ElasticsearchProvider::build_query("invoice", Some(&filters), 10);
        assert_eq!(query["query"]["bool"]["filter"][0]["term"]["status"], "paid");
    }

    #[test]
    fn test_search_response_keeps_sources() {
        let raw = json!({
            "took": 3,
            "hits": {
                "total": { "value": 2 },
                "hits": [
                    { "_id": "1", "_source": { "title": "a" } },
                    { "_id": "2", "_source": { "title": "b" } }
                ]
            }
        });
        let parsed: SearchResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.hits.hits.len(), 2);
        assert_eq!(parsed.hits.hits[1].source["title"], "b");
    }

    #[tokio::test]
    async fn test_index_requires_document_object() {
        let provider = ElasticsearchProvider::default();
        let mut params = Params::new();
        params.insert("index".to_string(), json!("docs"));
        params.insert("document_id".to_string(), json!("1"));
        params.insert("document".to_string(), json!("not an object"));
        let request = RequestEnvelope::new(Capability::DocumentIndex, params);

        let err = provider.invoke(&request).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);
    }
}
