use super::{BulkItemResult, SearchBackend};
use crate::document::BulkOperation;
use crate::IndexError;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Connection settings for an OpenSearch node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSearchConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl OpenSearchConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9200
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Talks to OpenSearch over its REST API with a pooled HTTP client.
pub struct OpenSearchBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl OpenSearchBackend {
    pub fn new(cfg: &OpenSearchConfig) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .pool_max_idle_per_host(32)
            .gzip(true)
            .build()
            .map_err(IndexError::backend)?;

        let base_url = Url::parse(&cfg.base_url())
            .map_err(|err| IndexError::Backend(format!("invalid OpenSearch url: {err}")))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Build a request URL from path segments, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, IndexError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| IndexError::Backend(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Turn a non-success response into a `Rejected` error carrying the backend's reason.
async fn rejection(response: reqwest::Response) -> IndexError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").map(describe_error))
        .unwrap_or(body);
    IndexError::Rejected { status, reason }
}

fn describe_error(error: &Value) -> String {
    match (
        error.get("type").and_then(Value::as_str),
        error.get("reason").and_then(Value::as_str),
    ) {
        (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
        _ => error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    }
}

/// Encode operations as the newline-delimited body `_bulk` expects.
pub(crate) fn encode_bulk_body(operations: &[BulkOperation]) -> Result<String, IndexError> {
    let mut body = String::new();
    for op in operations {
        let action = json!({ "index": { "_index": op.index, "_id": op.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&op.source)?);
        body.push('\n');
    }
    Ok(body)
}

pub(crate) fn parse_bulk_response(response: &Value) -> Result<Vec<BulkItemResult>, IndexError> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::Backend("bulk response has no items".into()))?;

    items
        .iter()
        .map(|item| {
            let detail = item
                .as_object()
                .and_then(|action| action.values().next())
                .ok_or_else(|| IndexError::Backend(format!("malformed bulk item: {item}")))?;
            let id = detail
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let status = detail.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
            Ok(BulkItemResult {
                id,
                status,
                error: detail.get("error").map(describe_error),
            })
        })
        .collect()
}

#[async_trait]
impl SearchBackend for OpenSearchBackend {
    async fn ping(&self) -> Result<bool, IndexError> {
        let response = self.client.head(self.base_url.clone()).send().await?;
        Ok(response.status().is_success())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, IndexError> {
        let response = self.client.head(self.url(&[index])?).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(rejection(response).await),
        }
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), IndexError> {
        let response = self.client.put(self.url(&[index])?).json(body).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }

    async fn delete_index(&self, index: &str) -> Result<(), IndexError> {
        let response = self.client.delete(self.url(&[index])?).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, IndexError> {
        let response = self
            .client
            .get(self.url(&[index, "_doc", id])?)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => return Err(rejection(response).await),
            _ => {}
        }

        let mut body: Value = response.json().await?;
        if body.get("found").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }
        match body.get_mut("_source") {
            Some(source) => Ok(Some(source.take())),
            None => Err(IndexError::Internal(format!(
                "document {id} in {index} has no _source"
            ))),
        }
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<Vec<BulkItemResult>, IndexError> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        let body = encode_bulk_body(operations)?;
        let response = self
            .client
            .post(self.url(&["_bulk"])?)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        let value: Value = response.json().await?;
        parse_bulk_response(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{to_document, PredictionRecord, RecordMetadata};

    #[test]
    fn default_config_points_at_local_node() {
        let cfg = OpenSearchConfig::default();
        assert_eq!(cfg.base_url(), "http://localhost:9200");
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn url_joins_paths() {
        let backend = OpenSearchBackend::new(&OpenSearchConfig::default()).unwrap();
        assert_eq!(
            backend.url(&["idx1", "_doc", "7"]).unwrap().as_str(),
            "http://localhost:9200/idx1/_doc/7"
        );
    }

    #[test]
    fn url_segments_cannot_escape_their_position() {
        let backend = OpenSearchBackend::new(&OpenSearchConfig::default()).unwrap();
        let url = backend.url(&["idx1/_doc/5?", "_doc", "31336"]).unwrap();
        assert_eq!(url.path(), "/idx1%2F_doc%2F5%3F/_doc/31336");
        assert_eq!(url.query(), None);
        assert_eq!(url.path_segments().unwrap().count(), 3);
    }

    #[test]
    fn bulk_body_is_action_then_source_per_line() {
        let record = PredictionRecord {
            paper_id: 5,
            probability: vec![1.0],
            prediction: 0.0,
            embedding: vec![0.25],
            most_similar_id: vec![9],
            most_similar_score: vec![0.5],
            metadata: RecordMetadata::default(),
        };
        let body = encode_bulk_body(&[to_document("idx1", 5, &record)]).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(body.ends_with('\n'));

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "idx1");
        assert_eq!(action["index"]["_id"], "5");
        let source: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(source["most_similar_id"][0], 9);
    }

    #[test]
    fn bulk_response_reports_item_errors() {
        let response = json!({
            "took": 3,
            "errors": true,
            "items": [
                { "index": { "_id": "1", "status": 201 } },
                { "index": { "_id": "2", "status": 400, "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [embedding]"
                } } }
            ]
        });
        let items = parse_bulk_response(&response).unwrap();
        assert!(items[0].is_success());
        assert_eq!(items[1].id, "2");
        assert_eq!(
            items[1].error.as_deref(),
            Some("mapper_parsing_exception: failed to parse field [embedding]")
        );
    }

    #[test]
    fn bulk_response_without_items_is_an_error() {
        let err = parse_bulk_response(&json!({ "errors": false })).unwrap_err();
        assert!(matches!(err, IndexError::Backend(_)));
    }
}
