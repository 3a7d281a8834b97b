//! Qdrant REST client.
//!
//! Speaks the Qdrant HTTP API directly with `reqwest`. Only single,
//! unnamed vector collections are supported. The API key, when set, is
//! sent in the `api-key` header.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Distance, VectorIndex};
use crate::config::VectorIndexConfig;
use crate::error::{RadiateError, Result};
use crate::models::{CollectionInfo, Payload, Point, ScoredPoint};

const SERVICE: &str = "Qdrant";

/// Largest page requested from the scroll endpoint.
const SCROLL_PAGE: usize = 256;

pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Qdrant wraps every response body in `{"result": .., "status": .., "time": ..}`.
#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionsList {
    collections: Vec<CollectionName>,
}

#[derive(Deserialize)]
struct CollectionName {
    name: String,
}

#[derive(Deserialize)]
struct CollectionDescription {
    #[serde(default)]
    status: String,
    #[serde(default)]
    points_count: Option<u64>,
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: Value,
}

#[derive(Deserialize)]
struct VectorParams {
    size: usize,
    distance: Distance,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: &'a [Point],
}

#[derive(Deserialize)]
struct ScrollPage {
    points: Vec<Record>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct Record {
    id: u64,
    #[serde(default)]
    payload: Option<Payload>,
}

impl QdrantIndex {
    /// Create a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RadiateError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &VectorIndexConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            RadiateError::Config(
                "vector_index.url (or QDRANT_URL) is required for Qdrant".to_string(),
            )
        })?;
        Self::new(
            url,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Send a request and decode the `result` field. `Ok(None)` on 404.
    async fn call<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<Option<T>> {
        let response = builder
            .send()
            .await
            .map_err(|e| RadiateError::from_transport(SERVICE, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RadiateError::from_status(SERVICE, status, &body));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| RadiateError::from_transport(SERVICE, e))?;
        Ok(Some(envelope.result))
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        collection: &str,
    ) -> Result<T> {
        self.call(builder).await?.ok_or_else(|| {
            RadiateError::Index(format!("collection '{}' does not exist", collection))
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: Distance,
    ) -> Result<()> {
        let body = json!({"vectors": {"size": dimension, "distance": metric.as_str()}});
        let _: Value = self
            .call_required(
                self.request(reqwest::Method::PUT, &format!("/collections/{}", name))
                    .json(&body),
                name,
            )
            .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let _: Value = self
            .call_required(
                self.request(
                    reqwest::Method::PUT,
                    &format!("/collections/{}/points?wait=true", collection),
                )
                .json(&UpsertRequest { points: &points }),
                collection,
            )
            .await?;
        tracing::debug!(collection, points = points.len(), "upserted points");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let body = json!({"vector": vector, "limit": limit, "with_payload": true});
        self.call_required(
            self.request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", collection),
            )
            .json(&body),
            collection,
        )
        .await
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let description: Option<CollectionDescription> = self
            .call(self.request(reqwest::Method::GET, &format!("/collections/{}", name)))
            .await?;
        let Some(description) = description else {
            return Ok(None);
        };

        let params: VectorParams =
            serde_json::from_value(description.config.params.vectors).map_err(|e| {
                RadiateError::Index(format!(
                    "collection '{}' does not use a single unnamed vector: {}",
                    name, e
                ))
            })?;

        Ok(Some(CollectionInfo {
            name: name.to_string(),
            dimension: params.size,
            metric: params.distance,
            point_count: description.points_count.unwrap_or(0),
            status: description.status,
        }))
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let deleted: Option<bool> = self
            .call(self.request(reqwest::Method::DELETE, &format!("/collections/{}", name)))
            .await?;
        Ok(deleted.unwrap_or(false))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let list: CollectionsList = self
            .call_required(self.request(reqwest::Method::GET, "/collections"), "")
            .await?;
        let mut names: Vec<String> = list.collections.into_iter().map(|c| c.name).collect();
        names.sort();
        Ok(names)
    }

    async fn scroll(&self, collection: &str, limit: usize) -> Result<Vec<ScoredPoint>> {
        let mut out = Vec::new();
        let mut offset: Option<Value> = None;

        while out.len() < limit {
            let mut body = json!({
                "limit": (limit - out.len()).min(SCROLL_PAGE),
                "with_payload": true,
                "with_vector": false,
            });
            if let Some(offset) = offset.take() {
                body["offset"] = offset;
            }

            let page: ScrollPage = self
                .call_required(
                    self.request(
                        reqwest::Method::POST,
                        &format!("/collections/{}/points/scroll", collection),
                    )
                    .json(&body),
                    collection,
                )
                .await?;

            let fetched = page.points.len();
            out.extend(page.points.into_iter().map(|r| ScoredPoint {
                id: r.id,
                score: 0.0,
                payload: r.payload.unwrap_or_default(),
            }));

            match page.next_page_offset {
                Some(next) if !next.is_null() && fetched > 0 => offset = Some(next),
                _ => break,
            }
        }

        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn index(server: &MockServer) -> QdrantIndex {
        QdrantIndex::new(&server.uri(), Some("qd-key".to_string()), Duration::from_secs(5)).unwrap()
    }

    fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "result": result,
            "status": "ok",
            "time": 0.001
        }))
    }

    #[tokio::test]
    async fn collection_info_parses_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/radiate_docs"))
            .and(header("api-key", "qd-key"))
            .respond_with(ok(json!({
                "status": "green",
                "points_count": 42,
                "config": {"params": {"vectors": {"size": 384, "distance": "Cosine"}}}
            })))
            .mount(&server)
            .await;

        let info = index(&server)
            .collection_info("radiate_docs")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.dimension, 384);
        assert_eq!(info.metric, Distance::Cosine);
        assert_eq!(info.point_count, 42);
        assert_eq!(info.status, "green");
    }

    #[tokio::test]
    async fn missing_collection_is_none_and_gets_created() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/fresh"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "status": {"error": "Not found: Collection `fresh` doesn't exist!"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/fresh"))
            .and(body_partial_json(json!({"vectors": {"size": 3, "distance": "Cosine"}})))
            .respond_with(ok(json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        let index = index(&server);
        assert!(index.collection_info("fresh").await.unwrap().is_none());
        index
            .ensure_collection("fresh", 3, Distance::Cosine)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upsert_and_search() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/docs/points"))
            .and(query_param("wait", "true"))
            .and(body_partial_json(json!({"points": [{"id": 7, "vector": [1.0, 0.0]}]})))
            .respond_with(ok(json!({"operation_id": 1, "status": "completed"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/docs/points/search"))
            .and(body_partial_json(json!({"limit": 2, "with_payload": true})))
            .respond_with(ok(json!([
                {"id": 7, "version": 0, "score": 0.99, "payload": {"text": "hello", "source": "a.txt", "chunk_index": 0}},
                {"id": 9, "version": 0, "score": 0.42, "payload": {"text": "bye", "source": "b.txt", "chunk_index": 1}}
            ])))
            .mount(&server)
            .await;

        let index = index(&server);
        let payload = json!({"text": "hello"}).as_object().cloned().unwrap();
        index
            .upsert(
                "docs",
                vec![Point {
                    id: 7,
                    vector: vec![1.0, 0.0],
                    payload,
                }],
            )
            .await
            .unwrap();

        let hits = index.search("docs", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 7);
        assert_eq!(hits[1].payload["source"], "b.txt");
    }

    #[tokio::test]
    async fn scroll_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/docs/points/scroll"))
            .and(body_partial_json(json!({"offset": 2})))
            .respond_with(ok(json!({
                "points": [{"id": 2, "payload": {"text": "c"}}],
                "next_page_offset": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/docs/points/scroll"))
            .respond_with(ok(json!({
                "points": [{"id": 0, "payload": {"text": "a"}}, {"id": 1, "payload": {"text": "b"}}],
                "next_page_offset": 2
            })))
            .mount(&server)
            .await;

        let points = index(&server).scroll("docs", 10).await.unwrap();
        let ids: Vec<u64> = points.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/collections/docs"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let index = index(&server);
        assert!(matches!(
            index.list_collections().await,
            Err(RadiateError::Authentication(_))
        ));
        let err = index.delete_collection("docs").await.unwrap_err();
        assert!(matches!(err, RadiateError::BackendUnavailable(_)));
        assert!(err.is_retryable());
    }
}
