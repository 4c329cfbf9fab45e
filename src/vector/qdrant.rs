//! Qdrant HTTP adapter for the [`VectorIndex`] capability.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{VectorHit, VectorIndex, VectorIndexError, VectorRecord};

/// Vector index backed by a Qdrant collection, one point per document.
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    vector_size: usize,
}

impl QdrantIndex {
    /// Construct a new client for the given Qdrant endpoint and collection.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self, VectorIndexError> {
        let client = Client::builder().user_agent("docpipe/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(VectorIndexError::InvalidUrl)?;
        Ok(Self {
            client,
            base_url,
            api_key,
            collection: collection.into(),
            vector_size,
        })
    }

    /// Create the backing collection if it is missing from Qdrant.
    pub async fn ensure_collection(&self) -> Result<(), VectorIndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => return Ok(()),
            StatusCode::NOT_FOUND => {}
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(VectorIndexError::UnexpectedStatus { status, body });
            }
        }

        tracing::debug!(
            collection = %self.collection,
            vector_size = self.vector_size,
            "Creating collection"
        );
        let body = json!({
            "vectors": {
                "size": self.vector_size,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))?
            .json(&body)
            .send()
            .await?;
        self.ensure_success(response).await
    }

    fn request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, VectorIndexError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success(&self, response: reqwest::Response) -> Result<(), VectorIndexError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorIndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, record: VectorRecord) -> Result<(), VectorIndexError> {
        if record.vector.len() != self.vector_size {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.vector_size,
                actual: record.vector.len(),
            });
        }

        // Point id is the document id: reprocessing overwrites in place.
        let body = json!({
            "points": [{
                "id": record.document_id.to_string(),
                "vector": record.vector,
                "payload": {
                    "doc_id": record.document_id.to_string(),
                    "filename": record.filename,
                    "text": record.preview,
                }
            }]
        });

        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )?
            .query(&[("wait", true)])
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response).await?;
        tracing::debug!(
            collection = %self.collection,
            document_id = %record.document_id,
            "Vector upserted"
        );
        Ok(())
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<VectorHit>, VectorIndexError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorIndexError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };

        let hits = points
            .into_iter()
            .filter_map(|point| {
                let id = stringify_point_id(point.id);
                let Ok(document_id) = Uuid::parse_str(&id) else {
                    tracing::warn!(id = %id, "Skipping hit with non-UUID point id");
                    return None;
                };
                let payload = point.payload.unwrap_or_default();
                Some(VectorHit {
                    document_id,
                    score: point.score,
                    filename: payload_str(&payload, "filename"),
                    preview: payload_str(&payload, "text"),
                })
            })
            .collect();

        Ok(hits)
    }

    async fn healthy(&self) -> bool {
        match self.request(Method::GET, "collections") {
            Ok(req) => match req.send().await {
                Ok(response) => response.status().is_success(),
                Err(error) => {
                    tracing::warn!(error = %error, "Qdrant health probe failed");
                    false
                }
            },
            Err(_) => false,
        }
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
struct QueryPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

fn payload_str(payload: &Map<String, Value>, key: &str) -> String {
    payload
        .get(key)
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string()
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, Method::PUT, MockServer};

    fn index(server: &MockServer) -> QdrantIndex {
        QdrantIndex::new(&server.base_url(), None, "documents", 2).expect("client")
    }

    #[tokio::test]
    async fn upsert_keys_point_by_document_id() {
        let server = MockServer::start_async().await;
        let document_id = Uuid::new_v4();
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/documents/points")
                    .query_param("wait", "true")
                    .json_body_partial(format!(
                        r#"{{ "points": [{{ "id": "{document_id}" }}] }}"#
                    ));
                then.status(200).json_body(json!({ "status": "ok" }));
            })
            .await;

        index(&server)
            .upsert(VectorRecord {
                document_id,
                vector: vec![0.1, 0.2],
                filename: "report.txt".into(),
                preview: "Example".into(),
            })
            .await
            .expect("upsert");
        mock.assert();
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let server = MockServer::start_async().await;
        let err = index(&server)
            .upsert(VectorRecord {
                document_id: Uuid::new_v4(),
                vector: vec![0.1, 0.2, 0.3],
                filename: "report.txt".into(),
                preview: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorIndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn query_parses_scored_hits() {
        let server = MockServer::start_async().await;
        let document_id = Uuid::new_v4();
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/documents/points/query");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": [
                        {
                            "id": document_id.to_string(),
                            "score": 0.42,
                            "payload": {
                                "doc_id": document_id.to_string(),
                                "filename": "report.txt",
                                "text": "Example preview"
                            }
                        }
                    ]
                }));
            })
            .await;

        let hits = index(&server).query(vec![0.1, 0.2], 3).await.expect("query");
        mock.assert();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, document_id);
        assert!((hits[0].score - 0.42).abs() < f32::EPSILON);
        assert_eq!(hits[0].filename, "report.txt");
        assert_eq!(hits[0].preview, "Example preview");
    }

    #[tokio::test]
    async fn query_surfaces_backend_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/documents/points/query");
                then.status(500).body("boom");
            })
            .await;

        let err = index(&server).query(vec![0.1, 0.2], 3).await.unwrap_err();
        assert!(matches!(
            err,
            VectorIndexError::UnexpectedStatus { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }
}
