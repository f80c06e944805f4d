//! Pinecone data-plane client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{MentorCandidate, MentorFilter, MentorMetadata, VectorIndex};
use crate::llm::{parse_retry_after, ProviderError};

const PINECONE_API_VERSION: &str = "2024-07";
const PROVIDER: &str = "pinecone";

/// Pinecone index client for mentor vectors.
pub struct PineconeIndex {
    client: Client,
    host: String,
    api_key: String,
    namespace: Option<String>,
}

impl PineconeIndex {
    /// Create a new client for the index served at `host`.
    ///
    /// `host` is the index endpoint shown in the Pinecone console, with or
    /// without the `https://` scheme.
    pub fn new(host: &str, api_key: &str) -> Self {
        let host = host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        Self {
            client: Client::new(),
            host,
            api_key: api_key.to_string(),
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<String, ProviderError> {
        let resp = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, &e))?;

        let status = resp.status();
        let retry_after = parse_retry_after(resp.headers());
        let text = resp.text().await.map_err(|e| {
            ProviderError::network(PROVIDER, format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            return Err(ProviderError::from_status(PROVIDER, status.as_u16(), &text, retry_after));
        }

        Ok(text)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MentorFilter,
    ) -> Result<Vec<MentorCandidate>, ProviderError> {
        let body = QueryRequest {
            vector,
            top_k,
            filter: filter.to_pinecone(),
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };

        let text = self.post("/query", &body).await?;
        let parsed: QueryResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::parse(PROVIDER, format!("Failed to parse query response: {}", e))
        })?;

        tracing::debug!("Pinecone returned {} matches (top_k={})", parsed.matches.len(), top_k);

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| MentorCandidate {
                mentor_id: m.id,
                semantic_score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }

    async fn upsert(
        &self,
        mentor_id: &str,
        vector: Vec<f32>,
        metadata: &MentorMetadata,
    ) -> Result<(), ProviderError> {
        let body = UpsertRequest {
            vectors: [UpsertVector {
                id: mentor_id,
                values: vector,
                metadata,
            }],
            namespace: self.namespace.as_deref(),
        };
        self.post("/vectors/upsert", &body).await?;
        Ok(())
    }

    async fn delete(&self, mentor_id: &str) -> Result<(), ProviderError> {
        let body = DeleteRequest {
            ids: [mentor_id],
            namespace: self.namespace.as_deref(),
        };
        self.post("/vectors/delete", &body).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    filter: serde_json::Value,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: [UpsertVector<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: Vec<f32>,
    metadata: &'a MentorMetadata,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    ids: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: Option<MentorMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderErrorKind;
    use crate::testing::truncated_body_server;

    #[test]
    fn test_host_gets_scheme() {
        let index = PineconeIndex::new("mentors-abc.svc.pinecone.io/", "key");
        assert_eq!(index.host, "https://mentors-abc.svc.pinecone.io");
    }

    #[test]
    fn test_query_request_is_camel_case() {
        let vector = [0.1f32, 0.2];
        let body = QueryRequest {
            vector: &vector,
            top_k: 30,
            filter: MentorFilter::default().to_pinecone(),
            include_metadata: true,
            namespace: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["topK"], 30);
        assert_eq!(json["includeMetadata"], true);
        assert!(json.get("namespace").is_none());
    }

    #[test]
    fn test_write_requests_omit_missing_namespace() {
        let metadata = MentorMetadata::default();
        let upsert = UpsertRequest {
            vectors: [UpsertVector {
                id: "m1",
                values: vec![0.5],
                metadata: &metadata,
            }],
            namespace: None,
        };
        let json = serde_json::to_value(&upsert).unwrap();
        assert!(json.get("namespace").is_none());
        assert_eq!(json["vectors"][0]["id"], "m1");

        let delete = DeleteRequest {
            ids: ["m1"],
            namespace: Some("mentors"),
        };
        let json = serde_json::to_value(&delete).unwrap();
        assert_eq!(json["namespace"], "mentors");
        assert_eq!(json["ids"][0], "m1");
    }

    #[tokio::test]
    async fn test_truncated_body_is_network_error() {
        let host = truncated_body_server().await;
        let index = PineconeIndex::new(&host, "key");
        let err = index.delete("m1").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Network);
        assert!(err.message.contains("response body"));
    }

    #[test]
    fn test_query_response_parses_matches() {
        let body = r#"{"matches":[{"id":"m1","score":0.91,"metadata":{"average_rating":4.8,"zones":["Career"]}}],"namespace":""}"#;
        let parsed: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.matches[0].id, "m1");
        assert_eq!(parsed.matches[0].metadata.as_ref().unwrap().rating, Some(4.8));
    }
}
