//! Content gateway client.

use std::time::Duration;

use tracing::{debug, instrument};

use revindex_shared::{DocumentPayload, IndexerConfig, IndexerError, Result};

use crate::USER_AGENT;

/// Fetches document payloads by content id. One attempt per call; retries
/// are left to the caller.
pub struct ContentFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl ContentFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| IndexerError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &IndexerConfig) -> Result<Self> {
        Self::new(&config.gateway_url, config.gateway_timeout)
    }

    /// `GET {base_url}/{content_id}` decoded as a [`DocumentPayload`].
    #[instrument(skip(self))]
    pub async fn fetch(&self, content_id: &str) -> Result<DocumentPayload> {
        let url = format!("{}/{content_id}", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IndexerError::fetch(content_id, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::fetch(content_id, format!("HTTP {status}")));
        }

        let payload: DocumentPayload = response
            .json()
            .await
            .map_err(|e| IndexerError::fetch(content_id, format!("invalid payload: {e}")))?;

        debug!(id = %payload.id, "fetched payload");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    fn fetcher(server: &MockServer) -> ContentFetcher {
        ContentFetcher::new(&format!("{}/ipfs/", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_decodes_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/ipfs/{CID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "bitcoin",
                "title": "Bitcoin",
                "content": "Bitcoin is a decentralized digital currency.",
                "summary": "Digital cash",
                "tags": [{ "id": "Layer1" }],
                "categories": [{ "id": "cryptocurrencies", "title": "Cryptocurrencies" }],
                "metadata": [{ "id": "references", "value": "[]" }],
                "images": [{ "id": "QmImage", "type": "image/png" }],
                "language": "en",
                "user": { "id": "0xabc" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let payload = fetcher(&server).fetch(CID).await.unwrap();
        assert_eq!(payload.id, "bitcoin");
        assert_eq!(payload.author.id, "0xabc");
        assert_eq!(payload.images[0].mime_type.as_deref(), Some("image/png"));
        assert_eq!(payload.meta("references"), Some("[]"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(504))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher(&server).fetch(CID).await.unwrap_err();
        assert_eq!(err.kind(), "fetch");
        assert!(err.to_string().contains("504"));
    }

    #[tokio::test]
    async fn undecodable_body_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = fetcher(&server).fetch(CID).await.unwrap_err();
        assert_eq!(err.kind(), "fetch");
        assert!(err.to_string().contains(CID));
    }
}
