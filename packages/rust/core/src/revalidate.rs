//! Front-end cache revalidation, triggered after every stored revision.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument, warn};

use revindex_shared::{IndexerError, PersistedRevision, Result, RevalidationConfig};

use crate::USER_AGENT;

const REVALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Post-write hook. Failures surface as [`IndexerError::SideEffect`].
#[async_trait]
pub trait Revalidator: Send + Sync {
    async fn revalidate(&self, revision: &PersistedRevision) -> Result<()>;
}

/// Used when no endpoint is configured.
pub struct NoopRevalidator;

#[async_trait]
impl Revalidator for NoopRevalidator {
    async fn revalidate(&self, _revision: &PersistedRevision) -> Result<()> {
        Ok(())
    }
}

/// POSTs `{ "path": "/wiki/<id>" }` to the front end.
pub struct HttpRevalidator {
    client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
}

impl HttpRevalidator {
    pub fn new(endpoint: &str, secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REVALIDATE_TIMEOUT)
            .build()
            .map_err(|e| IndexerError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            secret,
        })
    }
}

#[async_trait]
impl Revalidator for HttpRevalidator {
    #[instrument(skip_all, fields(id = %revision.id))]
    async fn revalidate(&self, revision: &PersistedRevision) -> Result<()> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "path": format!("/wiki/{}", revision.id) }));
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IndexerError::SideEffect(format!("revalidation request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::SideEffect(format!(
                "revalidation returned HTTP {status}"
            )));
        }

        debug!("front end revalidated");
        Ok(())
    }
}

/// Pick the revalidator for a configuration; the secret is read from the
/// configured environment variable.
pub fn build_revalidator(config: &RevalidationConfig) -> Result<Box<dyn Revalidator>> {
    match &config.endpoint {
        Some(endpoint) => {
            let secret = std::env::var(&config.secret_env).ok();
            if secret.is_none() {
                warn!(var = %config.secret_env, "revalidation secret not set; sending unauthenticated");
            }
            Ok(Box::new(HttpRevalidator::new(endpoint, secret)?))
        }
        None => Ok(Box::new(NoopRevalidator)),
    }
}
