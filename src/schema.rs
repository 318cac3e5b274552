use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

/// Canonical v2 configuration schema, also published on schemastore.org.
pub const DEFAULT_SCHEMA_URL: &str = "https://raw.githubusercontent.com/readthedocs/readthedocs.org/master/readthedocs/rtd_tests/fixtures/spec/v2/schema.json";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to fetch schema from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("schema is not valid JSON: {0}")]
    Parse(#[source] reqwest::Error),
}

/// Fetches the current JSON Schema over HTTP and caches it for the lifetime
/// of the provider. Staleness handling is deliberately not a concern here.
pub struct SchemaProvider {
    client: reqwest::Client,
    url: String,
    cached: OnceCell<serde_json::Value>,
}

impl SchemaProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            cached: OnceCell::new(),
        }
    }

    /// A provider that never touches the network. Used in tests and anywhere
    /// the schema is already at hand.
    pub fn preloaded(schema: serde_json::Value) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: String::new(),
            cached: OnceCell::new_with(Some(schema)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<&serde_json::Value, SchemaError> {
        self.cached
            .get_or_try_init(|| async {
                debug!(url = %self.url, "fetching configuration schema");
                let response = self
                    .client
                    .get(&self.url)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|source| SchemaError::Fetch {
                        url: self.url.clone(),
                        source,
                    })?;
                response.json().await.map_err(SchemaError::Parse)
            })
            .await
    }
}

impl Default for SchemaProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA_URL)
    }
}
