//! Ledger adapter for PostgREST-compatible record stores.
//!
//! Collections map to `{base_url}/rest/v1/{collection}`. Every call carries the
//! project key in `apikey` and the caller's token as bearer authorization, so
//! row-level policies of the store apply to the calling subject.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use encombrants_core::ports::{
    Collection, Condition, Credential, Filter, LedgerPort, PortError, Projection, Record,
};

const REST_PATH: &str = "rest/v1";

/// Connection settings for a PostgREST endpoint.
#[derive(Clone)]
pub struct PostgrestConfig {
    /// Project URL, without the `/rest/v1` suffix.
    pub base_url: String,
    /// Public project key sent as `apikey`. Never an elevated service key.
    pub api_key: String,
}

impl fmt::Debug for PostgrestConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PostgrestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// [`LedgerPort`] speaking the PostgREST dialect.
pub struct PostgrestLedger {
    client: Client,
    config: PostgrestConfig,
}

impl PostgrestLedger {
    /// Create a new ledger bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, config: PostgrestConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, collection: Collection) -> String {
        format!(
            "{}/{REST_PATH}/{}",
            self.config.base_url.trim_end_matches('/'),
            collection.name()
        )
    }

    fn request(
        &self,
        method: Method,
        credential: &Credential,
        collection: Collection,
    ) -> RequestBuilder {
        debug!(%method, %collection, "ledger request");
        self.client
            .request(method, self.endpoint(collection))
            .header("apikey", &self.config.api_key)
            .bearer_auth(credential.token())
            .header("Prefer", "return=representation")
    }
}

#[async_trait]
impl LedgerPort for PostgrestLedger {
    async fn create(
        &self,
        credential: &Credential,
        collection: Collection,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, PortError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        // A JSON array is inserted as a single statement.
        let req = self
            .request(Method::POST, credential, collection)
            .json(&records);
        fetch_json(req).await
    }

    async fn query(
        &self,
        credential: &Credential,
        collection: Collection,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Vec<Record>, PortError> {
        let req = self
            .request(Method::GET, credential, collection)
            .query(&[("select", projection.as_str())])
            .query(&filter_params(filter));
        fetch_json(req).await
    }

    async fn update(
        &self,
        credential: &Credential,
        collection: Collection,
        filter: &Filter,
        patch: Record,
    ) -> Result<Vec<Record>, PortError> {
        if filter.is_empty() {
            return Err(PortError::Internal(format!(
                "refusing to update every row of {collection}"
            )));
        }
        let req = self
            .request(Method::PATCH, credential, collection)
            .query(&filter_params(filter))
            .json(&patch);
        fetch_json(req).await
    }
}

/// Render filter conditions as PostgREST query parameters.
///
/// `In` values are double-quoted so that commas and parentheses inside a
/// value cannot break the list.
#[must_use]
pub fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    filter
        .conditions()
        .iter()
        .map(|(column, condition)| {
            let operand = match condition {
                Condition::Eq(value) => format!("eq.{value}"),
                Condition::Neq(value) => format!("neq.{value}"),
                Condition::In(values) => {
                    let quoted: Vec<String> = values.iter().map(String::as_str).map(quote).collect();
                    format!("in.({})", quoted.join(","))
                }
            };
            (column.clone(), operand)
        })
        .collect()
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

// Small helper to fetch and decode JSON, keeping the body of failed responses.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(PortError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
