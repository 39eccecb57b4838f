//! Typed access to ledger collections on behalf of one subject.

use std::slice;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::EngineError;
use crate::ports::{Collection, Credential, Filter, LedgerPort, Projection, Record};

/// Patch body that only changes a record's status.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusPatch<S> {
    /// New status.
    pub status: S,
}

/// Ledger handle bound to the calling subject's credential.
///
/// Each method is one round-trip. Nothing here retries or groups writes.
#[derive(Clone, Copy)]
pub struct LedgerGateway<'a> {
    port: &'a dyn LedgerPort,
    credential: &'a Credential,
}

impl<'a> LedgerGateway<'a> {
    /// Bind `port` to `credential`.
    #[must_use]
    pub fn new(port: &'a dyn LedgerPort, credential: &'a Credential) -> Self {
        Self { port, credential }
    }

    /// Insert one record and decode the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the ledger fails, returns no row,
    /// or returns a row that does not decode.
    pub async fn create<T, R>(&self, collection: Collection, record: &T) -> Result<R, EngineError>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut created = self
            .create_many(collection, slice::from_ref(record))
            .await?;
        created
            .pop()
            .ok_or_else(|| EngineError::Upstream(format!("ledger returned no {collection} row")))
    }

    /// Insert several records in one call and decode the stored rows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the ledger fails or returns rows
    /// that do not decode.
    pub async fn create_many<T, R>(
        &self,
        collection: Collection,
        records: &[T],
    ) -> Result<Vec<R>, EngineError>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let encoded = records
            .iter()
            .map(|record| encode(collection, record))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(%collection, rows = encoded.len(), "ledger create");
        let rows = self.port.create(self.credential, collection, encoded).await?;
        decode_all(collection, rows)
    }

    /// Read every column of the rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the ledger fails or returns rows
    /// that do not decode.
    pub async fn query<R: DeserializeOwned>(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<R>, EngineError> {
        self.query_with(collection, filter, &Projection::all()).await
    }

    /// Read the rows matching `filter` with an explicit projection.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the ledger fails or returns rows
    /// that do not decode.
    pub async fn query_with<R: DeserializeOwned>(
        &self,
        collection: Collection,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Vec<R>, EngineError> {
        debug!(%collection, select = projection.as_str(), "ledger query");
        let rows = self
            .port
            .query(self.credential, collection, filter, projection)
            .await?;
        decode_all(collection, rows)
    }

    /// Fetch a single record by id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when no row has that id, and
    /// [`EngineError::Upstream`] when the ledger fails.
    pub async fn find<R: DeserializeOwned>(
        &self,
        collection: Collection,
        entity: &'static str,
        id: &str,
    ) -> Result<R, EngineError> {
        self.query(collection, &Filter::by("id", id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::not_found(entity, id))
    }

    /// Patch the rows matching `filter` and decode the updated rows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the ledger fails or returns rows
    /// that do not decode.
    pub async fn update<T, R>(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &T,
    ) -> Result<Vec<R>, EngineError>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let encoded = encode(collection, patch)?;
        debug!(%collection, conditions = filter.conditions().len(), "ledger update");
        let rows = self
            .port
            .update(self.credential, collection, filter, encoded)
            .await?;
        decode_all(collection, rows)
    }
}

fn encode<T: Serialize>(collection: Collection, record: &T) -> Result<Record, EngineError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(EngineError::Upstream(format!(
            "{collection} record must encode as an object, got {other}"
        ))),
        Err(err) => Err(EngineError::Upstream(format!(
            "could not encode {collection} record: {err}"
        ))),
    }
}

fn decode_all<R: DeserializeOwned>(
    collection: Collection,
    rows: Vec<Record>,
) -> Result<Vec<R>, EngineError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row)).map_err(|err| {
                EngineError::Upstream(format!("malformed {collection} row: {err}"))
            })
        })
        .collect()
}
