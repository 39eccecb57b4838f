//! Traits describing the external collaborators and their shared helper types.

use std::fmt;

use async_trait::async_trait;
use reqwest::Error as ReqwestError;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::GeoPoint;

/// Raw ledger row: a JSON object keyed by column name.
pub type Record = Map<String, Value>;

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to the ledger or the routing service.
pub enum PortError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {body}")]
    Status {
        /// HTTP-like status code.
        status: u16,
        /// Response body, usually a diagnostic message.
        body: String,
    },
    /// A payload could not be encoded or decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    /// The backend answered successfully but without the expected content.
    #[error("Missing result: {0}")]
    MissingResult(String),
    /// Internal adapter error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Record collections held by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Pickup requests.
    Requests,
    /// Availability windows owned by requests.
    AvailabilityWindows,
    /// Collector proposals.
    Proposals,
    /// Collection routes.
    Routes,
    /// Stops owned by routes.
    RouteStops,
    /// Disposal sites.
    DisposalSites,
    /// Settings rows attached to disposal sites.
    DepositSettings,
}

impl Collection {
    /// Name of the collection in the ledger.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Collection::Requests => "requests",
            Collection::AvailabilityWindows => "availability_windows",
            Collection::Proposals => "proposals",
            Collection::Routes => "routes",
            Collection::RouteStops => "route_stops",
            Collection::DisposalSites => "disposal_sites",
            Collection::DepositSettings => "deposit_settings",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// A single column condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Column equals the value.
    Eq(String),
    /// Column differs from the value.
    Neq(String),
    /// Column equals one of the values.
    In(Vec<String>),
}

/// Conjunction of column conditions selecting ledger rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    /// Empty filter matching every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on a single `column = value` condition.
    #[must_use]
    pub fn by(column: &str, value: impl fmt::Display) -> Self {
        Self::new().equal(column, value)
    }

    /// Add a `column = value` condition.
    #[must_use]
    pub fn equal(mut self, column: &str, value: impl fmt::Display) -> Self {
        self.conditions
            .push((column.to_owned(), Condition::Eq(value.to_string())));
        self
    }

    /// Add a `column != value` condition.
    #[must_use]
    pub fn not_equal(mut self, column: &str, value: impl fmt::Display) -> Self {
        self.conditions
            .push((column.to_owned(), Condition::Neq(value.to_string())));
        self
    }

    /// Add a `column in (values)` condition.
    #[must_use]
    pub fn any_of<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: fmt::Display,
    {
        let values = values.into_iter().map(|value| value.to_string()).collect();
        self.conditions
            .push((column.to_owned(), Condition::In(values)));
        self
    }

    /// Conditions in insertion order.
    #[must_use]
    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    /// Whether the filter has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Columns requested from a query, in the ledger's select syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection(String);

impl Projection {
    /// Every column of the collection.
    #[must_use]
    pub fn all() -> Self {
        Self("*".to_owned())
    }

    /// Every column plus every column of the named related collections.
    #[must_use]
    pub fn embedding(related: &[Collection]) -> Self {
        let mut select = String::from("*");
        for collection in related {
            select.push(',');
            select.push_str(collection.name());
            select.push_str("(*)");
        }
        Self(select)
    }

    /// Select expression as sent to the ledger.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Bearer token of the subject on whose behalf a ledger call runs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a bearer token.
    #[must_use]
    pub fn bearer<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    /// Raw token for the authorization header.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("Credential(<redacted>)")
    }
}

/// API key for the routing service.
#[derive(Clone, PartialEq, Eq)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Wrap an API key.
    #[must_use]
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self(key.into())
    }

    /// Raw key for the authorization header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RoutingKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("RoutingKey(<redacted>)")
    }
}

#[async_trait]
/// Record-oriented access to the persistent store.
///
/// Every call is a single round-trip attributed to `credential`; adapters
/// neither retry nor wrap several calls in a transaction.
pub trait LedgerPort: Send + Sync {
    /// Insert rows and return them as stored, including server-assigned ids.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the store rejects the insert or is unreachable.
    async fn create(
        &self,
        credential: &Credential,
        collection: Collection,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, PortError>;

    /// Read rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the store rejects the query or is unreachable.
    async fn query(
        &self,
        credential: &Credential,
        collection: Collection,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Vec<Record>, PortError>;

    /// Apply `patch` to rows matching `filter` and return the updated rows.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the store rejects the update or is unreachable.
    async fn update(
        &self,
        credential: &Credential,
        collection: Collection,
        filter: &Filter,
        patch: Record,
    ) -> Result<Vec<Record>, PortError>;
}

/// Travel path returned by the routing service.
#[derive(Debug, Clone, PartialEq)]
pub struct Directions {
    /// Total distance in meters.
    pub distance_m: f64,
    /// Total duration in seconds.
    pub duration_s: f64,
    /// Raw path geometry as returned by the service.
    pub geometry: Value,
}

#[async_trait]
/// Turns an ordered list of coordinates into a travel path.
pub trait RoutingPort: Send + Sync {
    /// Compute the path visiting `waypoints` in order.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the service rejects the request or is unreachable.
    async fn directions(
        &self,
        key: &RoutingKey,
        waypoints: &[GeoPoint],
    ) -> Result<Directions, PortError>;
}
