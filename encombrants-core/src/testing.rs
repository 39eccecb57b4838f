//! In-memory ledger and routing doubles shared by the unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::model::{GeoPoint, ProposalStatus, RequestStatus, StopStatus};
use crate::ports::{
    Collection, Condition, Credential, Directions, Filter, LedgerPort, PortError, Projection,
    Record, RoutingKey, RoutingPort,
};

/// Evaluate `filter` against a stored row.
///
/// Values are compared by their textual form, the way they travel in a query
/// string. A missing column compares as `null`.
pub(crate) fn matches(filter: &Filter, record: &Record) -> bool {
    filter.conditions().iter().all(|(column, condition)| {
        let actual = record.get(column).map_or_else(|| "null".to_owned(), text_of);
        match condition {
            Condition::Eq(expected) => actual == *expected,
            Condition::Neq(expected) => actual != *expected,
            Condition::In(expected) => expected.contains(&actual),
        }
    })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Whether `projection` embeds the rows of `collection`.
pub(crate) fn embeds(projection: &Projection, collection: Collection) -> bool {
    projection
        .as_str()
        .split(',')
        .any(|part| part.trim_end_matches("(*)") == collection.name())
}

/// Kind of ledger call, recorded for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Create(Collection),
    Query(Collection),
    Update(Collection),
}

#[derive(Default)]
struct State {
    tables: BTreeMap<Collection, Vec<Record>>,
    next_id: u64,
    calls: Vec<Call>,
    tokens: Vec<String>,
    failing_writes: HashMap<Collection, usize>,
}

/// Ledger keeping rows in insertion order, with optional write failures.
#[derive(Default)]
pub(crate) struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    fn with_state<T>(&self, apply: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        apply(&mut state)
    }

    /// Insert a row as-is, bypassing call recording.
    pub(crate) fn seed(&self, collection: Collection, row: Record) {
        self.with_state(|state| state.tables.entry(collection).or_default().push(row));
    }

    /// Fail the next write (create or update) to `collection`.
    pub(crate) fn fail_next_write(&self, collection: Collection) {
        self.fail_write_after(collection, 0);
    }

    /// Let `skip` writes to `collection` succeed, then fail the next one.
    pub(crate) fn fail_write_after(&self, collection: Collection, skip: usize) {
        self.with_state(|state| {
            state.failing_writes.insert(collection, skip);
        });
    }

    pub(crate) fn rows(&self, collection: Collection) -> Vec<Record> {
        self.with_state(|state| state.tables.get(&collection).cloned().unwrap_or_default())
    }

    /// Value of `column` in the row with the given id.
    pub(crate) fn column(&self, collection: Collection, id: &str, column: &str) -> Option<Value> {
        self.rows(collection)
            .into_iter()
            .find(|row| row.get("id") == Some(&Value::from(id)))
            .and_then(|row| row.get(column).cloned())
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.with_state(|state| state.calls.clone())
    }

    pub(crate) fn writes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| !matches!(call, Call::Query(_)))
            .count()
    }

    pub(crate) fn tokens(&self) -> Vec<String> {
        self.with_state(|state| state.tokens.clone())
    }

    fn record_write(
        state: &mut State,
        call: Call,
        credential: &Credential,
        collection: Collection,
    ) -> Result<(), PortError> {
        state.calls.push(call);
        state.tokens.push(credential.token().to_owned());
        match state.failing_writes.get(&collection).copied() {
            Some(0) => {
                state.failing_writes.remove(&collection);
                Err(PortError::Status {
                    status: 503,
                    body: format!("{collection} unavailable"),
                })
            }
            Some(skip) => {
                state.failing_writes.insert(collection, skip - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerPort for MemoryLedger {
    async fn create(
        &self,
        credential: &Credential,
        collection: Collection,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, PortError> {
        self.with_state(|state| {
            Self::record_write(state, Call::Create(collection), credential, collection)?;
            let mut stored = Vec::with_capacity(records.len());
            for mut record in records {
                if !record.contains_key("id") {
                    state.next_id += 1;
                    let id = format!("{}-{}", collection.name(), state.next_id);
                    record.insert("id".to_owned(), Value::from(id));
                }
                stored.push(record);
            }
            state
                .tables
                .entry(collection)
                .or_default()
                .extend(stored.iter().cloned());
            Ok(stored)
        })
    }

    async fn query(
        &self,
        credential: &Credential,
        collection: Collection,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Vec<Record>, PortError> {
        self.with_state(|state| {
            state.calls.push(Call::Query(collection));
            state.tokens.push(credential.token().to_owned());
            let settings = state
                .tables
                .get(&Collection::DepositSettings)
                .cloned()
                .unwrap_or_default();
            let rows = state
                .tables
                .get(&collection)
                .map(|rows| {
                    rows.iter()
                        .filter(|row| matches(filter, row))
                        .cloned()
                        .map(|mut row| {
                            if embeds(projection, Collection::DepositSettings) {
                                let owned: Vec<Value> = settings
                                    .iter()
                                    .filter(|setting| setting.get("deposit_id") == row.get("id"))
                                    .cloned()
                                    .map(Value::Object)
                                    .collect();
                                row.insert("deposit_settings".to_owned(), Value::Array(owned));
                            }
                            row
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(rows)
        })
    }

    async fn update(
        &self,
        credential: &Credential,
        collection: Collection,
        filter: &Filter,
        patch: Record,
    ) -> Result<Vec<Record>, PortError> {
        self.with_state(|state| {
            Self::record_write(state, Call::Update(collection), credential, collection)?;
            let mut updated = Vec::new();
            for row in state.tables.entry(collection).or_default().iter_mut() {
                if matches(filter, row) {
                    row.extend(patch.clone());
                    updated.push(row.clone());
                }
            }
            Ok(updated)
        })
    }
}

/// Routing double answering with a fixed summary.
pub(crate) struct FakeRouting {
    distance_m: f64,
    duration_s: f64,
    fail: bool,
    seen: Mutex<Vec<Vec<GeoPoint>>>,
}

impl FakeRouting {
    pub(crate) fn answering(distance_m: f64, duration_s: f64) -> Self {
        Self {
            distance_m,
            duration_s,
            fail: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::answering(0.0, 0.0)
        }
    }

    pub(crate) fn waypoints(&self) -> Vec<Vec<GeoPoint>> {
        self.seen.lock().expect("routing lock poisoned").clone()
    }
}

#[async_trait]
impl RoutingPort for FakeRouting {
    async fn directions(
        &self,
        _key: &RoutingKey,
        waypoints: &[GeoPoint],
    ) -> Result<Directions, PortError> {
        self.seen
            .lock()
            .expect("routing lock poisoned")
            .push(waypoints.to_vec());
        if self.fail {
            return Err(PortError::Status {
                status: 502,
                body: "routing backend down".to_owned(),
            });
        }
        Ok(Directions {
            distance_m: self.distance_m,
            duration_s: self.duration_s,
            geometry: json!({"type": "FeatureCollection", "features": []}),
        })
    }
}

fn object(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

pub(crate) fn request_row(
    id: &str,
    waste_types: &[&str],
    point: GeoPoint,
    status: RequestStatus,
) -> Record {
    object(json!({
        "id": id,
        "client_id": "client-1",
        "status": status,
        "waste_types": waste_types,
        "volume": 2.5,
        "weight": null,
        "photos": [],
        "location_address": format!("{id} street"),
        "location_lat": point.lat,
        "location_lng": point.lng,
        "description": null,
    }))
}

pub(crate) fn proposal_row(id: &str, request_id: &str, status: ProposalStatus) -> Record {
    object(json!({
        "id": id,
        "request_id": request_id,
        "collector_id": "collector-1",
        "price": 30.0,
        "scheduled_start": "2026-10-20T08:00:00Z",
        "scheduled_end": "2026-10-20T10:00:00Z",
        "status": status,
    }))
}

pub(crate) fn site_row(id: &str, accepted: &[&str], point: GeoPoint) -> Record {
    object(json!({
        "id": id,
        "name": format!("Site {id}"),
        "address": format!("{id} avenue"),
        "lat": point.lat,
        "lng": point.lng,
        "accepted_waste_types": accepted,
    }))
}

pub(crate) fn route_row(id: &str, status: &str) -> Record {
    object(json!({
        "id": id,
        "collector_id": "collector-1",
        "disposal_site_id": "site-1",
        "distance": 12.5,
        "duration": 15,
        "start_time": "2026-10-20T08:00:00Z",
        "end_time": "2026-10-20T08:00:00Z",
        "status": status,
    }))
}

pub(crate) fn stop_row(id: &str, route_id: &str, order: u32, status: StopStatus) -> Record {
    object(json!({
        "id": id,
        "route_id": route_id,
        "request_id": format!("request-for-{id}"),
        "stop_order": order,
        "estimated_arrival": "2026-10-20T08:00:00Z",
        "status": status,
    }))
}

pub(crate) fn point(lat: f64, lng: f64) -> GeoPoint {
    GeoPoint { lat, lng }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_compares_textual_values() {
        let record = object(json!({"id": "p1", "request_id": "r1", "stop_order": 2, "status": "pending"}));

        assert!(matches(&Filter::by("id", "p1"), &record), "string equality");
        assert!(matches(&Filter::by("stop_order", 2), &record), "numbers compare as text");
        assert!(
            matches(&Filter::by("request_id", "r1").not_equal("id", "p2"), &record),
            "conjunction of eq and neq"
        );
        assert!(
            !matches(&Filter::new().any_of("status", ["accepted", "rejected"]), &record),
            "status outside the set"
        );
        assert!(matches(&Filter::by("weight", "null"), &record), "missing columns are null");
        assert!(matches(&Filter::new(), &record), "empty filter matches everything");
    }

    #[test]
    fn projection_embedding_is_detected() {
        let projection = Projection::embedding(&[Collection::DepositSettings]);

        assert!(embeds(&projection, Collection::DepositSettings), "embedded collection");
        assert!(!embeds(&Projection::all(), Collection::DepositSettings), "plain select");
    }
}
