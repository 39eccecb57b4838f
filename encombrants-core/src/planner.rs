//! Route assembly: path metrics, disposal site selection and stop creation.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{EngineError, WriteRef};
use crate::gateway::LedgerGateway;
use crate::matcher::{MatchKind, SiteMatcher};
use crate::model::{
    DisposalSite, NewRoute, NewRouteStop, Request, RequestId, Route, RouteDetails, RouteId,
    RouteStatus, RouteStop, StopStatus, SubjectId, WasteType,
};
use crate::ports::{Collection, Filter, RoutingKey, RoutingPort};

/// Input of [`RoutePlanner::compute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlanRequest {
    /// Requests to visit, in visiting order.
    pub request_ids: Vec<RequestId>,
    /// Collector driving the route.
    pub collector_id: SubjectId,
    /// Planned departure.
    pub start_time: DateTime<Utc>,
}

/// Everything [`RoutePlanner::compute`] created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePlan {
    /// Persisted route.
    pub route: Route,
    /// Persisted stops in visiting order.
    pub stops: Vec<RouteStop>,
    /// Path geometry as returned by the routing service.
    pub path: Value,
    /// Selected disposal site.
    pub disposal_site: DisposalSite,
    /// Whether the site really accepts the whole load.
    pub site_match: MatchKind,
}

/// End time recorded for a new route.
///
/// Currently the start time; the product has not decided whether it should
/// include driving and handling time.
#[must_use]
pub fn placeholder_end_time(start_time: DateTime<Utc>) -> DateTime<Utc> {
    start_time
}

/// Estimated arrival recorded for every stop of a new route.
///
/// Currently the route start time for all stops.
#[must_use]
pub fn placeholder_arrival(start_time: DateTime<Utc>) -> DateTime<Utc> {
    start_time
}

/// Meters to kilometers, rounded to one decimal.
#[must_use]
pub fn meters_to_km(meters: f64) -> f64 {
    (meters / 100.0).round() / 10.0
}

/// Seconds to whole minutes, rounded to nearest.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "route durations are far below i64::MAX minutes"
)]
pub fn seconds_to_minutes(seconds: f64) -> i64 {
    (seconds / 60.0).round() as i64
}

/// Builds routes from pickup requests.
#[derive(Clone, Copy)]
pub struct RoutePlanner<'a> {
    ledger: LedgerGateway<'a>,
    routing: &'a dyn RoutingPort,
    routing_key: Option<&'a RoutingKey>,
}

impl<'a> RoutePlanner<'a> {
    /// Planner writing through `ledger` and routing with `routing`.
    #[must_use]
    pub fn new(
        ledger: LedgerGateway<'a>,
        routing: &'a dyn RoutingPort,
        routing_key: Option<&'a RoutingKey>,
    ) -> Self {
        Self {
            ledger,
            routing,
            routing_key,
        }
    }

    /// Plan and persist a route visiting the requests in the given order.
    ///
    /// Stops follow `request_ids` order; ids that do not resolve are dropped.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for an empty or duplicated id list, before any ledger call.
    /// - [`EngineError::NotFound`] when none of the requests resolve.
    /// - [`EngineError::Configuration`] when no routing key is configured.
    /// - [`EngineError::Upstream`] when the routing service or the ledger fails.
    /// - [`EngineError::NoSuitableSite`] when no disposal site exists.
    /// - [`EngineError::PartialFailure`] when the route was stored but its stops were not.
    pub async fn compute(&self, plan: &RoutePlanRequest) -> Result<RoutePlan, EngineError> {
        if plan.request_ids.is_empty() {
            return Err(EngineError::invalid(
                "requestIds",
                "At least one request id is required",
            ));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = plan.request_ids.iter().find(|id| !seen.insert(*id)) {
            return Err(EngineError::invalid(
                "requestIds",
                format!("Request {duplicate} is listed twice"),
            ));
        }

        let fetched: Vec<Request> = self
            .ledger
            .query(
                Collection::Requests,
                &Filter::new().any_of("id", &plan.request_ids),
            )
            .await?;

        let ordered: Vec<&Request> = plan
            .request_ids
            .iter()
            .filter_map(|id| fetched.iter().find(|request| request.id == *id))
            .collect();
        let Some(last) = ordered.last() else {
            return Err(EngineError::not_found(
                "request",
                joined(&plan.request_ids),
            ));
        };
        if ordered.len() < plan.request_ids.len() {
            warn!(
                requested = plan.request_ids.len(),
                resolved = ordered.len(),
                "some requests could not be resolved and are left out of the route"
            );
        }

        let key = self.routing_key.ok_or_else(|| {
            EngineError::Configuration("Routing service credentials are not configured".to_owned())
        })?;
        let waypoints: Vec<_> = ordered.iter().map(|request| request.position()).collect();
        let directions = self
            .routing
            .directions(key, &waypoints)
            .await
            .map_err(|err| EngineError::Upstream(format!("Routing service: {err}")))?;
        let distance = meters_to_km(directions.distance_m);
        let duration = seconds_to_minutes(directions.duration_s);

        let load: BTreeSet<WasteType> = ordered
            .iter()
            .flat_map(|request| request.waste_types.iter().cloned())
            .collect();
        let selection = SiteMatcher::new(self.ledger)
            .select(&load, last.position())
            .await?
            .ok_or(EngineError::NoSuitableSite)?;

        let route: Route = self
            .ledger
            .create(
                Collection::Routes,
                &NewRoute {
                    collector_id: plan.collector_id.clone(),
                    disposal_site_id: selection.site.id.clone(),
                    distance,
                    duration,
                    start_time: plan.start_time,
                    end_time: placeholder_end_time(plan.start_time),
                    status: RouteStatus::Scheduled,
                },
            )
            .await?;
        info!(
            route_id = %route.id,
            collector_id = %route.collector_id,
            stops = ordered.len(),
            distance_km = distance,
            duration_min = duration,
            "route created"
        );

        let new_stops: Vec<NewRouteStop> = ordered
            .iter()
            .zip(1_u32..)
            .map(|(request, stop_order)| NewRouteStop {
                route_id: route.id.clone(),
                request_id: request.id.clone(),
                stop_order,
                estimated_arrival: placeholder_arrival(plan.start_time),
                status: StopStatus::Pending,
            })
            .collect();

        let committed = vec![WriteRef::new(Collection::Routes, &route.id)];
        let mut stops: Vec<RouteStop> = match self
            .ledger
            .create_many(Collection::RouteStops, &new_stops)
            .await
        {
            Ok(stops) => stops,
            Err(err) => {
                warn!(route_id = %route.id, error = %err, "route stored without stops");
                return Err(err.after_writes("compute_route", committed, "create_route_stops"));
            }
        };
        if stops.len() != new_stops.len() {
            warn!(
                route_id = %route.id,
                expected = new_stops.len(),
                stored = stops.len(),
                "ledger stored an incomplete set of stops"
            );
            let mut committed = committed;
            committed.extend(
                stops
                    .iter()
                    .map(|stop| WriteRef::new(Collection::RouteStops, &stop.id)),
            );
            return Err(
                EngineError::Upstream("Ledger stored fewer stops than requested".to_owned())
                    .after_writes("compute_route", committed, "create_route_stops"),
            );
        }
        stops.sort_by_key(|stop| stop.stop_order);

        Ok(RoutePlan {
            route,
            stops,
            path: directions.geometry,
            disposal_site: selection.site,
            site_match: selection.kind,
        })
    }

    /// Load a route with its stops in visiting order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown route and
    /// [`EngineError::Upstream`] when the ledger fails.
    pub async fn details(&self, route_id: &RouteId) -> Result<RouteDetails, EngineError> {
        let route: Route = self
            .ledger
            .find(Collection::Routes, "route", &route_id.0)
            .await?;
        let mut stops: Vec<RouteStop> = self
            .ledger
            .query(Collection::RouteStops, &Filter::by("route_id", route_id))
            .await?;
        stops.sort_by_key(|stop| stop.stop_order);
        Ok(RouteDetails { route, stops })
    }

    /// Routes of one collector, most recent start first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the ledger fails.
    pub async fn routes_of(&self, collector_id: &SubjectId) -> Result<Vec<Route>, EngineError> {
        let mut routes: Vec<Route> = self
            .ledger
            .query(Collection::Routes, &Filter::by("collector_id", collector_id))
            .await?;
        routes.sort_by(|left, right| right.start_time.cmp(&left.start_time));
        Ok(routes)
    }

    /// Check that a route was fully assembled.
    ///
    /// A route without stops is what an interrupted [`compute`](Self::compute)
    /// leaves behind and is reported as a partial failure.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] for an unknown route.
    /// - [`EngineError::PartialFailure`] when the route has no stops.
    /// - [`EngineError::Conflict`] when stop orders are not exactly `1..=n`.
    pub async fn confirm(&self, route_id: &RouteId) -> Result<RouteDetails, EngineError> {
        let details = self.details(route_id).await?;
        if details.stops.is_empty() {
            warn!(route_id = %route_id, "route has no stops");
            return Err(
                EngineError::Conflict(format!("Route {route_id} has no stops")).after_writes(
                    "compute_route",
                    vec![WriteRef::new(Collection::Routes, route_id)],
                    "create_route_stops",
                ),
            );
        }
        let contiguous = details
            .stops
            .iter()
            .zip(1_u32..)
            .all(|(stop, expected)| stop.stop_order == expected);
        if !contiguous {
            return Err(EngineError::Conflict(format!(
                "Stops of route {route_id} are not numbered 1..{}",
                details.stops.len()
            )));
        }
        info!(route_id = %route_id, stops = details.stops.len(), "route confirmed");
        Ok(details)
    }
}

fn joined(ids: &[RequestId]) -> String {
    ids.iter()
        .map(|id| id.0.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
