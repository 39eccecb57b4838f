//! Stop completion and the route completion cascade.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{EngineError, WriteRef};
use crate::gateway::{LedgerGateway, StatusPatch};
use crate::model::{Route, RouteId, RouteStatus, RouteStop, StopId, StopStatus};
use crate::ports::{Collection, Filter};

/// State of a route after one of its stops was settled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopProgress {
    /// The settled stop.
    pub stop: RouteStop,
    /// Stops of the same route still pending.
    pub remaining: usize,
    /// Whether this call moved the route to `completed`.
    pub route_completed: bool,
}

/// Tracks stop outcomes and closes routes.
#[derive(Clone, Copy)]
pub struct StopTracker<'a> {
    ledger: LedgerGateway<'a>,
}

impl<'a> StopTracker<'a> {
    /// Tracker writing through `ledger`.
    #[must_use]
    pub fn new(ledger: LedgerGateway<'a>) -> Self {
        Self { ledger }
    }

    /// Mark a stop completed and close its route when nothing is left.
    ///
    /// # Errors
    ///
    /// See [`settle`](Self::settle).
    pub async fn complete(&self, stop_id: &StopId) -> Result<StopProgress, EngineError> {
        self.settle(stop_id, StopStatus::Completed).await
    }

    /// Mark a stop skipped and close its route when nothing is left.
    ///
    /// # Errors
    ///
    /// See [`settle`](Self::settle).
    pub async fn skip(&self, stop_id: &StopId) -> Result<StopProgress, EngineError> {
        self.settle(stop_id, StopStatus::Skipped).await
    }

    /// Put a stop into a terminal status, then promote the route once every
    /// sibling is terminal.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] when `status` is not terminal.
    /// - [`EngineError::NotFound`] for an unknown stop.
    /// - [`EngineError::PartialFailure`] when the stop was updated but the
    ///   route could not be checked or promoted.
    /// - [`EngineError::Upstream`] when the first write fails.
    pub async fn settle(
        &self,
        stop_id: &StopId,
        status: StopStatus,
    ) -> Result<StopProgress, EngineError> {
        if !status.is_terminal() {
            return Err(EngineError::invalid(
                "status",
                format!("Stops can only be settled as completed or skipped, not {status}"),
            ));
        }

        let updated: Vec<RouteStop> = self
            .ledger
            .update(
                Collection::RouteStops,
                &Filter::by("id", stop_id),
                &StatusPatch { status },
            )
            .await?;
        let stop = updated
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::not_found("stop", stop_id))?;
        info!(%stop_id, route_id = %stop.route_id, %status, "stop settled");
        let committed = vec![WriteRef::new(Collection::RouteStops, stop_id)];

        let siblings: Vec<RouteStop> = match self
            .ledger
            .query(Collection::RouteStops, &Filter::by("route_id", &stop.route_id))
            .await
        {
            Ok(siblings) => siblings,
            Err(err) => {
                return Err(err.after_writes("settle_stop", committed, "load_route_stops"));
            }
        };
        let remaining = siblings
            .iter()
            .filter(|sibling| !sibling.status.is_terminal())
            .count();
        if remaining > 0 {
            return Ok(StopProgress {
                stop,
                remaining,
                route_completed: false,
            });
        }

        // Only open routes are promoted, a cancelled route stays cancelled.
        let promoted = self
            .ledger
            .update::<_, Route>(
                Collection::Routes,
                &Filter::by("id", &stop.route_id)
                    .any_of("status", [RouteStatus::Scheduled, RouteStatus::InProgress]),
                &StatusPatch {
                    status: RouteStatus::Completed,
                },
            )
            .await;
        let route_completed = match promoted {
            Ok(rows) => !rows.is_empty(),
            Err(err) => {
                warn!(route_id = %stop.route_id, error = %err, "all stops settled but route not closed");
                return Err(err.after_writes("settle_stop", committed, "complete_route"));
            }
        };
        if route_completed {
            info!(route_id = %stop.route_id, "route completed");
        } else {
            let route: Route = match self
                .ledger
                .find(Collection::Routes, "route", &stop.route_id.0)
                .await
            {
                Ok(route) => route,
                Err(err) => {
                    return Err(err.after_writes("settle_stop", committed, "complete_route"));
                }
            };
            info!(route_id = %stop.route_id, status = %route.status, "route left as is");
        }

        Ok(StopProgress {
            stop,
            remaining: 0,
            route_completed,
        })
    }

    /// Move a scheduled route to `in_progress`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] for an unknown route.
    /// - [`EngineError::Conflict`] when the route is not scheduled.
    /// - [`EngineError::Upstream`] when the ledger fails.
    pub async fn start(&self, route_id: &RouteId) -> Result<Route, EngineError> {
        let started: Vec<Route> = self
            .ledger
            .update(
                Collection::Routes,
                &Filter::by("id", route_id).equal("status", RouteStatus::Scheduled),
                &StatusPatch {
                    status: RouteStatus::InProgress,
                },
            )
            .await?;
        if let Some(route) = started.into_iter().next() {
            info!(%route_id, "route started");
            return Ok(route);
        }

        let current: Route = self
            .ledger
            .find(Collection::Routes, "route", &route_id.0)
            .await?;
        Err(EngineError::Conflict(format!(
            "Route {route_id} is {} and cannot be started",
            current.status
        )))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ports::Credential;
    use crate::testing::{MemoryLedger, route_row, stop_row};

    fn route_with(stops: &[(&str, StopStatus)]) -> MemoryLedger {
        let ledger = MemoryLedger::default();
        ledger.seed(Collection::Routes, route_row("route-1", "in_progress"));
        for ((id, status), order) in stops.iter().zip(1_u32..) {
            ledger.seed(Collection::RouteStops, stop_row(id, "route-1", order, *status));
        }
        ledger
    }

    fn route_status(ledger: &MemoryLedger) -> Option<serde_json::Value> {
        ledger.column(Collection::Routes, "route-1", "status")
    }

    #[tokio::test]
    async fn last_open_stop_completes_the_route() {
        let ledger = route_with(&[("s1", StopStatus::Completed), ("s2", StopStatus::Skipped), ("s3", StopStatus::Pending)]);
        let credential = Credential::bearer("collector-token");
        let tracker = StopTracker::new(LedgerGateway::new(&ledger, &credential));

        let progress = tracker.complete(&StopId::from("s3")).await.expect("settled");

        assert!(progress.route_completed, "route closed");
        assert_eq!(progress.remaining, 0, "nothing left");
        assert_eq!(progress.stop.status, StopStatus::Completed, "stop status");
        assert_eq!(route_status(&ledger), Some(json!("completed")), "route persisted as completed");
    }

    #[tokio::test]
    async fn open_siblings_leave_the_route_untouched() {
        let ledger = route_with(&[("s1", StopStatus::Pending), ("s2", StopStatus::Pending)]);
        let credential = Credential::bearer("t");
        let tracker = StopTracker::new(LedgerGateway::new(&ledger, &credential));

        let progress = tracker.complete(&StopId::from("s1")).await.expect("settled");

        assert!(!progress.route_completed, "route still open");
        assert_eq!(progress.remaining, 1, "one stop left");
        assert_eq!(route_status(&ledger), Some(json!("in_progress")), "route unchanged");
    }

    #[tokio::test]
    async fn skipping_the_last_stop_also_completes_the_route() {
        let ledger = route_with(&[("s1", StopStatus::Completed), ("s2", StopStatus::Pending)]);
        let credential = Credential::bearer("t");
        let tracker = StopTracker::new(LedgerGateway::new(&ledger, &credential));

        let progress = tracker.skip(&StopId::from("s2")).await.expect("settled");

        assert!(progress.route_completed, "skipped counts as terminal");
        assert_eq!(progress.stop.status, StopStatus::Skipped, "stop skipped");
    }

    #[tokio::test]
    async fn unknown_stop_is_not_found() {
        let ledger = route_with(&[("s1", StopStatus::Pending)]);
        let credential = Credential::bearer("t");

        let err = StopTracker::new(LedgerGateway::new(&ledger, &credential))
            .complete(&StopId::from("ghost"))
            .await
            .expect_err("unknown stop");

        assert!(matches!(err, EngineError::NotFound { entity: "stop", .. }), "{err}");
    }

    #[tokio::test]
    async fn pending_is_not_a_settled_status() {
        let ledger = route_with(&[("s1", StopStatus::Pending)]);
        let credential = Credential::bearer("t");

        let err = StopTracker::new(LedgerGateway::new(&ledger, &credential))
            .settle(&StopId::from("s1"), StopStatus::Pending)
            .await
            .expect_err("pending is not terminal");

        assert!(matches!(err, EngineError::Validation { .. }), "{err}");
        assert_eq!(ledger.writes(), 0, "nothing written");
    }

    #[tokio::test]
    async fn failed_route_promotion_is_a_partial_failure() {
        let ledger = route_with(&[("s1", StopStatus::Pending)]);
        ledger.fail_next_write(Collection::Routes);
        let credential = Credential::bearer("t");

        let err = StopTracker::new(LedgerGateway::new(&ledger, &credential))
            .complete(&StopId::from("s1"))
            .await
            .expect_err("route write fails");

        let EngineError::PartialFailure(partial) = err else {
            unreachable!("expected a partial failure");
        };
        assert_eq!(partial.failed_step, "complete_route", "failing step");
        assert_eq!(
            partial.committed,
            vec![WriteRef::new(Collection::RouteStops, "s1")],
            "stop committed"
        );
    }

    #[tokio::test]
    async fn cancelled_routes_are_not_completed() {
        let ledger = MemoryLedger::default();
        ledger.seed(Collection::Routes, route_row("route-1", "cancelled"));
        ledger.seed(Collection::RouteStops, stop_row("s1", "route-1", 1, StopStatus::Pending));
        let credential = Credential::bearer("t");

        let progress = StopTracker::new(LedgerGateway::new(&ledger, &credential))
            .complete(&StopId::from("s1"))
            .await
            .expect("stop settled");

        assert!(!progress.route_completed, "route not promoted");
        assert_eq!(progress.stop.status, StopStatus::Completed, "stop still recorded");
        assert_eq!(route_status(&ledger), Some(json!("cancelled")), "route stays cancelled");
    }

    #[tokio::test]
    async fn start_only_moves_scheduled_routes() {
        let ledger = MemoryLedger::default();
        ledger.seed(Collection::Routes, route_row("route-1", "scheduled"));
        let credential = Credential::bearer("t");
        let tracker = StopTracker::new(LedgerGateway::new(&ledger, &credential));

        let route = tracker.start(&RouteId::from("route-1")).await.expect("started");
        assert_eq!(route.status, RouteStatus::InProgress, "in progress");

        let err = tracker
            .start(&RouteId::from("route-1"))
            .await
            .expect_err("already started");
        assert!(matches!(err, EngineError::Conflict(_)), "{err}");

        let err = tracker
            .start(&RouteId::from("ghost"))
            .await
            .expect_err("unknown route");
        assert!(matches!(err, EngineError::NotFound { .. }), "{err}");
    }
}
