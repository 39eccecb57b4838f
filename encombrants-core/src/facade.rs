//! Public entry point composing intake, arbitration, planning and tracking.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::arbitrator::{Acceptance, ProposalArbitrator};
use crate::backends::Backends;
use crate::error::EngineError;
use crate::gateway::LedgerGateway;
use crate::intake::RequestIntake;
use crate::model::{
    DisposalSite, Proposal, ProposalId, Request, RequestId, Route, RouteDetails, RouteId,
    StopId, SubjectId,
};
use crate::outcome::{Failure, Outcome, Success};
use crate::planner::{RoutePlan, RoutePlanner};
use crate::ports::Credential;
use crate::schema::{DepositPayload, ProposalPayload, RequestPayload, RouteComputePayload};
use crate::sites::SiteRegistry;
use crate::tracker::{StopProgress, StopTracker};

/// Identity and credential a facade call runs under.
#[derive(Debug, Clone)]
pub struct Session {
    subject: Option<SubjectId>,
    credential: Credential,
}

impl Session {
    /// Session of an authenticated subject.
    #[must_use]
    pub fn authenticated(subject: SubjectId, credential: Credential) -> Self {
        Self {
            subject: Some(subject),
            credential,
        }
    }

    /// Session without a known subject. Reads still go through `credential`.
    #[must_use]
    pub fn anonymous(credential: Credential) -> Self {
        Self {
            subject: None,
            credential,
        }
    }

    /// The calling subject, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&SubjectId> {
        self.subject.as_ref()
    }

    fn require_subject(&self) -> Result<&SubjectId, EngineError> {
        self.subject.as_ref().ok_or(EngineError::Unauthenticated)
    }
}

/// Stateless facade over the fulfillment workflow.
///
/// Every call builds its components for the session at hand and maps the
/// result to an [`Outcome`]. Nothing is cached between calls. A failing call
/// returns the component's [`EngineError`] converted into a [`Failure`].
#[derive(Debug, Clone)]
pub struct FulfillmentService {
    backends: Arc<Backends>,
}

#[expect(
    clippy::missing_errors_doc,
    reason = "every operation fails the same way, see the type documentation"
)]
impl FulfillmentService {
    /// Create a new service bound to the provided backends.
    #[must_use]
    pub fn new(backends: Arc<Backends>) -> Self {
        Self { backends }
    }

    fn ledger<'s>(&'s self, session: &'s Session) -> LedgerGateway<'s> {
        LedgerGateway::new(self.backends.ledger.as_ref(), &session.credential)
    }

    fn planner<'s>(&'s self, session: &'s Session) -> RoutePlanner<'s> {
        RoutePlanner::new(
            self.ledger(session),
            self.backends.routing.as_ref(),
            self.backends.routing_key.as_ref(),
        )
    }

    /// Store a pending request owned by the calling subject.
    pub async fn create_request(&self, session: &Session, payload: RequestPayload) -> Outcome<Request> {
        let result = async {
            let client = session.require_subject()?;
            let draft = payload.into_draft()?;
            RequestIntake::new(self.ledger(session))
                .create(client, draft)
                .await
        }
        .await;
        respond("create_request", result, Success::created)
    }

    /// Requests visible to the session.
    pub async fn list_requests(&self, session: &Session) -> Outcome<Vec<Request>> {
        let result = RequestIntake::new(self.ledger(session)).list().await;
        respond("list_requests", result, Success::ok)
    }

    /// One request with its availability windows.
    pub async fn get_request(&self, session: &Session, request_id: &RequestId) -> Outcome<Request> {
        let result = RequestIntake::new(self.ledger(session)).get(request_id).await;
        respond("get_request", result, Success::ok)
    }

    /// Withdraw a pending request.
    pub async fn cancel_request(&self, session: &Session, request_id: &RequestId) -> Outcome<Request> {
        let result = RequestIntake::new(self.ledger(session))
            .cancel(request_id)
            .await;
        respond("cancel_request", result, Success::ok)
    }

    /// Offer to serve a request on behalf of the calling collector.
    pub async fn submit_proposal(
        &self,
        session: &Session,
        payload: ProposalPayload,
    ) -> Outcome<Proposal> {
        let result = async {
            let collector = session.require_subject()?;
            let draft = payload.into_draft(collector.clone())?;
            ProposalArbitrator::new(self.ledger(session))
                .submit(&draft)
                .await
        }
        .await;
        respond("submit_proposal", result, Success::created)
    }

    /// Proposals made on one request.
    pub async fn list_proposals(
        &self,
        session: &Session,
        request_id: &RequestId,
    ) -> Outcome<Vec<Proposal>> {
        let result = ProposalArbitrator::new(self.ledger(session))
            .proposals_for(request_id)
            .await;
        respond("list_proposals", result, Success::ok)
    }

    /// Accept a proposal, match its request and reject the competition.
    pub async fn accept_proposal(
        &self,
        session: &Session,
        proposal_id: &ProposalId,
    ) -> Outcome<Acceptance> {
        let result = ProposalArbitrator::new(self.ledger(session))
            .accept(proposal_id)
            .await;
        respond("accept_proposal", result, Success::ok)
    }

    /// Decline a proposal.
    pub async fn reject_proposal(
        &self,
        session: &Session,
        proposal_id: &ProposalId,
    ) -> Outcome<Proposal> {
        let result = ProposalArbitrator::new(self.ledger(session))
            .reject(proposal_id)
            .await;
        respond("reject_proposal", result, Success::ok)
    }

    /// Plan and persist a route. The collector defaults to the caller.
    pub async fn compute_route(
        &self,
        session: &Session,
        payload: RouteComputePayload,
    ) -> Outcome<RoutePlan> {
        let result = async {
            let plan = payload.into_plan(session.subject())?;
            self.planner(session).compute(&plan).await
        }
        .await;
        respond("compute_route", result, Success::created)
    }

    /// Check that a route has its full, contiguous set of stops.
    pub async fn confirm_route(&self, session: &Session, route_id: &RouteId) -> Outcome<RouteDetails> {
        let result = self.planner(session).confirm(route_id).await;
        respond("confirm_route", result, Success::ok)
    }

    /// Move a scheduled route to `in_progress`.
    pub async fn start_route(&self, session: &Session, route_id: &RouteId) -> Outcome<Route> {
        let result = StopTracker::new(self.ledger(session)).start(route_id).await;
        respond("start_route", result, Success::ok)
    }

    /// A route with its stops in visiting order.
    pub async fn get_route(&self, session: &Session, route_id: &RouteId) -> Outcome<RouteDetails> {
        let result = self.planner(session).details(route_id).await;
        respond("get_route", result, Success::ok)
    }

    /// Routes of a collector, the caller when `collector_id` is `None`.
    pub async fn list_routes(
        &self,
        session: &Session,
        collector_id: Option<SubjectId>,
    ) -> Outcome<Vec<Route>> {
        let result = async {
            let collector = collector_id
                .or_else(|| session.subject().cloned())
                .ok_or_else(|| EngineError::missing(vec!["collectorId".to_owned()]))?;
            self.planner(session).routes_of(&collector).await
        }
        .await;
        respond("list_routes", result, Success::ok)
    }

    /// Mark a stop completed, closing its route after the last one.
    pub async fn complete_stop(&self, session: &Session, stop_id: &StopId) -> Outcome<StopProgress> {
        let result = StopTracker::new(self.ledger(session)).complete(stop_id).await;
        respond("complete_stop", result, Success::ok)
    }

    /// Mark a stop skipped, closing its route after the last one.
    pub async fn skip_stop(&self, session: &Session, stop_id: &StopId) -> Outcome<StopProgress> {
        let result = StopTracker::new(self.ledger(session)).skip(stop_id).await;
        respond("skip_stop", result, Success::ok)
    }

    /// Register a disposal site on behalf of its operator.
    pub async fn register_deposit_site(
        &self,
        session: &Session,
        payload: DepositPayload,
    ) -> Outcome<DisposalSite> {
        let result = async {
            session.require_subject()?;
            let draft = payload.into_draft()?;
            SiteRegistry::new(self.ledger(session)).register(draft).await
        }
        .await;
        respond("register_deposit_site", result, Success::created)
    }

    /// Every disposal site with its settings.
    pub async fn list_deposit_sites(&self, session: &Session) -> Outcome<Vec<DisposalSite>> {
        let result = SiteRegistry::new(self.ledger(session)).list().await;
        respond("list_deposit_sites", result, Success::ok)
    }
}

fn respond<T>(
    operation: &'static str,
    result: Result<T, EngineError>,
    success: fn(T) -> Success<T>,
) -> Outcome<T> {
    result.map(success).map_err(|err| {
        match &err {
            EngineError::PartialFailure(partial) => {
                warn!(operation, committed = partial.committed.len(), %partial, "operation left partial state");
            }
            other => debug!(operation, kind = ?other.kind(), error = %other, "operation failed"),
        }
        Failure::from(err)
    })
}
