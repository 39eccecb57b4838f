//! Proposal submission and the accept/reject transitions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{EngineError, WriteRef};
use crate::gateway::{LedgerGateway, StatusPatch};
use crate::model::{
    NewProposal, Proposal, ProposalId, ProposalStatus, Request, RequestId, RequestStatus,
    SubjectId,
};
use crate::ports::{Collection, Filter};

/// Validated proposal ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalDraft {
    /// Target request.
    pub request_id: RequestId,
    /// Proposing collector.
    pub collector_id: SubjectId,
    /// Offered price.
    pub price: f64,
    /// Proposed pickup window start.
    pub scheduled_start: DateTime<Utc>,
    /// Proposed pickup window end.
    pub scheduled_end: DateTime<Utc>,
}

/// Result of a successful [`ProposalArbitrator::accept`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Acceptance {
    /// The accepted proposal.
    pub proposal: Proposal,
    /// The promoted request.
    pub request: Request,
    /// Competing proposals that were rejected.
    pub rejected: Vec<ProposalId>,
}

/// Check that a price is a finite number above zero.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] blaming `price` otherwise.
pub fn validate_price(price: f64) -> Result<f64, EngineError> {
    if !price.is_finite() {
        return Err(EngineError::invalid("price", "Invalid price value"));
    }
    if price <= 0.0 {
        return Err(EngineError::invalid("price", "Price must be greater than 0"));
    }
    Ok(price)
}

/// Governs proposals and the request status they drive.
#[derive(Clone, Copy)]
pub struct ProposalArbitrator<'a> {
    ledger: LedgerGateway<'a>,
}

impl<'a> ProposalArbitrator<'a> {
    /// Arbitrator writing through `ledger`.
    #[must_use]
    pub fn new(ledger: LedgerGateway<'a>) -> Self {
        Self { ledger }
    }

    /// Store a new pending proposal.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for a non-positive price or an empty time window.
    /// - [`EngineError::NotFound`] when the request does not exist.
    /// - [`EngineError::Conflict`] when the request is no longer pending.
    /// - [`EngineError::Upstream`] when the ledger fails.
    pub async fn submit(&self, draft: &ProposalDraft) -> Result<Proposal, EngineError> {
        let price = validate_price(draft.price)?;
        if draft.scheduled_end <= draft.scheduled_start {
            return Err(EngineError::invalid(
                "scheduledEnd",
                "Scheduled end must be after scheduled start",
            ));
        }

        let request: Request = self
            .ledger
            .find(Collection::Requests, "request", &draft.request_id.0)
            .await?;
        if request.status != RequestStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "Request {} is {} and takes no more proposals",
                request.id, request.status
            )));
        }

        let proposal: Proposal = self
            .ledger
            .create(
                Collection::Proposals,
                &NewProposal {
                    request_id: draft.request_id.clone(),
                    collector_id: draft.collector_id.clone(),
                    price,
                    scheduled_start: draft.scheduled_start,
                    scheduled_end: draft.scheduled_end,
                    status: ProposalStatus::Pending,
                },
            )
            .await?;
        info!(
            proposal_id = %proposal.id,
            request_id = %proposal.request_id,
            collector_id = %proposal.collector_id,
            price,
            "proposal submitted"
        );
        Ok(proposal)
    }

    /// Proposals made on a request.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the ledger fails.
    pub async fn proposals_for(&self, request_id: &RequestId) -> Result<Vec<Proposal>, EngineError> {
        self.ledger
            .query(Collection::Proposals, &Filter::by("request_id", request_id))
            .await
    }

    /// Accept a proposal, promote its request and reject every competitor.
    ///
    /// The three writes are sequential. Accepting an already accepted
    /// proposal replays the last two, which finishes an interrupted cascade.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] for an unknown proposal or request.
    /// - [`EngineError::Conflict`] when the proposal was rejected, the request was
    ///   cancelled, or another proposal on the request is already accepted.
    /// - [`EngineError::PartialFailure`] when the cascade stopped after the first write.
    /// - [`EngineError::Upstream`] when the ledger fails before any write.
    pub async fn accept(&self, proposal_id: &ProposalId) -> Result<Acceptance, EngineError> {
        let proposal: Proposal = self
            .ledger
            .find(Collection::Proposals, "proposal", &proposal_id.0)
            .await?;
        if proposal.status == ProposalStatus::Rejected {
            return Err(EngineError::Conflict(format!(
                "Proposal {proposal_id} was rejected"
            )));
        }
        let request: Request = self
            .ledger
            .find(Collection::Requests, "request", &proposal.request_id.0)
            .await?;
        if request.status == RequestStatus::Cancelled {
            return Err(EngineError::Conflict(format!(
                "Request {} was cancelled",
                request.id
            )));
        }

        let competing: Vec<Proposal> = self
            .ledger
            .query(
                Collection::Proposals,
                &Filter::by("request_id", &request.id)
                    .not_equal("id", proposal_id)
                    .equal("status", ProposalStatus::Accepted),
            )
            .await?;
        if let Some(winner) = competing.first() {
            return Err(EngineError::Conflict(format!(
                "Request {} already accepted proposal {}",
                request.id, winner.id
            )));
        }

        let accepted: Vec<Proposal> = self
            .ledger
            .update(
                Collection::Proposals,
                &Filter::by("id", proposal_id).any_of(
                    "status",
                    [ProposalStatus::Pending, ProposalStatus::Accepted],
                ),
                &StatusPatch {
                    status: ProposalStatus::Accepted,
                },
            )
            .await?;
        let Some(accepted) = accepted.into_iter().next() else {
            return Err(EngineError::Conflict(format!(
                "Proposal {proposal_id} changed while being accepted"
            )));
        };
        let mut committed = vec![WriteRef::new(Collection::Proposals, proposal_id)];

        let promoted = self
            .ledger
            .update::<_, Request>(
                Collection::Requests,
                &Filter::by("id", &request.id),
                &StatusPatch {
                    status: RequestStatus::Matched,
                },
            )
            .await
            .and_then(|rows| {
                rows.into_iter()
                    .next()
                    .ok_or_else(|| EngineError::not_found("request", &request.id))
            });
        let promoted = match promoted {
            Ok(promoted) => promoted,
            Err(err) => {
                warn!(%proposal_id, error = %err, "proposal accepted but request not promoted");
                return Err(err.after_writes("accept_proposal", committed, "promote_request"));
            }
        };
        committed.push(WriteRef::new(Collection::Requests, &request.id));

        let rejected: Vec<Proposal> = match self
            .ledger
            .update(
                Collection::Proposals,
                &Filter::by("request_id", &request.id).not_equal("id", proposal_id),
                &StatusPatch {
                    status: ProposalStatus::Rejected,
                },
            )
            .await
        {
            Ok(rejected) => rejected,
            Err(err) => {
                warn!(%proposal_id, error = %err, "competing proposals left pending");
                return Err(err.after_writes(
                    "accept_proposal",
                    committed,
                    "reject_competing_proposals",
                ));
            }
        };

        info!(
            %proposal_id,
            request_id = %request.id,
            rejected = rejected.len(),
            "proposal accepted"
        );
        Ok(Acceptance {
            proposal: accepted,
            request: promoted,
            rejected: rejected.into_iter().map(|proposal| proposal.id).collect(),
        })
    }

    /// Reject a proposal. Rejecting twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown proposal and
    /// [`EngineError::Upstream`] when the ledger fails.
    pub async fn reject(&self, proposal_id: &ProposalId) -> Result<Proposal, EngineError> {
        let rejected: Vec<Proposal> = self
            .ledger
            .update(
                Collection::Proposals,
                &Filter::by("id", proposal_id),
                &StatusPatch {
                    status: ProposalStatus::Rejected,
                },
            )
            .await?;
        let proposal = rejected
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::not_found("proposal", proposal_id))?;
        info!(%proposal_id, "proposal rejected");
        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::ports::Credential;
    use crate::testing::{MemoryLedger, point, proposal_row, request_row};

    fn draft(request_id: &str, price: f64) -> ProposalDraft {
        let start = Utc
            .with_ymd_and_hms(2026, 10, 21, 9, 0, 0)
            .single()
            .expect("valid timestamp");
        ProposalDraft {
            request_id: RequestId::from(request_id),
            collector_id: SubjectId::from("collector-1"),
            price,
            scheduled_start: start,
            scheduled_end: start + Duration::hours(2),
        }
    }

    fn with_request(status: RequestStatus) -> MemoryLedger {
        let ledger = MemoryLedger::default();
        ledger.seed(
            Collection::Requests,
            request_row("r1", &["furniture"], point(47.26, 0.48), status),
        );
        ledger
    }

    fn status_of(ledger: &MemoryLedger, collection: Collection, id: &str) -> Option<serde_json::Value> {
        ledger.column(collection, id, "status")
    }

    #[test]
    fn price_must_be_positive_and_finite() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = validate_price(bad).expect_err("invalid price");
            assert_eq!(err.fields(), ["price"], "blames price for {bad}");
        }
        assert!(validate_price(0.01).is_ok(), "one cent is fine");
    }

    #[tokio::test]
    async fn invalid_prices_are_never_persisted() {
        let ledger = with_request(RequestStatus::Pending);
        let credential = Credential::bearer("collector-token");
        let arbitrator = ProposalArbitrator::new(LedgerGateway::new(&ledger, &credential));

        for bad in [0.0, -30.0, f64::NAN] {
            let err = arbitrator.submit(&draft("r1", bad)).await.expect_err("rejected");
            assert!(matches!(err, EngineError::Validation { .. }), "{err}");
        }

        assert!(ledger.calls().is_empty(), "ledger never touched");
    }

    #[tokio::test]
    async fn submit_stores_a_pending_proposal() {
        let ledger = with_request(RequestStatus::Pending);
        let credential = Credential::bearer("collector-token");
        let arbitrator = ProposalArbitrator::new(LedgerGateway::new(&ledger, &credential));

        let proposal = arbitrator.submit(&draft("r1", 30.0)).await.expect("stored");

        assert_eq!(proposal.status, ProposalStatus::Pending, "new proposals are pending");
        assert!((proposal.price - 30.0).abs() < f64::EPSILON, "price kept");
        assert_eq!(ledger.rows(Collection::Proposals).len(), 1, "one row");
    }

    #[tokio::test]
    async fn submit_requires_an_open_request() {
        let credential = Credential::bearer("t");

        let missing = MemoryLedger::default();
        let err = ProposalArbitrator::new(LedgerGateway::new(&missing, &credential))
            .submit(&draft("r1", 30.0))
            .await
            .expect_err("unknown request");
        assert!(matches!(err, EngineError::NotFound { .. }), "{err}");

        let cancelled = with_request(RequestStatus::Cancelled);
        let err = ProposalArbitrator::new(LedgerGateway::new(&cancelled, &credential))
            .submit(&draft("r1", 30.0))
            .await
            .expect_err("cancelled request");
        assert!(matches!(err, EngineError::Conflict(_)), "{err}");
    }

    #[tokio::test]
    async fn submit_rejects_inverted_windows() {
        let ledger = with_request(RequestStatus::Pending);
        let credential = Credential::bearer("t");
        let mut inverted = draft("r1", 30.0);
        inverted.scheduled_end = inverted.scheduled_start;

        let err = ProposalArbitrator::new(LedgerGateway::new(&ledger, &credential))
            .submit(&inverted)
            .await
            .expect_err("empty window");

        assert_eq!(err.fields(), ["scheduledEnd"], "blames the end");
    }

    #[tokio::test]
    async fn accept_promotes_request_and_rejects_competitors() {
        let ledger = with_request(RequestStatus::Pending);
        for id in ["p1", "p2", "p3"] {
            ledger.seed(Collection::Proposals, proposal_row(id, "r1", ProposalStatus::Pending));
        }
        ledger.seed(Collection::Proposals, proposal_row("other", "r9", ProposalStatus::Pending));
        let credential = Credential::bearer("client-token");
        let arbitrator = ProposalArbitrator::new(LedgerGateway::new(&ledger, &credential));

        let acceptance = arbitrator
            .accept(&ProposalId::from("p2"))
            .await
            .expect("accepted");

        assert_eq!(acceptance.proposal.status, ProposalStatus::Accepted, "returned proposal");
        assert_eq!(acceptance.request.status, RequestStatus::Matched, "returned request");
        assert_eq!(
            acceptance.rejected,
            vec![ProposalId::from("p1"), ProposalId::from("p3")],
            "competitors rejected"
        );
        assert_eq!(status_of(&ledger, Collection::Proposals, "p2"), Some(json!("accepted")), "p2");
        assert_eq!(status_of(&ledger, Collection::Proposals, "p1"), Some(json!("rejected")), "p1");
        assert_eq!(status_of(&ledger, Collection::Proposals, "p3"), Some(json!("rejected")), "p3");
        assert_eq!(status_of(&ledger, Collection::Proposals, "other"), Some(json!("pending")), "other request untouched");
        assert_eq!(status_of(&ledger, Collection::Requests, "r1"), Some(json!("matched")), "request matched");
    }

    #[tokio::test]
    async fn accept_refuses_when_a_sibling_already_won() {
        let ledger = with_request(RequestStatus::Matched);
        ledger.seed(Collection::Proposals, proposal_row("p1", "r1", ProposalStatus::Accepted));
        ledger.seed(Collection::Proposals, proposal_row("p2", "r1", ProposalStatus::Pending));
        let credential = Credential::bearer("t");
        let arbitrator = ProposalArbitrator::new(LedgerGateway::new(&ledger, &credential));

        let err = arbitrator
            .accept(&ProposalId::from("p2"))
            .await
            .expect_err("sibling already accepted");

        assert!(matches!(err, EngineError::Conflict(_)), "{err}");
        assert_eq!(ledger.writes(), 0, "nothing written");
    }

    #[tokio::test]
    async fn accept_refuses_rejected_proposals() {
        let ledger = with_request(RequestStatus::Pending);
        ledger.seed(Collection::Proposals, proposal_row("p1", "r1", ProposalStatus::Rejected));
        let credential = Credential::bearer("t");

        let err = ProposalArbitrator::new(LedgerGateway::new(&ledger, &credential))
            .accept(&ProposalId::from("p1"))
            .await
            .expect_err("rejected proposal");

        assert!(matches!(err, EngineError::Conflict(_)), "{err}");
    }

    #[tokio::test]
    async fn interrupted_accept_reports_committed_writes_and_can_be_replayed() {
        let ledger = with_request(RequestStatus::Pending);
        ledger.seed(Collection::Proposals, proposal_row("p1", "r1", ProposalStatus::Pending));
        ledger.seed(Collection::Proposals, proposal_row("p2", "r1", ProposalStatus::Pending));
        ledger.fail_next_write(Collection::Requests);
        let credential = Credential::bearer("t");
        let arbitrator = ProposalArbitrator::new(LedgerGateway::new(&ledger, &credential));

        let err = arbitrator
            .accept(&ProposalId::from("p1"))
            .await
            .expect_err("request promotion fails");
        let EngineError::PartialFailure(partial) = err else {
            unreachable!("expected a partial failure");
        };
        assert_eq!(partial.failed_step, "promote_request", "failing step");
        assert_eq!(
            partial.committed,
            vec![WriteRef::new(Collection::Proposals, "p1")],
            "proposal already accepted"
        );
        assert_eq!(status_of(&ledger, Collection::Requests, "r1"), Some(json!("pending")), "request untouched");

        let acceptance = arbitrator
            .accept(&ProposalId::from("p1"))
            .await
            .expect("replay finishes the cascade");
        assert_eq!(acceptance.rejected, vec![ProposalId::from("p2")], "competitor rejected");
        assert_eq!(status_of(&ledger, Collection::Requests, "r1"), Some(json!("matched")), "request matched");
    }

    #[tokio::test]
    async fn failing_sibling_rejection_is_a_partial_failure() {
        let ledger = with_request(RequestStatus::Pending);
        ledger.seed(Collection::Proposals, proposal_row("p1", "r1", ProposalStatus::Pending));
        ledger.seed(Collection::Proposals, proposal_row("p2", "r1", ProposalStatus::Pending));
        ledger.fail_write_after(Collection::Proposals, 1);
        let credential = Credential::bearer("t");

        let err = ProposalArbitrator::new(LedgerGateway::new(&ledger, &credential))
            .accept(&ProposalId::from("p1"))
            .await
            .expect_err("third write fails");

        let EngineError::PartialFailure(partial) = err else {
            unreachable!("expected a partial failure");
        };
        assert_eq!(partial.failed_step, "reject_competing_proposals", "failing step");
        assert_eq!(partial.committed.len(), 2, "proposal and request committed");
    }

    #[tokio::test]
    async fn reject_is_idempotent_and_reports_unknown_ids() {
        let ledger = with_request(RequestStatus::Pending);
        ledger.seed(Collection::Proposals, proposal_row("p1", "r1", ProposalStatus::Pending));
        let credential = Credential::bearer("t");
        let arbitrator = ProposalArbitrator::new(LedgerGateway::new(&ledger, &credential));

        for _ in 0..2 {
            let proposal = arbitrator.reject(&ProposalId::from("p1")).await.expect("rejected");
            assert_eq!(proposal.status, ProposalStatus::Rejected, "status");
        }

        let err = arbitrator
            .reject(&ProposalId::from("ghost"))
            .await
            .expect_err("unknown proposal");
        assert!(matches!(err, EngineError::NotFound { .. }), "{err}");
    }
}
