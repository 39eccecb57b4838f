//! Dispatch of parsed commands to the fulfillment facade.

use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use encombrants_core::facade::{FulfillmentService, Session};
use encombrants_core::model::{ProposalId, RequestId, RouteId, StopId, SubjectId};
use encombrants_core::outcome::{Failure, Outcome, StatusClass};
use encombrants_core::schema::parse_payload;

use crate::cli::Command;

/// JSON document printed for a finished command.
#[derive(Debug)]
pub(crate) struct Rendered {
    pub(crate) status: StatusClass,
    pub(crate) body: Value,
}

/// Run one command. Only local problems such as an unreadable payload file
/// are errors here; workflow failures are rendered like successes.
pub(crate) async fn run(
    service: &FulfillmentService,
    session: &Session,
    command: Command,
) -> Result<Rendered> {
    match command {
        Command::CreateRequest { payload } => match payload_from(&payload)? {
            Ok(payload) => render(service.create_request(session, payload).await),
            Err(failure) => render_failure(failure),
        },
        Command::ListRequests => render(service.list_requests(session).await),
        Command::GetRequest { id } => render(service.get_request(session, &RequestId(id)).await),
        Command::CancelRequest { id } => {
            render(service.cancel_request(session, &RequestId(id)).await)
        }
        Command::SubmitProposal { payload } => match payload_from(&payload)? {
            Ok(payload) => render(service.submit_proposal(session, payload).await),
            Err(failure) => render_failure(failure),
        },
        Command::ListProposals { request_id } => {
            render(service.list_proposals(session, &RequestId(request_id)).await)
        }
        Command::AcceptProposal { id } => {
            render(service.accept_proposal(session, &ProposalId(id)).await)
        }
        Command::RejectProposal { id } => {
            render(service.reject_proposal(session, &ProposalId(id)).await)
        }
        Command::ComputeRoute { payload } => match payload_from(&payload)? {
            Ok(payload) => render(service.compute_route(session, payload).await),
            Err(failure) => render_failure(failure),
        },
        Command::ConfirmRoute { id } => render(service.confirm_route(session, &RouteId(id)).await),
        Command::StartRoute { id } => render(service.start_route(session, &RouteId(id)).await),
        Command::GetRoute { id } => render(service.get_route(session, &RouteId(id)).await),
        Command::ListRoutes { collector } => render(
            service
                .list_routes(session, collector.map(SubjectId))
                .await,
        ),
        Command::CompleteStop { id } => render(service.complete_stop(session, &StopId(id)).await),
        Command::SkipStop { id } => render(service.skip_stop(session, &StopId(id)).await),
        Command::RegisterDeposit { payload } => match payload_from(&payload)? {
            Ok(payload) => render(service.register_deposit_site(session, payload).await),
            Err(failure) => render_failure(failure),
        },
        Command::ListDeposits => render(service.list_deposit_sites(session).await),
    }
}

/// Read and decode a payload argument. Malformed JSON is a workflow failure,
/// an unreadable source is not.
fn payload_from<T: DeserializeOwned>(source: &str) -> Result<Result<T, Failure>> {
    let raw = read_source(source)?;
    Ok(parse_payload(&raw).map_err(Failure::from))
}

/// Inline JSON, `@path` for a file, or `-` for stdin.
fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("reading payload from stdin")?;
        return Ok(raw);
    }
    match source.strip_prefix('@') {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading payload file {path}"))
        }
        None => Ok(source.to_owned()),
    }
}

fn render<T: Serialize>(outcome: Outcome<T>) -> Result<Rendered> {
    match outcome {
        Ok(success) => Ok(Rendered {
            status: success.status,
            body: serde_json::to_value(&success)?,
        }),
        Err(failure) => render_failure(failure),
    }
}

fn render_failure(failure: Failure) -> Result<Rendered> {
    Ok(Rendered {
        status: failure.status,
        body: serde_json::to_value(&failure)?,
    })
}
