//! Core types and workflow for the bulky-waste pickup fulfillment engine.

/// Proposal submission, acceptance and rejection.
pub mod arbitrator;
/// Ports the facade is wired to.
pub mod backends;
/// Error taxonomy and partial-failure reporting.
pub mod error;
/// High-level facade used by transport shells.
pub mod facade;
/// Typed ledger access bound to a subject credential.
pub mod gateway;
/// Pickup request intake.
pub mod intake;
/// Disposal site selection.
pub mod matcher;
/// Domain records and identifiers.
pub mod model;
/// Transport-neutral call outcomes.
pub mod outcome;
/// Route planning and confirmation.
pub mod planner;
/// Traits describing the ledger and routing interfaces.
pub mod ports;
/// Inbound payload schemas.
pub mod schema;
/// Disposal site registration.
pub mod sites;
/// Stop completion and route lifecycle.
pub mod tracker;

#[cfg(test)]
mod testing;

pub use arbitrator::*;
pub use backends::*;
pub use error::*;
pub use facade::*;
pub use gateway::*;
pub use intake::*;
pub use matcher::*;
pub use model::*;
pub use outcome::*;
pub use planner::*;
pub use ports::*;
pub use schema::*;
pub use sites::*;
pub use tracker::*;
