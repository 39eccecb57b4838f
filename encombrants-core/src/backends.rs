//! External collaborators the facade delegates to.

use std::fmt;
use std::sync::Arc;

use crate::ports::{LedgerPort, RoutingKey, RoutingPort};

/// Ledger and routing implementations plus the routing credential.
///
/// Ledger calls carry the caller's credential, so only the routing key is held
/// here. It is optional: without it every call works except route computation.
pub struct Backends {
    /// Implementation for ledger access.
    pub ledger: Arc<dyn LedgerPort>,
    /// Implementation for path computation.
    pub routing: Arc<dyn RoutingPort>,
    /// Key for the routing service.
    pub routing_key: Option<RoutingKey>,
}

impl Backends {
    /// Bundle the given ports.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerPort>,
        routing: Arc<dyn RoutingPort>,
        routing_key: Option<RoutingKey>,
    ) -> Self {
        Self {
            ledger,
            routing,
            routing_key,
        }
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Backends")
            .field("routing_key", &self.routing_key)
            .finish_non_exhaustive()
    }
}
