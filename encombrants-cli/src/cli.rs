//! Command line arguments and environment configuration.

use clap::{Parser, Subcommand};

use encombrants_core::facade::Session;
use encombrants_core::model::SubjectId;
use encombrants_core::ports::{Credential, RoutingKey};
use encombrants_provider_ors::{DEFAULT_BASE_URL, DEFAULT_PROFILE, OrsConfig};
use encombrants_provider_postgrest::PostgrestConfig;

/// Drive the bulky-waste pickup workflow against a ledger and a routing service.
///
/// Payload arguments take inline JSON, `@path` to read a file, or `-` for stdin.
#[derive(Debug, Parser)]
#[command(name = "encombrants", version)]
pub(crate) struct Args {
    /// Ledger project URL, without the `/rest/v1` suffix
    #[arg(long, env = "LEDGER_URL")]
    pub(crate) ledger_url: String,

    /// Public project key of the ledger
    #[arg(long, env = "LEDGER_API_KEY", hide_env_values = true)]
    pub(crate) ledger_api_key: String,

    /// Token of the calling subject; anonymous calls use the project key
    #[arg(long, env = "SUBJECT_TOKEN", hide_env_values = true)]
    pub(crate) subject_token: Option<String>,

    /// Identity of the calling subject, vouched for by its token
    #[arg(long, env = "SUBJECT_ID", requires = "subject_token")]
    pub(crate) subject_id: Option<String>,

    /// OpenRouteService key, needed for route computation only
    #[arg(long, env = "ORS_API_KEY", hide_env_values = true)]
    pub(crate) ors_api_key: Option<String>,

    /// OpenRouteService root URL
    #[arg(long, env = "ORS_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub(crate) ors_base_url: String,

    /// Travel profile for directions
    #[arg(long, env = "ORS_PROFILE", default_value = DEFAULT_PROFILE)]
    pub(crate) ors_profile: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub(crate) log_level: String,

    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Args {
    pub(crate) fn postgrest(&self) -> PostgrestConfig {
        PostgrestConfig {
            base_url: self.ledger_url.clone(),
            api_key: self.ledger_api_key.clone(),
        }
    }

    pub(crate) fn ors(&self) -> OrsConfig {
        OrsConfig {
            base_url: self.ors_base_url.clone(),
            profile: self.ors_profile.clone(),
        }
    }

    pub(crate) fn routing_key(&self) -> Option<RoutingKey> {
        self.ors_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(RoutingKey::new)
    }

    /// Session of the caller. Without a subject id, calls run anonymously.
    pub(crate) fn session(&self) -> Session {
        let token = self
            .subject_token
            .clone()
            .unwrap_or_else(|| self.ledger_api_key.clone());
        let credential = Credential::bearer(token);
        match self.subject_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Session::authenticated(SubjectId::from(id), credential),
            _ => Session::anonymous(credential),
        }
    }
}

/// Workflow operations.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create a pickup request
    CreateRequest {
        /// Request payload
        payload: String,
    },
    /// List visible requests
    ListRequests,
    /// Show a request with its availability windows
    GetRequest {
        /// Request id
        id: String,
    },
    /// Cancel a pending request
    CancelRequest {
        /// Request id
        id: String,
    },
    /// Offer a price and schedule for a request
    SubmitProposal {
        /// Proposal payload
        payload: String,
    },
    /// List proposals of a request
    ListProposals {
        /// Request id
        request_id: String,
    },
    /// Accept a proposal and reject its competitors
    AcceptProposal {
        /// Proposal id
        id: String,
    },
    /// Reject a proposal
    RejectProposal {
        /// Proposal id
        id: String,
    },
    /// Plan a route through accepted requests
    ComputeRoute {
        /// Route payload
        payload: String,
    },
    /// Check that a route has all of its stops
    ConfirmRoute {
        /// Route id
        id: String,
    },
    /// Start a scheduled route
    StartRoute {
        /// Route id
        id: String,
    },
    /// Show a route with its stops
    GetRoute {
        /// Route id
        id: String,
    },
    /// List routes of a collector
    ListRoutes {
        /// Collector id, the caller when omitted
        #[arg(long)]
        collector: Option<String>,
    },
    /// Mark a stop completed
    CompleteStop {
        /// Stop id
        id: String,
    },
    /// Mark a stop skipped
    SkipStop {
        /// Stop id
        id: String,
    },
    /// Register a disposal site
    RegisterDeposit {
        /// Deposit payload
        payload: String,
    },
    /// List disposal sites with their settings
    ListDeposits,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    use super::*;

    const BASE: [&str; 5] = [
        "encombrants",
        "--ledger-url",
        "https://ledger.test",
        "--ledger-api-key",
        "anon",
    ];

    fn parse(extra: &[&str]) -> Args {
        Args::try_parse_from(BASE.iter().chain(extra).copied()).expect("arguments parse")
    }

    #[test]
    fn definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn subject_makes_an_authenticated_session() {
        let args = parse(&["--subject-id", "collector-1", "--subject-token", "jwt", "list-requests"]);

        let session = args.session();

        assert_eq!(
            session.subject(),
            Some(&SubjectId::from("collector-1")),
            "subject kept"
        );
    }

    #[test]
    fn blank_subject_is_anonymous() {
        let args = parse(&["--subject-id", "  ", "--subject-token", "jwt", "list-deposits"]);

        assert_eq!(args.session().subject(), None, "no subject");
    }

    #[test]
    fn subject_needs_its_token() {
        let parsed = Args::try_parse_from(
            BASE.iter()
                .chain(&["--subject-id", "collector-1", "list-requests"])
                .copied(),
        );

        let err = parsed.expect_err("token missing");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument, "{err}");
    }

    #[test]
    fn blank_routing_key_counts_as_missing() {
        let args = parse(&["--ors-api-key", " ", "list-routes"]);

        assert!(args.routing_key().is_none(), "blank key ignored");
        assert_eq!(args.ors().profile, DEFAULT_PROFILE, "default profile");
    }

    #[test]
    fn list_routes_takes_an_optional_collector() {
        let args = parse(&["list-routes", "--collector", "c-7"]);

        let Command::ListRoutes { collector } = args.command else {
            unreachable!("expected list-routes");
        };
        assert_eq!(collector.as_deref(), Some("c-7"), "collector parsed");
    }
}
