//! Command line shell for the encombrants pickup fulfillment workflow.

mod cli;
mod command;
mod output;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use reqwest::Client;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use encombrants_core::backends::Backends;
use encombrants_core::facade::FulfillmentService;
use encombrants_provider_ors::OrsRouting;
use encombrants_provider_postgrest::PostgrestLedger;

use crate::cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env file is fine, a broken one is not.
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        return Err(err.into());
    }

    let args = Args::parse();

    // Logs go to stderr so stdout stays a single JSON document.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("encombrants={},info", args.log_level).into()),
        )
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    // HTTP + service setup
    let client = Client::builder().user_agent("encombrants/0.1").build()?;
    let backends = Backends::new(
        Arc::new(PostgrestLedger::new(client.clone(), args.postgrest())),
        Arc::new(OrsRouting::new(client, args.ors())),
        args.routing_key(),
    );
    let service = FulfillmentService::new(Arc::new(backends));
    let session = args.session();
    debug!(command = ?args.command, anonymous = session.subject().is_none(), "dispatching");

    let rendered = command::run(&service, &session, args.command).await?;
    output::print(&rendered)?;

    Ok(if rendered.status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
