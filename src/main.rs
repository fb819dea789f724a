// ABOUTME: Main entry point for the calendar-to-presence bridge
// ABOUTME: Initializes logging and config, then serves HTTP or runs a one-shot availability sync

use anyhow::Result;
use calbridge::{
    config::Config,
    server::{self, ServerState},
};
use calbridge_core::availability;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "calbridge", version, about = "Calendar to chat presence bridge")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server and the recurring availability job (default)
    Serve,
    /// Sync one user's presence from their calendar and print the result
    Availability {
        /// Chat user id
        user_id: String,
    },
}

fn init_tracing() {
    let json = std::env::var("CALBRIDGE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load()?;

    tracing::info!(
        site_url = %config.server.site_url,
        base_path = %config.server.base_path,
        workspace = %config.workspace.path,
        job_enabled = config.availability_job.enabled,
        job_interval_secs = config.availability_job.interval_secs,
        "Configuration loaded"
    );

    let ctx = server::build_context(config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let metrics = server::init_metrics()?;
            let job_enabled = ctx.config().availability_job.enabled;
            ctx.init_recurring_job(job_enabled).await;

            let result = server::serve(ServerState {
                ctx: ctx.clone(),
                metrics: Some(metrics),
            })
            .await;

            ctx.shutdown().await;
            tracing::info!("Shutdown complete");
            result
        }
        Command::Availability { user_id } => {
            let summary = availability::compute_and_apply(&ctx, &user_id).await?;
            println!("{}", summary);
            Ok(())
        }
    }
}
