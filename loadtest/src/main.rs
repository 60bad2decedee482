use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use venue_loadtest::config::{Config, ProfileMode};
use venue_loadtest::fixture::{generate, write_artifact};
use venue_loadtest::orchestrator::{Orchestrator, RunSummary};
use venue_loadtest::transport::HttpTransport;
use venue_loadtest::users::UserSource;
use venue_loadtest::workflow::basic_session;

/// Exit code for configuration and wiring failures
const SETUP_ERROR: u8 = 2;

/// Load tester for the Venue API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Render the seed fixture batch through the loader template
    Generate,
    /// Drive the session workflow against the target
    Run {
        /// Load shape; falls back to LOAD_PROFILE, then staged
        #[arg(value_enum)]
        mode: Option<ProfileMode>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Install the Prometheus recorder (must happen before any metric is recorded)
fn setup_prometheus_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

fn generate_fixtures(config: &Config) -> anyhow::Result<()> {
    let fixture = &config.fixture;
    let batch = generate(
        fixture.users,
        fixture.post_floor,
        &fixture.rank_ids,
        fixture.seed,
    )?;
    let path = write_artifact(
        &batch,
        &fixture.template_path,
        &fixture.output_path,
        &fixture.dialect,
    )?;
    info!(
        "Generated {} users, {} profiles, {} posts into {:?}",
        batch.users.len(),
        batch.profiles.len(),
        batch.posts.len(),
        path
    );
    Ok(())
}

fn user_source(config: &Config) -> anyhow::Result<UserSource> {
    match &config.target.user_pool_path {
        Some(path) => Ok(UserSource::from_json_file(path)?),
        None => {
            // Same seed as `generate`, so the pool matches the loaded fixtures
            let fixture = &config.fixture;
            let batch = generate(
                fixture.users,
                fixture.post_floor,
                &fixture.rank_ids,
                fixture.seed,
            )?;
            Ok(UserSource::new(batch.credentials())?)
        }
    }
}

async fn run_load(config: &Config, mode: ProfileMode) -> anyhow::Result<RunSummary> {
    let profile = config.load_profile(mode)?;
    let users = Arc::new(user_source(config)?);
    let transport = Arc::new(
        HttpTransport::new(&config.target.base_url, config.target.request_timeout)
            .context("Failed to build HTTP client")?,
    );
    let workflow = Arc::new(
        basic_session(Arc::clone(&users), transport).with_auth_scheme(&config.target.auth_scheme),
    );

    info!(
        "Target {} with {} credentials",
        config.target.base_url,
        users.len()
    );

    let orchestrator = Orchestrator::new(workflow, profile, config.orchestrator());
    let stop = orchestrator.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping run");
            stop.stop();
        }
    });

    Ok(orchestrator.run().await)
}

async fn execute(config: Config, command: Commands) -> anyhow::Result<u8> {
    let prometheus = match &config.metrics_export_path {
        Some(_) => Some(setup_prometheus_metrics()?),
        None => None,
    };

    let code = match command {
        Commands::Generate => {
            generate_fixtures(&config)?;
            0
        }
        Commands::Run { mode, json } => {
            let mode = mode.unwrap_or(config.load.mode);
            let summary = run_load(&config, mode).await?;
            if json {
                println!("{}", summary.to_json());
            } else {
                summary.print_summary();
            }
            if let Err(violation) = summary.verdict() {
                warn!("{}", violation);
            }
            summary.exit_code() as u8
        }
    };

    if let (Some(handle), Some(path)) = (prometheus, &config.metrics_export_path) {
        std::fs::write(path, handle.render())
            .with_context(|| format!("Failed to write metrics to {:?}", path))?;
        info!("Metrics written to {:?}", path);
    }

    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Usage errors exit with clap's status 2, same as setup errors
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "venue_loadtest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: target={}, profile={:?}",
        config.target.base_url, config.load.mode
    );

    match execute(config, cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(SETUP_ERROR)
        }
    }
}
