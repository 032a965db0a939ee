mod config;
mod dashboard;
mod direct;
mod error;
mod events;
mod logging;
mod measurement;
mod orchestrator;
mod proxy;
mod region;
mod report;
mod server;
mod signal_handler;
mod stats;
mod timing;
mod upstream;

use clap::Parser;
use config::{clamp_iterations, Config, LoggingConfig};
use dashboard::Dashboard;
use events::OrchestratorEvent;
use logging::*;
use orchestrator::TestOrchestrator;
use server::MeasureContext;
use signal_handler::GracefulShutdown;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::mpsc;
use url::Url;

#[derive(Parser)]
#[command(name = "edge-latency-probe")]
#[command(about = "Measure how much latency an edge proxy hop adds to backend API calls")]
struct Args {
    /// Enable TUI dashboard mode
    #[arg(long, help = "Run with interactive dashboard")]
    dashboard: bool,

    /// Run one test and print the comparison
    #[arg(long, conflicts_with = "dashboard")]
    run: bool,

    /// Print the raw run report as JSON (with --run)
    #[arg(long, requires = "run")]
    json: bool,

    /// Backend URL to measure
    #[arg(long)]
    target: Option<String>,

    /// Iterations per run (1-20)
    #[arg(long)]
    iterations: Option<u32>,

    /// Base URL of deployed measurers; defaults to an in-process server
    #[arg(long)]
    measurer: Option<String>,

    /// Port for serve mode
    #[arg(long)]
    port: Option<u16>,

    /// Path to the configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            // Dashboard mode: no console logging to avoid interfering with TUI
            if !args.dashboard {
                init_logging(&LoggingConfig::default());
                log_config_error(&format!("{e}"));
            }
            eprintln!(
                "Please fix config.toml (see config.toml.example) or the command-line flags."
            );
            return Err(e);
        }
    };

    if !args.dashboard {
        init_logging(&config.logging);
        log_config_loaded(&source);
    }

    if args.dashboard {
        run_with_dashboard(config).await
    } else if args.run {
        run_headless(config, args.json).await
    } else {
        run_server(config).await
    }
}

/// Load the file, then let command-line flags override it
fn load_config(args: &Args) -> anyhow::Result<(Config, String)> {
    let (mut config, source) = match &args.config {
        Some(path) => (
            Config::load_from_file(path)?,
            path.display().to_string(),
        ),
        None => Config::load_default()?,
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(iterations) = args.iterations {
        config.orchestrator.iterations = clamp_iterations(iterations);
    }
    if let Some(target) = &args.target {
        config.orchestrator.target_url = Some(target.clone());
    }
    if let Some(measurer) = &args.measurer {
        config.orchestrator.measurer_base_url = Some(measurer.clone());
    }

    config.validate()?;
    Ok((config, source))
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let listener = server::bind(config.bind_addr()?)?;
    let ctx = MeasureContext::from_config(&config);

    let shutdown = GracefulShutdown::new();
    let signals = shutdown.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    server::serve(listener, ctx, async move { shutdown.wait().await }).await
}

/// Resolve the measurer base URL, starting the in-process server when no
/// deployed measurers were configured
fn start_measurers(config: &Config, shutdown: &GracefulShutdown) -> anyhow::Result<Url> {
    if let Some(base) = &config.orchestrator.measurer_base_url {
        return Ok(Url::parse(base)?);
    }

    let listener = server::bind(SocketAddr::from(([127, 0, 0, 1], 0)))?;
    let addr = listener.local_addr()?;
    let ctx = MeasureContext::from_config(config);
    let stop = shutdown.clone();

    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, ctx, async move { stop.wait().await }).await {
            tracing::error!("Measurer server error: {}", e);
        }
    });

    Ok(Url::parse(&format!("http://{addr}/"))?)
}

async fn run_headless(config: Config, json: bool) -> anyhow::Result<()> {
    let target = config.orchestrator.target_url.clone().ok_or_else(|| {
        anyhow::anyhow!("❌ No target URL: pass --target or set orchestrator.target_url")
    })?;

    let shutdown = GracefulShutdown::new();
    let measurer_base = start_measurers(&config, &shutdown)?;

    let mut orchestrator =
        TestOrchestrator::new(upstream::build_client(), measurer_base, &config.orchestrator);
    let run_report = orchestrator
        .run(&target, config.orchestrator.iterations)
        .await;

    shutdown.trigger();

    if json {
        println!("{}", serde_json::to_string_pretty(&run_report)?);
    } else {
        print!("{}", report::render_report(&run_report));
    }

    Ok(())
}

async fn run_with_dashboard(config: Config) -> anyhow::Result<()> {
    let shutdown = GracefulShutdown::new();
    let measurer_base = start_measurers(&config, &shutdown)?;

    let (event_sender, event_receiver) = mpsc::unbounded_channel::<OrchestratorEvent>();
    let (command_sender, command_receiver) = mpsc::unbounded_channel();

    let _ = event_sender.send(OrchestratorEvent::ServerStarted {
        measurer_url: measurer_base.to_string(),
    });

    let mut dashboard = Dashboard::new(
        measurer_base.to_string(),
        config.orchestrator.target_url.clone().unwrap_or_default(),
        config.orchestrator.iterations,
    );

    let orchestrator =
        TestOrchestrator::new(upstream::build_client(), measurer_base, &config.orchestrator)
            .with_events(event_sender);
    tokio::spawn(orchestrator.run_commands(command_receiver));

    let result = dashboard.run(event_receiver, command_sender).await;
    shutdown.trigger();
    result
}
