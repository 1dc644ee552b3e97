use anyhow::{Context, Result};
use callsim_core::*;
use callsim_engine::{CallSimulationRunner, RunReport, Verdict, WriteStatus};
use callsim_sessions_appium::AppiumSession;
use callsim_sessions_common::SimulatedSession;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "callsim")]
#[command(about = "Simulate incoming calls on an automated device and capture the screen for each")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to a TOML run configuration
    #[arg(short, long, env = "CALLSIM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the call simulation over the configured numbers
    Run(RunArgs),

    /// List the configured numbers in processing order
    Numbers,

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Automation server URL (e.g. "http://localhost:4723/wd/hub")
    #[arg(long, env = "APPIUM_SERVER_URL")]
    server_url: Option<String>,

    /// Directory screenshots are written into
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Milliseconds to wait between starting a call and taking the screenshot
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Create the output directory if it is missing
    #[arg(long)]
    create_output_dir: bool,

    /// Lock the device screen before the first call
    #[arg(long)]
    lock_device: bool,

    /// Write a CSV manifest of per-number outcomes
    #[arg(long)]
    results_file: Option<PathBuf>,

    /// Reference screen of an allowed call; classifies each screenshot
    #[arg(long, requires = "blocked_image")]
    allowed_image: Option<PathBuf>,

    /// Reference screen of a blocked call
    #[arg(long, requires = "allowed_image")]
    blocked_image: Option<PathBuf>,

    /// Use an in-memory simulated device instead of the automation server
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RunConfig::default(),
    };

    match cli.command {
        Commands::Run(args) => {
            let dry_run = args.dry_run;
            let config = apply_overrides(config, args)?;
            run_simulation(config, dry_run).await?;
        }
        Commands::Numbers => {
            println!("Configured numbers ({}):", config.caller_ids.len());
            for (i, id) in config.caller_ids.iter().enumerate() {
                println!("  {:>3}  {}", i + 1, id);
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}

/// Layer command-line flags over the loaded configuration.
fn apply_overrides(mut config: RunConfig, args: RunArgs) -> Result<RunConfig> {
    if let Some(url) = args.server_url {
        config.server = config.server.with_url(&url)?;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(delay) = args.delay_ms {
        config.ring_delay_ms = delay;
    }
    if let Some(path) = args.results_file {
        config.results_file = Some(path);
    }
    if let (Some(allowed), Some(blocked)) = (args.allowed_image, args.blocked_image) {
        config.reference_images = Some(ReferenceImagesConfig { allowed, blocked });
    }
    config.create_output_dir |= args.create_output_dir;
    config.lock_device |= args.lock_device;
    Ok(config)
}

async fn run_simulation(config: RunConfig, dry_run: bool) -> Result<()> {
    let session: Arc<dyn AutomationSession> = if dry_run {
        tracing::info!("Dry run: using a simulated device session");
        Arc::new(SimulatedSession::default())
    } else {
        let session = AppiumSession::start(&config.server, &config.capabilities)
            .await
            .with_context(|| format!("Could not start a session at {}", config.server.base_url()))?;
        Arc::new(session)
    };

    let runner = CallSimulationRunner::new(Arc::clone(&session), config);
    let result = runner.run().await;

    // Release the session whether or not the run succeeded.
    if let Err(e) = session.end().await {
        tracing::warn!(error = %e, "Session release failed");
    }

    let report = result?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    let sep = "=".repeat(60);
    println!("\n{sep}");
    println!("  CALL SIMULATION RESULTS");
    println!("{sep}");
    println!("  Run:         {}", report.run_id);
    println!("  Started:     {}", report.started_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Duration:    {:.1}s", report.duration().num_milliseconds() as f64 / 1000.0);
    println!("  Numbers:     {}", report.outcomes.len());
    println!("  Written:     {}", report.written_count());
    println!("  Failed:      {}", report.failed_count());
    if report.outcomes.iter().any(|o| o.classification.is_some()) {
        println!("  Allowed:     {}", report.verdict_count(Verdict::Allowed));
        println!("  Blocked:     {}", report.verdict_count(Verdict::Blocked));
    }
    println!("{sep}");
    for outcome in &report.outcomes {
        let verdict = outcome
            .classification
            .map(|c| format!(" [{}]", c.verdict))
            .unwrap_or_default();
        match &outcome.status {
            WriteStatus::Written { bytes } => println!(
                "  {:<14} {} ({} bytes){}",
                outcome.caller_id,
                outcome.path.display(),
                bytes,
                verdict
            ),
            WriteStatus::WriteFailed { reason } => {
                println!("  {:<14} FAILED: {}{}", outcome.caller_id, reason, verdict)
            }
        }
    }
    println!("{sep}\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let args = RunArgs {
            server_url: Some("http://10.0.2.2:4724/wd/hub".to_string()),
            output_dir: Some(PathBuf::from("shots")),
            delay_ms: Some(3000),
            lock_device: true,
            ..Default::default()
        };
        let config = apply_overrides(RunConfig::default(), args).unwrap();

        assert_eq!(config.server.base_url(), "http://10.0.2.2:4724/wd/hub");
        assert_eq!(config.output_dir, PathBuf::from("shots"));
        assert_eq!(config.ring_delay_ms, 3000);
        assert!(config.lock_device);
        assert!(!config.create_output_dir);
        assert_eq!(config.caller_ids.len(), 20);
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let config = apply_overrides(RunConfig::default(), RunArgs::default()).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_bad_server_url_rejected() {
        let args = RunArgs {
            server_url: Some("localhost:4723".to_string()),
            ..Default::default()
        };
        assert!(apply_overrides(RunConfig::default(), args).is_err());
    }

    #[test]
    fn test_reference_image_flags() {
        let cli = Cli::try_parse_from([
            "callsim",
            "run",
            "--allowed-image",
            "refs/allowed.png",
            "--blocked-image",
            "refs/blocked.png",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("Expected run command");
        };
        let config = apply_overrides(RunConfig::default(), args).unwrap();
        assert_eq!(
            config.reference_images,
            Some(ReferenceImagesConfig {
                allowed: PathBuf::from("refs/allowed.png"),
                blocked: PathBuf::from("refs/blocked.png"),
            })
        );

        assert!(Cli::try_parse_from(["callsim", "run", "--allowed-image", "a.png"]).is_err());
    }

    #[test]
    fn test_ipv6_server_url_accepted() {
        let args = RunArgs {
            server_url: Some("http://[::1]:4723/wd/hub".to_string()),
            ..Default::default()
        };
        let config = apply_overrides(RunConfig::default(), args).unwrap();
        assert_eq!(config.server.base_url(), "http://[::1]:4723/wd/hub");
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "callsim",
            "run",
            "--dry-run",
            "--delay-ms",
            "10",
            "--create-output-dir",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert!(args.dry_run);
                assert!(args.create_output_dir);
                assert_eq!(args.delay_ms, Some(10));
            }
            _ => panic!("Expected run command"),
        }
    }
}
