use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolkit_telemetry::config::{get_telemetry_dir, load_host_config, telemetry_disabled_by_env};
use toolkit_telemetry::{
    validate_metric_event, FileState, MetricDatum, OperatingSystem, ProcessEnv, SystemHost,
    TelemetryConfig, TelemetryContext, TomlSettings, UserAgentOptions,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolkit", version, about = "Toolkit telemetry diagnostics")]
struct Cli {
    /// Settings file holding the telemetry flags
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Host config file (`[host]` section)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory for persisted telemetry state
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the telemetry client id
    ClientId {
        /// Report as if running under test automation
        #[arg(long)]
        test: bool,
    },
    /// Print the user agent
    UserAgent {
        #[arg(long)]
        platform: bool,
        #[arg(long)]
        client_id: bool,
    },
    /// Print the compute environment type
    Env,
    /// Print the operating system as reported to the telemetry API
    Os,
    /// Check metric records in a JSON file (one object or an array)
    Validate {
        file: PathBuf,
        /// Fail instead of warning on invalid metrics
        #[arg(long)]
        fatal: bool,
    },
    /// Run one-time settings migrations
    Migrate,
    /// Show everything at once
    Status,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}

fn settings_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => {
            let home_dir = dirs::home_dir().context("Could not determine home directory")?;
            Ok(home_dir.join(".toolkit").join("settings.toml"))
        }
    }
}

fn state_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.state_dir {
        Some(dir) => Ok(dir.clone()),
        None => get_telemetry_dir(),
    }
}

fn build_host(cli: &Cli) -> Result<SystemHost> {
    let host_config = load_host_config(cli.config.as_deref())?;
    Ok(SystemHost::new(host_config, state_dir(cli)?))
}

fn build_context(cli: &Cli) -> Result<TelemetryContext> {
    let host_config = load_host_config(cli.config.as_deref())?;
    let state_dir = state_dir(cli)?;

    let settings_path = settings_path(cli.settings.as_deref())?;
    debug!(
        settings = %settings_path.display(),
        state_dir = %state_dir.display(),
        product = host_config.product.as_str(),
        "building telemetry context"
    );
    let settings = TomlSettings::load(&settings_path)
        .with_context(|| format!("Failed to load settings: {}", settings_path.display()))?;
    let config = TelemetryConfig::new(Arc::new(settings), host_config.product)
        .with_env_opt_out(telemetry_disabled_by_env());

    let state = FileState::open(&state_dir)
        .with_context(|| format!("Failed to open state in {}", state_dir.display()))?;
    let host = SystemHost::new(host_config, state_dir);

    Ok(TelemetryContext::new(
        Arc::new(host),
        config,
        Arc::new(state),
        Arc::new(ProcessEnv),
    ))
}

fn load_metrics(path: &Path) -> Result<Vec<MetricDatum>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read metrics: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse metrics: {}", path.display()))?;

    let metrics = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(metrics)
}

fn cmd_validate(file: &Path, fatal: bool) -> Result<()> {
    let metrics = load_metrics(file)?;
    for metric in &metrics {
        validate_metric_event(metric, fatal)?;
    }
    println!("checked {} metric(s)", metrics.len());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.cmd {
        Command::Os => {
            let host = build_host(&cli)?;
            println!("{}", OperatingSystem::from_host(&host).as_str());
        }
        Command::Validate { file, fatal } => cmd_validate(file, *fatal)?,
        Command::ClientId { test } => {
            let ctx = build_context(&cli)?;
            let is_test = if *test { Some(true) } else { None };
            println!("{}", ctx.client_id_with(ctx.config().is_enabled(), is_test));
        }
        Command::UserAgent { platform, client_id } => {
            let ctx = build_context(&cli)?;
            println!(
                "{}",
                ctx.user_agent(UserAgentOptions {
                    include_platform: *platform,
                    include_client_id: *client_id,
                })
            );
        }
        Command::Env => {
            let ctx = build_context(&cli)?;
            println!("{}", ctx.compute_env_type().await);
        }
        Command::Migrate => {
            let ctx = build_context(&cli)?;
            ctx.initialize().await?;
            println!("settings migrated");
        }
        Command::Status => {
            let ctx = build_context(&cli)?;
            println!("product:    {}", ctx.config().surface().as_str());
            println!("telemetry:  {}", ctx.opt_out_preference().as_str());
            println!("client id:  {}", ctx.client_id());
            println!("env:        {}", ctx.compute_env_type().await);
            println!("os:         {}", ctx.operating_system().as_str());
            println!(
                "user agent: {}",
                ctx.user_agent(UserAgentOptions {
                    include_platform: true,
                    include_client_id: false,
                })
            );
        }
    }

    Ok(())
}
