use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argus::config::{ArgusSettings, LogFormat, Settings};
use argus::scenario::ScenarioFilter;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{filter::EnvFilter, filter::LevelFilter, fmt, prelude::*, registry};

mod commands;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "ARGUS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of `argus.debug`
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Run the smoke suites of the selected scenarios
    Run(RunArgs),
    /// List the selected scenarios
    List(FilterArgs),
    /// Show what the DHCP agent configuration forces on instances
    Dhcp,
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct FilterArgs {
    /// Comma-separated OS types; only scenarios on matching images are kept
    #[arg(long, value_delimiter = ',')]
    test_os_types: Vec<String>,

    /// Only keep scenarios of this type
    #[arg(long)]
    test_scenario_type: Option<String>,
}

impl FilterArgs {
    pub(crate) fn filter(&self) -> ScenarioFilter {
        ScenarioFilter {
            os_types: self.test_os_types.clone(),
            scenario_type: self.test_scenario_type.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    #[command(flatten)]
    filter: FilterArgs,

    /// Directory holding one `<scenario>.json` transcript per scenario
    #[arg(long, env = "ARGUS_TRANSCRIPTS", default_value = "transcripts")]
    transcripts: PathBuf,

    /// Directory receiving the console output of each instance
    #[arg(long)]
    instance_output: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("argus error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new(cli.config).context("Failed to load configuration")?;
    settings.validate()?;
    init_log(&settings.argus, cli.debug)?;

    match cli.command {
        CliCommand::Run(args) => commands::run::run_smoke(&settings, &args)?,
        CliCommand::List(args) => commands::list::run_list(&settings, &args),
        CliCommand::Dhcp => commands::dhcp::run_dhcp(&settings)?,
    }
    Ok(())
}

fn init_log(argus: &ArgusSettings, debug: bool) -> Result<()> {
    let level = if debug || argus.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let layer = match &argus.file_log {
        Some(path) => {
            let log_file = Arc::new(
                File::create(path)
                    .with_context(|| format!("Failed to create log file {}", path.display()))?,
            );
            let layer = fmt::Layer::default().with_ansi(false).with_writer(log_file);
            match argus.log_format {
                LogFormat::Full => layer.boxed(),
                LogFormat::Compact => layer.compact().boxed(),
            }
        }
        None => {
            let layer = fmt::Layer::default().with_writer(std::io::stdout);
            match argus.log_format {
                LogFormat::Full => layer.boxed(),
                LogFormat::Compact => layer.compact().boxed(),
            }
        }
    };

    registry()
        .with(layer)
        .with(env_filter)
        .try_init()
        .context("Failed to initialize logging")
}
