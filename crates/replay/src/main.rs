//! oo-replay command line entry point

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use oo_replay::logging::{self, LoggingContext};
use oo_replay::suite::{run_suite, SuiteConfig};
use oo_replay::visual::VisualTester;
use oo_replay::{
    apply_profile, find_latest_interaction_log, Executor, PageDriver, PlaywrightDriver, ProfileRegistry,
    ReplayConfig, ReplayContext, ReplayOptions, ReplayProfile, ReplayResult,
};

/// Replay recorded plugin interaction logs against a running editor
#[derive(Parser, Debug)]
#[command(name = "oo-replay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "oo-replay.toml", global = true)]
    config: PathBuf,

    /// Remote debugger address (host:port)
    #[arg(long, global = true)]
    debugger_address: Option<String>,

    /// Replay profile name
    #[arg(long, env = "OO_REPLAY_PROFILE", global = true)]
    profile: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "OO_REPLAY_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Directory for run logs
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Do not run the profile's prepare hook before replay
    #[arg(long, global = true)]
    no_prepare: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay one interaction log
    Replay {
        /// Log file; defaults to the newest interaction-log-*.jsonl
        #[arg(long)]
        log: Option<PathBuf>,

        /// Keep replaying after a failing step
        #[arg(long)]
        continue_on_error: bool,

        /// Compare the final screen against the baseline with this name
        #[arg(long)]
        screenshot: Option<String>,
    },

    /// Replay every *.jsonl in a directory
    Batch {
        /// Directory with replay cases
        #[arg(long, default_value = "test_cases")]
        cases_dir: PathBuf,

        /// Root for batch-<stamp> result directories
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,

        /// Continue with the remaining cases if one fails
        #[arg(long)]
        continue_on_error: bool,
    },

    /// List available replay profiles
    Profiles,
}

impl Cli {
    /// Command line values override the configuration file.
    fn apply_overrides(&self, config: &mut ReplayConfig) {
        if let Some(addr) = &self.debugger_address {
            config.debugger_address = addr.clone();
        }
        if let Some(profile) = &self.profile {
            config.profile = profile.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => {
            println!("[replay] completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("[replay] failed: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ReplayConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);

    let registry = ProfileRegistry::with_builtins();
    if let Commands::Profiles = cli.command {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let logging: LoggingContext = logging::init(&config.log_level, &config.log_dir)?;
    info!("oo-replay v{}", env!("CARGO_PKG_VERSION"));
    info!("Run log: {}", logging.log_file().display());

    let profile = if config.profile.trim().is_empty() {
        info!("No replay profile selected: routes stay empty");
        None
    } else {
        Some(registry.get(&config.profile)?)
    };

    match cli.command {
        Commands::Replay {
            log,
            continue_on_error,
            screenshot,
        } => {
            let log_path = match log {
                Some(path) => path,
                None => find_latest_interaction_log(&config.logs_dir).with_context(|| {
                    format!(
                        "log path is not provided and no interaction-log-*.jsonl was found in {}",
                        config.logs_dir.display()
                    )
                })?,
            };
            anyhow::ensure!(log_path.exists(), "Log file not found: {}", log_path.display());

            let driver: Arc<dyn PageDriver> = Arc::new(
                PlaywrightDriver::connect(config.driver_config())
                    .await
                    .context("attaching to the editor")?,
            );
            let mut executor = build_executor(&config, driver, profile.as_deref())?;

            let options = ReplayOptions {
                prepare: !cli.no_prepare,
                stop_on_error: !continue_on_error,
            };
            let report = executor.replay_file(&log_path, options).await?;
            info!("Step timings:\n{}", report.timing_summary());
            anyhow::ensure!(report.success(), "{} step(s) failed", report.failed);

            if let Some(name) = screenshot {
                let tester = VisualTester::new(config.visual.clone())?;
                let driver = executor.context().driver()?;
                anyhow::ensure!(
                    tester.capture(driver.as_ref(), &name, None).await?,
                    "visual mismatch for '{}'",
                    name
                );
            }
        }

        Commands::Batch {
            cases_dir,
            artifacts_dir,
            continue_on_error,
        } => {
            let suite = SuiteConfig {
                cases_dir,
                artifacts_dir: artifacts_dir.unwrap_or_else(|| config.artifacts_dir.join("replay_cases")),
                continue_on_error,
                options: ReplayOptions {
                    prepare: !cli.no_prepare,
                    ..ReplayOptions::default()
                },
            };

            let driver: Arc<dyn PageDriver> = Arc::new(
                PlaywrightDriver::connect(config.driver_config())
                    .await
                    .context("attaching to the editor")?,
            );
            let summary = run_suite(&suite, |_case_dir| {
                build_executor(&config, driver.clone(), profile.as_deref())
            })
            .await?;

            anyhow::ensure!(
                summary.success(),
                "{} of {} case(s) failed, see {}",
                summary.failures,
                summary.cases_executed,
                summary.summary_path().display()
            );
        }

        Commands::Profiles => {}
    }

    Ok(())
}

fn build_executor(
    config: &ReplayConfig,
    driver: Arc<dyn PageDriver>,
    profile: Option<&dyn ReplayProfile>,
) -> ReplayResult<Executor> {
    let mut context = ReplayContext::with_driver(driver);
    context.extend(config.settings.clone());

    let mut executor = Executor::with_context(context);
    if let Some(profile) = profile {
        apply_profile(&mut executor, profile)?;
    }
    Ok(executor)
}
