// CLI module - User-facing command-line interface

mod output;

use crate::config::{SupervisorConfig, DEFAULT_ERROR_LOG};
use crate::supervisor::Supervisor;
use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// scriptwarden - keeps a list of scripts alive
#[derive(Parser)]
#[command(name = "scriptwarden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Scripts file to supervise (overrides the configuration)
    #[arg(short, long, global = true)]
    scripts: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one supervision pass (default)
    Check,

    /// Run supervision passes periodically until interrupted
    Watch {
        /// Seconds between passes (defaults to the configured interval)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// List the scripts and whether they are running
    List,

    /// Restart a script now, whether or not it is running
    Restart {
        /// Script name
        name: String,
    },

    /// Include a script in supervision passes
    Activate {
        /// Script name
        name: String,
    },

    /// Stop a script and exclude it from supervision passes
    Deactivate {
        /// Script name
        name: String,
    },
}

impl Cli {
    /// Run the CLI application
    ///
    /// Failures are also appended to the configured error log, or to
    /// `log.txt` when the configuration itself could not be loaded.
    pub fn run() -> anyhow::Result<()> {
        let cli = Cli::parse();

        let (error_log, config) = cli.prepare();
        let result = config.and_then(|config| cli.execute(config));

        if let (Err(e), Some(path)) = (&result, &error_log) {
            if let Err(log_err) = append_error_log(path, e) {
                error!(
                    "Failed to write error log {}: {}",
                    path.display(),
                    log_err
                );
            }
        }

        result
    }

    /// Load the configuration and pick the error log for any failure
    fn prepare(&self) -> (Option<PathBuf>, anyhow::Result<SupervisorConfig>) {
        match self.load_config() {
            Ok(config) => (config.error_log_path().map(Path::to_path_buf), Ok(config)),
            Err(e) => (Some(PathBuf::from(DEFAULT_ERROR_LOG)), Err(e)),
        }
    }

    /// Resolve the configuration from the file and command-line overrides
    fn load_config(&self) -> anyhow::Result<SupervisorConfig> {
        let mut config = match self.config {
            Some(ref path) => SupervisorConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => SupervisorConfig::default(),
        };

        if let Some(ref scripts) = self.scripts {
            config.scripts_file = scripts.clone();
        }

        Ok(config)
    }

    /// Execute the parsed command
    fn execute(&self, config: SupervisorConfig) -> anyhow::Result<()> {
        match self.command {
            None | Some(Commands::Check) => {
                let mut supervisor = Supervisor::from_config(config);
                let report = supervisor.run_pass().context("Supervision pass failed")?;
                output::print_report(&report);
                Ok(())
            }

            Some(Commands::Watch { interval }) => {
                let interval = interval
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| config.check_interval());
                anyhow::ensure!(!interval.is_zero(), "Watch interval must be at least 1 second");

                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("Failed to start async runtime")?;
                runtime.block_on(watch(config, interval))
            }

            Some(Commands::List) => {
                let mut supervisor = Supervisor::from_config(config);
                let scripts = supervisor.list()?;
                output::print_script_table(&scripts);
                Ok(())
            }

            Some(Commands::Restart { ref name }) => {
                let mut supervisor = Supervisor::from_config(config);
                let pid = supervisor
                    .restart_script(name)
                    .with_context(|| format!("Failed to restart {}", name))?;
                output::print_success_msg(&format!("{} restarted (pid {})", name, pid));
                Ok(())
            }

            Some(Commands::Activate { ref name }) => {
                let mut supervisor = Supervisor::from_config(config);
                supervisor
                    .activate_script(name)
                    .with_context(|| format!("Failed to activate {}", name))?;
                output::print_success_msg(&format!("{} activated", name));
                Ok(())
            }

            Some(Commands::Deactivate { ref name }) => {
                let mut supervisor = Supervisor::from_config(config);
                supervisor
                    .deactivate_script(name)
                    .with_context(|| format!("Failed to deactivate {}", name))?;
                output::print_success_msg(&format!("{} deactivated", name));
                Ok(())
            }
        }
    }
}

/// Run passes on a fixed interval until Ctrl-C
///
/// Each pass runs on the blocking pool and is awaited before the next tick,
/// so two passes never touch the scripts file at the same time.
async fn watch(config: SupervisorConfig, interval: Duration) -> anyhow::Result<()> {
    let mut supervisor = Supervisor::from_config(config);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut shutdown = pin!(tokio::signal::ctrl_c());

    info!(
        "Watching {} (check interval: {}s)",
        supervisor.store().path().display(),
        interval.as_secs()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reaped = supervisor.probe_mut().reap_exited_children();
                if !reaped.is_empty() {
                    info!("Reaped exited children: {:?}", reaped);
                }

                let (returned, result) = tokio::task::spawn_blocking(move || {
                    let result = supervisor.run_pass();
                    (supervisor, result)
                })
                .await
                .context("Supervision task panicked")?;
                supervisor = returned;

                // Keep watching: the scripts file may be fixed before the next tick
                match result {
                    Ok(report) => output::print_report(&report),
                    Err(e) if e.is_store_error() => {
                        warn!("Scripts file unusable, retrying next tick: {}", e)
                    }
                    Err(e) => error!("Supervision pass failed: {}", e),
                }
            }
            signal = &mut shutdown => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Received Ctrl-C, stopping watch");
                break;
            }
        }
    }

    Ok(())
}

/// Append a failure with its cause chain to the error log
fn append_error_log(path: &Path, err: &anyhow::Error) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "[{}] {:?}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        err
    )
}
