//! etabar CLI - countdown progress for work that cannot report its own.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use etabar_core::{EstimateKey, ProgressConfig, ProgressState};
use etabar_progress::ProgressController;
use etabar_storage::{JsonStorage, MemoryStorage, Storage};
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const BAR_WIDTH: usize = 30;

#[derive(Parser)]
#[command(name = "etabar")]
#[command(about = "Learned countdown progress for opaque long-running work", long_about = None)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    /// Key prefix prepended to operation names
    #[arg(long, global = true, default_value = "eta")]
    prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// JSON file holding learned estimates
    #[arg(long, global = true, default_value = JsonStorage::DEFAULT_PATH)]
    store: PathBuf,

    /// Keep estimates in memory only
    #[arg(long, global = true)]
    memory: bool,

    /// SQLite database holding learned estimates
    #[cfg(feature = "sqlite")]
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Countdown tick interval in milliseconds
    #[arg(long, global = true)]
    step_ms: Option<u64>,

    /// Dwell at 100% in milliseconds
    #[arg(long, global = true)]
    dwell_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task under a learned countdown
    Run {
        /// Operation name
        name: String,
        /// Estimate used until one has been learned
        #[arg(long, default_value = "60000")]
        default_ms: u64,
        /// Simulate a task taking this long instead of running a command
        #[arg(long)]
        simulate_ms: Option<u64>,
        /// Make the simulated task fail with this message
        #[arg(long)]
        fail: Option<String>,
        /// Command to run
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Show the learned estimate for an operation
    Show {
        /// Operation name
        name: String,
    },
    /// List all learned estimates
    List,
    /// Forget the learned estimate for an operation
    Clear {
        /// Operation name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_config(&cli.store).await?;
    let storage = open_storage(&cli.store).await?;
    let controller = ProgressController::new(storage).with_config(config)?;

    match cli.command {
        Commands::Run {
            name,
            default_ms,
            simulate_ms,
            fail,
            command,
        } => {
            let key = EstimateKey::namespaced(&cli.prefix, &name);
            let task = TaskSpec::from_args(simulate_ms, fail, command)?;

            let run = controller.run_with_estimate(&key, default_ms, || task.run());
            let outcome = tokio::select! {
                outcome = run => outcome,
                () = render_progress(controller.subscribe()) => Ok(()),
            };
            println!();

            outcome?;
            info!("{} finished", key);
        }
        Commands::Show { name } => {
            let key = EstimateKey::namespaced(&cli.prefix, &name);
            match controller.store().peek(&key).await {
                Some(ms) => println!("{}: {}", key, format_ms(ms)),
                None => println!("{}: no estimate", key),
            }
        }
        Commands::List => {
            let entries = controller.store().entries().await;
            println!("Estimates ({})", entries.len());
            for (key, ms) in entries {
                println!("  {} | {}", key, format_ms(ms));
            }
        }
        Commands::Clear { name } => {
            let key = EstimateKey::namespaced(&cli.prefix, &name);
            controller.store().clear(&key).await;
            println!("Cleared {}", key);
        }
    }

    Ok(())
}

async fn load_config(args: &StoreArgs) -> Result<ProgressConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ProgressConfig::default(),
    };

    if let Some(ms) = args.step_ms {
        config = config.with_step(Duration::from_millis(ms));
    }
    if let Some(ms) = args.dwell_ms {
        config = config.with_dwell(Duration::from_millis(ms));
    }
    config.validate()?;
    debug!("Using config {:?}", config);
    Ok(config)
}

async fn open_storage(args: &StoreArgs) -> Result<Arc<dyn Storage>> {
    if args.memory {
        return Ok(Arc::new(MemoryStorage::new()));
    }

    #[cfg(feature = "sqlite")]
    if let Some(path) = &args.sqlite {
        let storage = etabar_storage::SqliteStorage::new_from_path(path).await?;
        return Ok(Arc::new(storage));
    }

    Ok(Arc::new(JsonStorage::new(&args.store).await?))
}

/// What `run` executes.
enum TaskSpec {
    Simulate { duration: Duration, fail: Option<String> },
    Command(Vec<String>),
}

impl TaskSpec {
    fn from_args(
        simulate_ms: Option<u64>,
        fail: Option<String>,
        command: Vec<String>,
    ) -> Result<Self> {
        match (simulate_ms, command.is_empty()) {
            (Some(_), false) => bail!("--simulate-ms and a command are mutually exclusive"),
            (Some(ms), true) => Ok(Self::Simulate {
                duration: Duration::from_millis(ms),
                fail,
            }),
            (None, false) if fail.is_none() => Ok(Self::Command(command)),
            (None, false) => bail!("--fail only applies to simulated tasks"),
            (None, true) => bail!("nothing to run: pass --simulate-ms or `-- <command>`"),
        }
    }

    async fn run(&self) -> Result<()> {
        match self {
            Self::Simulate { duration, fail } => {
                tokio::time::sleep(*duration).await;
                match fail {
                    Some(msg) => bail!("{}", msg),
                    None => Ok(()),
                }
            }
            Self::Command(argv) => {
                let status = tokio::process::Command::new(&argv[0])
                    .args(&argv[1..])
                    .stdout(std::process::Stdio::null())
                    .status()
                    .await
                    .with_context(|| format!("spawning {}", argv[0]))?;
                if !status.success() {
                    bail!("{} exited with {}", argv[0], status);
                }
                Ok(())
            }
        }
    }
}

/// Redraws the progress line on every state change. Returns only if the
/// controller goes away.
async fn render_progress(mut rx: watch::Receiver<ProgressState>) {
    while rx.changed().await.is_ok() {
        let state = *rx.borrow_and_update();
        if state.remaining_ms.is_some() {
            print!("\r{}", render_line(&state));
            let _ = std::io::stdout().flush();
        }
    }
}

fn render_line(state: &ProgressState) -> String {
    let percent = state.percent();
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let remaining = state.remaining_ms.unwrap_or(0);
    format!(
        "[{}{}] {:>3.0}%  ~{} left",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
        percent,
        format_ms(remaining),
    )
}

fn format_ms(ms: u64) -> String {
    let secs = ms.div_ceil(1000);
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
