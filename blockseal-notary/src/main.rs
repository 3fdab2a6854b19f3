//! Blockseal CLI entry point

use anyhow::{bail, Context, Result};
use blockseal_core::{LocalAuthority, VerificationPolicy};
use blockseal_ledger::{FileBlockSource, SledLedger};
use blockseal_notary::{build_notarizers, run_batch, run_daemon, BlocksealConfig, Notarizer, Task};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "blockseal")]
#[command(about = "Notarize ledger blocks with a timestamping authority", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "blockseal.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RangeArgs {
    /// First block of the range
    #[arg(long)]
    first: u64,

    /// Last block of the range (defaults to --first)
    #[arg(long)]
    last: Option<u64>,

    /// Only run for this organization
    #[arg(long)]
    org: Option<String>,
}

impl RangeArgs {
    fn bounds(&self) -> (u64, u64) {
        (self.first, self.last.unwrap_or(self.first))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sign blocks read as JSON lines from stdin or a file
    Daemon {
        /// Block event file (defaults to stdin)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Sign a range of exported blocks
    Sign(RangeArgs),

    /// Verify stored signatures against exported blocks
    Verify {
        #[command(flatten)]
        range: RangeArgs,

        /// internal, key, calendar, publication, default, or
        /// user-publication:<publication string>
        #[arg(long, default_value = "default")]
        policy: VerificationPolicy,
    },

    /// Extend stored signatures
    Extend(RangeArgs),

    /// Summarize stored signatures for a block range
    Summary(RangeArgs),

    /// Show every stored version of one block's signature
    History {
        /// Block number
        block: u64,

        /// Only show this organization
        #[arg(long)]
        org: Option<String>,
    },

    /// Generate a signing key
    InitKey {
        /// Output file for the hex key seed
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::InitKey { output, force } = &cli.command {
        return init_key(output, *force);
    }

    let config = load_config(&cli.config)?;
    let ledger = Arc::new(open_ledger(&config.ledger.state_path)?);
    let mut notarizers = build_notarizers(&config, ledger)?;

    let only_org = match &cli.command {
        Commands::Sign(range) | Commands::Extend(range) | Commands::Summary(range) => range.org.clone(),
        Commands::Verify { range, .. } => range.org.clone(),
        Commands::History { org, .. } => org.clone(),
        _ => None,
    };
    if let Some(org) = &only_org {
        notarizers.retain(|n| n.org() == org);
        if notarizers.is_empty() {
            bail!("no enabled identity for org {}", org);
        }
    }
    if notarizers.is_empty() {
        bail!("no enabled identities in {}", cli.config.display());
    }

    match cli.command {
        Commands::Daemon { input } => {
            let input: Box<dyn AsyncBufRead + Unpin + Send> = match input {
                Some(path) => Box::new(BufReader::new(
                    tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("failed to open {}", path.display()))?,
                )),
                None => Box::new(BufReader::new(tokio::io::stdin())),
            };
            let notarizers = notarizers.into_iter().map(Arc::new).collect();
            let shutdown = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            let report = run_daemon(notarizers, input, shutdown).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Sign(range) => batch(&config, &notarizers, Task::Sign, &range)?,
        Commands::Verify { range, policy } => batch(&config, &notarizers, Task::Verify(policy), &range)?,
        Commands::Extend(range) => batch(&config, &notarizers, Task::Extend, &range)?,

        Commands::Summary(range) => {
            let (first, last) = range.bounds();
            for notarizer in &notarizers {
                let summary = notarizer.store().summary(notarizer.org(), first, last)?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }

        Commands::History { block, .. } => {
            for notarizer in &notarizers {
                let history = notarizer.store().history(notarizer.org(), block)?;
                println!("{}", serde_json::to_string_pretty(&history)?);
            }
        }

        Commands::InitKey { .. } => unreachable!("handled before loading configuration"),
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<BlocksealConfig> {
    if path.exists() {
        return BlocksealConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()));
    }

    eprintln!("Configuration file not found: {}", path.display());
    eprintln!("Creating default configuration...");
    BlocksealConfig::default().to_file(path)?;
    eprintln!("Default configuration saved to {}", path.display());
    eprintln!(
        "Please edit the configuration and create signing keys with `blockseal init-key`, or set {}",
        blockseal_notary::config::SIGNING_KEY_ENV
    );
    std::process::exit(1);
}

fn open_ledger(path: &Path) -> Result<SledLedger> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(SledLedger::open(path)?)
}

type CliNotarizer = Notarizer<LocalAuthority, Arc<SledLedger>>;

fn batch(config: &BlocksealConfig, notarizers: &[CliNotarizer], task: Task, range: &RangeArgs) -> Result<()> {
    let source = FileBlockSource::open(&config.ledger.blocks_dir)?;
    let (first, last) = range.bounds();

    let mut failed = false;
    for notarizer in notarizers {
        let report = run_batch(notarizer, &source, task.clone(), first, last)?;
        println!("{}", report);
        failed |= !report.is_clean();
    }
    if failed {
        bail!("{} finished with failures", task);
    }
    Ok(())
}

fn init_key(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let authority = LocalAuthority::generate();
    std::fs::write(output, format!("{}\n", authority.seed_hex()))
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(path = %output.display(), "wrote signing key");
    println!("{}", authority.public_key_hex());
    Ok(())
}
