use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interlinear_sync_config::Config;
use interlinear_sync_engine::{SegmentScanner, SentenceScanner};

mod scenario;

use scenario::Scenario;

#[derive(Parser, Debug)]
#[command(name = "interlinear-sync")]
#[command(about = "Replay annotation edits against interlinear text", long_about = None)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay an edit scenario and print the annotations after each step
    Replay {
        /// Scenario file (TOML)
        scenario: PathBuf,
    },
    /// Show how the sentence scanner segments a piece of text
    Scan {
        text: String,
    },
    /// Write a config file with the default settings
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let loaded = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(loaded.unwrap_or_default())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    let level = config
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match args.command {
        Commands::Replay { scenario } => {
            let path = config.resolve_scenario(&scenario);
            log::info!("replaying {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read scenario {}", path.display()))?;
            let scenario = Scenario::from_toml(&content)
                .with_context(|| format!("failed to parse scenario {}", path.display()))?;
            print!("{}", scenario::run(&scenario, &config)?);
        }
        Commands::Scan { text } => {
            let scanner = SentenceScanner::with_terminators(&config.segment_terminators)?;
            let scan = scanner.scan(&text);
            for (range, brk) in scan.segments.iter().zip(&scan.breaks) {
                println!("{}..{} (break {brk}) {:?}", range.start, range.end, &text[range.clone()]);
            }
        }
        Commands::InitConfig { force } => {
            let path = args.config.clone().unwrap_or_else(Config::config_path);
            if path.exists() && !force {
                anyhow::bail!("{} already exists; use --force to overwrite", path.display());
            }
            match &args.config {
                Some(path) => Config::default().save_to_path(path)?,
                None => Config::default().save()?,
            }
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}
