//! CLI interface for adaptive-qc

use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::{self, Config};
use crate::generation::{AttemptController, HttpAnalyzer, HttpGenerator};
use crate::learning::LearningStore;
use crate::metrics::PerformanceTracker;
use crate::quality::severity::DEFAULT_TIER;
use crate::quality::SeverityTier;
use crate::types::{Asset, AssetKind, GenerationRequest};

#[derive(Parser)]
#[command(name = "adaptive-qc")]
#[command(about = "Adaptive quality control for generated marketing artifacts", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true, env = "ADAPTIVE_QC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one generation session and print the result as JSON
    Generate {
        /// Template identifier
        #[arg(short, long)]
        template: String,
        /// Base prompt
        #[arg(short, long)]
        prompt: String,
        /// Attempt budget (defaults to the configured value)
        #[arg(short, long)]
        max_attempts: Option<u32>,
        /// Logo image to pass through to the generator
        #[arg(long)]
        logo: Option<PathBuf>,
        /// Photo to pass through to the generator
        #[arg(long)]
        photo: Option<PathBuf>,
        /// Print the full session report instead of the result
        #[arg(long)]
        report: bool,
    },
    /// Show learning performance per template
    Stats,
    /// Show the severity table used to score errors
    Severity,
    /// Manage problematic terms
    Terms {
        #[command(subcommand)]
        command: TermCommands,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum TermCommands {
    /// List tracked terms
    List,
    /// Track a term and register alternatives for it
    Add {
        term: String,
        /// Alternative wording (repeatable)
        #[arg(short, long = "alternative")]
        alternatives: Vec<String>,
    },
    /// Record that the generator misspelled a term
    RecordFailure {
        term: String,
        misspelling: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the current configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Reset configuration to defaults
    Reset,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

fn load_asset(kind: AssetKind, path: &Path) -> Result<Asset> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read asset {}", path.display()))?;
    let mime_type = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    };
    Ok(Asset {
        kind,
        mime_type: mime_type.to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

fn open_store(config: &Config) -> Result<LearningStore> {
    let path = config.store_path()?;
    LearningStore::open_file(&path, config.learning_policy())
        .with_context(|| format!("Failed to open learning database {}", path.display()))
}

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };

    match cli.command {
        Commands::Generate {
            template,
            prompt,
            max_attempts,
            logo,
            photo,
            report,
        } => {
            let config = Config::load_from(&config_path)?;
            let store = Arc::new(open_store(&config)?);
            let generator = HttpGenerator::new(&config.backend.generator_url, config.request_timeout())?;
            let analyzer = HttpAnalyzer::new(&config.backend.analyzer_url, config.request_timeout())?;
            let tracker = Arc::new(PerformanceTracker::new());

            let policy = config.retry_policy();
            let cancel = policy.cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, cancelling session");
                    cancel.cancel();
                }
            });

            let controller = AttemptController::new(Arc::new(generator), Arc::new(analyzer), store)
                .with_policy(policy)
                .with_settings(config.strategy.clone())
                .with_classifier(config.severity_classifier())
                .with_options(config.generate_options())
                .with_tracker(tracker);

            let mut request = GenerationRequest::new(template, prompt)
                .with_max_attempts(max_attempts.unwrap_or(config.retry.max_attempts));
            if let Some(path) = logo {
                request = request.with_asset(load_asset(AssetKind::Logo, &path)?);
            }
            if let Some(path) = photo {
                request = request.with_asset(load_asset(AssetKind::Photo, &path)?);
            }

            let session = controller.run(&request).await?;
            if report {
                print_json(&session)?;
            } else {
                print_json(&session.result())?;
            }
        }
        Commands::Stats => {
            let config = Config::load_from(&config_path)?;
            let store = open_store(&config)?;
            let summary = store.performance_summary().await;

            println!("Learning Performance");
            println!(
                "  Global success rate: {:.1}% (target {:.0}%){}",
                summary.global_success_rate,
                summary.target,
                if summary.meets_target { " - target met" } else { "" }
            );
            for (template, stats) in &summary.templates {
                println!(
                    "  {:<24} {:>6.1}%  {} generations, {} perfect, {} patterns, {} fixes confirmed",
                    template,
                    stats.success_rate,
                    stats.generations,
                    stats.perfect,
                    stats.error_patterns,
                    stats.fixes_confirmed
                );
            }
        }
        Commands::Severity => {
            let config = Config::load_from(&config_path)?;
            let classifier = config.severity_classifier();
            for tier in SeverityTier::all() {
                println!("{} (-{} points): {}", tier, tier.weight(), tier.description());
                for rule in classifier.rules().iter().filter(|r| r.tier == tier) {
                    println!("    {}", rule.patterns.join(", "));
                }
            }
            println!("Unmatched errors are {}.", DEFAULT_TIER);
        }
        Commands::Terms { command } => {
            let config = Config::load_from(&config_path)?;
            let store = open_store(&config)?;
            match command {
                TermCommands::List => {
                    let terms = store.terms().await;
                    for term in terms.iter() {
                        println!(
                            "  {:<20} {:>3} failures  {:<8} {}  [{}]",
                            term.term,
                            term.failure_count,
                            term.severity.to_string(),
                            if term.auto_replace { "auto" } else { "manual" },
                            term.alternatives.join(", ")
                        );
                    }
                    print_json(&store.term_stats().await)?;
                }
                TermCommands::Add { term, alternatives } => {
                    let updated = store.add_term_alternatives(&term, &alternatives).await?;
                    print_json(&updated)?;
                }
                TermCommands::RecordFailure { term, misspelling } => {
                    let updated = store.record_term_failure(&term, &misspelling).await?;
                    if updated.auto_replace {
                        println!("'{}' is now replaced automatically", updated.term);
                    }
                    print_json(&updated)?;
                }
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = Config::load_from(&config_path)?;
                print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
            }
            ConfigCommands::Path => println!("{}", config_path.display()),
            ConfigCommands::Reset => {
                Config::default().save_to(&config_path)?;
                println!("Configuration reset to defaults.");
            }
        },
    }

    Ok(())
}
