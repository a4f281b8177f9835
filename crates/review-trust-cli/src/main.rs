//! Review Trust CLI — entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;

use review_trust::acquire::{AcquireConfig, AcquireRequest, CancelFlag, JobResult, Orchestrator};
use review_trust::features::extract_with;
use review_trust::fetch::browser::chromium::{ChromiumEngine, ChromiumOptions};
use review_trust::fetch::browser::{BrowserEngine, NoopEngine};
use review_trust::fetch::{BrowserFetcher, BrowserSettings, HttpFetcher};
use review_trust::parse::{parse_histogram, parse_product_page, reviews::parse_review_list_with_base};
use review_trust::scoring::{score, ScoreResult, ScoreService, Thresholds, ThresholdsProvider};
use review_trust::types::PageSnapshot;

use review_trust_cli::{read_reviews, resolve_output_dir, AcquireOverrides, JsonlStore};

#[derive(Parser)]
#[command(
    name = "review-trust",
    about = "Acquire Amazon product reviews and score them for sakura risk",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to the scoring thresholds YAML file.
    #[arg(long, global = true)]
    thresholds: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a saved product page and print the snapshot as JSON.
    ParsePage {
        /// HTML file.
        file: PathBuf,

        /// Print the normalized rating histogram instead.
        #[arg(long)]
        histogram: bool,
    },

    /// Parse a saved reviews listing and print the records as JSON.
    ParseReviews {
        /// HTML file.
        file: PathBuf,

        /// Site root used to absolutize review links.
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Acquire reviews for a product into an output directory.
    ///
    /// Examples:
    ///   review-trust acquire B0ABCDEF12 --limit 50
    ///   review-trust acquire https://www.amazon.co.jp/dp/B0ABCDEF12 --no-browser --score
    Acquire {
        /// Product URL, reviews URL, or ASIN.
        target: String,

        /// Caller-side identifier recorded on every stored review.
        #[arg(long, default_value = "cli")]
        target_id: String,

        /// Maximum reviews to store.
        #[arg(long)]
        limit: Option<usize>,

        /// Output directory (default: $REVIEW_TRUST_OUT or build/review-trust).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Site root (default https://www.amazon.co.jp).
        #[arg(long)]
        base_url: Option<String>,

        /// Disable the browser fallback stage.
        #[arg(long)]
        no_browser: bool,

        /// Show the browser window.
        #[arg(long)]
        headed: bool,

        /// Allow interactive sign-in when blocked (needs AMZN_EMAIL/AMZN_PASSWORD).
        #[arg(long)]
        login: bool,

        /// Session state file.
        #[arg(long)]
        storage_state: Option<PathBuf>,

        /// Chromium executable.
        #[arg(long)]
        chromium: Option<PathBuf>,

        /// Score the collected reviews.
        #[arg(long)]
        score: bool,
    },

    /// Score a review file (JSON array or JSON lines).
    Score {
        file: PathBuf,

        /// Include the extracted feature summary.
        #[arg(long)]
        features: bool,
    },

    /// Inspect or write the scoring thresholds.
    Thresholds {
        #[command(subcommand)]
        action: ThresholdsAction,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   review-trust completions bash > ~/.local/share/bash-completion/completions/review-trust
    ///   review-trust completions zsh > ~/.zfunc/_review-trust
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ThresholdsAction {
    /// Print the active thresholds as YAML.
    Show,
    /// Print the resolved thresholds file path.
    Path,
    /// Write thresholds to the resolved path.
    Write {
        /// Write the built-in defaults instead of the active values.
        #[arg(long)]
        defaults: bool,
    },
}

#[derive(Serialize)]
struct AcquireReport<'a> {
    job: &'a JobResult,
    output_dir: String,
    snapshot: Option<&'a PageSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<ScoreResult>,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Chromium when it launches, otherwise the no-op engine (HTTP-only).
async fn launch_engine(settings: &BrowserSettings) -> Arc<dyn BrowserEngine> {
    let options = ChromiumOptions {
        headless: settings.headless,
        executable: settings.chromium_path.clone(),
        user_agent: None,
    };
    match ChromiumEngine::launch(&options).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::warn!(error = %e, "Chromium unavailable; continuing HTTP-only");
            Arc::new(NoopEngine)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::ParsePage { file, histogram } => {
            let html = std::fs::read_to_string(&file)?;
            if histogram {
                print_json(&parse_histogram(&html))?;
            } else {
                let snapshot = parse_product_page(&html);
                if snapshot.partial {
                    tracing::warn!(missing = ?snapshot.missing_fields(), "partial snapshot");
                }
                print_json(&snapshot)?;
            }
        }

        Commands::ParseReviews { file, base_url } => {
            let html = std::fs::read_to_string(&file)?;
            let base = base_url.unwrap_or_else(|| AcquireConfig::default().base_url);
            let reviews = parse_review_list_with_base(&html, &base);
            tracing::info!(count = reviews.len(), "parsed review listing");
            print_json(&reviews)?;
        }

        Commands::Acquire {
            target,
            target_id,
            limit,
            out,
            base_url,
            no_browser,
            headed,
            login,
            storage_state,
            chromium,
            score: with_score,
        } => {
            let overrides = AcquireOverrides {
                base_url,
                no_browser,
                headed,
                login,
                storage_state,
                chromium,
            };
            let config = overrides.apply(AcquireConfig::from_env());
            let out_dir = resolve_output_dir(out.as_deref());
            let store = Arc::new(JsonlStore::open(&out_dir)?);
            tracing::info!(dir = %out_dir.display(), "writing acquisition output");

            let http = Arc::new(HttpFetcher::new(config.http.clone())?);
            let mut orchestrator =
                Orchestrator::new(config.clone(), http, store.clone(), store.clone()).with_listener(store.clone());

            let engine = if config.browser_fallback {
                Some(launch_engine(&config.browser).await)
            } else {
                None
            };
            if let Some(engine) = &engine {
                let browser = BrowserFetcher::new(Arc::clone(engine), config.browser.clone());
                orchestrator = orchestrator.with_browser(Arc::new(browser));
            }

            let cancel = CancelFlag::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupt received; cancelling after the current stage");
                        cancel.cancel();
                    }
                });
            }

            let acquisition = orchestrator
                .acquire(
                    AcquireRequest {
                        target_id,
                        url_or_asin: target,
                        limit,
                    },
                    &cancel,
                )
                .await;

            if let Some(engine) = engine {
                if let Err(e) = engine.shutdown().await {
                    tracing::warn!(error = %e, "browser shutdown failed");
                }
            }

            let score = if with_score && !acquisition.reviews.is_empty() {
                let provider = Arc::new(ThresholdsProvider::load(cli.thresholds.as_deref()));
                let service = ScoreService::new(provider);
                let key = acquisition.job.asin.clone().unwrap_or_default();
                Some(service.score_reviews(&key, &acquisition.reviews))
            } else {
                None
            };

            print_json(&AcquireReport {
                job: &acquisition.job,
                output_dir: out_dir.display().to_string(),
                snapshot: acquisition.snapshot.as_ref(),
                score,
            })?;
            if !acquisition.job.success {
                std::process::exit(1);
            }
        }

        Commands::Score { file, features } => {
            let reviews = read_reviews(&file)?;
            let provider = ThresholdsProvider::load(cli.thresholds.as_deref());
            let thresholds = provider.current();
            let summary = extract_with(&reviews, &thresholds.noise);
            let result = score(&summary, &thresholds);
            tracing::info!(
                reviews = reviews.len(),
                risk = result.risk_score,
                judgment = ?result.judgment,
                "scored review file"
            );
            if features {
                print_json(&serde_json::json!({ "features": summary, "score": result }))?;
            } else {
                print_json(&result)?;
            }
        }

        Commands::Thresholds { action } => {
            let provider = ThresholdsProvider::load(cli.thresholds.as_deref());
            match action {
                ThresholdsAction::Show => print!("{}", provider.current().to_yaml()?),
                ThresholdsAction::Path => match provider.path() {
                    Some(path) => println!("{}", path.display()),
                    None => {
                        eprintln!("No thresholds path could be resolved");
                        std::process::exit(1);
                    }
                },
                ThresholdsAction::Write { defaults } => {
                    let Some(path) = provider.path().map(|p| p.to_path_buf()) else {
                        anyhow::bail!("no thresholds path; pass --thresholds");
                    };
                    let thresholds = if defaults {
                        Thresholds::default()
                    } else {
                        (*provider.current()).clone()
                    };
                    provider.save(thresholds)?;
                    println!("Wrote thresholds to {}", path.display());
                }
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "review-trust", &mut std::io::stdout());
        }
    }

    Ok(())
}
