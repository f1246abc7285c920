use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revq::budget::BudgetState;
use revq::dispatch::OpenAiBackend;
use revq::github::GitHubClient;
use revq::review::{ReviewEngine, ReviewOptions};
use revq::{render, Config};

#[derive(Parser)]
#[command(name = "revq")]
#[command(author, version, about = "LLM-assisted pull request reviewer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Review a pull request and print the assembled report
    Review {
        /// Pull request number
        pr: u64,

        /// Repository owner (overrides config)
        #[arg(long)]
        owner: Option<String>,

        /// Repository name (overrides config)
        #[arg(long)]
        repo: Option<String>,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Output format (plain, json)
        #[arg(short, long, default_value = "plain")]
        format: String,
    },

    /// Print the configuration file path
    ConfigPath,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "revq=debug" } else { "revq=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Review {
            pr,
            owner,
            repo,
            model,
            format,
        } => run_review(pr, owner, repo, model, &format).await,
        Commands::ConfigPath => {
            println!("{}", Config::config_path()?.display());
            Ok(())
        }
    }
}

async fn run_review(
    pr: u64,
    owner: Option<String>,
    repo: Option<String>,
    model: Option<String>,
    format: &str,
) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let owner = owner
        .or_else(|| non_empty(&config.github.owner))
        .context("repository owner not set (use --owner or the [github] config section)")?;
    let repo = repo
        .or_else(|| non_empty(&config.github.repo))
        .context("repository name not set (use --repo or the [github] config section)")?;

    let github = GitHubClient::new(Config::github_token()?, config.github.api_url.clone());
    let pull_request = github
        .fetch_pull_request(&owner, &repo, pr)
        .await
        .with_context(|| format!("failed to fetch {owner}/{repo}#{pr}"))?;
    tracing::info!(title = %pull_request.title, author = %pull_request.user.login, "fetched pull request");

    let diff = github
        .fetch_diff(&owner, &repo, pr)
        .await
        .context("failed to fetch pull request diff")?;

    let mut options = ReviewOptions::from_config(&config);
    if let Some(model) = model {
        options.model = model;
    }

    let backend = OpenAiBackend::new(Config::openai_api_key()?);
    let budget = BudgetState::new(
        config.review.max_requests_per_window,
        config.review.max_tokens_per_window,
    );
    let mut engine = ReviewEngine::new(Box::new(backend), budget, options)?;

    // Ctrl+C requests cancellation; the engine observes it at unit and
    // chunk boundaries and reports whatever already finished.
    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, finishing current chunk then stopping");
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("failed to install interrupt handler")?;

    let cancelled = move || interrupted.load(Ordering::SeqCst);
    let result = engine.review_document(&diff, &cancelled).await?;

    match format {
        "json" => println!("{}", render::json(&result)?),
        _ => println!("{}", render::plain(&result, Some(&pull_request))),
    }

    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
