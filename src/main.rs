use std::sync::Arc;

use anyhow::{Context as _, Result as AnyhowResult};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt::MakeWriter, util::SubscriberInitExt as _};

mod cli;
mod gh_api;
mod pipeline;
mod stats;

use crate::{
    cli::Cli,
    gh_api::GithubClient,
    pipeline::RepositoryResult,
    stats::{BranchPercentage, Histogram},
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(&cli).await {
        eprintln!("{}", fatal_line(&err));
        std::process::exit(1);
    }
}

/// Single-line rendering of a fatal error and its causes.
fn fatal_line(err: &anyhow::Error) -> String {
    format!("{} {:#}", "Error:".red(), err)
}

async fn run(cli: &Cli) -> AnyhowResult<()> {
    let exclude = cli.exclude_patterns()?;
    let client = Arc::new(GithubClient::new(&cli.base_url)?);

    let repos = client
        .get_repositories(&cli.username)
        .await
        .with_context(|| format!("Failed to list repositories for {}", cli.username))?;
    let repos = cli::filter_excluded(repos, &exclude);

    println!(
        "Found {} repositories for {}.",
        repos.len(),
        cli.username.blue()
    );

    let mut collected = pipeline::fetch_all(repos, client, &cli.fan_out_options()).await?;
    if cli.sort {
        collected.successes.sort_by(|a, b| a.name.cmp(&b.name));
    }
    tracing::debug!(
        succeeded = collected.successes.len(),
        failed = collected.failed,
        "branch fetch finished"
    );

    let histogram = Histogram::from_results(&collected.successes);
    if collected.successes.is_empty() {
        tracing::warn!("No repository branches could be fetched; skipping percentages");
    } else if histogram.is_empty() {
        tracing::debug!("successful repositories listed no branches");
    } else {
        tracing::debug!(distinct = histogram.len(), "built branch histogram");
    }

    print!("{}", render_report(&collected.successes, &histogram.percentages()));
    Ok(())
}

/// octocrab logs its own error event for every failed request; the collector
/// already reports those, so it stays silent unless `RUST_LOG` asks for it.
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug,octocrab=off"
    } else {
        "warn,octocrab=off"
    }
}

fn log_subscriber<W>(
    filter: EnvFilter,
    writer: W,
) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .finish()
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    log_subscriber(filter, std::io::stderr).init();
}

fn render_report(repos: &[RepositoryResult], rows: &[BranchPercentage]) -> String {
    let mut out = String::new();
    for repo in repos {
        out.push_str(&format!(
            "{}: [{}]\n",
            repo.name.green(),
            repo.branches.join(", ")
        ));
    }
    out.push_str("\nPercentages\n");
    for row in rows {
        out.push_str(&format!(
            "Branch [{}] present in {:.2}% of valid repositories\n",
            row.branch, row.percentage
        ));
    }
    out
}
