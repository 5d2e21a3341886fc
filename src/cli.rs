use std::time::Duration;

use anyhow::{Context as _, Result as AnyhowResult};
use clap::Parser;
use glob::Pattern;

use crate::{gh_api::GithubRepo, pipeline::FanOutOptions};

#[derive(Parser, Debug)]
#[command(
    name = "gh-branch-census",
    about = "Count how often each branch name appears across a GitHub user's repositories",
    version
)]
pub struct Cli {
    /// GitHub username whose public repositories are inspected
    #[arg(short, long, env = "GITHUB_USER", default_value = "RicardoLinck")]
    pub username: String,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub base_url: String,

    /// Limit of concurrent branch fetches; unlimited when omitted
    #[arg(short = 'l', long)]
    pub task_limit: Option<usize>,

    /// Give up on a repository after this many seconds
    #[arg(short, long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Repos to exclude (globs supported); specify multiple times for multiple repos
    #[arg(short, long, num_args = 0..)]
    pub exclude: Vec<String>,

    /// Print repositories sorted by name instead of in completion order
    #[arg(short, long, default_value_t = false)]
    pub sort: bool,

    /// Log debug output to stderr
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    pub fn fan_out_options(&self) -> FanOutOptions {
        FanOutOptions {
            task_limit: self.task_limit,
            timeout: self.timeout.map(Duration::from_secs),
        }
    }

    pub fn exclude_patterns(&self) -> AnyhowResult<Vec<Pattern>> {
        self.exclude
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).with_context(|| format!("Invalid exclude pattern: {}", pattern))
            })
            .collect()
    }
}

/// Drop repositories whose name matches any of the exclude patterns
pub fn filter_excluded(repos: Vec<GithubRepo>, exclude: &[Pattern]) -> Vec<GithubRepo> {
    repos
        .into_iter()
        .filter(|repo| !exclude.iter().any(|pattern| pattern.matches(&repo.name)))
        .collect()
}
