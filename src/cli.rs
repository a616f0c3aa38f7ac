use std::{fmt, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::{
    collect::CollectionSpec,
    error::CollectError,
    github::{self, GitHub},
    types::Repo,
    window::WindowPolicy,
};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

const DEFAULT_OWNER: &str = "PostHog";
const DEFAULT_REPO: &str = "posthog";
const TIMEOUT_ENV: &str = "IMPACTSCORE_HTTP_TIMEOUT_SECS";
const API_URL_ENV: &str = "IMPACTSCORE_API_URL";
const MAX_DAYS_BACK: u32 = 36_500;

#[derive(Args, Debug, Clone)]
struct FetchArgs {
    /// GitHub repository in format 'owner/repo' (defaults to $GITHUB_OWNER/$GITHUB_REPO, then PostHog/posthog)
    #[arg(short = 'r', long, value_name = "OWNER/REPO")]
    repo: Option<String>,

    /// Number of days of activity to collect, ending now
    #[arg(short = 'b', long, default_value_t = 90, value_name = "DAYS")]
    days_back: u32,

    /// Search results per page (1-100)
    #[arg(long, default_value_t = 100, value_name = "NUM")]
    per_page: u32,

    /// HTTP timeout per request in seconds (defaults to $IMPACTSCORE_HTTP_TIMEOUT_SECS, then 30)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// API base URL (defaults to $IMPACTSCORE_API_URL, then https://api.github.com)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Restore the 7-day window after every accepted window instead of keeping it shrunk
    #[arg(long)]
    reset_window: bool,
}

#[derive(Args, Debug, Clone)]
struct ShowArgs {
    /// Number of engineers shown on the dashboard
    #[arg(short = 'n', long, default_value_t = 5, value_name = "NUM")]
    top: usize,

    /// Override the detected terminal width
    #[arg(long, value_name = "COLUMNS")]
    width: Option<usize>,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[command(flatten)]
    fetch: FetchArgs,

    #[command(flatten)]
    show: ShowArgs,
}

#[derive(Subcommand, Debug, Clone)]
enum CommandArgs {
    /// Collect PR and issue activity into CSV tables
    Fetch(FetchArgs),
    /// Rank engineers from previously fetched tables
    Score,
    /// Print the impact dashboard from the scores table
    Show(ShowArgs),
    /// Fetch, score and show in one go
    Run(RunArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Collect GitHub PR and issue activity and rank engineers by impact")]
#[command(version, long_version = BUILD_INFO_HUMAN)]
struct CliArgs {
    /// Directory holding the fetched tables and the scores table
    #[arg(short = 'd', long, global = true, default_value = "data", value_name = "DIR")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: CommandArgs,
}

impl FetchArgs {
    fn validate(&self) -> Result<()> {
        if !(1..=MAX_DAYS_BACK).contains(&self.days_back) {
            anyhow::bail!(
                "--days-back must be between 1 and {MAX_DAYS_BACK}, got {}",
                self.days_back
            );
        }
        if !(1..=100).contains(&self.per_page) {
            anyhow::bail!("--per-page must be between 1 and 100, got {}", self.per_page);
        }
        if self.timeout == Some(0) {
            anyhow::bail!("--timeout must be at least 1 second");
        }
        Ok(())
    }
}

impl ShowArgs {
    fn validate(&self) -> Result<()> {
        if self.top == 0 {
            anyhow::bail!("--top must be at least 1");
        }
        Ok(())
    }
}

/// Settings for the fetch stage.
#[derive(Clone)]
pub struct FetchConfig {
    pub repo: Repo,
    pub days_back: u32,
    pub per_page: u32,
    pub timeout: Duration,
    pub api_url: String,
    pub token: Option<String>,
    pub policy: WindowPolicy,
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("repo", &self.repo)
            .field("days_back", &self.days_back)
            .field("per_page", &self.per_page)
            .field("timeout", &self.timeout)
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("policy", &self.policy)
            .finish()
    }
}

impl FetchConfig {
    /// The collection range ends at `now` and starts `days_back` days
    /// earlier. `now` is taken once so all five runs share one range.
    pub fn collection_spec(&self, now: DateTime<Utc>) -> CollectionSpec {
        CollectionSpec {
            repo: self.repo.clone(),
            since: now - chrono::Duration::days(i64::from(self.days_back)),
            until: now,
            per_page: self.per_page,
            policy: self.policy,
        }
    }

    pub fn client(&self) -> Result<GitHub, CollectError> {
        GitHub::new(&self.api_url, self.token.clone(), self.timeout)
    }
}

/// Settings for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowConfig {
    pub top: usize,
    pub width: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum Command {
    Fetch(FetchConfig),
    Score,
    Show(ShowConfig),
    Run(FetchConfig, ShowConfig),
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub data_dir: PathBuf,
    pub command: Command,
}

fn resolve_repo(arg: Option<&str>, env: &impl Fn(&str) -> Option<String>) -> Result<Repo> {
    let repo = match arg {
        Some(r) => Repo::parse(r),
        None => {
            let owner = env("GITHUB_OWNER").unwrap_or_else(|| DEFAULT_OWNER.to_string());
            let name = env("GITHUB_REPO").unwrap_or_else(|| DEFAULT_REPO.to_string());
            Repo::new(owner, name)
        }
    };
    repo.context("Invalid repository")
}

fn resolve_timeout(arg: Option<u64>, env: &impl Fn(&str) -> Option<String>) -> Result<Duration> {
    let secs = match arg {
        Some(secs) => secs,
        None => match env(TIMEOUT_ENV) {
            Some(value) => {
                let secs: u64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid {TIMEOUT_ENV} value '{value}'"))?;
                if secs == 0 {
                    anyhow::bail!("{TIMEOUT_ENV} must be at least 1 second");
                }
                secs
            }
            None => return Ok(github::DEFAULT_TIMEOUT),
        },
    };
    Ok(Duration::from_secs(secs))
}

fn build_fetch_config(args: FetchArgs, env: &impl Fn(&str) -> Option<String>) -> Result<FetchConfig> {
    args.validate()?;

    Ok(FetchConfig {
        repo: resolve_repo(args.repo.as_deref(), env)?,
        days_back: args.days_back,
        per_page: args.per_page,
        timeout: resolve_timeout(args.timeout, env)?,
        api_url: args
            .api_url
            .or_else(|| env(API_URL_ENV))
            .unwrap_or_else(|| github::DEFAULT_API_URL.to_string()),
        token: github::get_github_token(env),
        policy: if args.reset_window {
            WindowPolicy::ResetAfterAccept
        } else {
            WindowPolicy::KeepShrunk
        },
    })
}

fn build_show_config(args: ShowArgs) -> Result<ShowConfig> {
    args.validate()?;
    Ok(ShowConfig {
        top: args.top,
        width: args.width,
    })
}

/// Parses command-line arguments, reading fallbacks from `env`.
pub fn parse_args_with_env<I, T, E>(args: I, env: E) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    E: Fn(&str) -> Option<String>,
{
    let cli = CliArgs::try_parse_from(args)?;

    let command = match cli.command {
        CommandArgs::Fetch(fetch) => Command::Fetch(build_fetch_config(fetch, &env)?),
        CommandArgs::Score => Command::Score,
        CommandArgs::Show(show) => Command::Show(build_show_config(show)?),
        CommandArgs::Run(run) => Command::Run(
            build_fetch_config(run.fetch, &env)?,
            build_show_config(run.show)?,
        ),
    };

    Ok(Invocation {
        data_dir: cli.data_dir,
        command,
    })
}

/// Parses command-line arguments into a validated invocation.
///
/// Repository, timeout, API URL and token fall back to the process
/// environment when not given on the command line.
pub fn parse_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    parse_args_with_env(args, |name| std::env::var(name).ok())
}
