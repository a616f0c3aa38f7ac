mod display;

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use display::show_dashboard;
use impactscore::{
    CollectError, Command, CsvSink, FetchConfig, SCORES_FILE, ShowConfig, fetch_stage,
    parse_args, score_stage,
};
use tracing::{info, warn};

fn handle_clap_help_version(clap_err: &clap::Error) -> ! {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        _ => {
            eprint!("{clap_err}");
            std::process::exit(2);
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,impactscore=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn fetch(config: &FetchConfig, data_dir: &Path) -> anyhow::Result<()> {
    let client = config.client()?;
    if !client.is_authenticated() {
        warn!("No GITHUB_TOKEN or GH_TOKEN set; unauthenticated search quota is very low");
    }

    let spec = config.collection_spec(Utc::now());
    let mut sink = CsvSink::new(data_dir);
    let report = fetch_stage(&client, &spec, &mut sink).await?;

    let records: usize = report.completed().map(|set| set.len()).sum();
    info!(records, dir = %data_dir.display(), "Fetch complete");
    Ok(())
}

fn score(data_dir: &Path) -> anyhow::Result<()> {
    let summary = score_stage(data_dir)
        .with_context(|| format!("Scoring tables in {}", data_dir.display()))?;
    println!(
        "Scored {} engineers -> {}",
        summary.scores.len(),
        summary.path.display()
    );
    Ok(())
}

fn show(config: &ShowConfig, data_dir: &Path) -> anyhow::Result<()> {
    show_dashboard(&data_dir.join(SCORES_FILE), config, &mut std::io::stdout())
}

fn report_rate_limit(err: &anyhow::Error) {
    if let Some(CollectError::RateLimited { reset_at, .. }) = err.downcast_ref::<CollectError>() {
        eprintln!(
            "hint: search quota resets {}",
            chrono_humanize::HumanTime::from(*reset_at)
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let invocation = match parse_args(std::env::args()) {
        Ok(result) => result,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                handle_clap_help_version(clap_err);
            } else {
                return Err(err);
            }
        }
    };

    let data_dir = invocation.data_dir.as_path();
    let result = match &invocation.command {
        Command::Fetch(config) => fetch(config, data_dir).await,
        Command::Score => score(data_dir),
        Command::Show(config) => show(config, data_dir),
        Command::Run(fetch_config, show_config) => async {
            fetch(fetch_config, data_dir).await?;
            score(data_dir)?;
            show(show_config, data_dir)
        }
        .await,
    };

    if let Err(err) = &result {
        report_rate_limit(err);
    }
    result
}
