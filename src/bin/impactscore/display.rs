use std::{
    io::{self, IsTerminal, Write},
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use impactscore::{EngineerScore, ShowConfig, Signal, read_scores};
use tracing::warn;

const TABLE_HEADERS: &[&str] = &[
    "RANK",
    "ENGINEER",
    "IMPACT",
    "MERGED",
    "CLOSED",
    "ISSUES CLOSED",
    "OPENED",
    "COMMENTS",
    "ISSUES OPENED",
];

const COLUMN_SEPARATOR: &str = "  ";
const BAR_GLYPH: &str = "█";
const DEFAULT_WIDTH: usize = 80;
const MIN_BAR_WIDTH: usize = 10;

fn get_terminal_width(width_override: Option<usize>) -> usize {
    if let Some(width) = width_override {
        width
    } else if io::stdout().is_terminal() {
        terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(DEFAULT_WIDTH)
    } else {
        std::env::var("COLUMNS")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(DEFAULT_WIDTH)
    }
}

fn format_relative_time(time: DateTime<Utc>) -> String {
    use chrono_humanize::HumanTime;
    HumanTime::from(time).to_string()
}

fn score_to_table_row(score: &EngineerScore) -> Vec<String> {
    vec![
        score.rank.to_string(),
        score.engineer.clone(),
        format!("{:.4}", score.impact_score),
        score.prs_merged.to_string(),
        score.prs_closed.to_string(),
        score.issues_closed.to_string(),
        score.prs_opened.to_string(),
        score.pr_comments.to_string(),
        score.issues_opened.to_string(),
    ]
}

fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    widths
}

fn render_table_headers<W: Write>(
    headers: &[&str],
    widths: &[usize],
    writer: &mut W,
) -> Result<()> {
    for (i, header) in headers.iter().enumerate() {
        write!(writer, "{:<width$}", header, width = widths[i])?;
        if i < headers.len() - 1 {
            write!(writer, "{COLUMN_SEPARATOR}")?;
        }
    }
    writeln!(writer)?;
    Ok(())
}

fn render_table_separator<W: Write>(widths: &[usize], writer: &mut W) -> Result<()> {
    for (i, &width) in widths.iter().enumerate() {
        write!(writer, "{}", "-".repeat(width))?;
        if i < widths.len() - 1 {
            write!(writer, "{COLUMN_SEPARATOR}")?;
        }
    }
    writeln!(writer)?;
    Ok(())
}

fn render_table_rows<W: Write>(
    rows: &[Vec<String>],
    widths: &[usize],
    writer: &mut W,
) -> Result<()> {
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            write!(writer, "{:<width$}", cell, width = widths[i])?;
            if i < row.len() - 1 {
                write!(writer, "{COLUMN_SEPARATOR}")?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn render_section_title<W: Write>(title: &str, writer: &mut W) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{title}")?;
    writeln!(writer, "{}", "=".repeat(title.chars().count()))?;
    Ok(())
}

fn render_kpis<W: Write>(top: &[EngineerScore], writer: &mut W) -> Result<()> {
    let Some(leader) = top.first() else {
        return Ok(());
    };
    let merged: u64 = top.iter().map(|s| s.prs_merged).sum();
    let issues_closed: u64 = top.iter().map(|s| s.issues_closed).sum();

    let kpis = [
        ("Top engineer".to_string(), leader.engineer.clone()),
        ("Top score".to_string(), format!("{:.4}", leader.impact_score)),
        (format!("PRs merged (top {})", top.len()), merged.to_string()),
        (
            format!("Issues closed (top {})", top.len()),
            issues_closed.to_string(),
        ),
    ];

    let label_width = kpis.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    for (label, value) in &kpis {
        writeln!(writer, "{label:<label_width$}  {value}")?;
    }
    Ok(())
}

/// Length of a bar for `value` scaled so that `max` fills `bar_width`.
/// Non-zero values always get at least one glyph.
fn bar_length(value: u64, max: u64, bar_width: usize) -> usize {
    if max == 0 || value == 0 {
        return 0;
    }
    let scaled = (value as f64 / max as f64 * bar_width as f64).round() as usize;
    scaled.clamp(1, bar_width)
}

fn render_bar_chart<W: Write>(
    title: &str,
    entries: &[(&str, u64)],
    terminal_width: usize,
    writer: &mut W,
) -> Result<()> {
    render_section_title(title, writer)?;

    let label_width = entries.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
    let max = entries.iter().map(|(_, v)| *v).max().unwrap_or(0);
    let count_width = max.to_string().len();
    let overhead = label_width + count_width + 2 * COLUMN_SEPARATOR.len();
    let bar_width = terminal_width.saturating_sub(overhead).max(MIN_BAR_WIDTH);

    for (label, value) in entries {
        let bar = BAR_GLYPH.repeat(bar_length(*value, max, bar_width));
        writeln!(
            writer,
            "{label:<label_width$}{COLUMN_SEPARATOR}{value:>count_width$}{COLUMN_SEPARATOR}{bar}"
        )?;
    }
    Ok(())
}

fn render_legend<W: Write>(writer: &mut W) -> Result<()> {
    render_section_title("Scoring model", writer)?;
    for signal in Signal::ALL {
        writeln!(writer, "{:>4.0}%  {}", signal.weight() * 100.0, signal.label())?;
    }
    writeln!(
        writer,
        "Each signal is divided by the largest value among all engineers before weighting."
    )?;
    Ok(())
}

/// Renders the dashboard for scores already ranked best first.
fn render_dashboard<W: Write>(
    scores: &[EngineerScore],
    top_n: usize,
    terminal_width: usize,
    last_run: Option<DateTime<Utc>>,
    writer: &mut W,
) -> Result<()> {
    let top = &scores[..top_n.min(scores.len())];

    writeln!(writer, "Engineering impact dashboard")?;
    if let Some(time) = last_run {
        writeln!(
            writer,
            "Last run: {} ({})",
            time.format("%Y-%m-%d %H:%M:%S UTC"),
            format_relative_time(time)
        )?;
    }

    render_section_title("Highlights", writer)?;
    render_kpis(top, writer)?;

    render_section_title(&format!("Top {} engineers", top.len()), writer)?;
    let rows: Vec<Vec<String>> = top.iter().map(score_to_table_row).collect();
    let widths = calculate_column_widths(TABLE_HEADERS, &rows);
    render_table_headers(TABLE_HEADERS, &widths, writer)?;
    render_table_separator(&widths, writer)?;
    render_table_rows(&rows, &widths, writer)?;

    let charts: [(&str, fn(&EngineerScore) -> u64); 3] = [
        ("PRs merged", |s| s.prs_merged),
        ("PRs closed", |s| s.prs_closed),
        ("Issues closed", |s| s.issues_closed),
    ];
    for (title, value) in charts {
        let entries: Vec<(&str, u64)> = top
            .iter()
            .map(|s| (s.engineer.as_str(), value(s)))
            .collect();
        render_bar_chart(title, &entries, terminal_width, writer)?;
    }

    render_legend(writer)?;
    Ok(())
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// Prints the dashboard for the scores table at `path`.
pub fn show_dashboard<W: Write>(path: &Path, config: &ShowConfig, writer: &mut W) -> Result<()> {
    if !path.exists() {
        anyhow::bail!(
            "Scores file not found at {}. Run the score stage first",
            path.display()
        );
    }

    let scores = read_scores(path)
        .with_context(|| format!("Failed to read scores from {}", path.display()))?;

    if scores.is_empty() {
        warn!(path = %path.display(), "Scores table is empty");
        writeln!(writer, "No engineers scored yet.")?;
        return Ok(());
    }

    render_dashboard(
        &scores,
        config.top,
        get_terminal_width(config.width),
        modified_time(path),
        writer,
    )
}
