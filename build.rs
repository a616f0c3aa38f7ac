//! Build script for impactscore: embeds a human-readable version string.
//!
//! `BUILD_INFO_HUMAN` is `CARGO_PKG_VERSION`, then the git description in
//! parentheses, then the rustc version. The git description is the output
//! of `git describe --tags --always --dirty` when a tag is reachable, and
//! otherwise a pseudo-version `v{version}-{timestamp}-{commit}[+dirty]`
//! where the timestamp is the commit time for clean trees and the build
//! time for dirty ones.

use std::process::Command;

use chrono::Utc;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn main() {
    ["src", "build.rs", "Cargo.toml", "Cargo.lock"]
        .iter()
        .for_each(|path| println!("cargo:rerun-if-changed={path}"));

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={}", build_info());
}

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn git(args: &[&str]) -> Option<String> {
    command_output("git", args)
}

/// `None` when git is unavailable. `.cargo-ok` is written by
/// `cargo install --git` and does not count as a change.
fn is_dirty() -> Option<bool> {
    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;
    let status = String::from_utf8(output.stdout).ok()?;
    Some(
        status
            .lines()
            .any(|line| line.get(3..).is_some_and(|path| path != ".cargo-ok")),
    )
}

fn pseudo_version() -> String {
    let commit = git(&["rev-parse", "--short=12", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let dirty = is_dirty();

    let commit_time = || {
        git(&["log", "-1", "--format=%ct"])
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
    };
    let timestamp = match dirty {
        Some(false) => commit_time(),
        _ => None,
    }
    .unwrap_or_else(Utc::now)
    .format(TIMESTAMP_FORMAT);

    let suffix = if dirty == Some(true) { "+dirty" } else { "" };
    format!(
        "v{}-{timestamp}-{commit}{suffix}",
        env!("CARGO_PKG_VERSION")
    )
}

fn git_version() -> String {
    match git(&["describe", "--tags", "--always", "--dirty"]) {
        Some(desc) if desc.contains('v') || desc.contains("-g") => desc,
        _ => pseudo_version(),
    }
}

fn build_info() -> String {
    [
        Some(env!("CARGO_PKG_VERSION").to_string()),
        Some(format!("({})", git_version())),
        command_output("rustc", &["--version"]),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
}
