use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::ValidationSummary;

#[derive(Debug, Serialize)]
struct ValidationRunLog<'a> {
    schema_version: &'static str,
    tool_version: String,
    command: &'static str,
    started_at: String,
    finished_at: String,
    status: &'static str,
    project_root: String,
    templates_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    template: Option<&'a str>,
    passed: usize,
    total: usize,
    results: &'a ValidationSummary,
}

#[derive(Debug, Clone)]
pub struct RunContext<'a> {
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    pub project_root: &'a Path,
    pub templates_dir: &'a Path,
    pub template: Option<&'a str>,
}

pub fn write_validation_log(
    dir: &Path,
    ctx: &RunContext<'_>,
    summary: &ValidationSummary,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = ctx.finished_at.unix_timestamp_nanos();
    let path = dir.join(format!("validate-{pid}-{ts}.json"));

    let status = if summary.is_discovery_failure() {
        "discovery_failed"
    } else if summary.all_passed() {
        "ok"
    } else {
        "failed"
    };

    let log = ValidationRunLog {
        schema_version: "1.0",
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        command: "validate",
        started_at: format_ts(ctx.started_at),
        finished_at: format_ts(ctx.finished_at),
        status,
        project_root: ctx.project_root.display().to_string(),
        templates_dir: ctx.templates_dir.display().to_string(),
        template: ctx.template,
        passed: summary.passed_count(),
        total: summary.total_count(),
        results: summary,
    };

    let buf = serde_json::to_vec_pretty(&log).context("failed to serialize run log (JSON)")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("failed to write run log: {}", path.display()))?;
    Ok(path)
}

fn format_ts(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| "unknown".to_string())
}
