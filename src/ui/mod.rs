use anyhow::{Error, Result};
use std::io::{self, Write};

use crate::core::{CHECK_BUILD, CheckOutcome, DISCOVERY_ERROR_KEY, TemplateVerdict, ValidationSummary};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Pass,
    Warn,
    Fail,
}

impl Marker {
    pub fn for_outcome(outcome: &CheckOutcome) -> Self {
        if outcome.passed {
            Marker::Pass
        } else if is_sandbox_restriction(outcome) {
            Marker::Warn
        } else {
            Marker::Fail
        }
    }

    pub fn for_verdict(verdict: &TemplateVerdict) -> Self {
        if verdict.passed {
            Marker::Pass
        } else {
            Marker::Fail
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Marker::Pass => "PASS",
            Marker::Warn => "WARN",
            Marker::Fail => "FAIL",
        }
    }

    const fn ansi(self) -> &'static str {
        match self {
            Marker::Pass => "32",
            Marker::Warn => "33",
            Marker::Fail => "31",
        }
    }
}

/// Display-only downgrade; the outcome still counts as failed.
fn is_sandbox_restriction(outcome: &CheckOutcome) -> bool {
    outcome.name == CHECK_BUILD && outcome.message.contains("sandbox restrictions")
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    if crate::exit::exit_code(err) == crate::exit::ExitCode::ValidationFailed.as_i32() {
        let _ = writeln!(stderr, "validation failed: {err}");
        return;
    }
    let _ = writeln!(stderr, "error:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "caused by:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "next:");
    let _ = writeln!(
        stderr,
        "  - re-run with `--verbose` for diagnostic logs"
    );
    let _ = writeln!(
        stderr,
        "  - see `template-check --help` for available commands and options"
    );
}

pub fn print_summary(summary: &ValidationSummary, cfg: &UiConfig) -> Result<()> {
    if cfg.quiet {
        return Ok(());
    }
    write_stdout(&format_text(summary, cfg))
}

pub fn format_text(summary: &ValidationSummary, cfg: &UiConfig) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();

    if summary.is_discovery_failure() {
        if let Some(outcome) = summary
            .get(DISCOVERY_ERROR_KEY)
            .and_then(|v| v.outcomes.first())
        {
            let _ = writeln!(out, "{} {}", paint(Marker::Fail, cfg.color), outcome.message);
        }
        return out;
    }

    for (name, verdict) in summary.iter() {
        let _ = writeln!(
            out,
            "{} Template: {name}",
            paint(Marker::for_verdict(verdict), cfg.color)
        );
        for outcome in &verdict.outcomes {
            let _ = writeln!(
                out,
                "  {} {}: {}",
                paint(Marker::for_outcome(outcome), cfg.color),
                outcome.name,
                outcome.message
            );
            if let Some(details) = &outcome.details {
                for line in details.lines() {
                    let _ = writeln!(out, "      {line}");
                }
            }
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(
        out,
        "Summary: {}/{} templates passed",
        summary.passed_count(),
        summary.total_count()
    );
    out
}

pub fn format_markdown(summary: &ValidationSummary) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = writeln!(out, "# Template validation report");
    let _ = writeln!(out);

    if summary.is_discovery_failure() {
        if let Some(outcome) = summary
            .get(DISCOVERY_ERROR_KEY)
            .and_then(|v| v.outcomes.first())
        {
            let _ = writeln!(out, "**Error:** {}", escape_md(&outcome.message));
        }
        return out;
    }

    let _ = writeln!(
        out,
        "- Passed: {}/{}",
        summary.passed_count(),
        summary.total_count()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "| Template | Result | Failed checks |");
    let _ = writeln!(out, "|---|---|---|");
    for (name, verdict) in summary.iter() {
        let failed: Vec<&str> = verdict
            .outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.name.as_str())
            .collect();
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            escape_md(name),
            Marker::for_verdict(verdict).label(),
            failed.join(", ")
        );
    }

    for (name, verdict) in summary.iter().filter(|(_, v)| !v.passed) {
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", escape_md(name));
        let _ = writeln!(out);
        for outcome in verdict.outcomes.iter().filter(|o| !o.passed) {
            let kind = outcome
                .kind
                .map(|k| format!(" ({k})"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "- **{}**{kind} [{}]: {}",
                outcome.name,
                Marker::for_outcome(outcome).label(),
                escape_md(first_line(&outcome.message))
            );
            if let Some(details) = &outcome.details {
                let _ = writeln!(out);
                let _ = writeln!(out, "  ```text");
                for line in details.lines() {
                    let _ = writeln!(out, "  {line}");
                }
                let _ = writeln!(out, "  ```");
            }
        }
    }
    out
}

pub fn write_json(summary: &ValidationSummary) -> Result<()> {
    let mut buf = serde_json::to_vec_pretty(summary)?;
    buf.push(b'\n');
    write_stdout_bytes(&buf)
}

pub fn write_stdout(s: &str) -> Result<()> {
    write_stdout_bytes(s.as_bytes())
}

fn write_stdout_bytes(buf: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match stdout.write_all(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn paint(marker: Marker, color: bool) -> String {
    let s = marker.label();
    if !color {
        return s.to_string();
    }
    format!("\x1b[{}m{s}\x1b[0m", marker.ansi())
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

fn escape_md(s: &str) -> String {
    s.replace('|', "\\|")
}
