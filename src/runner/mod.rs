use std::path::Path;
use std::time::Duration;

use crate::config::ToolConfig;
use crate::core::{CHECK_BUILD, CheckOutcome, FailureKind};
use crate::platform::{CommandError, CommandOutput, CommandRunOptions};

/// Flags that let the tool evaluate an un-registered local flake.
pub const FEATURE_FLAGS: [&str; 4] = [
    "--extra-experimental-features",
    "nix-command",
    "--extra-experimental-features",
    "flakes",
];
pub const CHECK_ARGS: [&str; 4] = ["flake", "check", "--no-net", "--quiet"];

const MAX_MESSAGE_CHARS: usize = 2000;
const MAX_DETAILS_BYTES: usize = 64 * 1024;

pub trait CheckRunner: Send + Sync {
    fn run_build_check(&self, staged_dir: &Path) -> CheckOutcome;
}

impl<T: CheckRunner + ?Sized> CheckRunner for std::sync::Arc<T> {
    fn run_build_check(&self, staged_dir: &Path) -> CheckOutcome {
        (**self).run_build_check(staged_dir)
    }
}

#[derive(Debug, Clone)]
pub struct NixFlakeCheck {
    program: String,
    timeout: Duration,
}

impl NixFlakeCheck {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(tool: &ToolConfig) -> Self {
        Self::new(tool.program.clone(), Duration::from_secs(tool.timeout_secs))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn args() -> Vec<&'static str> {
        FEATURE_FLAGS.iter().chain(CHECK_ARGS.iter()).copied().collect()
    }
}

impl CheckRunner for NixFlakeCheck {
    fn run_build_check(&self, staged_dir: &Path) -> CheckOutcome {
        let args = Self::args();
        tracing::debug!(
            program = %self.program,
            dir = %staged_dir.display(),
            timeout_secs = self.timeout.as_secs(),
            "running build check"
        );
        let result = crate::platform::run_command_with_options(
            &self.program,
            &args,
            self.timeout,
            &CommandRunOptions {
                current_dir: Some(staged_dir.to_path_buf()),
            },
        );
        classify(result)
    }
}

pub fn classify(result: Result<CommandOutput, CommandError>) -> CheckOutcome {
    match result {
        Ok(output) if output.success() => CheckOutcome::pass(CHECK_BUILD, "nix flake check passed"),
        Ok(output) => {
            let diagnostics = diagnostic_text(&output);
            tracing::debug!(exit_code = output.exit_code, "build check failed");
            let shown = if diagnostics.is_empty() {
                "(no diagnostic output)".to_string()
            } else {
                excerpt(&diagnostics, MAX_MESSAGE_CHARS)
            };
            let message = format!("nix flake check failed: {shown}");
            CheckOutcome::fail(CHECK_BUILD, FailureKind::BuildFailed, message)
                .with_details(truncate_bytes(&diagnostics, MAX_DETAILS_BYTES))
        }
        Err(CommandError::Timeout {
            timeout, stderr, ..
        }) => CheckOutcome::fail(
            CHECK_BUILD,
            FailureKind::BuildTimeout,
            format!("nix flake check timed out after {}s", timeout.as_secs()),
        )
        .with_details(truncate_bytes(stderr.trim(), MAX_DETAILS_BYTES)),
        Err(err) => CheckOutcome::fail(
            CHECK_BUILD,
            FailureKind::ExecutionEnvironmentError,
            format!("Error running flake check: {err}"),
        ),
    }
}

fn diagnostic_text(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    output.stdout.trim().to_string()
}

/// First `max_chars` characters, with a marker when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

fn truncate_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn args_put_feature_flags_before_check_command() {
        assert_eq!(
            NixFlakeCheck::args(),
            vec![
                "--extra-experimental-features",
                "nix-command",
                "--extra-experimental-features",
                "flakes",
                "flake",
                "check",
                "--no-net",
                "--quiet",
            ]
        );
    }

    #[test]
    fn zero_exit_passes() {
        let outcome = classify(Ok(output(0, "", "warning: dirty tree")));
        assert!(outcome.passed);
        assert_eq!(outcome.name, CHECK_BUILD);
        assert_eq!(outcome.kind, None);
    }

    #[test]
    fn non_zero_exit_is_build_failure_with_trimmed_stderr() {
        let outcome = classify(Ok(output(1, "", "\n  error: attribute 'x' missing  \n")));
        assert!(!outcome.passed);
        assert_eq!(outcome.kind, Some(FailureKind::BuildFailed));
        assert!(outcome.message.starts_with("nix flake check failed: "));
        assert!(
            outcome.message.ends_with("error: attribute 'x' missing"),
            "message={}",
            outcome.message
        );
        assert_eq!(
            outcome.details.as_deref(),
            Some("error: attribute 'x' missing")
        );
    }

    #[test]
    fn timeout_is_distinct_from_build_failure() {
        let outcome = classify(Err(CommandError::Timeout {
            cmd: "nix".to_string(),
            timeout: Duration::from_secs(120),
            stderr: String::new(),
        }));
        assert!(!outcome.passed);
        assert_eq!(outcome.kind, Some(FailureKind::BuildTimeout));
        assert!(outcome.message.contains("120s"));
        assert_eq!(outcome.details, None);
    }

    #[test]
    fn spawn_failure_is_environmental() {
        let outcome = classify(Err(CommandError::Spawn {
            cmd: "nix".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }));
        assert_eq!(outcome.kind, Some(FailureKind::ExecutionEnvironmentError));
        assert!(outcome.message.starts_with("Error running flake check: "));
    }

    #[test]
    fn long_diagnostics_are_cut_in_message_only() {
        let long = "é".repeat(MAX_MESSAGE_CHARS + 10);
        let outcome = classify(Ok(output(2, "", &long)));
        assert!(outcome.message.ends_with('…'));
        assert_eq!(outcome.details.as_deref(), Some(long.as_str()));
    }

    #[cfg(unix)]
    #[test]
    fn runs_fake_tool_in_staged_directory() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().expect("bin");
        let staged = tempfile::tempdir().expect("staged");
        let tool = bin.path().join("nix");
        std::fs::write(
            &tool,
            "#!/bin/sh\n[ -f ./marker ] || { echo 'no marker' >&2; exit 1; }\nexit 0\n",
        )
        .expect("write tool");
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let runner = NixFlakeCheck::new(tool.display().to_string(), Duration::from_secs(10));
        let outcome = runner.run_build_check(staged.path());
        assert_eq!(outcome.kind, Some(FailureKind::BuildFailed));
        assert!(outcome.message.contains("no marker"));

        std::fs::write(staged.path().join("marker"), b"").expect("marker");
        assert!(runner.run_build_check(staged.path()).passed);
    }

    #[cfg(unix)]
    #[test]
    fn slow_fake_tool_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().expect("bin");
        let tool = bin.path().join("nix");
        std::fs::write(&tool, "#!/bin/sh\nsleep 30\n").expect("write tool");
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let runner = NixFlakeCheck::new(tool.display().to_string(), Duration::from_millis(300));
        let outcome = runner.run_build_check(bin.path());
        assert_eq!(outcome.kind, Some(FailureKind::BuildTimeout));
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_with_lingering_child_stays_within_budget() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        let bin = tempfile::tempdir().expect("bin");
        let tool = bin.path().join("nix");
        std::fs::write(
            &tool,
            "#!/bin/sh\nsleep 8 &\necho 'error: boom' >&2\nexit 1\n",
        )
        .expect("write tool");
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let runner = NixFlakeCheck::new(tool.display().to_string(), Duration::from_secs(2));
        let start = Instant::now();
        let outcome = runner.run_build_check(bin.path());
        let elapsed = start.elapsed();

        assert_eq!(outcome.kind, Some(FailureKind::BuildFailed));
        assert!(outcome.message.contains("error: boom"), "{}", outcome.message);
        assert!(elapsed < Duration::from_secs(4), "elapsed={elapsed:?}");
    }

    #[test]
    fn empty_diagnostics_get_placeholder() {
        let outcome = classify(Ok(output(1, "  ", "")));
        assert_eq!(outcome.message, "nix flake check failed: (no diagnostic output)");
        assert_eq!(outcome.details, None);
    }
}
