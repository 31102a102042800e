use std::io;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::EffectiveConfig;
use crate::engine::{Engine, EngineOptions};
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "template-check",
    version,
    about = "Validate Nix-FHS project templates: reference check, isolated staging and `nix flake check`"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Build-check timeout in seconds (overrides `tool.timeout_secs`).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Validate(ValidateArgs),
    List(ListArgs),
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct RootArgs {
    #[arg(long)]
    pub project_root: Option<PathBuf>,
    /// Relative paths are resolved against the current directory.
    #[arg(long)]
    pub templates_dir: Option<PathBuf>,
    #[arg(long)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Validate a single template instead of discovering all of them.
    #[arg(long)]
    pub template: Option<String>,
    #[command(flatten)]
    pub roots: RootArgs,
    #[arg(long)]
    pub jobs: Option<usize>,
    /// Build-check program (defaults to `nix`).
    #[arg(long)]
    pub program: Option<String>,
    #[arg(long)]
    pub markdown: bool,
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub roots: RootArgs,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::home_dir();
    let env_config_path = std::env::var_os("TEMPLATE_CHECK_CONFIG").map(PathBuf::from);
    let mut cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        home_dir.as_deref(),
    )
    .map_err(crate::exit::invalid_args_err)?;

    if let Some(timeout) = cli.timeout {
        if timeout == 0 {
            return Err(crate::exit::invalid_args("--timeout must be greater than 0"));
        }
        cfg.tool.timeout_secs = timeout;
    }

    let ui_cfg = UiConfig {
        color: stdout_is_tty && cfg.ui.color && !cli.no_color,
        quiet: cli.quiet,
    };
    let show_progress = stderr_is_tty && !cli.quiet && !cli.json;

    match cli.command {
        Commands::Validate(args) => {
            if let Some(jobs) = args.jobs {
                if jobs == 0 {
                    return Err(crate::exit::invalid_args("--jobs must be at least 1"));
                }
                cfg.discovery.jobs = jobs;
            }
            if let Some(program) = args.program {
                cfg.tool.program = program;
            }
            if let Some(dir) = args.log_dir {
                cfg.logs.dir = Some(dir);
            }

            let engine = build_engine(&mut cfg, &args.roots, show_progress)?;

            let started_at = time::OffsetDateTime::now_utc();
            let summary = match args.template.as_deref() {
                Some(name) => engine.validate_one(name),
                None => engine.validate_all(),
            };
            let finished_at = time::OffsetDateTime::now_utc();

            if let Some(dir) = &cfg.logs.dir {
                let ctx = crate::logs::RunContext {
                    started_at,
                    finished_at,
                    project_root: engine.project_root(),
                    templates_dir: engine.templates_dir(),
                    template: args.template.as_deref(),
                };
                let path = crate::logs::write_validation_log(dir, &ctx, &summary)?;
                tracing::debug!(path = %path.display(), "run log written");
            }

            if cli.json {
                crate::ui::write_json(&summary)?;
            } else if args.markdown {
                crate::ui::write_stdout(&crate::ui::format_markdown(&summary))?;
            } else {
                crate::ui::print_summary(&summary, &ui_cfg)?;
            }

            if !summary.all_passed() {
                return Err(crate::exit::validation_failed(format!(
                    "{}/{} templates passed",
                    summary.passed_count(),
                    summary.total_count()
                )));
            }
        }
        Commands::List(args) => {
            let engine = build_engine(&mut cfg, &args.roots, false)?;
            let names = engine.discover().map_err(crate::exit::validation_failed)?;
            if cli.json {
                let mut buf = serde_json::to_vec_pretty(&names)?;
                buf.push(b'\n');
                crate::ui::write_stdout(&String::from_utf8_lossy(&buf))?;
            } else {
                let mut out = String::new();
                for name in &names {
                    out.push_str(name);
                    out.push('\n');
                }
                crate::ui::write_stdout(&out)?;
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "template-check", &mut out);
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    let mut buf = serde_json::to_vec_pretty(&cfg)?;
                    buf.push(b'\n');
                    crate::ui::write_stdout(&String::from_utf8_lossy(&buf))?;
                } else {
                    crate::ui::write_stdout(&toml::to_string_pretty(&cfg)?)?;
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: use `template-check config --show`");
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .try_init();
}

/// Applies root/exclude flags, resolves roots to absolute paths and builds the engine.
fn build_engine(cfg: &mut EffectiveConfig, roots: &RootArgs, show_progress: bool) -> Result<Engine> {
    if let Some(project_root) = &roots.project_root {
        cfg.paths.project_root = project_root.clone();
    }
    if let Some(templates_dir) = &roots.templates_dir {
        cfg.paths.templates_dir = std::path::absolute(templates_dir).map_err(|e| {
            crate::exit::invalid_args(format!(
                "cannot resolve templates directory: {}: {e}",
                templates_dir.display()
            ))
        })?;
    }

    let mut exclude = cfg.discovery.exclude.clone();
    exclude.extend(roots.exclude.iter().cloned());
    exclude.sort();
    exclude.dedup();
    crate::engine::validate_excludes(&exclude).map_err(crate::exit::invalid_args_err)?;

    let project_root = crate::platform::resolve_dir(&cfg.paths.project_root).map_err(|e| {
        crate::exit::invalid_args(format!(
            "project root is not an accessible directory: {}: {e}",
            cfg.paths.project_root.display()
        ))
    })?;
    let templates_dir = templates_dir_under(&project_root, &cfg.paths.templates_dir);
    tracing::debug!(
        project_root = %project_root.display(),
        templates_dir = %templates_dir.display(),
        "resolved roots"
    );

    Engine::new(EngineOptions {
        project_root,
        templates_dir,
        reference: cfg.reference.clone(),
        tool: cfg.tool.clone(),
        exclude,
        jobs: cfg.discovery.jobs,
        show_progress,
    })
    .map_err(crate::exit::invalid_args_err)
}

/// Configured (not flag-given) relative templates dirs live under the project root.
fn templates_dir_under(project_root: &Path, templates_dir: &Path) -> PathBuf {
    if templates_dir.is_absolute() {
        templates_dir.to_path_buf()
    } else {
        project_root.join(templates_dir)
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "unsupported shell: {other} (expected bash|zsh|fish)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_shell_accepts_known_shells_only() {
        assert_eq!(parse_shell(" Zsh ").expect("zsh"), clap_complete::Shell::Zsh);
        let err = parse_shell("powershell").expect_err("unsupported");
        assert_eq!(crate::exit::exit_code(&err), 2);
    }

    #[test]
    fn configured_relative_templates_dir_is_joined_to_project_root() {
        let root = Path::new("/abs/proj");
        assert_eq!(
            templates_dir_under(root, Path::new("templates")),
            PathBuf::from("/abs/proj/templates")
        );
        assert_eq!(
            templates_dir_under(root, Path::new("/elsewhere/t")),
            PathBuf::from("/elsewhere/t")
        );
    }

    #[test]
    fn cli_parses_validate_flags() {
        let cli = Cli::try_parse_from([
            "template-check",
            "--json",
            "--timeout",
            "5",
            "validate",
            "--template",
            "basic",
            "--jobs",
            "4",
            "--exclude",
            "wip-*",
            "--exclude",
            "old-*",
        ])
        .expect("parse");
        assert!(cli.json);
        assert_eq!(cli.timeout, Some(5));
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.template.as_deref(), Some("basic"));
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.roots.exclude, vec!["wip-*", "old-*"]);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
