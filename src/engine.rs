use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;

use crate::checker::TemplateChecker;
use crate::config::{ReferenceConfig, ToolConfig};
use crate::core::{TemplateVerdict, ValidationSummary};
use crate::runner::NixFlakeCheck;
use crate::staging::Stager;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub project_root: PathBuf,
    pub templates_dir: PathBuf,
    pub reference: ReferenceConfig,
    pub tool: ToolConfig,
    pub exclude: Vec<String>,
    pub jobs: usize,
    pub show_progress: bool,
}

pub struct Engine {
    checker: TemplateChecker,
    exclude: GlobSet,
    jobs: usize,
    show_progress: bool,
}

impl Engine {
    pub fn new(opts: EngineOptions) -> Result<Self> {
        let stager = Stager::new(&opts.project_root, &opts.reference)?;
        let runner = NixFlakeCheck::from_config(&opts.tool);
        let checker = TemplateChecker::new(opts.templates_dir, stager, Box::new(runner));
        Self::with_checker(checker, &opts.exclude, opts.jobs, opts.show_progress)
    }

    pub fn with_checker(
        checker: TemplateChecker,
        exclude: &[String],
        jobs: usize,
        show_progress: bool,
    ) -> Result<Self> {
        Ok(Self {
            checker,
            exclude: build_exclude_set(exclude)?,
            jobs: jobs.max(1),
            show_progress,
        })
    }

    pub fn templates_dir(&self) -> &Path {
        self.checker.templates_dir()
    }

    pub fn project_root(&self) -> &Path {
        self.checker.stager().project_root()
    }

    /// Candidate template names, sorted. `Err` carries a user-facing message.
    pub fn discover(&self) -> std::result::Result<Vec<String>, String> {
        let root = self.templates_dir();
        if !root.is_dir() {
            return Err(format!("Templates directory not found: {}", root.display()));
        }

        let entries = std::fs::read_dir(root)
            .map_err(|e| format!("Failed to read templates directory {}: {e}", root.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable templates entry");
                    continue;
                }
            };
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 template name");
                continue;
            };
            if name.starts_with('.') || self.exclude.is_match(&name) {
                tracing::debug!(template = %name, "excluded from discovery");
                continue;
            }
            names.push(name);
        }
        names.sort();

        if names.is_empty() {
            return Err("No template directories found".to_string());
        }
        Ok(names)
    }

    pub fn validate_all(&self) -> ValidationSummary {
        match self.discover() {
            Ok(names) => self.validate_templates(&names),
            Err(message) => ValidationSummary::discovery_failed(message),
        }
    }

    pub fn validate_one(&self, name: &str) -> ValidationSummary {
        self.validate_templates(&[name.to_string()])
    }

    /// Summary keys follow the order of `names`, whatever order checks finish in.
    pub fn validate_templates(&self, names: &[String]) -> ValidationSummary {
        let pb = self.progress();
        let check = |name: &String| -> TemplateVerdict {
            if let Some(pb) = &pb {
                pb.set_message(format!("checking template {name}"));
            }
            let verdict = self.checker.check_template(name);
            tracing::debug!(template = %name, passed = verdict.passed, "template checked");
            verdict
        };

        let verdicts: Vec<TemplateVerdict> = if self.jobs > 1 && names.len() > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs.min(names.len()))
                .build()
            {
                Ok(pool) => pool.install(|| names.par_iter().map(check).collect()),
                Err(err) => {
                    tracing::warn!(error = %err, "thread pool unavailable; checking sequentially");
                    names.iter().map(check).collect()
                }
            }
        } else {
            names.iter().map(check).collect()
        };

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        ValidationSummary::from_verdicts(verdicts)
    }

    fn progress(&self) -> Option<indicatif::ProgressBar> {
        use std::io::IsTerminal;

        if !self.show_progress || !std::io::stderr().is_terminal() {
            return None;
        }
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.set_message("discovering templates...");
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }
}

pub fn validate_excludes(excludes: &[String]) -> Result<()> {
    let _ = build_exclude_set(excludes)?;
    Ok(())
}

fn build_exclude_set(excludes: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in excludes {
        builder.add(Glob::new(pat).with_context(|| format!("invalid exclude glob: {pat}"))?);
    }
    Ok(builder.build()?)
}
