use std::path::{Component, Path, PathBuf};

use crate::core::{
    CHECK_REFERENCE, CHECK_STAGING, CHECK_TEMPLATE, CheckOutcome, FailureKind, TemplateVerdict,
};
use crate::runner::CheckRunner;
use crate::staging::{StagedTemplate, Stager};

pub struct TemplateChecker {
    templates_dir: PathBuf,
    stager: Stager,
    runner: Box<dyn CheckRunner>,
}

impl TemplateChecker {
    pub fn new(templates_dir: impl Into<PathBuf>, stager: Stager, runner: Box<dyn CheckRunner>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            stager,
            runner,
        }
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    pub fn check_template(&self, name: &str) -> TemplateVerdict {
        let Some(template_dir) = self.template_dir(name) else {
            let shown = self.templates_dir.join(name);
            return TemplateVerdict::new(
                name,
                vec![CheckOutcome::fail(
                    CHECK_TEMPLATE,
                    FailureKind::TemplateNotFound,
                    format!("Template directory not found: {}", shown.display()),
                )],
            );
        };

        let mut outcomes = vec![self.check_reference(&template_dir)];

        match self.stager.stage(&template_dir) {
            Ok(staged) => {
                outcomes.push(CheckOutcome::pass(
                    CHECK_STAGING,
                    format!("Temporary template created with {}", staged.local_reference()),
                ));
                outcomes.push(self.runner.run_build_check(staged.path()));
                teardown(name, staged);
            }
            Err(failure) => {
                tracing::debug!(template = name, kind = %failure.kind, "staging failed");
                outcomes.push(CheckOutcome::fail(
                    CHECK_STAGING,
                    failure.kind,
                    failure.message,
                ));
            }
        }

        TemplateVerdict::new(name, outcomes)
    }

    /// Checks the published manifest, not the staged copy.
    fn check_reference(&self, template_dir: &Path) -> CheckOutcome {
        let manifest = template_dir.join(self.stager.manifest_name());
        let canonical = self.stager.canonical_reference();
        match std::fs::read_to_string(&manifest) {
            Ok(content) if content.contains(canonical) => {
                CheckOutcome::pass(CHECK_REFERENCE, "Template uses correct GitHub URL")
            }
            Ok(_) => CheckOutcome::fail(
                CHECK_REFERENCE,
                FailureKind::StaleReference,
                format!("Template does not use expected GitHub URL: {canonical}"),
            ),
            Err(e) => CheckOutcome::fail(
                CHECK_REFERENCE,
                FailureKind::ManifestUnreadable,
                format!("Error reading template: {}: {e}", manifest.display()),
            ),
        }
    }

    fn template_dir(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_name(name) {
            return None;
        }
        let dir = self.templates_dir.join(name);
        if dir.is_dir() { Some(dir) } else { None }
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn teardown(name: &str, staged: StagedTemplate) {
    let path = staged.path().to_path_buf();
    if let Err(err) = staged.close() {
        tracing::debug!(
            template = name,
            staging_dir = %path.display(),
            error = %err,
            "failed to remove staging directory"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::EffectiveConfig;
    use crate::core::CHECK_BUILD;

    const FLAKE: &str = "{ inputs.nix-fhs.url = \"github:luochen1990/Nix-FHS\"; }\n";

    struct RecordingRunner {
        seen: Mutex<Vec<(PathBuf, String)>>,
        fail: bool,
    }

    impl CheckRunner for RecordingRunner {
        fn run_build_check(&self, staged_dir: &Path) -> CheckOutcome {
            let manifest = std::fs::read_to_string(staged_dir.join("flake.nix")).unwrap_or_default();
            self.seen
                .lock()
                .expect("lock")
                .push((staged_dir.to_path_buf(), manifest));
            if self.fail {
                CheckOutcome::fail(CHECK_BUILD, FailureKind::BuildFailed, "nix flake check failed: boom")
            } else {
                CheckOutcome::pass(CHECK_BUILD, "nix flake check passed")
            }
        }
    }

    struct Fixture {
        _project: tempfile::TempDir,
        templates: tempfile::TempDir,
        checker: TemplateChecker,
        runner: std::sync::Arc<RecordingRunner>,
    }

    fn fixture(fail: bool) -> Fixture {
        let project = tempfile::tempdir().expect("project");
        let templates = tempfile::tempdir().expect("templates");
        let stager = Stager::new(project.path(), &EffectiveConfig::default().reference).expect("stager");
        let runner = std::sync::Arc::new(RecordingRunner {
            seen: Mutex::new(vec![]),
            fail,
        });
        let checker = TemplateChecker::new(
            templates.path(),
            stager,
            Box::new(runner.clone()),
        );
        Fixture {
            _project: project,
            templates,
            checker,
            runner,
        }
    }

    fn add_template(fx: &Fixture, name: &str, manifest: Option<&str>) {
        let dir = fx.templates.path().join(name);
        std::fs::create_dir_all(&dir).expect("mkdir");
        if let Some(manifest) = manifest {
            std::fs::write(dir.join("flake.nix"), manifest).expect("write");
        }
    }

    fn names(verdict: &TemplateVerdict) -> Vec<&str> {
        verdict.outcomes.iter().map(|o| o.name.as_str()).collect()
    }

    #[test]
    fn healthy_template_runs_all_three_checks_and_tears_down() {
        let fx = fixture(false);
        add_template(&fx, "basic", Some(FLAKE));

        let verdict = fx.checker.check_template("basic");
        assert!(verdict.passed, "{verdict:?}");
        assert_eq!(names(&verdict), vec![CHECK_REFERENCE, CHECK_STAGING, CHECK_BUILD]);

        let seen = fx.runner.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        let (staged_dir, manifest) = &seen[0];
        assert!(manifest.contains(fx.checker.stager().local_reference()));
        assert!(!staged_dir.exists(), "staging dir should be removed");
    }

    #[test]
    fn missing_manifest_skips_build_check() {
        let fx = fixture(false);
        add_template(&fx, "empty", None);

        let verdict = fx.checker.check_template("empty");
        assert!(!verdict.passed);
        assert_eq!(names(&verdict), vec![CHECK_REFERENCE, CHECK_STAGING]);
        let staging = verdict.outcome(CHECK_STAGING).expect("staging outcome");
        assert_eq!(staging.kind, Some(FailureKind::MissingManifest));
        assert!(staging.message.contains("not found"));
        assert_eq!(
            verdict.outcome(CHECK_REFERENCE).and_then(|o| o.kind),
            Some(FailureKind::ManifestUnreadable)
        );
        assert!(verdict.outcome(CHECK_BUILD).is_none());
        assert!(fx.runner.seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn stale_reference_reports_both_static_and_rewrite_failures() {
        let fx = fixture(false);
        add_template(&fx, "stale", Some("{ inputs.x.url = \"github:other/repo\"; }"));

        let verdict = fx.checker.check_template("stale");
        assert!(!verdict.passed);
        assert_eq!(
            verdict.failure_kinds(),
            vec![FailureKind::StaleReference, FailureKind::RewriteFailed]
        );
        assert!(fx.runner.seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn build_failure_fails_verdict_but_keeps_earlier_passes() {
        let fx = fixture(true);
        add_template(&fx, "broken", Some(FLAKE));

        let verdict = fx.checker.check_template("broken");
        assert!(!verdict.passed);
        assert!(verdict.outcome(CHECK_REFERENCE).expect("ref").passed);
        assert!(verdict.outcome(CHECK_STAGING).expect("staging").passed);
        assert_eq!(
            verdict.first_failure().map(|o| o.name.as_str()),
            Some(CHECK_BUILD)
        );
    }

    #[test]
    fn unknown_or_unsafe_names_are_not_found() {
        let fx = fixture(false);
        std::fs::write(fx.templates.path().join("file"), b"x").expect("write");

        for name in ["missing", "../escape", "a/b", "", ".", "file"] {
            let verdict = fx.checker.check_template(name);
            assert!(!verdict.passed, "name={name}");
            assert_eq!(names(&verdict), vec![CHECK_TEMPLATE], "name={name}");
            assert_eq!(verdict.outcomes[0].kind, Some(FailureKind::TemplateNotFound));
        }
        assert!(fx.runner.seen.lock().expect("lock").is_empty());
    }
}
