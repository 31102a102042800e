use serde::{Deserialize, Serialize};

use crate::core::{CheckOutcome, FailureKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVerdict {
    pub template: String,
    pub passed: bool,
    #[serde(rename = "tests")]
    pub outcomes: Vec<CheckOutcome>,
}

impl TemplateVerdict {
    /// `passed` is always derived from `outcomes`.
    pub fn new(template: impl Into<String>, outcomes: Vec<CheckOutcome>) -> Self {
        let passed = outcomes.iter().all(|o| o.passed);
        Self {
            template: template.into(),
            passed,
            outcomes,
        }
    }

    pub fn outcome(&self, name: &str) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn first_failure(&self) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| !o.passed)
    }

    pub fn failure_kinds(&self) -> Vec<FailureKind> {
        self.outcomes.iter().filter_map(|o| o.kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CHECK_BUILD, CHECK_REFERENCE, CHECK_STAGING};

    #[test]
    fn passed_is_conjunction_of_outcomes() {
        let ok = TemplateVerdict::new(
            "basic",
            vec![
                CheckOutcome::pass(CHECK_REFERENCE, "ok"),
                CheckOutcome::pass(CHECK_STAGING, "ok"),
                CheckOutcome::pass(CHECK_BUILD, "ok"),
            ],
        );
        assert!(ok.passed);

        let failed = TemplateVerdict::new(
            "basic",
            vec![
                CheckOutcome::fail(CHECK_REFERENCE, FailureKind::StaleReference, "stale"),
                CheckOutcome::pass(CHECK_STAGING, "ok"),
                CheckOutcome::fail(CHECK_BUILD, FailureKind::BuildFailed, "boom"),
            ],
        );
        assert!(!failed.passed);
        assert_eq!(
            failed.first_failure().map(|o| o.name.as_str()),
            Some(CHECK_REFERENCE)
        );
        assert_eq!(
            failed.failure_kinds(),
            vec![FailureKind::StaleReference, FailureKind::BuildFailed]
        );
    }

    #[test]
    fn serializes_outcomes_as_tests_with_null_details() {
        let verdict = TemplateVerdict::new(
            "basic",
            vec![CheckOutcome::pass(CHECK_REFERENCE, "Template uses correct GitHub URL")],
        );
        let v = serde_json::to_value(&verdict).expect("serialize");
        assert_eq!(v["template"], "basic");
        assert_eq!(v["passed"], true);
        assert_eq!(v["tests"][0]["name"], CHECK_REFERENCE);
        assert!(v["tests"][0]["details"].is_null());
        assert!(v["tests"][0].get("kind").is_none());
    }
}
