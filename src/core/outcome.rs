use serde::{Deserialize, Serialize};

use crate::core::FailureKind;

pub const CHECK_TEMPLATE: &str = "template_check";
pub const CHECK_REFERENCE: &str = "github_url";
pub const CHECK_STAGING: &str = "temp_template";
pub const CHECK_BUILD: &str = "flake_check";
pub const CHECK_SETUP: &str = "setup";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl CheckOutcome {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            details: None,
            kind: None,
        }
    }

    pub fn fail(name: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            details: None,
            kind: Some(kind),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        let details = details.into();
        self.details = if details.is_empty() {
            None
        } else {
            Some(details)
        };
        self
    }
}
