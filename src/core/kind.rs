use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    ManifestUnreadable,
    StaleReference,
    MissingManifest,
    CopyFailed,
    RewriteFailed,
    BuildFailed,
    BuildTimeout,
    ExecutionEnvironmentError,
    TemplateNotFound,
    DiscoveryFailed,
}

impl FailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureKind::ManifestUnreadable => "MANIFEST_UNREADABLE",
            FailureKind::StaleReference => "STALE_REFERENCE",
            FailureKind::MissingManifest => "MISSING_MANIFEST",
            FailureKind::CopyFailed => "COPY_FAILED",
            FailureKind::RewriteFailed => "REWRITE_FAILED",
            FailureKind::BuildFailed => "BUILD_FAILED",
            FailureKind::BuildTimeout => "BUILD_TIMEOUT",
            FailureKind::ExecutionEnvironmentError => "EXECUTION_ENVIRONMENT_ERROR",
            FailureKind::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            FailureKind::DiscoveryFailed => "DISCOVERY_FAILED",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
