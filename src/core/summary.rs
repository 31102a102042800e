use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::core::{CHECK_SETUP, CheckOutcome, FailureKind, TemplateVerdict};

pub const DISCOVERY_ERROR_KEY: &str = "error";

/// Verdicts keyed by template name, kept in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    entries: Vec<(String, TemplateVerdict)>,
}

impl ValidationSummary {
    /// Later verdicts for an already-present key replace the earlier one in place.
    pub fn from_verdicts(verdicts: impl IntoIterator<Item = TemplateVerdict>) -> Self {
        let mut entries: Vec<(String, TemplateVerdict)> = Vec::new();
        for verdict in verdicts {
            let key = verdict.template.clone();
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = verdict,
                None => entries.push((key, verdict)),
            }
        }
        Self { entries }
    }

    pub fn discovery_failed(message: impl Into<String>) -> Self {
        Self::from_verdicts([TemplateVerdict::new(
            DISCOVERY_ERROR_KEY,
            vec![CheckOutcome::fail(
                CHECK_SETUP,
                FailureKind::DiscoveryFailed,
                message,
            )],
        )])
    }

    pub fn is_discovery_failure(&self) -> bool {
        self.entries.len() == 1
            && self.entries[0].0 == DISCOVERY_ERROR_KEY
            && self.entries[0]
                .1
                .outcomes
                .iter()
                .any(|o| o.kind == Some(FailureKind::DiscoveryFailed))
    }

    pub fn get(&self, name: &str) -> Option<&TemplateVerdict> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TemplateVerdict)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn passed_count(&self) -> usize {
        self.entries.iter().filter(|(_, v)| v.passed).count()
    }

    pub fn total_count(&self) -> usize {
        self.entries.len()
    }

    pub fn all_passed(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|(_, v)| v.passed)
    }
}

impl Serialize for ValidationSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, verdict) in &self.entries {
            map.serialize_entry(key, verdict)?;
        }
        map.end()
    }
}
