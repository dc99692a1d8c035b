//! # Label Selectors
//!
//! Equality-based label selector parsing for external-metrics queries. The
//! orchestrator addresses a scaled workload with selectors of the form
//! `key=value,other!=value`; set-based expressions are not part of the
//! external-metrics query surface.

use std::collections::BTreeMap;

use crate::adapter::AdapterError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
}

/// Parsed equality-based label selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Selector that matches every label set
    #[must_use]
    pub const fn any() -> Self {
        Self {
            requirements: Vec::new(),
        }
    }

    /// Parse a comma-separated list of `key=value`, `key==value`, and
    /// `key!=value` requirements. An empty string selects everything.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidSelector`] for malformed requirements.
    pub fn parse(raw: &str) -> Result<Self, AdapterError> {
        let mut requirements = Vec::new();
        for clause in raw.split(',') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }

            let requirement = if let Some((key, value)) = clause.split_once("!=") {
                Requirement::NotEquals(key.trim().to_string(), value.trim().to_string())
            } else if let Some((key, value)) = clause.split_once("==") {
                Requirement::Equals(key.trim().to_string(), value.trim().to_string())
            } else if let Some((key, value)) = clause.split_once('=') {
                Requirement::Equals(key.trim().to_string(), value.trim().to_string())
            } else {
                return Err(AdapterError::InvalidSelector {
                    reason: format!("requirement {clause:?} has no operator"),
                });
            };

            let key = match &requirement {
                Requirement::Equals(key, _) | Requirement::NotEquals(key, _) => key,
            };
            if key.is_empty() {
                return Err(AdapterError::InvalidSelector {
                    reason: format!("requirement {clause:?} has an empty key"),
                });
            }
            requirements.push(requirement);
        }
        Ok(Self { requirements })
    }

    /// True when every requirement holds against `labels`
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|requirement| match requirement {
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::NotEquals(key, value) => labels.get(key) != Some(value),
        })
    }

    /// True when the selector has no requirements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}
