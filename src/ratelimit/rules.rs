//! Policy rules keyed by rate-limit key prefix.
//!
//! Rules let an operator give whole families of keys (`login:`, `api:search:`)
//! their own policy without every caller passing one explicitly. The most
//! specific (longest) matching prefix wins.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::policy::{PolicySpec, WindowPolicy};
use crate::error::{Result, TurnstileError};

/// An ordered set of prefix rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyRules {
    /// Rules in declaration order
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// A policy applied to every key starting with `prefix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Key prefix to match; an empty prefix matches every key
    pub prefix: String,
    /// Admissions per window
    #[serde(default)]
    pub limit: Option<f64>,
    /// Window length in milliseconds
    #[serde(default)]
    pub window_ms: Option<f64>,
    /// Optional name for logs
    #[serde(default)]
    pub name: Option<String>,
}

impl PolicyRule {
    /// Resolve this rule into a policy, filling bad fields from `fallback`.
    pub fn policy(&self, fallback: &WindowPolicy) -> WindowPolicy {
        PolicySpec {
            limit: self.limit,
            window_ms: self.window_ms,
        }
        .resolve(fallback)
    }
}

impl PolicyRules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading policy rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    ///
    /// Accepts either a mapping with a `rules` list or a bare list of rules.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if let Ok(rules) = serde_yaml::from_str::<Vec<PolicyRule>>(yaml) {
            return Ok(Self { rules });
        }

        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse policy rules: {}", e)))
    }

    /// Append a rule.
    pub fn push(&mut self, rule: PolicyRule) {
        self.rules.push(rule);
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the rule for a key: longest matching prefix, first declared on ties.
    pub fn find(&self, key: &str) -> Option<&PolicyRule> {
        let mut best: Option<&PolicyRule> = None;

        for rule in &self.rules {
            if !key.starts_with(rule.prefix.as_str()) {
                continue;
            }
            match best {
                Some(current) if current.prefix.len() >= rule.prefix.len() => {}
                _ => best = Some(rule),
            }
        }

        best
    }
}
