/// State updates applied when a rule fires.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::rules::Rules;

/// Value that stores the firing rule's own name.
pub const RULE_NAME_VALUE: &str = "=";

/// A set of `key -> value` assignments written into the registry's state
/// map each time the owning rule fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    pub entries: BTreeMap<String, String>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an assignment, builder style.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply every assignment to `rules`. A value of `=` stores `rule_name`.
    pub fn set(&self, rules: &mut Rules, rule_name: &str) {
        for (key, value) in &self.entries {
            let value = if value == RULE_NAME_VALUE {
                rule_name
            } else {
                value.as_str()
            };
            rules.set_state(key, value);
        }
    }
}
