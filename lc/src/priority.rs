//! Key-to-priority rules

use serde::{Deserialize, Serialize};

/// Keys containing `contains` get `priority`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRule {
    pub contains: String,
    pub priority: i32,
}

impl PriorityRule {
    pub fn new(contains: impl Into<String>, priority: i32) -> Self {
        Self {
            contains: contains.into(),
            priority,
        }
    }
}

/// Ordered substring rules; the first match wins, otherwise `fallback`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRules {
    #[serde(default)]
    pub rules: Vec<PriorityRule>,
    #[serde(default)]
    pub fallback: i32,
}

impl Default for PriorityRules {
    /// Thumbnails after plain resources, video covers last
    fn default() -> Self {
        Self {
            rules: vec![PriorityRule::new("getThumbnail", 1), PriorityRule::new("getVideoCover", 0)],
            fallback: 2,
        }
    }
}

impl PriorityRules {
    /// Rules that give every key the same priority
    pub fn flat(priority: i32) -> Self {
        Self {
            rules: Vec::new(),
            fallback: priority,
        }
    }

    pub fn priority_for(&self, key: &str) -> i32 {
        self.rules
            .iter()
            .find(|rule| key.contains(&rule.contains))
            .map_or(self.fallback, |rule| rule.priority)
    }
}
