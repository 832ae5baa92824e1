//! Plan-trigger classifiers

use crate::agent::Agent;
use crate::config::PlanningConfig;

/// Decides whether a message should go through planning. Advisory only.
pub trait PlanTrigger: Send + Sync {
    fn should_plan(&self, agent: &Agent, message: &str) -> bool;
}

/// Keyword and complexity-marker heuristic over the lowercased message
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
    markers: Vec<String>,
    threshold: usize,
}

impl KeywordClassifier {
    pub fn new(config: &PlanningConfig) -> Self {
        let lower = |items: &[String]| items.iter().map(|s| s.to_lowercase()).collect();
        Self {
            keywords: lower(&config.keywords),
            markers: lower(&config.complexity_markers),
            threshold: config.marker_threshold.max(1),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(&PlanningConfig::default())
    }
}

impl PlanTrigger for KeywordClassifier {
    fn should_plan(&self, _agent: &Agent, message: &str) -> bool {
        let message = message.to_lowercase();
        if self.keywords.iter().any(|k| message.contains(k.as_str())) {
            return true;
        }
        let markers = self
            .markers
            .iter()
            .filter(|m| message.contains(m.as_str()))
            .count();
        markers >= self.threshold
    }
}
