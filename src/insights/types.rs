//! Insight records produced by the engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How urgently an insight needs attention.
///
/// Variant order is the ranking order, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One actionable finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub title: String,
    pub severity: Severity,
    pub summary: String,
    /// Suggested next step
    pub action: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Insight {
    pub fn new(
        title: impl Into<String>,
        severity: Severity,
        summary: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            severity,
            summary: summary.into(),
            action: action.into(),
            metadata: Map::new(),
        }
    }

    /// Attach metadata. Non-object values are ignored.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        if let Value::Object(map) = metadata {
            self.metadata = map;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_insight_serialization() {
        let insight = Insight::new("t", Severity::Critical, "s", "a")
            .with_metadata(json!({ "count": 3 }));
        let value = serde_json::to_value(&insight).unwrap();
        assert_eq!(value["severity"], "critical");
        assert_eq!(value["metadata"]["count"], 3);

        let bare = serde_json::to_value(Insight::new("t", Severity::Low, "s", "a")).unwrap();
        assert!(bare.get("metadata").is_none());
    }
}
