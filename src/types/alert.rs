//! Alerts: structured, non-fatal warnings returned alongside results.
//!
//! Alerts are never errors. A mutation that returns alerts still succeeded
//! for everything the alerts don't mention, so callers must inspect them
//! even on the success path.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// Informational.
    Success,
    /// Something requested was skipped.
    Warn,
    /// Something requested was rejected.
    Error,
}

/// Machine-readable reason for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCode {
    /// Topic name empty after normalization or shaped like a URL.
    InvalidTopicName,
    /// Another topic in the repository already has this name.
    DuplicateTopicName,
    /// Adding the parent would introduce a cycle.
    WouldCreateCycle,
    /// The URL could not be parsed.
    InvalidUrl,
    /// No requested parent could be applied; existing parents were kept.
    ParentsUnchanged,
    /// A topic must keep at least one synonym.
    SynonymRequired,
}

/// A structured, non-fatal warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique id, useful for de-duplicating alerts in a UI.
    pub id: String,
    /// Severity.
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    /// Reason code.
    pub code: AlertCode,
    /// Human-readable text.
    pub text: String,
}

impl Alert {
    /// Create an alert.
    pub fn new(alert_type: AlertType, code: AlertCode, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_type,
            code,
            text: text.into(),
        }
    }

    /// A warning.
    pub fn warn(code: AlertCode, text: impl Into<String>) -> Self {
        Self::new(AlertType::Warn, code, text)
    }

    /// An error-level alert.
    pub fn error(code: AlertCode, text: impl Into<String>) -> Self {
        Self::new(AlertType::Error, code, text)
    }

    /// Rejected parent: `ancestor` is already a descendant of `topic`.
    pub fn cycle(topic_name: &str, ancestor_name: &str) -> Self {
        Self::warn(
            AlertCode::WouldCreateCycle,
            format!(
                "\"{}\" is a descendant of \"{}\" and cannot be added as a parent topic",
                ancestor_name, topic_name
            ),
        )
    }

    /// Rejected topic name.
    pub fn invalid_topic_name(name: &str) -> Self {
        Self::warn(
            AlertCode::InvalidTopicName,
            format!("\"{}\" is not a valid name", name),
        )
    }

    /// Name clash within a repository.
    pub fn duplicate_topic_name(name: &str) -> Self {
        Self::warn(
            AlertCode::DuplicateTopicName,
            format!("A topic with the name \"{}\" already exists", name),
        )
    }

    /// Unparseable URL.
    pub fn invalid_url(url: &str) -> Self {
        Self::warn(AlertCode::InvalidUrl, format!("Invalid url: {}", url))
    }

    /// Whether this alert has the given code.
    pub fn is(&self, code: AlertCode) -> bool {
        self.code == code
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.alert_type, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_alert_names_both_topics() {
        let alert = Alert::cycle("Science", "Physics");
        assert_eq!(alert.alert_type, AlertType::Warn);
        assert!(alert.is(AlertCode::WouldCreateCycle));
        assert!(alert.text.contains("Science"));
        assert!(alert.text.contains("Physics"));
    }

    #[test]
    fn test_alert_serializes_type_field() {
        let alert = Alert::duplicate_topic_name("Foo");
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "WARN");
        assert_eq!(json["code"], "duplicate_topic_name");
    }
}
