use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for activity logs. Controls retention and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Long-term retention, never auto-deleted (permission and lifecycle
    /// changes).
    Critical,
    /// Medium-term retention (default for business records).
    #[default]
    Important,
    /// Aggressively trimmed.
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Trait for entities that appear in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Entity type name, used as the event-name prefix ("customer.deleted").
    fn entity_type() -> &'static str;

    /// Usually the entity's primary key.
    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Deletions and restores always matter for the audit trail, whatever
    /// the entity's baseline severity.
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "restored" | "purged" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
