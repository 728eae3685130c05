//! Change-notification DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound push notification from the source repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    /// Fully qualified ref, e.g. `refs/heads/main`
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Commit the ref now points to
    #[serde(default)]
    pub after: Option<String>,
}

impl PushEvent {
    /// Branch name of a `refs/heads/*` ref
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }
}

/// Outcome of a push notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub triggered: bool,
    pub run_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_event_branch() {
        let event: PushEvent =
            serde_json::from_str(r#"{"ref": "refs/heads/main", "after": "abc123"}"#).unwrap();
        assert_eq!(event.branch(), Some("main"));
        assert_eq!(event.after.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_push_event_tag_has_no_branch() {
        let event = PushEvent {
            git_ref: "refs/tags/v1.0.0".to_string(),
            after: None,
        };
        assert_eq!(event.branch(), None);
    }
}
