use serde::{Deserialize, Serialize};

/// Human-readable payload published to the notification topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub message: String,
}

/// Fire-and-forget publish to a topic-keyed notification channel.
///
/// Delivery is best-effort: failures are logged by the caller and never
/// roll back pipeline state. Routing to a specific user's device endpoint
/// is a future extension.
pub trait Notifier: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
