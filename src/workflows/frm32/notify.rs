use serde::Serialize;

use super::domain::SubmissionId;

/// Outbound mail hook events raised by the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SubmissionReceived,
    ReviewCompleted,
}

/// Payload handed to the mail transport adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewNotification {
    pub kind: NotificationKind,
    pub submission_id: SubmissionId,
    pub contractor_name: String,
    pub evaluation_period: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
}

/// Trait describing the outbound email adapter. Delivery is fire-and-forget:
/// the service logs failures and never propagates them to the caller.
pub trait NotificationSender: Send + Sync {
    fn send(&self, notification: ReviewNotification) -> Result<(), NotifyError>;
}

/// Default sender that only records the notification in the logs.
#[derive(Debug, Default, Clone)]
pub struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send(&self, notification: ReviewNotification) -> Result<(), NotifyError> {
        tracing::info!(
            kind = ?notification.kind,
            submission = %notification.submission_id.0,
            contractor = %notification.contractor_name,
            "notification dispatched"
        );
        Ok(())
    }
}
