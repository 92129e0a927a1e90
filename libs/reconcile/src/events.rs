//! Scale events.
//!
//! One event is emitted per created or deleted instance and one per terminal
//! outcome of a pass. Events are reports only; nothing reads them back.

use std::fmt;

use serde::Serialize;
use tracing::{error, info};

/// Whether the reported step succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Successful,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "successful",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of scale event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationKind {
    #[serde(rename = "TSG_INSTANCE_LAUNCH")]
    InstanceLaunch,
    #[serde(rename = "TSG_INSTANCE_LAUNCH_ERROR")]
    InstanceLaunchError,
    #[serde(rename = "TSG_INSTANCE_TERMINATE")]
    InstanceTerminate,
    #[serde(rename = "TSG_INSTANCE_TERMINATE_ERROR")]
    InstanceTerminateError,
    #[serde(rename = "TSG_INSTANCE_NO_OP")]
    InstanceNoOp,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InstanceLaunch => "TSG_INSTANCE_LAUNCH",
            Self::InstanceLaunchError => "TSG_INSTANCE_LAUNCH_ERROR",
            Self::InstanceTerminate => "TSG_INSTANCE_TERMINATE",
            Self::InstanceTerminateError => "TSG_INSTANCE_TERMINATE_ERROR",
            Self::InstanceNoOp => "TSG_INSTANCE_NO_OP",
        }
    }

    /// Status implied by the kind.
    pub fn status(&self) -> EventStatus {
        match self {
            Self::InstanceLaunchError | Self::InstanceTerminateError => EventStatus::Failed,
            _ => EventStatus::Successful,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured scale event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScaleEvent {
    pub account_name: String,
    pub tsg_name: String,
    pub status: EventStatus,
    pub notification_type: NotificationKind,
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Rendered error for failed steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScaleEvent {
    pub fn new(
        account_name: impl Into<String>,
        tsg_name: impl Into<String>,
        kind: NotificationKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            tsg_name: tsg_name.into(),
            status: kind.status(),
            notification_type: kind,
            description: description.into(),
            instance_id: None,
            error: None,
        }
    }

    pub fn with_instance(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    pub fn with_error(mut self, err: &dyn std::error::Error) -> Self {
        self.error = Some(err.to_string());
        self
    }
}

/// Receiver for scale events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScaleEvent);
}

/// Emits scale events as `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ScaleEvent) {
        let message = match event.notification_type {
            NotificationKind::InstanceLaunch => {
                "An instance was created due to a difference between the expected and actual instance count"
            }
            NotificationKind::InstanceTerminate => {
                "An instance was deleted due to a difference between the expected and actual instance count"
            }
            NotificationKind::InstanceNoOp => "TSG is healthy",
            NotificationKind::InstanceLaunchError => "Failed to launch instance",
            NotificationKind::InstanceTerminateError => "Failed to terminate instance",
        };

        match event.status {
            EventStatus::Successful => info!(
                account_name = %event.account_name,
                tsg_name = %event.tsg_name,
                status = %event.status,
                notification_type = %event.notification_type,
                description = %event.description,
                instance_id = event.instance_id.as_deref(),
                "{message}"
            ),
            EventStatus::Failed => error!(
                account_name = %event.account_name,
                tsg_name = %event.tsg_name,
                status = %event.status,
                notification_type = %event.notification_type,
                description = %event.description,
                instance_id = event.instance_id.as_deref(),
                error = event.error.as_deref(),
                "{message}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_kind() {
        let ok = ScaleEvent::new("acct", "g", NotificationKind::InstanceLaunch, "launched");
        let failed = ScaleEvent::new("acct", "g", NotificationKind::InstanceTerminateError, "boom");

        assert_eq!(ok.status, EventStatus::Successful);
        assert_eq!(failed.status, EventStatus::Failed);
    }

    #[test]
    fn test_event_json_shape() {
        let event = ScaleEvent::new(
            "acct",
            "g",
            NotificationKind::InstanceTerminate,
            "Terminating instance abc",
        )
        .with_instance("abc");

        let value = serde_json::to_value(&event).unwrap();
        let expected = serde_json::json!({
            "account_name": "acct",
            "tsg_name": "g",
            "status": "successful",
            "notification_type": "TSG_INSTANCE_TERMINATE",
            "description": "Terminating instance abc",
            "instance_id": "abc"
        });
        assert_eq!(value, expected);
    }
}
