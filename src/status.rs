/*!
 # User facing status line

 Every settings operation ends in a single status message with an optional
 detail line, so a front end can show progress and failures the same way.
*/

use std::fmt;

use crate::Error;

/// Settings operation a status refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Save,
    Backup,
    Restore,
}

impl Operation {
    fn in_progress(self) -> &'static str {
        match self {
            Operation::Load => "Loading settings...",
            Operation::Save => "Sending settings...",
            Operation::Backup => "Fetching settings for backup...",
            Operation::Restore => "Restoring settings...",
        }
    }

    fn failure_prefix(self) -> &'static str {
        match self {
            Operation::Load => "Failed to load settings.",
            Operation::Save => "Save failed:",
            Operation::Backup => "Backup failed:",
            Operation::Restore => "Restore failed:",
        }
    }
}

/// Current status message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub message: String,
    pub detail: Option<String>,
    pub failed: bool,
}

impl Status {
    pub fn in_progress(operation: Operation) -> Self {
        Self {
            message: operation.in_progress().to_string(),
            ..Self::default()
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Renders an error the way the front end reports it
    pub fn failure(operation: Operation, error: &Error) -> Self {
        let prefix = operation.failure_prefix();
        let (message, detail) = match error {
            Error::Validation(e) => (format!("{prefix} {}", e.summary()), Some(e.to_string())),
            Error::Status { status, body } => (
                format!("{prefix} Error: {body}"),
                Some(format!("HTTP status {status}")),
            ),
            Error::Timeout(after) => (
                format!("{prefix} Error: Timeout"),
                Some(format!("No response within {} ms", after.as_millis())),
            ),
            other => (format!("{prefix} {other}"), None),
        };
        Self {
            message,
            detail,
            failed: true,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n{detail}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValidationError;
    use std::time::Duration;

    #[test]
    fn timeout_message_names_the_timeout() {
        let status = Status::failure(Operation::Load, &Error::Timeout(Duration::from_millis(5000)));
        assert_eq!(status.message, "Failed to load settings. Error: Timeout");
        assert_eq!(status.detail.as_deref(), Some("No response within 5000 ms"));
        assert!(status.failed);
    }

    #[test]
    fn status_error_uses_body_as_detail() {
        let status = Status::failure(
            Operation::Save,
            &Error::Status {
                status: 500,
                body: "NVS write failed".into(),
            },
        );
        assert_eq!(status.message, "Save failed: Error: NVS write failed");
        assert_eq!(status.to_string(), "Save failed: Error: NVS write failed\nHTTP status 500");
    }

    #[test]
    fn validation_summary_and_field_detail() {
        let status = Status::failure(
            Operation::Save,
            &Error::Validation(ValidationError::MissingTimeOfDay { row: 2 }),
        );
        assert_eq!(status.message, "Save failed: Invalid schedule. Please fix errors.");
        assert_eq!(
            status.detail.as_deref(),
            Some("Schedule row 2: time of day is required")
        );
    }
}
