// Notify module - outbound change reports

use crate::config::{NotificationConfig, SinkConfig};
use crate::error::{Result, WardenError};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// A change report produced by a supervision pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(
        topic: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Destination for change reports
///
/// Delivery is best effort: the supervisor logs a failed publish and moves on.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the structured log
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn publish(&self, notification: &Notification) -> Result<()> {
        info!(
            topic = %notification.topic,
            subject = %notification.subject,
            "{}",
            notification.body.trim_end()
        );
        Ok(())
    }
}

/// Hands notifications to an external program
///
/// The program is called as `<program> <args...> <topic> <subject>` and
/// receives the body on stdin.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl NotificationSink for CommandSink {
    fn publish(&self, notification: &Notification) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&notification.topic)
            .arg(&notification.subject)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| {
                WardenError::NotificationError(format!(
                    "Failed to run '{}': {}",
                    self.program, e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(notification.body.as_bytes())
                .map_err(|e| {
                    WardenError::NotificationError(format!("Failed to write body: {}", e))
                })?;
        }

        let status = child.wait().map_err(|e| {
            WardenError::NotificationError(format!("Failed to wait for '{}': {}", self.program, e))
        })?;

        if !status.success() {
            return Err(WardenError::NotificationError(format!(
                "'{}' exited with {}",
                self.program, status
            )));
        }

        debug!("Notification delivered through {}", self.program);
        Ok(())
    }
}

/// Build the sink selected in the configuration
pub fn sink_from_config(config: &NotificationConfig) -> Box<dyn NotificationSink> {
    match config.sink {
        SinkConfig::Log => Box::new(LogSink),
        SinkConfig::Command {
            ref program,
            ref args,
        } => Box::new(CommandSink::new(program.clone(), args.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_log_sink_accepts_notification() {
        let notification = Notification::new("Script Handler", "Scripts Changes", "a Has Been Restarted\n");
        assert!(LogSink.publish(&notification).is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_command_sink_passes_topic_subject_and_body() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("notification.txt");

        let sink = CommandSink::new(
            "/bin/sh",
            vec![
                "-c".to_string(),
                format!("{{ echo \"$1|$2\"; cat; }} > '{}'", out.display()),
                "sh".to_string(),
            ],
        );

        let notification = Notification::new("Jobs", "Scripts Changes [now]", "a Has Been Restarted\n");
        sink.publish(&notification).unwrap();

        let written = fs::read_to_string(&out).unwrap();
        assert_eq!(written, "Jobs|Scripts Changes [now]\na Has Been Restarted\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_command_sink_reports_failure_status() {
        let sink = CommandSink::new("/bin/sh", vec!["-c".to_string(), "exit 3".to_string()]);
        let result = sink.publish(&Notification::new("t", "s", "b"));

        assert!(matches!(result, Err(WardenError::NotificationError(_))));
    }

    #[test]
    fn test_command_sink_missing_program() {
        let sink = CommandSink::new("/nonexistent/notifier", vec![]);
        let result = sink.publish(&Notification::new("t", "s", "b"));

        assert!(matches!(result, Err(WardenError::NotificationError(_))));
    }

    #[test]
    fn test_sink_from_config() {
        let config = NotificationConfig::default();
        let sink = sink_from_config(&config);
        assert!(sink.publish(&Notification::new("t", "s", "b")).is_ok());
    }
}
