use std::fmt;
use std::time::{Duration, SystemTime};

use serde::Deserialize;

use crate::secret::Secret;

#[derive(Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    #[default]
    Ace,
    Gdle,
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServerType::Ace => write!(f, "ACE"),
            ServerType::Gdle => write!(f, "GDLE"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConnection {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub server_type: ServerType,
}

#[derive(Clone, Debug)]
pub enum Credential {
    Stored(Secret),
    Env(String),
}

#[derive(Clone, Debug)]
pub struct Account {
    pub username: String,
    pub credential: Credential,
}

#[derive(Debug)]
pub struct LaunchTask {
    pub connection: ServerConnection,
    pub account: Account,
    pub order: u32,
    pub delay_seconds: u64,
    pub notes: Option<String>,
}

impl LaunchTask {
    pub fn label(&self) -> String {
        format!("{} on {}", self.account.username, self.connection.name)
    }
}

/// Outcome of one task. Built only through the named constructors below.
#[derive(Clone, Debug)]
pub struct LaunchResult {
    success: bool,
    error: Option<String>,
    process_id: Option<u32>,
    world_id: String,
    world_name: String,
    timestamp: SystemTime,
    cancelled: bool,
}

impl LaunchResult {
    pub fn success(connection: &ServerConnection, process_id: u32) -> Self {
        Self::build(connection, true, None, Some(process_id), false)
    }

    pub fn failure(connection: &ServerConnection, error: impl Into<String>) -> Self {
        Self::build(connection, false, Some(error.into()), None, false)
    }

    /// The process started but did not come up cleanly.
    pub fn failure_with_process(
        connection: &ServerConnection,
        process_id: u32,
        error: impl Into<String>,
    ) -> Self {
        Self::build(connection, false, Some(error.into()), Some(process_id), false)
    }

    pub fn cancelled(connection: &ServerConnection, process_id: Option<u32>) -> Self {
        Self::build(
            connection,
            false,
            Some("Launch cancelled".to_string()),
            process_id,
            true,
        )
    }

    fn build(
        connection: &ServerConnection,
        success: bool,
        error: Option<String>,
        process_id: Option<u32>,
        cancelled: bool,
    ) -> Self {
        Self {
            success,
            error,
            process_id,
            world_id: connection.id.clone(),
            world_name: connection.name.clone(),
            timestamp: SystemTime::now(),
            cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[derive(Clone, Debug, Default)]
pub struct LaunchSequenceResult {
    pub total_tasks: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub was_cancelled: bool,
    pub duration: Duration,
    pub errors: Vec<String>,
}

impl LaunchSequenceResult {
    pub fn success(&self) -> bool {
        !self.was_cancelled && self.failure_count == 0
    }

    pub fn attempted(&self) -> usize {
        self.success_count + self.failure_count
    }
}

impl fmt::Display for LaunchSequenceResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} of {} clients launched, {} failed in {:.1}s",
            self.success_count,
            self.total_tasks,
            self.failure_count,
            self.duration.as_secs_f64()
        )?;

        let skipped = self.total_tasks.saturating_sub(self.attempted());
        if self.was_cancelled {
            write!(f, " (cancelled, {} not completed)", skipped)?;
        } else if skipped > 0 {
            write!(f, " ({} skipped)", skipped)?;
        }

        for error in &self.errors {
            write!(f, "\n  - {}", error)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> ServerConnection {
        ServerConnection {
            id: "coldeve".to_string(),
            name: "Coldeve".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9000,
            server_type: ServerType::Ace,
        }
    }

    #[test]
    fn test_result_factories() {
        let ok = LaunchResult::success(&connection(), 42);
        assert!(ok.is_success());
        assert_eq!(ok.process_id(), Some(42));
        assert_eq!(ok.world_name(), "Coldeve");
        assert_eq!(ok.error(), None);

        let failed = LaunchResult::failure(&connection(), "boom");
        assert!(!failed.is_success());
        assert_eq!(failed.error(), Some("boom"));
        assert!(!failed.was_cancelled());

        let cancelled = LaunchResult::cancelled(&connection(), Some(7));
        assert!(cancelled.was_cancelled());
        assert!(!cancelled.is_success());
        assert_eq!(cancelled.process_id(), Some(7));
    }

    #[test]
    fn test_sequence_result_lists_every_error() {
        let result = LaunchSequenceResult {
            total_tasks: 3,
            success_count: 1,
            failure_count: 2,
            was_cancelled: false,
            duration: Duration::from_secs(4),
            errors: vec!["first".to_string(), "second".to_string()],
        };

        let text = result.to_string();
        assert!(!result.success());
        assert!(text.contains("1 of 3"));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }

    #[test]
    fn test_sequence_result_counts_unattempted_tasks() {
        let aborted = LaunchSequenceResult {
            total_tasks: 4,
            success_count: 1,
            failure_count: 1,
            ..Default::default()
        };
        assert_eq!(aborted.attempted(), 2);
        assert!(aborted.to_string().contains("(2 skipped)"));

        let cancelled = LaunchSequenceResult {
            total_tasks: 3,
            success_count: 1,
            was_cancelled: true,
            ..Default::default()
        };
        assert!(cancelled.to_string().contains("(cancelled, 2 not completed)"));
    }
}
