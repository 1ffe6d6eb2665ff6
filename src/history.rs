use log::{info, warn};
use std::time::UNIX_EPOCH;

use crate::task::{LaunchResult, LaunchTask};

/// Receives every finished task of a sequence.
pub trait LaunchHistory: Send + Sync {
    fn record(&self, task: &LaunchTask, result: &LaunchResult);
}

/// Writes history entries to the log.
pub struct LogHistory;

fn entry(task: &LaunchTask, result: &LaunchResult) -> String {
    let at = result
        .timestamp()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let outcome = match (result.is_success(), result.process_id()) {
        (true, Some(pid)) => format!("launched as pid {}", pid),
        _ => format!(
            "did not launch: {}",
            result.error().unwrap_or("unknown error")
        ),
    };

    let mut line = format!(
        "History @{}: {} on {} ({}) {}",
        at,
        task.account.username,
        result.world_name(),
        result.world_id(),
        outcome
    );

    if let Some(notes) = task.notes.as_deref().filter(|n| !n.is_empty()) {
        line.push_str(&format!(" [{}]", notes));
    }

    line
}

impl LaunchHistory for LogHistory {
    fn record(&self, task: &LaunchTask, result: &LaunchResult) {
        if result.is_success() {
            info!("{}", entry(task, result));
        } else {
            warn!("{}", entry(task, result));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::task;

    #[test]
    fn test_entry_includes_timestamp_and_notes() {
        let mut task = task("alice", 1, 0);
        task.notes = Some("main crafter".to_string());
        let result = LaunchResult::success(&task.connection, 31);

        let line = entry(&task, &result);
        let at = result
            .timestamp()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        assert!(line.starts_with(&format!("History @{}: alice on COLDEVE (coldeve)", at)));
        assert!(line.contains("launched as pid 31"));
        assert!(line.ends_with("[main crafter]"));
    }

    #[test]
    fn test_failed_entry_without_notes() {
        let task = task("bob", 2, 0);
        let result = LaunchResult::failure(&task.connection, "Injector failed".to_string());

        let line = entry(&task, &result);

        assert!(line.contains("bob on COLDEVE (coldeve) did not launch: Injector failed"));
        assert!(!line.contains('['));
    }
}
