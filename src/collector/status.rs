//! Per-task run status for health reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Outcome history of one background task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub runs: u64,
    pub failures: u64,
}

impl TaskStatus {
    /// Healthy until the most recent run failed
    pub fn is_healthy(&self) -> bool {
        match (self.last_success, self.last_run) {
            (_, None) => true,
            (Some(success), Some(run)) => success >= run,
            (None, Some(_)) => false,
        }
    }
}

/// Shared status of all collector tasks
#[derive(Debug, Default)]
pub struct StatusBoard {
    tasks: RwLock<BTreeMap<String, TaskStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_success(&self, task: &str) {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;
        let status = tasks.entry(task.to_string()).or_default();
        status.last_run = Some(now);
        status.last_success = Some(now);
        status.last_error = None;
        status.runs += 1;
    }

    pub async fn record_failure(&self, task: &str, error: impl ToString) {
        let mut tasks = self.tasks.write().await;
        let status = tasks.entry(task.to_string()).or_default();
        status.last_run = Some(Utc::now());
        status.last_error = Some(error.to_string());
        status.runs += 1;
        status.failures += 1;
    }

    pub async fn get(&self, task: &str) -> Option<TaskStatus> {
        self.tasks.read().await.get(task).cloned()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, TaskStatus> {
        self.tasks.read().await.clone()
    }

    pub async fn all_healthy(&self) -> bool {
        self.tasks.read().await.values().all(TaskStatus::is_healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_then_failure() {
        let board = StatusBoard::new();
        assert!(board.all_healthy().await);

        board.record_success("prices").await;
        let status = board.get("prices").await.unwrap();
        assert_eq!(status.runs, 1);
        assert!(status.is_healthy());

        board.record_failure("prices", "Tibber API unavailable").await;
        let status = board.get("prices").await.unwrap();
        assert_eq!(status.runs, 2);
        assert_eq!(status.failures, 1);
        assert_eq!(status.last_error.as_deref(), Some("Tibber API unavailable"));
        assert!(!board.all_healthy().await);

        board.record_success("prices").await;
        assert!(board.all_healthy().await);
        assert!(board.get("prices").await.unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted() {
        let board = StatusBoard::new();
        board.record_success("retention").await;
        board.record_success("energy").await;
        let names: Vec<String> = board.snapshot().await.into_keys().collect();
        assert_eq!(names, vec!["energy", "retention"]);
    }
}
