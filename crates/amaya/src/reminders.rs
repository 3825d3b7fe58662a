//! Reminder jobs persisted to a JSON file.
//!
//! Jobs are only recorded here. Something else (cron, a desktop notifier)
//! is expected to read the file and fire them.

use amaya_tools::{HandlerResult, Recurrence, ReminderScheduler, ToolError};
use amaya_util::{IdPrefix, Identifier};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// One scheduled reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderJob {
    pub id: String,
    pub trigger: DateTime<Local>,
    pub prompt: String,
    pub recurrence: Recurrence,
    pub created: DateTime<Utc>,
}

/// Appends jobs to `reminders.json`.
pub struct JsonReminderScheduler {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonReminderScheduler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<data_local_dir>/amaya/reminders.json`.
    pub fn default_location() -> Option<Self> {
        amaya_util::path::data_dir().map(|dir| Self::new(dir.join("reminders.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All recorded jobs, oldest first.
    pub async fn jobs(&self) -> HandlerResult<Vec<ReminderJob>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ReminderScheduler for JsonReminderScheduler {
    async fn schedule(
        &self,
        trigger: DateTime<Local>,
        prompt: &str,
        recurrence: Recurrence,
    ) -> HandlerResult<String> {
        let _guard = self.lock.lock().await;

        let mut jobs = self.jobs().await.map_err(|e| {
            ToolError::execution_failed(format!(
                "Could not read {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let id = Identifier::ascending(IdPrefix::Reminder);
        jobs.push(ReminderJob {
            id: id.clone(),
            trigger,
            prompt: prompt.to_string(),
            recurrence,
            created: Utc::now(),
        });

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&jobs)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(id = %id, path = %self.path.display(), "Reminder recorded");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_schedule_appends_jobs() {
        let dir = TempDir::new().unwrap();
        let scheduler = JsonReminderScheduler::new(dir.path().join("nested/reminders.json"));
        let at = Local.with_ymd_and_hms(2030, 1, 2, 9, 30, 0).unwrap();

        let first = scheduler
            .schedule(at, "stand-up", Recurrence::Daily)
            .await
            .unwrap();
        let second = scheduler
            .schedule(at, "pay rent", Recurrence::Once)
            .await
            .unwrap();
        assert!(first.starts_with("rem_"));
        assert_ne!(first, second);

        let jobs = scheduler.jobs().await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].prompt, "stand-up");
        assert_eq!(jobs[0].recurrence, Recurrence::Daily);
        assert_eq!(jobs[1].trigger, at);
    }

    #[tokio::test]
    async fn test_missing_file_has_no_jobs() {
        let dir = TempDir::new().unwrap();
        let scheduler = JsonReminderScheduler::new(dir.path().join("reminders.json"));
        assert!(scheduler.jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_schedule() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reminders.json");
        std::fs::write(&path, "not json").unwrap();

        let scheduler = JsonReminderScheduler::new(&path);
        let err = scheduler
            .schedule(Local::now(), "x", Recurrence::Once)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }
}
