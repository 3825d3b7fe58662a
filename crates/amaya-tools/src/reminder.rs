//! Reminders.
//!
//! The tool only validates and hands the job to a [`ReminderScheduler`];
//! firing the reminder is the host's business.

use crate::{parse_args, Capability, HandlerResult, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Accepted datetime formats, all local time.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    Once,
    Daily,
    Weekly,
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Recurrence::Once => "once",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
        })
    }
}

/// Schedules reminder jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReminderScheduler: Send + Sync {
    /// Schedule a job and return its id.
    async fn schedule(
        &self,
        trigger: DateTime<Local>,
        prompt: &str,
        recurrence: Recurrence,
    ) -> HandlerResult<String>;
}

/// Parse a model-supplied local datetime.
pub fn parse_datetime(input: &str) -> HandlerResult<DateTime<Local>> {
    let input = input.trim();
    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .ok_or_else(|| {
            ToolError::validation(format!(
                "Invalid datetime '{}'. Use YYYY-MM-DDTHH:MM",
                input
            ))
        })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ToolError::validation(format!("'{}' does not exist in local time", input)))
}

pub struct CreateReminderTool {
    scheduler: Arc<dyn ReminderScheduler>,
}

impl CreateReminderTool {
    pub fn new(scheduler: Arc<dyn ReminderScheduler>) -> Self {
        Self { scheduler }
    }
}

#[derive(Debug, Deserialize)]
struct ReminderArgs {
    title: String,
    message: String,
    datetime: String,
    #[serde(default)]
    repeat: Option<Recurrence>,
}

#[async_trait]
impl Tool for CreateReminderTool {
    fn id(&self) -> &str {
        "create_reminder"
    }

    fn description(&self) -> &str {
        r#"Create a reminder that fires at a given local date and time.

- datetime uses the format YYYY-MM-DDTHH:MM and must be in the future
- repeat is once (default), daily or weekly"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["title", "message", "datetime"],
            "properties": {
                "title": { "type": "string", "minLength": 1 },
                "message": { "type": "string" },
                "datetime": {
                    "type": "string",
                    "description": "Local time, YYYY-MM-DDTHH:MM"
                },
                "repeat": {
                    "type": "string",
                    "enum": ["once", "daily", "weekly"]
                }
            }
        })
    }

    fn capability(&self) -> Capability {
        Capability::Scheduler
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> HandlerResult<ToolOutput> {
        let args: ReminderArgs = parse_args(args)?;
        let trigger = parse_datetime(&args.datetime)?;
        if trigger <= Local::now() {
            return Err(ToolError::validation(format!(
                "Reminder time {} is in the past",
                trigger.format("%Y-%m-%d %H:%M")
            )));
        }

        let recurrence = args.repeat.unwrap_or_default();
        let prompt = format!("{}: {}", args.title, args.message);
        let job_id = self
            .scheduler
            .schedule(trigger, &prompt, recurrence)
            .await?;
        info!(job_id = %job_id, recurrence = %recurrence, "Reminder scheduled");

        let when = trigger.format("%Y-%m-%d %H:%M").to_string();
        Ok(ToolOutput::new(
            format!("Reminder: {}", args.title),
            format!(
                "Reminder '{}' scheduled for {} ({}), job id {}",
                args.title, when, recurrence, job_id
            ),
        )
        .with_metadata(json!({ "job_id": job_id, "trigger": when, "repeat": recurrence })))
    }
}
