//! Agenda task model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task name must not be empty")]
    EmptyName,
    #[error("task duration must be at least one minute")]
    ZeroMinutes,
}

/// A named unit of work with a fixed duration in minutes.
///
/// Note: values are immutable once built; editing an agenda entry replaces
/// the task at its position rather than mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub minutes: u32,
}

impl Task {
    /// Build a validated task. The name is trimmed before the empty check.
    pub fn new(name: impl Into<String>, minutes: u32) -> Result<Self, TaskError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(TaskError::EmptyName);
        }
        if minutes == 0 {
            return Err(TaskError::ZeroMinutes);
        }
        Ok(Self { name, minutes })
    }

    pub fn duration_seconds(&self) -> u32 {
        self.minutes * 60
    }
}
