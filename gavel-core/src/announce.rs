//! Narration hooks for sequence milestones.
//!
//! Announcers are best-effort collaborators: the scheduler logs a failed
//! call and keeps counting, so a broken narration engine never affects
//! timing bookkeeping.

use anyhow::Result;

pub trait Announce: Send + Sync {
    fn sequence_start(&self, task_count: usize, total_minutes: u32) -> Result<()>;

    /// `up_next` is absent when the finished task was the last one.
    fn task_complete(&self, finished: &str, up_next: Option<&str>) -> Result<()>;

    fn sequence_end(&self) -> Result<()>;
}

/// No-op announcer for headless runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentAnnouncer;

impl Announce for SilentAnnouncer {
    fn sequence_start(&self, _task_count: usize, _total_minutes: u32) -> Result<()> {
        Ok(())
    }

    fn task_complete(&self, _finished: &str, _up_next: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn sequence_end(&self) -> Result<()> {
        Ok(())
    }
}
