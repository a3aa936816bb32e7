//! Meeting narration through an external text-to-speech command.

use anyhow::{Context, Result};
use gavel_core::Announce;
use std::process::{Command, Stdio};
use tracing::debug;

use crate::config::VoiceSection;

/// Speaks milestone lines by spawning the configured TTS command, detached.
/// Best-effort by design: a missing or failing engine surfaces as an `Err`
/// that the scheduler logs and ignores, so narration can never hold up the
/// countdown.
pub struct VoiceAnnouncer {
    command: Option<(String, Vec<String>)>,
}

impl VoiceAnnouncer {
    pub fn from_config(voice: &VoiceSection, muted: bool) -> Self {
        let command =
            (voice.enabled && !muted).then(|| (voice.command.clone(), voice.args.clone()));
        Self { command }
    }

    fn narrate(&self, text: &str) -> Result<()> {
        debug!("narration: {text}");
        let Some((command, args)) = &self.command else {
            return Ok(());
        };

        let mut child = Command::new(command)
            .args(args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning {command}"))?;

        // Reap off to the side; narration must not block the caller.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

impl Announce for VoiceAnnouncer {
    fn sequence_start(&self, task_count: usize, total_minutes: u32) -> Result<()> {
        self.narrate(&format!(
            "Meeting started. {task_count} tasks on the agenda, {total_minutes} minutes planned."
        ))
    }

    fn task_complete(&self, finished: &str, up_next: Option<&str>) -> Result<()> {
        match up_next {
            Some(next) => self.narrate(&format!("Time is up for {finished}. Up next: {next}.")),
            None => self.narrate(&format!("Time is up for {finished}.")),
        }
    }

    fn sequence_end(&self) -> Result<()> {
        self.narrate("The meeting has ended. Good work, everyone.")
    }
}
