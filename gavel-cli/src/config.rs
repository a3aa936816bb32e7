use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::store::ensure_gavel_home;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub voice: VoiceSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSection {
    /// Narrate meeting milestones through the external TTS command.
    pub enabled: bool,

    /// Command to run; the narration text is appended as the last argument.
    /// `say` works out of the box on macOS; `espeak` is the usual choice
    /// on Linux.
    pub command: String,

    pub args: Vec<String>,
}

impl Default for VoiceSection {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "say".to_string(),
            args: Vec::new(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_gavel_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    Ok(toml::from_str(&s).context("parse config.toml")?)
}
