use anyhow::{Context, Result};
use gavel_core::Task;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub fn gavel_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".gavel"))
}

pub fn ensure_gavel_home() -> Result<PathBuf> {
    let dir = gavel_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// On-disk agenda. Only the task list matters; the timestamp is for the
/// curious reader of the file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Agenda {
    pub saved_at_utc: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

pub fn agenda_path() -> Result<PathBuf> {
    Ok(ensure_gavel_home()?.join("agenda.json"))
}

pub fn load_tasks() -> Result<Vec<Task>> {
    let p = agenda_path()?;
    if !p.exists() {
        return Ok(Vec::new());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    let agenda: Agenda =
        serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))?;
    Ok(agenda.tasks)
}

pub fn save_tasks(tasks: &[Task]) -> Result<()> {
    let p = agenda_path()?;
    let agenda = Agenda {
        saved_at_utc: Some(chrono::Utc::now().to_rfc3339()),
        tasks: tasks.to_vec(),
    };
    let json = serde_json::to_string_pretty(&agenda)?;
    fs::write(&p, json).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}
