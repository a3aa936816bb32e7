//! Two-column CSV agenda exchange.
//!
//! Expected shape:
//!   name,minutes
//!   Standup,15
//!   Sprint review,45
//!
//! The two required columns may appear in any order and any case; extra
//! columns are ignored. Rows with an empty name or a duration that is not
//! a positive integer are skipped, not fatal, and reported back with the
//! offending line number.

use anyhow::{Context, Result, bail};
use std::io::{Read, Write};
use std::path::Path;

use gavel_core::Task;

/// A row the import rejected, with a caller-facing reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based line in the source file, counting the header as line 1.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgendaImport {
    pub tasks: Vec<Task>,
    pub skipped: Vec<SkippedRow>,
}

pub fn read_agenda_csv(path: impl AsRef<Path>) -> Result<AgendaImport> {
    let file = std::fs::File::open(path.as_ref())
        .with_context(|| format!("opening {}", path.as_ref().display()))?;
    read_agenda(file)
}

/// Parse an agenda CSV, returning the valid tasks plus every skipped row.
pub fn read_agenda(reader: impl Read) -> Result<AgendaImport> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = rdr.headers().context("reading CSV header")?;
    let name_col = find_column(headers, "name")?;
    let minutes_col = find_column(headers, "minutes")?;

    let mut import = AgendaImport::default();
    for (i, result) in rdr.records().enumerate() {
        let line = i + 2; // data rows start after the header
        let record = result.with_context(|| format!("reading CSV line {line}"))?;

        let name = record.get(name_col).unwrap_or("").trim();
        let raw_minutes = record.get(minutes_col).unwrap_or("").trim();

        if name.is_empty() {
            import.skipped.push(SkippedRow {
                line,
                reason: "task name is empty".to_string(),
            });
            continue;
        }

        let Ok(minutes) = raw_minutes.parse::<u32>() else {
            import.skipped.push(SkippedRow {
                line,
                reason: format!("duration '{raw_minutes}' is not a positive integer"),
            });
            continue;
        };

        match Task::new(name, minutes) {
            Ok(task) => import.tasks.push(task),
            Err(err) => import.skipped.push(SkippedRow {
                line,
                reason: err.to_string(),
            }),
        }
    }

    Ok(import)
}

pub fn write_agenda_csv(path: impl AsRef<Path>, tasks: &[Task]) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    write_agenda(file, tasks)
}

/// Write the agenda in the same two-column shape the importer reads.
pub fn write_agenda(writer: impl Write, tasks: &[Task]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["name", "minutes"])
        .context("writing CSV header")?;
    for task in tasks {
        wtr.write_record([task.name.as_str(), &task.minutes.to_string()])
            .with_context(|| format!("writing task '{}'", task.name))?;
    }
    wtr.flush().context("flushing CSV output")?;
    Ok(())
}

fn find_column(headers: &csv::StringRecord, wanted: &str) -> Result<usize> {
    match headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(wanted))
    {
        Some(idx) => Ok(idx),
        None => bail!("CSV is missing the required column '{wanted}' (expected 'name' and 'minutes')"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_valid_rows_in_order() {
        let csv = "name,minutes\nStandup,15\nSprint review,45\n";
        let import = read_agenda(csv.as_bytes()).unwrap();

        assert!(import.skipped.is_empty());
        assert_eq!(import.tasks.len(), 2);
        assert_eq!(import.tasks[0].name, "Standup");
        assert_eq!(import.tasks[0].minutes, 15);
        assert_eq!(import.tasks[1].name, "Sprint review");
    }

    #[test]
    fn accepts_reordered_headers_and_extra_columns() {
        let csv = "owner,minutes,name\nalice,10,Standup\n";
        let import = read_agenda(csv.as_bytes()).unwrap();

        assert_eq!(import.tasks.len(), 1);
        assert_eq!(import.tasks[0].name, "Standup");
        assert_eq!(import.tasks[0].minutes, 10);
    }

    #[test]
    fn skips_bad_rows_with_line_numbers() {
        let csv = "name,minutes\n,15\nPlanning,abc\nRetro,-5\nDemo,0\nStandup,15\n";
        let import = read_agenda(csv.as_bytes()).unwrap();

        assert_eq!(import.tasks.len(), 1);
        assert_eq!(import.tasks[0].name, "Standup");

        let lines: Vec<usize> = import.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 5]);
        assert_eq!(import.skipped[0].reason, "task name is empty");
        assert!(import.skipped[1].reason.contains("'abc'"));
        assert!(import.skipped[2].reason.contains("'-5'"));
        assert_eq!(
            import.skipped[3].reason,
            "task duration must be at least one minute"
        );
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let csv = "title,minutes\nStandup,15\n";
        let err = read_agenda(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn written_agenda_reads_back() {
        let tasks = vec![
            Task::new("Standup", 15).unwrap(),
            Task::new("Sprint review", 45).unwrap(),
        ];

        let mut buf = Vec::new();
        write_agenda(&mut buf, &tasks).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("name,minutes\n"));

        let import = read_agenda(buf.as_slice()).unwrap();
        assert_eq!(import.tasks, tasks);
        assert!(import.skipped.is_empty());
    }
}
