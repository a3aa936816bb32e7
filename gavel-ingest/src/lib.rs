//! gavel-ingest: CSV agenda exchange for gavel.

pub mod agenda;

pub use agenda::{
    AgendaImport, SkippedRow, read_agenda, read_agenda_csv, write_agenda, write_agenda_csv,
};
