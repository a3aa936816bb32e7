//! Live meeting view: drives the countdown scheduler and maps keystrokes
//! onto its control operations.

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
};
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use gavel_core::{Phase, RunStatus, Scheduler, TaskSequence, TimerEvent};

use crate::voice::VoiceAnnouncer;

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Finished { total_elapsed_seconds: u32 },
    Stopped,
}

pub async fn run_meeting(agenda: TaskSequence, announcer: VoiceAnnouncer) -> Result<()> {
    let scheduler = Scheduler::new(announcer);
    let mut events = scheduler.start(&agenda)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = meeting_loop(&mut terminal, &scheduler, &agenda, &mut events);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    match res? {
        Outcome::Finished {
            total_elapsed_seconds,
        } => println!("Meeting finished in {}.", fmt_elapsed(total_elapsed_seconds)),
        Outcome::Stopped => println!("Meeting stopped."),
    }
    Ok(())
}

struct View {
    task_name: Option<String>,
    task_number: usize,
    banner: String,
}

fn meeting_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    scheduler: &Scheduler<VoiceAnnouncer>,
    agenda: &TaskSequence,
    events: &mut UnboundedReceiver<TimerEvent>,
) -> Result<Outcome> {
    let mut view = View {
        task_name: agenda.tasks().first().map(|t| t.name.clone()),
        task_number: 1,
        banner: format!(
            "{} tasks on the agenda, {} minutes planned",
            agenda.len(),
            agenda.total_minutes()
        ),
    };
    let mut finished: Option<Outcome> = None;

    loop {
        while let Ok(ev) = events.try_recv() {
            match ev {
                TimerEvent::Tick {
                    task_name,
                    task_number,
                    ..
                } => {
                    view.task_name = Some(task_name);
                    view.task_number = task_number;
                }
                TimerEvent::TaskComplete { task_name } => {
                    view.banner = format!("{task_name} is done");
                }
                TimerEvent::SequenceEnd {
                    total_elapsed_seconds,
                } => {
                    view.banner = "meeting complete".to_string();
                    finished = Some(Outcome::Finished {
                        total_elapsed_seconds,
                    });
                }
            }
        }

        let status = scheduler.status();
        terminal.draw(|f| draw(f, agenda, &view, &status))?;

        if let Some(outcome) = finished {
            return Ok(outcome);
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('p') => {
                        scheduler.pause();
                    }
                    KeyCode::Char('r') => {
                        scheduler.resume();
                    }
                    KeyCode::Char('k') => {
                        let _ = scheduler.skip_current();
                    }
                    KeyCode::Char('e') => {
                        let _ = scheduler.extend_current(5);
                    }
                    KeyCode::Char('1') => {
                        let _ = scheduler.extend_current(1);
                    }
                    KeyCode::Char('q') | KeyCode::Esc => {
                        scheduler.stop();
                        return Ok(Outcome::Stopped);
                    }
                    _ => {}
                }
            }
        }
    }
}

fn draw(f: &mut ratatui::Frame, agenda: &TaskSequence, view: &View, status: &RunStatus) {
    let size = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Min(4),
            Constraint::Length(3),
        ])
        .split(size);

    let (phase_label, clock_style) = match status.phase {
        Phase::Running => ("running", Style::default().fg(Color::Green)),
        Phase::Paused => ("paused", Style::default().fg(Color::Yellow)),
        Phase::Idle => ("idle", Style::default().fg(Color::DarkGray)),
    };

    let countdown = Paragraph::new(Text::from(vec![
        Line::from(Span::styled(
            view.task_name.clone().unwrap_or_default(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!(
                "{:02}:{:02}",
                status.remaining_seconds / 60,
                status.remaining_seconds % 60
            ),
            clock_style.add_modifier(Modifier::BOLD),
        )),
        Line::from(format!(
            "task {}/{} · elapsed {}",
            view.task_number,
            agenda.len(),
            fmt_elapsed(status.elapsed_seconds)
        )),
        Line::from(Span::styled(
            view.banner.clone(),
            Style::default().fg(Color::Cyan),
        )),
    ]))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" gavel — {phase_label} ")),
    );
    f.render_widget(countdown, chunks[0]);

    let current = view.task_number.saturating_sub(1);
    let rows: Vec<Line> = agenda
        .tasks()
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let text = format!("{:>2}. {} ({} min)", i + 1, t.name, t.minutes);
            if i == current {
                Line::from(Span::styled(
                    text,
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(text)
            }
        })
        .collect();
    let list = Paragraph::new(Text::from(rows))
        .block(Block::default().borders(Borders::ALL).title(" agenda "));
    f.render_widget(list, chunks[1]);

    let help = Paragraph::new("p pause · r resume · k skip · e +5 min · 1 +1 min · q stop")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(help, chunks[2]);
}

fn fmt_elapsed(seconds: u32) -> String {
    format!("{}m {:02}s", seconds / 60, seconds % 60)
}
