//! Sequential countdown scheduler.
//!
//! Drives one background countdown at a time over a snapshot of the agenda
//! and exposes a small set of control operations that are safe to call
//! while the loop runs. The run state is the only shared-mutable resource;
//! it lives behind a single mutex and is never held across an await.
//! Progress notifications go out over one unbounded channel, so a slow
//! consumer cannot stall a tick.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::announce::Announce;
use crate::sequence::TaskSequence;
use crate::task::Task;

const TICK: Duration = Duration::from_secs(1);

/// Latency bound for observing resume/stop while paused.
const PAUSE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("the agenda has no tasks")]
    EmptyAgenda,
    #[error("a countdown is already active")]
    AlreadyActive,
    #[error("no countdown is active")]
    NotActive,
    #[error("cannot extend the current task while paused")]
    ExtendWhilePaused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Paused,
}

/// Consistent point-in-time view of an active (or idle) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatus {
    pub phase: Phase,
    pub current_index: usize,
    pub remaining_seconds: u32,
    pub elapsed_seconds: u32,
}

/// Progress notifications, delivered strictly in order: every tick of a
/// task precedes its `TaskComplete`, which precedes the next task's first
/// tick; `SequenceEnd` fires once, last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Tick {
        task_name: String,
        minutes: u32,
        seconds: u32,
        /// 1-based position of the active task in the run snapshot.
        task_number: usize,
    },
    TaskComplete {
        task_name: String,
    },
    SequenceEnd {
        total_elapsed_seconds: u32,
    },
}

#[derive(Debug, Default)]
struct RunState {
    /// Bumped on every `start` so a stale loop from a prior run exits
    /// silently instead of touching the new run's state.
    generation: u64,
    is_running: bool,
    is_paused: bool,
    current_index: usize,
    remaining_seconds: u32,
    elapsed_seconds: u32,
}

impl RunState {
    fn reset(&mut self) {
        self.is_running = false;
        self.is_paused = false;
        self.current_index = 0;
        self.remaining_seconds = 0;
        self.elapsed_seconds = 0;
    }
}

pub struct Scheduler<A: Announce> {
    announcer: Arc<A>,
    run: Arc<Mutex<RunState>>,
}

impl<A: Announce + 'static> Scheduler<A> {
    pub fn new(announcer: A) -> Self {
        Self {
            announcer: Arc::new(announcer),
            run: Arc::new(Mutex::new(RunState::default())),
        }
    }

    /// Snapshot the agenda and launch the countdown loop, returning the
    /// event stream. Returns without waiting for the run to make progress.
    ///
    /// Fails when the agenda is empty or a run is already active; those are
    /// the only validation failures in the scheduler.
    pub fn start(
        &self,
        agenda: &TaskSequence,
    ) -> Result<UnboundedReceiver<TimerEvent>, SchedulerError> {
        let plan = agenda.snapshot();
        if plan.is_empty() {
            return Err(SchedulerError::EmptyAgenda);
        }

        let generation = {
            let mut run = lock(&self.run);
            if run.is_running {
                return Err(SchedulerError::AlreadyActive);
            }
            run.generation += 1;
            run.is_running = true;
            run.is_paused = false;
            run.current_index = 0;
            run.elapsed_seconds = 0;
            run.remaining_seconds = plan[0].duration_seconds();
            run.generation
        };

        debug!(generation, tasks = plan.len(), "countdown started");
        let (events, rx) = mpsc::unbounded_channel();
        tokio::spawn(
            CountdownLoop {
                plan,
                generation,
                run: Arc::clone(&self.run),
                announcer: Arc::clone(&self.announcer),
                events,
            }
            .run(),
        );
        Ok(rx)
    }

    /// Freeze the countdown. `false` when there is nothing running to pause
    /// (benign, e.g. a double keypress).
    pub fn pause(&self) -> bool {
        let mut run = lock(&self.run);
        if run.is_running && !run.is_paused {
            run.is_paused = true;
            true
        } else {
            false
        }
    }

    /// Undo a pause. `false` when the run is not paused.
    pub fn resume(&self) -> bool {
        let mut run = lock(&self.run);
        if run.is_running && run.is_paused {
            run.is_paused = false;
            true
        } else {
            false
        }
    }

    /// Abort the run. Idempotent; `false` when nothing was active. The loop
    /// observes the cleared flag and exits within one interval, emitting no
    /// completion or end event for the interrupted task.
    pub fn stop(&self) -> bool {
        let mut run = lock(&self.run);
        let was_active = run.is_running;
        run.is_running = false;
        run.is_paused = false;
        was_active
    }

    /// Drop the rest of the current task and move on. No completion event
    /// is emitted for the skipped task; skipping the last one ends the
    /// sequence. Also clears a pause.
    pub fn skip_current(&self) -> Result<(), SchedulerError> {
        let mut run = lock(&self.run);
        if !run.is_running {
            return Err(SchedulerError::NotActive);
        }
        run.current_index += 1;
        run.is_paused = false;
        Ok(())
    }

    /// Grant the current task more time. Rejected while paused: remaining
    /// time is frozen then, and "current remaining" would be ambiguous.
    pub fn extend_current(&self, extra_minutes: u32) -> Result<(), SchedulerError> {
        let mut run = lock(&self.run);
        if !run.is_running {
            return Err(SchedulerError::NotActive);
        }
        if run.is_paused {
            return Err(SchedulerError::ExtendWhilePaused);
        }
        run.remaining_seconds += extra_minutes * 60;
        Ok(())
    }

    pub fn status(&self) -> RunStatus {
        let run = lock(&self.run);
        let phase = if !run.is_running {
            Phase::Idle
        } else if run.is_paused {
            Phase::Paused
        } else {
            Phase::Running
        };
        RunStatus {
            phase,
            current_index: run.current_index,
            remaining_seconds: run.remaining_seconds,
            elapsed_seconds: run.elapsed_seconds,
        }
    }
}

fn lock(run: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    run.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What the loop decided to do after inspecting the run state.
enum Step {
    Halt,
    Reloaded,
    Wait(Duration),
    Count,
    Finish { elapsed: u32 },
}

/// What happened to the second that just elapsed.
enum Counted {
    Halt,
    Skipped,
    Ticked { remaining: u32 },
    TaskDone { up_next: Option<String> },
}

struct CountdownLoop<A: Announce> {
    plan: Vec<Task>,
    generation: u64,
    run: Arc<Mutex<RunState>>,
    announcer: Arc<A>,
    events: UnboundedSender<TimerEvent>,
}

impl<A: Announce> CountdownLoop<A> {
    async fn run(self) {
        let total_minutes: u32 = self.plan.iter().map(|t| t.minutes).sum();
        self.narrate(
            "sequence start",
            self.announcer.sequence_start(self.plan.len(), total_minutes),
        );

        // Index this loop last loaded a duration for. `start` already
        // loaded task 0.
        let mut loaded_index = 0usize;

        loop {
            let step = {
                let mut run = lock(&self.run);
                if run.generation != self.generation {
                    Step::Halt
                } else if !run.is_running {
                    run.reset();
                    Step::Halt
                } else if run.current_index >= self.plan.len() {
                    let elapsed = run.elapsed_seconds;
                    run.reset();
                    Step::Finish { elapsed }
                } else if run.current_index != loaded_index {
                    // A skip or a completion moved the cursor.
                    loaded_index = run.current_index;
                    run.remaining_seconds = self.plan[loaded_index].duration_seconds();
                    Step::Reloaded
                } else if run.is_paused {
                    Step::Wait(PAUSE_POLL)
                } else {
                    Step::Count
                }
            };

            match step {
                Step::Halt => return,
                Step::Reloaded => continue,
                Step::Wait(interval) => tokio::time::sleep(interval).await,
                Step::Finish { elapsed } => {
                    self.narrate("sequence end", self.announcer.sequence_end());
                    let _ = self.events.send(TimerEvent::SequenceEnd {
                        total_elapsed_seconds: elapsed,
                    });
                    debug!(generation = self.generation, elapsed, "countdown finished");
                    return;
                }
                Step::Count => self.count_one_second(loaded_index).await,
            }
        }
    }

    /// Sleep one tick, then account for the elapsed second. The decision
    /// and the bookkeeping share one critical section so a concurrent skip
    /// or stop cannot tear the update.
    async fn count_one_second(&self, loaded_index: usize) {
        tokio::time::sleep(TICK).await;

        let counted = {
            let mut run = lock(&self.run);
            if run.generation != self.generation || !run.is_running {
                Counted::Halt
            } else if run.current_index != loaded_index {
                // Skipped mid-sleep; the in-flight second is not charged.
                Counted::Skipped
            } else {
                run.remaining_seconds -= 1;
                run.elapsed_seconds += 1;
                if run.remaining_seconds == 0 {
                    // Advance here, under the same lock that observed zero,
                    // so a concurrent skip cannot double-step the cursor.
                    run.current_index += 1;
                    Counted::TaskDone {
                        up_next: self
                            .plan
                            .get(loaded_index + 1)
                            .map(|t| t.name.clone()),
                    }
                } else {
                    Counted::Ticked {
                        remaining: run.remaining_seconds,
                    }
                }
            }
        };

        let task = &self.plan[loaded_index];
        match counted {
            Counted::Halt | Counted::Skipped => {}
            Counted::Ticked { remaining } => self.send_tick(task, remaining, loaded_index),
            Counted::TaskDone { up_next } => {
                self.send_tick(task, 0, loaded_index);
                self.narrate(
                    "task completion",
                    self.announcer
                        .task_complete(&task.name, up_next.as_deref()),
                );
                let _ = self.events.send(TimerEvent::TaskComplete {
                    task_name: task.name.clone(),
                });
            }
        }
    }

    fn send_tick(&self, task: &Task, remaining: u32, index: usize) {
        let _ = self.events.send(TimerEvent::Tick {
            task_name: task.name.clone(),
            minutes: remaining / 60,
            seconds: remaining % 60,
            task_number: index + 1,
        });
    }

    fn narrate(&self, what: &str, outcome: anyhow::Result<()>) {
        if let Err(err) = outcome {
            warn!("announcer failed on {what}: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::SilentAnnouncer;
    use anyhow::anyhow;

    #[derive(Clone, Default)]
    struct RecordingAnnouncer {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Announce for RecordingAnnouncer {
        fn sequence_start(&self, task_count: usize, total_minutes: u32) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("start {task_count} {total_minutes}"));
            Ok(())
        }

        fn task_complete(&self, finished: &str, up_next: Option<&str>) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!(
                "complete {finished} -> {}",
                up_next.unwrap_or("(none)")
            ));
            Ok(())
        }

        fn sequence_end(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("end".to_string());
            Ok(())
        }
    }

    struct FailingAnnouncer;

    impl Announce for FailingAnnouncer {
        fn sequence_start(&self, _: usize, _: u32) -> anyhow::Result<()> {
            Err(anyhow!("speech engine missing"))
        }

        fn task_complete(&self, _: &str, _: Option<&str>) -> anyhow::Result<()> {
            Err(anyhow!("speech engine missing"))
        }

        fn sequence_end(&self) -> anyhow::Result<()> {
            Err(anyhow!("speech engine missing"))
        }
    }

    fn agenda(tasks: &[(&str, u32)]) -> TaskSequence {
        TaskSequence::from_tasks(
            tasks
                .iter()
                .map(|(name, minutes)| Task::new(*name, *minutes).unwrap())
                .collect(),
        )
    }

    /// Receive events until (and including) `SequenceEnd`.
    async fn drain(rx: &mut UnboundedReceiver<TimerEvent>) -> Vec<TimerEvent> {
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            let end = matches!(ev, TimerEvent::SequenceEnd { .. });
            out.push(ev);
            if end {
                break;
            }
        }
        out
    }

    async fn recv_tick(rx: &mut UnboundedReceiver<TimerEvent>) -> (String, u32, u32, usize) {
        match rx.recv().await.expect("event stream ended early") {
            TimerEvent::Tick {
                task_name,
                minutes,
                seconds,
                task_number,
            } => (task_name, minutes, seconds, task_number),
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_on_empty_agenda_fails_without_events() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        assert_eq!(
            scheduler.start(&TaskSequence::new()).err(),
            Some(SchedulerError::EmptyAgenda)
        );
        assert_eq!(scheduler.status().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn controls_are_benign_noops_when_idle() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        assert!(!scheduler.pause());
        assert!(!scheduler.resume());
        assert!(!scheduler.stop());
        assert_eq!(scheduler.skip_current(), Err(SchedulerError::NotActive));
        assert_eq!(scheduler.extend_current(5), Err(SchedulerError::NotActive));
    }

    #[tokio::test(start_paused = true)]
    async fn full_run_matches_the_expected_trace() {
        let announcer = RecordingAnnouncer::default();
        let log = Arc::clone(&announcer.log);
        let scheduler = Scheduler::new(announcer);

        let mut rx = scheduler.start(&agenda(&[("Standup", 1), ("Review", 2)])).unwrap();
        let events = drain(&mut rx).await;

        // 60 + 120 ticks, two completions, one end.
        assert_eq!(events.len(), 183);

        assert_eq!(
            events[0],
            TimerEvent::Tick {
                task_name: "Standup".to_string(),
                minutes: 0,
                seconds: 59,
                task_number: 1,
            }
        );
        assert_eq!(
            events[59],
            TimerEvent::Tick {
                task_name: "Standup".to_string(),
                minutes: 0,
                seconds: 0,
                task_number: 1,
            }
        );
        assert_eq!(
            events[60],
            TimerEvent::TaskComplete {
                task_name: "Standup".to_string()
            }
        );
        assert_eq!(
            events[61],
            TimerEvent::Tick {
                task_name: "Review".to_string(),
                minutes: 1,
                seconds: 59,
                task_number: 2,
            }
        );
        assert_eq!(
            events[181],
            TimerEvent::TaskComplete {
                task_name: "Review".to_string()
            }
        );
        assert_eq!(
            events[182],
            TimerEvent::SequenceEnd {
                total_elapsed_seconds: 180
            }
        );

        // Task numbers never move backwards across the run.
        let numbers: Vec<usize> = events
            .iter()
            .filter_map(|ev| match ev {
                TimerEvent::Tick { task_number, .. } => Some(*task_number),
                _ => None,
            })
            .collect();
        assert!(numbers.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "start 2 3".to_string(),
                "complete Standup -> Review".to_string(),
                "complete Review -> (none)".to_string(),
                "end".to_string(),
            ]
        );
        assert_eq!(scheduler.status().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_active_is_rejected() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        let _rx = scheduler.start(&agenda(&[("a", 5)])).unwrap();
        assert_eq!(
            scheduler.start(&agenda(&[("b", 5)])).err(),
            Some(SchedulerError::AlreadyActive)
        );
        assert!(scheduler.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_remaining_and_resume_continues() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        let mut rx = scheduler.start(&agenda(&[("Design", 2)])).unwrap();

        for _ in 0..5 {
            recv_tick(&mut rx).await;
        }
        assert!(scheduler.pause());

        // The second already in flight when the pause lands still counts;
        // after that the clock is frozen.
        tokio::time::sleep(Duration::from_secs(10)).await;
        let (_, minutes, seconds, _) = match rx.try_recv() {
            Ok(TimerEvent::Tick {
                task_name,
                minutes,
                seconds,
                task_number,
            }) => (task_name, minutes, seconds, task_number),
            other => panic!("expected one in-flight tick, got {other:?}"),
        };
        assert_eq!((minutes, seconds), (1, 54));
        assert!(rx.try_recv().is_err());

        let frozen = scheduler.status();
        assert_eq!(frozen.phase, Phase::Paused);
        assert_eq!(frozen.remaining_seconds, 114);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.status().remaining_seconds, 114);

        assert!(scheduler.resume());
        let (_, minutes, seconds, _) = recv_tick(&mut rx).await;
        assert_eq!((minutes, seconds), (1, 53));

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn extend_adds_exact_minutes_to_the_next_tick() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        let mut rx = scheduler.start(&agenda(&[("Demo", 1)])).unwrap();

        let (_, minutes, seconds, _) = recv_tick(&mut rx).await;
        assert_eq!((minutes, seconds), (0, 59));

        scheduler.extend_current(1).unwrap();
        let (_, minutes, seconds, _) = recv_tick(&mut rx).await;
        assert_eq!((minutes, seconds), (1, 58));

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn extend_is_rejected_while_paused() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        let mut rx = scheduler.start(&agenda(&[("Demo", 2)])).unwrap();

        recv_tick(&mut rx).await;
        assert!(scheduler.pause());
        assert_eq!(
            scheduler.extend_current(5),
            Err(SchedulerError::ExtendWhilePaused)
        );

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn skip_advances_without_a_completion_event() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        let mut rx = scheduler
            .start(&agenda(&[("First", 1), ("Second", 1)]))
            .unwrap();

        for _ in 0..3 {
            recv_tick(&mut rx).await;
        }
        scheduler.skip_current().unwrap();

        // Straight to the next task's countdown, no TaskComplete between.
        let (name, minutes, seconds, number) = recv_tick(&mut rx).await;
        assert_eq!(name, "Second");
        assert_eq!((minutes, seconds), (0, 59));
        assert_eq!(number, 2);
        assert_eq!(scheduler.status().current_index, 1);

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn skip_on_the_last_task_ends_the_sequence() {
        let announcer = RecordingAnnouncer::default();
        let log = Arc::clone(&announcer.log);
        let scheduler = Scheduler::new(announcer);
        let mut rx = scheduler.start(&agenda(&[("Only", 5)])).unwrap();

        for _ in 0..2 {
            recv_tick(&mut rx).await;
        }
        scheduler.skip_current().unwrap();

        assert_eq!(
            rx.recv().await,
            Some(TimerEvent::SequenceEnd {
                total_elapsed_seconds: 2
            })
        );
        assert_eq!(rx.recv().await, None);

        // The skipped task never announces a completion.
        let log = log.lock().unwrap();
        assert!(log.iter().all(|line| !line.starts_with("complete")));
        assert_eq!(log.last().map(String::as_str), Some("end"));
        assert_eq!(scheduler.status().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_also_clears_a_pause() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        let mut rx = scheduler
            .start(&agenda(&[("First", 1), ("Second", 1)]))
            .unwrap();

        recv_tick(&mut rx).await;
        assert!(scheduler.pause());
        scheduler.skip_current().unwrap();

        let (name, _, _, number) = recv_tick(&mut rx).await;
        assert_eq!(name, "Second");
        assert_eq!(number, 2);
        assert_eq!(scheduler.status().phase, Phase::Running);

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_without_completion_or_end_events() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        let mut rx = scheduler.start(&agenda(&[("Only", 1)])).unwrap();

        for _ in 0..2 {
            recv_tick(&mut rx).await;
        }
        assert!(scheduler.stop());

        // The loop exits without emitting anything further; the stream
        // simply closes.
        assert_eq!(rx.recv().await, None);
        assert_eq!(scheduler.status().phase, Phase::Idle);
        assert!(!scheduler.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn agenda_edits_after_start_do_not_affect_the_run() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        let mut seq = agenda(&[("Planned", 1)]);
        let mut rx = scheduler.start(&seq).unwrap();

        seq.clear();
        seq.push(Task::new("Added later", 30).unwrap());

        let events = drain(&mut rx).await;
        assert_eq!(events.len(), 62);
        assert!(events.iter().all(|ev| match ev {
            TimerEvent::Tick { task_name, .. } => task_name == "Planned",
            _ => true,
        }));
        assert_eq!(
            events.last(),
            Some(&TimerEvent::SequenceEnd {
                total_elapsed_seconds: 60
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn announcer_failures_do_not_stall_the_countdown() {
        let scheduler = Scheduler::new(FailingAnnouncer);
        let mut rx = scheduler.start(&agenda(&[("Only", 1)])).unwrap();

        let events = drain(&mut rx).await;
        assert_eq!(events.len(), 62);
        assert_eq!(
            events[60],
            TimerEvent::TaskComplete {
                task_name: "Only".to_string()
            }
        );
        assert_eq!(
            events[61],
            TimerEvent::SequenceEnd {
                total_elapsed_seconds: 60
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn status_tracks_the_phase_transitions() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        assert_eq!(scheduler.status().phase, Phase::Idle);

        let mut rx = scheduler.start(&agenda(&[("Only", 1)])).unwrap();
        assert_eq!(scheduler.status().phase, Phase::Running);
        assert_eq!(scheduler.status().current_index, 0);
        assert_eq!(scheduler.status().remaining_seconds, 60);

        recv_tick(&mut rx).await;
        assert!(scheduler.pause());
        assert_eq!(scheduler.status().phase, Phase::Paused);
        assert!(scheduler.resume());
        assert_eq!(scheduler.status().phase, Phase::Running);

        scheduler.stop();
        assert_eq!(scheduler.status().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_run_can_start_after_a_stop() {
        let scheduler = Scheduler::new(SilentAnnouncer);
        let mut rx = scheduler.start(&agenda(&[("First run", 1)])).unwrap();
        recv_tick(&mut rx).await;
        scheduler.stop();
        assert_eq!(rx.recv().await, None);

        let mut rx = scheduler.start(&agenda(&[("Second run", 1)])).unwrap();
        let (name, _, _, _) = recv_tick(&mut rx).await;
        assert_eq!(name, "Second run");
        scheduler.stop();
    }
}
