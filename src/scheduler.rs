//! Turns filtered buildings into a [`ScheduledRun`] and fires its events at
//! the right times, making sure only one run is ever live.
//!
//! Starting a new run flips the previous run's [`CancellationToken`] before
//! the new run is handed out, so nothing the old run still had pending can
//! fire afterwards. The token is checked right before every event fires;
//! an event that already fired stays fired.

use crate::filter::FilteredBuilding;
use crate::pose::Millis;
use crate::sonify::{SonificationEvent, SonificationParams};
use log::{debug, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// A shared flag saying a run has been superseded. Clones observe the same
/// flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the run as cancelled. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The events produced from one filtering pass, and the token that can
/// stop them.
#[derive(Debug, Clone)]
pub struct ScheduledRun {
    id: u64,
    events: Vec<SonificationEvent>,
    token: CancellationToken,
}

impl ScheduledRun {
    /// Sequence number of the run, starting at 1.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Events in firing order.
    pub fn events(&self) -> &[SonificationEvent] {
        &self.events
    }

    /// The run's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether a later run has superseded this one.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Offset of the last event, i.e. when the run has nothing left to fire.
    pub fn last_offset_ms(&self) -> Option<Millis> {
        self.events.last().map(|e| e.offset_ms)
    }
}

/// The external audio engine. Receives trigger instructions as they fire;
/// synthesizing the sound is entirely its business.
pub trait AudioSink {
    /// Plays `event`, which belongs to run `run_id`.
    fn trigger(&mut self, run_id: u64, event: &SonificationEvent);
}

/// Records every trigger, which is handy for tests and dry runs.
impl AudioSink for Vec<(u64, SonificationEvent)> {
    fn trigger(&mut self, run_id: u64, event: &SonificationEvent) {
        self.push((run_id, event.clone()));
    }
}

/// Owns the one live run and produces new ones.
#[derive(Debug, Default)]
pub struct SonificationScheduler {
    params: SonificationParams,
    live: Option<CancellationToken>,
    runs_started: u64,
}

impl SonificationScheduler {
    /// Instantiates a scheduler using `params` for every run.
    pub fn new(params: SonificationParams) -> Self {
        Self {
            params,
            live: None,
            runs_started: 0,
        }
    }

    /// The mapping parameters in use.
    pub fn params(&self) -> &SonificationParams {
        &self.params
    }

    /// Cancels whatever run is live, then builds a new live run from
    /// `filtered`.
    pub fn schedule(&mut self, filtered: &[FilteredBuilding]) -> ScheduledRun {
        self.cancel_live();

        self.runs_started += 1;
        let token = CancellationToken::new();
        self.live = Some(token.clone());

        let events = self.params.events_for(filtered);
        debug!(
            "run {} scheduled with {} events from {} buildings",
            self.runs_started,
            events.len(),
            filtered.len()
        );

        ScheduledRun {
            id: self.runs_started,
            events,
            token,
        }
    }

    /// Cancels the live run, if there is one.
    pub fn cancel_live(&mut self) {
        if let Some(previous) = self.live.take() {
            if !previous.is_cancelled() {
                debug!("superseding run {}", self.runs_started);
            }
            previous.cancel();
        }
    }
}

#[derive(Debug)]
struct RunCursor {
    run: ScheduledRun,
    started_at: Millis,
    next: usize,
}

/// A single cancellable timer that walks one run's events against a clock
/// the caller advances. Starting a run replaces whatever was loaded.
#[derive(Debug, Default)]
pub struct TimerDriver {
    cursor: Option<RunCursor>,
}

impl TimerDriver {
    /// A driver with nothing loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `run`, treating `now` as its start time. Any previously loaded
    /// run is dropped without firing its remaining events.
    pub fn start(&mut self, run: ScheduledRun, now: Millis) {
        if let Some(old) = self.cursor.take() {
            let left = old.run.events.len() - old.next;
            if left > 0 {
                debug!("dropping {} unfired events of run {}", left, old.run.id);
            }
        }
        self.cursor = Some(RunCursor {
            run,
            started_at: now,
            next: 0,
        });
    }

    /// Fires, in order, every event due at or before `now`. Returns how many
    /// fired. If the run turns out to be cancelled it is unloaded and nothing
    /// more fires from it.
    pub fn tick(&mut self, now: Millis, sink: &mut impl AudioSink) -> usize {
        let Some(cursor) = self.cursor.as_mut() else {
            return 0;
        };

        let mut fired = 0;
        while let Some(event) = cursor.run.events.get(cursor.next) {
            if cursor.started_at.saturating_add(event.offset_ms) > now {
                break;
            }
            if cursor.run.is_cancelled() {
                debug!("run {} cancelled, unloading", cursor.run.id);
                self.cursor = None;
                return fired;
            }
            sink.trigger(cursor.run.id, event);
            cursor.next += 1;
            fired += 1;
        }

        if cursor.next == cursor.run.events.len() {
            self.cursor = None;
        }
        fired
    }

    /// Absolute time of the next pending event.
    pub fn next_due(&self) -> Option<Millis> {
        self.cursor.as_ref().and_then(|c| {
            c.run
                .events
                .get(c.next)
                .map(|e| c.started_at.saturating_add(e.offset_ms))
        })
    }

    /// True when no run is loaded.
    pub fn is_idle(&self) -> bool {
        self.cursor.is_none()
    }

    /// Id of the loaded run.
    pub fn current_run(&self) -> Option<u64> {
        self.cursor.as_ref().map(|c| c.run.id)
    }

    /// Unloads the current run without firing anything else.
    pub fn stop(&mut self) {
        self.cursor = None;
    }
}

/// Plays `run` in real time on the calling thread, sleeping until each event
/// is due. Returns how many events fired before the run finished or was
/// cancelled.
pub fn play_blocking(run: ScheduledRun, sink: &mut impl AudioSink) -> usize {
    let started = Instant::now();
    let mut driver = TimerDriver::new();
    driver.start(run, 0);

    let mut fired = 0;
    while let Some(due) = driver.next_due() {
        let elapsed = started.elapsed();
        let due = Duration::from_millis(due);
        if due > elapsed {
            spin_sleep::sleep(due - elapsed);
        }
        fired += driver.tick(started.elapsed().as_millis() as Millis, sink);
        if driver.is_idle() {
            break;
        }
    }
    fired
}

/// Plays `run` on its own thread. The sink is handed back when the run ends
/// so the caller can inspect it.
pub fn spawn_playback<S>(run: ScheduledRun, mut sink: S) -> JoinHandle<S>
where
    S: AudioSink + Send + 'static,
{
    thread::spawn(move || {
        let id = run.id();
        let expected = run.events().len();
        let fired = play_blocking(run, &mut sink);
        if fired == 0 && expected > 0 {
            warn!("run {} finished without firing anything", id);
        }
        sink
    })
}
