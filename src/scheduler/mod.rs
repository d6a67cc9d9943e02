//! Recurring execution of pipeline runs.
//!
//! A [`Scheduler`] holds daily and weekly entries and polls them from a
//! single background task. When an entry comes due the job is spawned as
//! its own task; a trigger that arrives while that task is still running
//! is skipped.

use crate::error::ScheduleError;
use chrono::{Datelike, Local, NaiveDateTime, Timelike, Weekday};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Default time between two evaluations of the schedule.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// The work a trigger starts.
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// When an entry fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Daily { hour: u32, minute: u32 },
    Weekly { weekday: Weekday, hour: u32, minute: u32 },
}

impl Timing {
    fn matches(&self, now: &NaiveDateTime) -> bool {
        match *self {
            Timing::Daily { hour, minute } => now.hour() == hour && now.minute() == minute,
            Timing::Weekly {
                weekday,
                hour,
                minute,
            } => now.weekday() == weekday && now.hour() == hour && now.minute() == minute,
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timing::Daily { hour, minute } => write!(f, "daily at {:02}:{:02}", hour, minute),
            Timing::Weekly {
                weekday,
                hour,
                minute,
            } => write!(f, "weekly on {} at {:02}:{:02}", weekday, hour, minute),
        }
    }
}

/// A schedule entry and the minute it last fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub timing: Timing,
    pub last_fired: Option<NaiveDateTime>,
}

impl ScheduleEntry {
    fn new(timing: Timing) -> Self {
        Self {
            timing,
            last_fired: None,
        }
    }

    /// Due at `minute` unless it already fired in that minute.
    fn is_due(&self, minute: &NaiveDateTime) -> bool {
        self.timing.matches(minute) && self.last_fired.as_ref() != Some(minute)
    }
}

/// State shared with the poll loop.
struct Shared {
    job: Job,
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<ScheduleEntry>>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn run_pending(&self, now: NaiveDateTime) -> bool {
        let minute = truncate_to_minute(now);

        let due: Vec<Timing> = {
            let mut entries = lock(&self.entries);
            entries
                .iter_mut()
                .filter(|entry| entry.is_due(&minute))
                .map(|entry| {
                    entry.last_fired = Some(minute);
                    entry.timing
                })
                .collect()
        };

        let Some(first) = due.first() else {
            return false;
        };
        if due.len() > 1 {
            debug!("{} entries due at {}, starting one run", due.len(), minute);
        }

        let mut in_flight = lock(&self.in_flight);
        if in_flight.as_ref().is_some_and(|run| !run.is_finished()) {
            warn!("Schedule entry {} due but previous run still in progress, skipping", first);
            return false;
        }

        info!("Schedule entry {} due, starting run", first);
        let job = self.job.clone();
        *in_flight = Some(tokio::spawn(async move {
            match tokio::spawn(async move { job().await }).await {
                Ok(Ok(())) => debug!("Scheduled run finished"),
                Ok(Err(err)) => error!("Scheduled run failed: {:#}", err),
                Err(err) => error!("Scheduled run panicked: {}", err),
            }
        }));
        true
    }
}

/// A running poll loop.
struct LoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Triggers a job on a daily / weekly timetable.
pub struct Scheduler {
    shared: Arc<Shared>,
    poll_interval: Duration,
    running: Mutex<Option<LoopHandle>>,
}

impl Scheduler {
    pub fn new(job: Job, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                job,
                clock,
                entries: Mutex::new(Vec::new()),
                in_flight: Mutex::new(None),
            }),
            poll_interval: DEFAULT_POLL_INTERVAL,
            running: Mutex::new(None),
        }
    }

    /// Use a different poll interval. Takes effect on the next `start`.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Fire every day at `hour:minute`.
    pub fn add_daily(&self, hour: u32, minute: u32) -> Result<(), ScheduleError> {
        validate_time(hour, minute)?;
        self.add(Timing::Daily { hour, minute });
        Ok(())
    }

    /// Fire every week on `weekday` (e.g. "monday", "Tue") at `hour:minute`.
    pub fn add_weekly(&self, weekday: &str, hour: u32, minute: u32) -> Result<(), ScheduleError> {
        let weekday: Weekday = weekday
            .trim()
            .parse()
            .map_err(|_| ScheduleError::Weekday(weekday.to_string()))?;
        validate_time(hour, minute)?;
        self.add(Timing::Weekly {
            weekday,
            hour,
            minute,
        });
        Ok(())
    }

    fn add(&self, timing: Timing) {
        info!("Scheduled run {}", timing);
        lock(&self.shared.entries).push(ScheduleEntry::new(timing));
    }

    pub fn entries(&self) -> Vec<ScheduleEntry> {
        lock(&self.shared.entries).clone()
    }

    /// Evaluate all entries at `now`. Returns whether a run was started.
    pub fn run_pending(&self, now: NaiveDateTime) -> bool {
        self.shared.run_pending(now)
    }

    /// Spawn the poll loop. Does nothing if it is already running.
    pub fn start(&self) {
        let mut running = lock(&self.running);
        if running.is_some() {
            debug!("Scheduler already running");
            return;
        }

        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(poll_loop(self.shared.clone(), self.poll_interval, receiver));
        *running = Some(LoopHandle { shutdown, task });
        info!("Scheduler started");
    }

    /// Stop the poll loop and wait for it to exit.
    ///
    /// No trigger fires after this returns. A run already in progress keeps
    /// going; see [`Scheduler::wait_for_run`].
    pub async fn stop(&self) {
        let Some(handle) = lock(&self.running).take() else {
            return;
        };

        let _ = handle.shutdown.send(true);
        if let Err(err) = handle.task.await {
            error!("Scheduler loop ended abnormally: {}", err);
        }
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Wait for the most recently triggered run, if any, to finish.
    pub async fn wait_for_run(&self) {
        let run = lock(&self.shared.in_flight).take();
        if let Some(run) = run {
            if let Err(err) = run.await {
                error!("Scheduled run task failed: {}", err);
            }
        }
    }
}

async fn poll_loop(shared: Arc<Shared>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                shared.run_pending(shared.clock.now());
            }
        }
    }
}

fn validate_time(hour: u32, minute: u32) -> Result<(), ScheduleError> {
    if hour > 23 {
        return Err(ScheduleError::Hour(hour));
    }
    if minute > 59 {
        return Err(ScheduleError::Minute(minute));
    }
    Ok(())
}

fn truncate_to_minute(now: NaiveDateTime) -> NaiveDateTime {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
