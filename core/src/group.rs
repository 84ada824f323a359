//! Fan-out/join orchestration.
//!
//! A [`JobGroup`] collects units, then [`JobGroup::run`] starts one worker per
//! unit and waits until either every worker has written its slot or the
//! group deadline elapses. The deadline bounds the wait only: workers that are
//! still running keep going and write into the slot map of the run that
//! started them.
//!
//! ```text
//! add/extend ─► pending units ─► run() ─► SlotMap (fresh per run)
//!                                  │            ▲
//!                                  ├─ worker 0 ─┤ fill(0)
//!                                  ├─ worker 1 ─┤ fill(1)
//!                                  └─ worker n ─┘ fill(n)
//!                     Notify (pending == 0)  vs  tokio::time::timeout
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::Notify;
use tokio::task;
use tokio::time::timeout;

use gather_types::{GroupSettings, NotFoundError, TimeoutError, TraceLine, TraceReport};

use crate::sink::{TraceSink, TracingSink};
use crate::slots::{Slot, SlotMap};
use crate::unit::Unit;

type PanicPayload = Box<dyn Any + Send>;

/// State shared between one run and the workers it spawned.
struct RunState<T, E> {
    slots: SlotMap<T, E>,
    pending: AtomicUsize,
    done: Notify,
    panic: Mutex<Option<PanicPayload>>,
}

impl<T, E> RunState<T, E> {
    fn new(units: usize) -> Self {
        Self {
            slots: SlotMap::with_len(units),
            pending: AtomicUsize::new(units),
            done: Notify::new(),
            panic: Mutex::new(None),
        }
    }

    fn finish(&self, index: usize, started: Instant, outcome: thread::Result<Result<T, E>>) {
        let elapsed = started.elapsed();
        match outcome {
            Ok(outcome) => {
                tracing::debug!(
                    index,
                    elapsed_ms = elapsed.as_millis() as u64,
                    failed = outcome.is_err(),
                    "Unit finished"
                );
                self.slots.fill(index, Slot::new(outcome, elapsed));
            }
            Err(payload) => {
                tracing::error!(
                    index,
                    panic = %panic_payload_to_string(&payload),
                    "Unit panicked"
                );
                let mut cell = self.panic.lock().unwrap_or_else(PoisonError::into_inner);
                if cell.is_none() {
                    *cell = Some(payload);
                }
            }
        }

        // Notify stores a permit, so a completion that lands before the
        // runner starts waiting is not lost.
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.done.notify_one();
        }
    }

    fn take_panic(&self) -> Option<PanicPayload> {
        self.panic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn panic_payload_to_string(payload: &PanicPayload) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs a batch of units in parallel and keeps one outcome per unit, in
/// submission order.
///
/// `run` surfaces only the group-level [`TimeoutError`]. Per-unit errors are
/// stored verbatim and read back through [`errors`](Self::errors),
/// [`data`](Self::data) and [`results`](Self::results).
///
/// A panic inside a unit is caught at the worker boundary so the group still
/// completes; the panicking unit's slot stays empty, and `run` resumes the
/// panic on the caller once the wait is over. Panics from workers that outlive
/// a timed-out run are logged and dropped.
///
/// Requires a Tokio runtime with the time driver enabled.
pub struct JobGroup<T, E> {
    pending: Vec<Unit<T, E>>,
    state: Arc<RunState<T, E>>,
    settings: GroupSettings,
    sink: Arc<dyn TraceSink>,
    label: Option<String>,
}

impl<T, E> JobGroup<T, E>
where
    T: Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(GroupSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: GroupSettings) -> Self {
        Self {
            pending: Vec::new(),
            state: Arc::new(RunState::new(0)),
            settings,
            sink: Arc::new(TracingSink::default()),
            label: None,
        }
    }

    /// Replace the trace sink. Reports go to `tracing` at TRACE level by default.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Name shown in the report header next to the call site.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn settings(&self) -> GroupSettings {
        self.settings
    }

    pub fn add(&mut self, unit: Unit<T, E>) -> &mut Self {
        self.pending.push(unit);
        self
    }

    pub fn extend<I>(&mut self, units: I) -> &mut Self
    where
        I: IntoIterator<Item = Unit<T, E>>,
    {
        self.pending.extend(units);
        self
    }

    pub fn add_blocking<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        self.add(Unit::blocking(f))
    }

    pub fn add_async<Fut>(&mut self, fut: Fut) -> &mut Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.add(Unit::future(fut))
    }

    /// Units submitted since the last run.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of slots of the most recent run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.slots.is_empty()
    }

    /// Run every pending unit, waiting at most the configured deadline.
    #[track_caller]
    pub fn run(&mut self) -> impl Future<Output = Result<(), TimeoutError>> {
        let caller = Location::caller();
        let deadline = self.settings.deadline();
        self.dispatch(caller, deadline)
    }

    /// Run every pending unit, waiting at most `deadline`.
    #[track_caller]
    pub fn run_within(
        &mut self,
        deadline: Duration,
    ) -> impl Future<Output = Result<(), TimeoutError>> {
        let caller = Location::caller();
        self.dispatch(caller, deadline)
    }

    /// Run, then return the captured values if every unit finished in time.
    #[track_caller]
    pub fn run_and_data<'a>(
        &'a mut self,
        deadline: Duration,
    ) -> impl Future<Output = Result<Vec<Option<&'a T>>, TimeoutError>> {
        let caller = Location::caller();
        async move {
            self.dispatch(caller, deadline).await?;
            let this: &'a Self = self;
            Ok(this.data())
        }
    }

    /// Run, then return every outcome if every unit finished in time.
    #[track_caller]
    pub fn run_and_results<'a>(
        &'a mut self,
        deadline: Duration,
    ) -> impl Future<Output = Result<Vec<&'a Result<T, E>>, TimeoutError>> {
        let caller = Location::caller();
        async move {
            self.dispatch(caller, deadline).await?;
            let this: &'a Self = self;
            Ok(this.state.slots.iter().flatten().map(Slot::outcome).collect())
        }
    }

    async fn dispatch(
        &mut self,
        caller: &'static Location<'static>,
        deadline: Duration,
    ) -> Result<(), TimeoutError> {
        let units = mem::take(&mut self.pending);
        let total = units.len();
        let state = Arc::new(RunState::new(total));
        // Stragglers from an earlier run keep their own map.
        self.state = Arc::clone(&state);

        let started = Instant::now();
        for (index, unit) in units.into_iter().enumerate() {
            spawn_worker(Arc::clone(&state), index, unit);
        }

        let finished = total == 0 || timeout(deadline, state.done.notified()).await.is_ok();

        let mut lines = Vec::new();
        for (index, slot) in state.slots.iter().enumerate() {
            let Some(slot) = slot else {
                continue;
            };
            let elapsed = slot.elapsed();
            match slot.outcome() {
                Err(error) => lines.push(TraceLine::Failed {
                    index,
                    elapsed,
                    error: error.to_string(),
                }),
                Ok(_) if elapsed > self.settings.long_threshold() => {
                    lines.push(TraceLine::Slow { index, elapsed });
                }
                Ok(_) => {}
            }
        }
        // Taken after the line pass: a straggler landing in between is
        // neither listed as finished nor as outstanding.
        let outstanding = state.slots.outstanding();
        if !finished {
            lines.extend(outstanding.iter().map(|&index| TraceLine::TimedOut { index }));
        }

        let mut report = TraceReport::new(caller, total, lines, started.elapsed());
        if let Some(label) = &self.label {
            report = report.with_label(label.clone());
        }
        self.sink.report(&report);

        if let Some(payload) = state.take_panic() {
            panic::resume_unwind(payload);
        }

        if finished {
            Ok(())
        } else {
            tracing::warn!(
                units = total,
                outstanding = outstanding.len(),
                deadline_ms = deadline.as_millis() as u64,
                "Job group deadline elapsed"
            );
            Err(TimeoutError::new(deadline, total, outstanding))
        }
    }

    /// Outcome of slot `index`, or `NotFoundError` if the index is out of
    /// range or the unit is still running.
    pub fn result(&self, index: usize) -> Result<&Result<T, E>, NotFoundError> {
        self.state.slots.get(index).map(Slot::outcome)
    }

    /// How long the unit behind slot `index` ran.
    pub fn elapsed(&self, index: usize) -> Result<Duration, NotFoundError> {
        self.state.slots.get(index).map(Slot::elapsed)
    }

    /// Every outcome in submission order.
    #[must_use]
    pub fn results(&self) -> Vec<Result<&Result<T, E>, NotFoundError>> {
        (0..self.len()).map(|index| self.result(index)).collect()
    }

    /// Per-slot error in submission order: `Ok(None)` for a unit that
    /// succeeded, `Ok(Some(_))` for one that failed.
    #[must_use]
    pub fn errors(&self) -> Vec<Result<Option<&E>, NotFoundError>> {
        (0..self.len())
            .map(|index| self.result(index).map(|outcome| outcome.as_ref().err()))
            .collect()
    }

    /// Per-slot value in submission order; `None` for failed or unfinished units.
    #[must_use]
    pub fn data(&self) -> Vec<Option<&T>> {
        self.state
            .slots
            .iter()
            .map(|slot| slot.and_then(|slot| slot.outcome().as_ref().ok()))
            .collect()
    }
}

fn spawn_worker<T, E>(state: Arc<RunState<T, E>>, index: usize, unit: Unit<T, E>)
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    match unit {
        Unit::Blocking(f) => {
            task::spawn_blocking(move || {
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(f));
                state.finish(index, started, outcome);
            });
        }
        Unit::Async(fut) => {
            tokio::spawn(async move {
                let started = Instant::now();
                let outcome = AssertUnwindSafe(fut).catch_unwind().await;
                state.finish(index, started, outcome);
            });
        }
    }
}

impl<T, E> Default for JobGroup<T, E>
where
    T: Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for JobGroup<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobGroup")
            .field("pending", &self.pending.len())
            .field("slots", &self.state.slots.len())
            .field("outstanding", &self.state.pending.load(Ordering::Acquire))
            .field("settings", &self.settings)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Build a group from `units`, run it with `settings`, and hand back the
/// group for inspection together with the run status.
#[track_caller]
pub fn run_units<T, E, I>(
    units: I,
    settings: GroupSettings,
    sink: Arc<dyn TraceSink>,
) -> impl Future<Output = (JobGroup<T, E>, Result<(), TimeoutError>)>
where
    T: Send + Sync + 'static,
    E: fmt::Display + Send + Sync + 'static,
    I: IntoIterator<Item = Unit<T, E>>,
{
    let caller = Location::caller();
    let mut group = JobGroup::with_settings(settings).with_sink(sink);
    group.extend(units);
    async move {
        let deadline = group.settings.deadline();
        let status = group.dispatch(caller, deadline).await;
        (group, status)
    }
}
