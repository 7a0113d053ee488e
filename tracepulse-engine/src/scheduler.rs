//! The polling loop: fetch, compute, dispatch, sleep.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tracepulse_adapters::{RecordSource, SourceError};
use tracepulse_types::AnalysisName;

use crate::analysis::{analysis_set, analyze};
use crate::clock::{Clock, SystemClock};
use crate::registry::{panic_message, DispatchReport, SubscriberRegistry};
use crate::window::{WindowTracker, DEFAULT_BACKFILL};
use crate::EngineError;

/// Timing and content parameters of the engine.
///
/// All values are fixed at construction; there is no runtime
/// reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Sleep between the end of one cycle and the start of the next.
    pub poll_interval: Duration,
    /// How far back the first fetch reaches.
    pub backfill: Duration,
    /// Upper bound on the fetch phase of a cycle.
    pub cycle_timeout: Duration,
    /// Also publish the distribution and per-endpoint analyses.
    pub extended_analyses: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            backfill: DEFAULT_BACKFILL,
            cycle_timeout: Duration::from_secs(30),
            extended_analyses: false,
        }
    }
}

impl EngineConfig {
    /// Check the values can drive a loop.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.poll_interval.is_zero() {
            return Err(EngineError::Configuration(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.cycle_timeout.is_zero() {
            return Err(EngineError::Configuration(
                "cycle_timeout must be greater than zero".to_string(),
            ));
        }
        if chrono::Duration::from_std(self.backfill).is_err() {
            return Err(EngineError::Configuration(format!(
                "backfill of {:?} is out of range",
                self.backfill
            )));
        }
        Ok(())
    }
}

/// What the loop is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Built but not started.
    Idle,
    Fetching,
    Computing,
    Dispatching,
    /// Waiting for the next cycle.
    Sleeping,
    /// Cancelled; terminal.
    Stopped,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Fetching => "fetching",
            SchedulerState::Computing => "computing",
            SchedulerState::Dispatching => "dispatching",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one successful cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Lower bound of the fetch.
    pub since: DateTime<Utc>,
    /// The cycle's `now`; the window's new value.
    pub until: DateTime<Utc>,
    /// Records fetched across every kind.
    pub records: usize,
    /// Spans the analyses ran over.
    pub spans: usize,
    /// Results computed and dispatched. Zero when there were no spans.
    pub published: Vec<AnalysisName>,
    /// Delivery outcome summed over every result.
    pub dispatch: DispatchReport,
}

/// Drives the fetch, compute and dispatch cycle for one data source.
///
/// A scheduler owns its window; two schedulers never share one. Run cycles
/// by hand with [`run_cycle`](Self::run_cycle) or hand the scheduler to a
/// background task with [`start`](Self::start).
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tracepulse_adapters::LogFileSource;
/// use tracepulse_engine::{EngineConfig, Output, Scheduler};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let scheduler = Scheduler::builder()
///         .source(Arc::new(LogFileSource::new("logs/app.log")))
///         .config(EngineConfig {
///             poll_interval: Duration::from_secs(5),
///             ..EngineConfig::default()
///         })
///         .build()?;
///
///     scheduler.registry().register(Arc::new(Output::stdout()));
///
///     // Start background polling
///     let handle = scheduler.start();
///
///     tokio::time::sleep(Duration::from_secs(60)).await;
///     handle.stop();
///     handle.join().await;
///     Ok(())
/// }
/// ```
pub struct Scheduler {
    source: Arc<dyn RecordSource>,
    registry: Arc<SubscriberRegistry>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    analyses: Vec<AnalysisName>,
    window: WindowTracker,
    state: watch::Sender<SchedulerState>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("source", &self.source.description())
            .field("config", &self.config)
            .field("window", &self.window)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Scheduler {
    /// Create a builder for configuring the scheduler.
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// The registry results are dispatched to.
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// The configuration the scheduler was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current window.
    pub fn window(&self) -> WindowTracker {
        self.window
    }

    /// What the scheduler is doing.
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }

    /// Run a single cycle.
    ///
    /// The window only advances when the fetch succeeds, so a failed cycle
    /// is retried over the same range next time. A panicking source counts
    /// as a failed fetch. Subscribers are only called when the batch
    /// contains spans.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, EngineError> {
        let now = self.clock.now();
        let since = self.window.current();

        self.set_state(SchedulerState::Fetching);
        let fetch = AssertUnwindSafe(self.source.fetch_batch(since)).catch_unwind();
        let batch = tokio::time::timeout(self.config.cycle_timeout, fetch)
            .await
            .map_err(|_| EngineError::CycleTimeout(self.config.cycle_timeout))?
            .map_err(|payload| SourceError::Panicked(panic_message(payload)))??;

        // Late records stamped before `now` but stored after the fetch are
        // not picked up by the next cycle.
        self.window.advance(now);
        debug!(%since, until = %now, records = batch.len(), spans = batch.traces.len(), "fetched batch");

        let mut report = CycleReport {
            since,
            until: now,
            records: batch.len(),
            spans: batch.traces.len(),
            published: Vec::new(),
            dispatch: DispatchReport::default(),
        };
        if batch.traces.is_empty() {
            return Ok(report);
        }

        self.set_state(SchedulerState::Computing);
        let results = analyze(&batch.traces, &self.analyses, now);

        self.set_state(SchedulerState::Dispatching);
        for result in &results {
            report.dispatch += self.registry.dispatch(result.name, result);
            report.published.push(result.name);
        }

        Ok(report)
    }

    /// Start polling on a background task.
    ///
    /// The first cycle runs immediately. Returns a handle that stops the
    /// loop; dropping the handle stops it too.
    pub fn start(mut self) -> StreamHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let state = self.state.subscribe();

        let task = tokio::spawn(async move {
            info!(
                source = self.source.description(),
                interval = ?self.config.poll_interval,
                since = %self.window.current(),
                "analytics stream started"
            );

            loop {
                if *stop_rx.borrow() {
                    break;
                }

                match self.run_cycle().await {
                    Ok(report) => debug!(
                        published = report.published.len(),
                        delivered = report.dispatch.delivered,
                        failed = report.dispatch.failed,
                        "cycle complete"
                    ),
                    Err(e) => warn!(error = %e, since = %self.window.current(), "cycle failed, window retained"),
                }

                self.set_state(SchedulerState::Sleeping);
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            self.set_state(SchedulerState::Stopped);
            info!(since = %self.window.current(), "analytics stream stopped");
            self
        });

        StreamHandle {
            stop_tx,
            state,
            task,
        }
    }
}

/// Builder for configuring a Scheduler.
#[derive(Default)]
pub struct SchedulerBuilder {
    source: Option<Arc<dyn RecordSource>>,
    registry: Option<Arc<SubscriberRegistry>>,
    clock: Option<Arc<dyn Clock>>,
    config: EngineConfig,
}

impl SchedulerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data source. Required.
    pub fn source(mut self, source: Arc<dyn RecordSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Share an existing registry. A fresh one is created otherwise.
    pub fn registry(mut self, registry: Arc<SubscriberRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the clock. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the scheduler.
    ///
    /// Fails if no source was given or the configuration is invalid.
    pub fn build(self) -> Result<Scheduler, EngineError> {
        let source = self
            .source
            .ok_or_else(|| EngineError::Configuration("no record source configured".to_string()))?;
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let window = WindowTracker::with_backfill(clock.now(), self.config.backfill);
        let (state, _) = watch::channel(SchedulerState::Idle);

        Ok(Scheduler {
            source,
            registry: self.registry.unwrap_or_default(),
            clock,
            analyses: analysis_set(self.config.extended_analyses),
            config: self.config,
            window,
            state,
        })
    }
}

/// Handle for controlling a running scheduler.
///
/// Drop this handle to stop polling, or call `stop()` explicitly.
#[derive(Debug)]
pub struct StreamHandle {
    stop_tx: watch::Sender<bool>,
    state: watch::Receiver<SchedulerState>,
    task: JoinHandle<Scheduler>,
}

impl StreamHandle {
    /// Ask the loop to stop.
    ///
    /// Takes effect at once while sleeping; an in-flight fetch is allowed
    /// to finish first.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// What the loop is doing right now.
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Wait for the loop to exit and take back the stopped scheduler.
    ///
    /// Returns `None` if the task panicked or was cancelled.
    pub async fn join(self) -> Option<Scheduler> {
        let StreamHandle { stop_tx, task, .. } = self;
        let joined = task.await;
        drop(stop_tx);
        match joined {
            Ok(scheduler) => Some(scheduler),
            Err(e) => {
                warn!(error = %e, "analytics task ended abnormally");
                None
            }
        }
    }
}
