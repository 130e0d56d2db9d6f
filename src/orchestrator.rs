//! Minimal in-process workflow runner.
//!
//! A [`Task`] is a named unit of work that can be retried and is recorded on
//! the enclosing [`FlowRun`]. A [`Flow`] composes tasks. A [`Deployment`]
//! binds a flow to a fixed name and an optional schedule, and [`serve`] keeps
//! executing it until shutdown.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        retries: 0,
        delay: Duration::ZERO,
    };

    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Base delay plus up to 25% random jitter, saturating at `u64::MAX` ms.
    fn backoff(&self) -> Duration {
        let base = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX);
        if base == 0 {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(0..=base / 4);
        Duration::from_millis(base.saturating_add(jitter))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunState {
    Completed,
    Failed { error: String },
}

impl RunState {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunState::Completed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task: &'static str,
    pub attempts: u32,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A unit of work the runner can retry and track.
#[derive(Debug, Clone, Copy)]
pub struct Task {
    name: &'static str,
    policy: RetryPolicy,
}

impl Task {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            policy: RetryPolicy::NONE,
        }
    }

    pub fn with_retries(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Execute `op`, retrying per policy. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, run: &FlowRun, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started_at = Utc::now();
        let span = tracing::info_span!("task", task = self.name, run_id = %run.id);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let res = op().instrument(span.clone()).await;
            match res {
                Ok(value) => {
                    info!(parent: &span, attempt, "task completed");
                    run.record(TaskRecord {
                        task: self.name,
                        attempts: attempt,
                        state: RunState::Completed,
                        started_at,
                        finished_at: Utc::now(),
                    });
                    return Ok(value);
                }
                Err(e) if attempt <= self.policy.retries => {
                    let wait = self.policy.backoff();
                    warn!(parent: &span, attempt, error = %e, wait_ms = wait.as_millis() as u64, "task failed; retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    error!(parent: &span, attempt, error = %e, "task failed");
                    run.record(TaskRecord {
                        task: self.name,
                        attempts: attempt,
                        state: RunState::Failed {
                            error: e.to_string(),
                        },
                        started_at,
                        finished_at: Utc::now(),
                    });
                    return Err(e);
                }
            }
        }
    }
}

/// One execution of a flow under a deployment.
#[derive(Debug)]
pub struct FlowRun {
    pub id: Uuid,
    pub flow: &'static str,
    pub deployment: String,
    pub started_at: DateTime<Utc>,
    tasks: Mutex<Vec<TaskRecord>>,
}

impl FlowRun {
    pub fn new(flow: &'static str, deployment: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow,
            deployment: deployment.to_string(),
            started_at: Utc::now(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, rec: TaskRecord) {
        // A poisoned lock only means a panicking task; keep the history anyway.
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.push(rec);
    }

    fn finish(self, state: RunState) -> FlowRunOutcome {
        let tasks = self.tasks.into_inner().unwrap_or_else(|p| p.into_inner());
        FlowRunOutcome {
            id: self.id,
            flow: self.flow,
            deployment: self.deployment,
            started_at: self.started_at,
            finished_at: Utc::now(),
            state,
            tasks,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowRunOutcome {
    pub id: Uuid,
    pub flow: &'static str,
    pub deployment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: RunState,
    pub tasks: Vec<TaskRecord>,
}

#[cfg(test)]
impl FlowRunOutcome {
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.task).collect()
    }
}

/// A named composition of tasks.
#[async_trait]
pub trait Flow: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, run: &FlowRun) -> Result<()>;
}

/// A flow registered under a fixed name, optionally on a fixed interval.
#[derive(Clone)]
pub struct Deployment {
    pub name: String,
    pub flow: Arc<dyn Flow>,
    pub schedule: Option<Duration>,
}

impl Deployment {
    pub fn new(name: impl Into<String>, flow: Arc<dyn Flow>) -> Self {
        Self {
            name: name.into(),
            flow,
            schedule: None,
        }
    }

    /// Run on a fixed interval. A zero interval means unscheduled (one run).
    pub fn every(mut self, interval: Duration) -> Self {
        self.schedule = (!interval.is_zero()).then_some(interval);
        self
    }
}

/// Execute one run of the deployment's flow. Failures become a `Failed`
/// outcome rather than an error.
pub async fn run_once(deployment: &Deployment) -> FlowRunOutcome {
    let run = FlowRun::new(deployment.flow.name(), &deployment.name);
    let span = tracing::info_span!(
        "flow",
        flow = run.flow,
        deployment = %run.deployment,
        run_id = %run.id
    );
    info!(parent: &span, "flow run started");
    let res = deployment.flow.run(&run).instrument(span.clone()).await;
    let state = match res {
        Ok(()) => {
            info!(parent: &span, "flow run completed");
            RunState::Completed
        }
        Err(e) => {
            error!(parent: &span, error = %e, "flow run failed");
            RunState::Failed {
                error: e.to_string(),
            }
        }
    };
    run.finish(state)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServeStats {
    pub runs: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

impl ServeStats {
    fn observe(&mut self, outcome: &FlowRunOutcome) {
        self.runs += 1;
        if let RunState::Failed { error } = &outcome.state {
            self.failures += 1;
            self.last_error = Some(error.clone());
        }
    }
}

/// Serve a deployment: run immediately, then on every schedule tick until
/// `shutdown` resolves. Without a schedule, a single run is made. Runs are
/// sequential within one serve loop; separate processes are not coordinated.
///
/// Shutdown is also honoured mid-run: the in-flight run is dropped, which
/// rolls back any open database transaction, and is not counted.
pub async fn serve<S>(deployment: Deployment, shutdown: S) -> ServeStats
where
    S: Future<Output = ()>,
{
    let mut stats = ServeStats::default();
    let schedule = deployment.schedule.filter(|d| !d.is_zero());
    info!(
        deployment = %deployment.name,
        flow = deployment.flow.name(),
        interval_secs = schedule.map(|d| d.as_secs()),
        "serving deployment"
    );

    tokio::pin!(shutdown);
    let mut ticker = schedule.map(|interval| {
        let mut t = tokio::time::interval(interval);
        t.set_missed_tick_behavior(MissedTickBehavior::Skip);
        t
    });

    loop {
        if let Some(ticker) = ticker.as_mut() {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
        }

        tokio::select! {
            outcome = run_once(&deployment) => stats.observe(&outcome),
            _ = &mut shutdown => {
                warn!(deployment = %deployment.name, "shutdown requested; abandoning in-flight run");
                break;
            }
        }

        if ticker.is_none() {
            return stats;
        }
    }

    info!(deployment = %deployment.name, runs = stats.runs, failures = stats.failures, "shutting down");
    stats
}
