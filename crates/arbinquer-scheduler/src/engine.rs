//! Scheduler engine: one tokio task per feed job.
//!
//! Workers own their `FeedJob` outright and publish a copy after every state
//! change to a collector task, which maintains the shared job table read by
//! [`SchedulerHandle::jobs`].

use arbinquer_channels::MessageReconciler;
use arbinquer_core::error::{ArbinquerError, Result};
use arbinquer_core::traits::{FeedSource, Renderer};
use arbinquer_core::types::{FeedId, Snapshot};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::cadence::{Cadence, CadencePolicy};
use crate::change::ChangeDetector;
use crate::job::{FeedJob, JobState, RunOutcome};

/// Executes single runs of a job. Shared by every worker.
pub struct JobRunner {
    policy: CadencePolicy,
    detector: ChangeDetector,
    renderer: Arc<dyn Renderer>,
    reconciler: Arc<MessageReconciler>,
}

impl JobRunner {
    pub fn new(policy: CadencePolicy, renderer: Arc<dyn Renderer>, reconciler: Arc<MessageReconciler>) -> Self {
        Self {
            policy,
            detector: ChangeDetector,
            renderer,
            reconciler,
        }
    }

    pub fn policy(&self) -> &CadencePolicy {
        &self.policy
    }

    /// Fetch, then [`complete`](Self::complete) the run.
    pub async fn run_once(&self, job: &mut FeedJob, source: &dyn FeedSource, now: DateTime<Utc>) -> RunOutcome {
        job.state = JobState::Running;
        let fetched = source.fetch().await;
        self.complete(job, fetched, now).await
    }

    /// Detect, render, reconcile, and reschedule. Never fails: every error is
    /// folded into the job's state and the returned outcome.
    pub async fn complete(&self, job: &mut FeedJob, fetched: Result<Snapshot>, now: DateTime<Utc>) -> RunOutcome {
        job.state = JobState::Running;
        job.last_run_at = Some(now);
        job.runs += 1;

        let outcome = match fetched {
            Ok(snapshot) => {
                job.consecutive_failures = 0;
                let outcome = self.publish(job, &snapshot).await;
                job.last_snapshot = Some(snapshot);
                outcome
            }
            Err(e) => {
                job.consecutive_failures = job.consecutive_failures.saturating_add(1);
                if e.is_fetch() {
                    tracing::warn!(feed = %job.feed_id, failures = job.consecutive_failures, "fetch failed: {e}");
                } else {
                    tracing::error!(feed = %job.feed_id, failures = job.consecutive_failures, "source error: {e}");
                }
                job.last_error = Some(e.to_string());
                RunOutcome::FetchFailed
            }
        };

        // Delays count from the end of the run, not from when the fetch began.
        let finished = Utc::now().max(now);
        let failures = job.consecutive_failures.max(job.publish_failures);
        job.next_run_at = match &outcome {
            RunOutcome::Posted(_) | RunOutcome::Unchanged | RunOutcome::Degraded => {
                self.policy.next_run(&job.cadence, finished, job.last_snapshot.as_ref())
            }
            RunOutcome::RateLimited(retry_after) => self.policy.next_run_after_rate_limit(finished, *retry_after),
            RunOutcome::FetchFailed | RunOutcome::Failed => {
                self.policy.next_run_after_failure(&job.cadence, finished, failures)
            }
        };
        job.state = JobState::Idle;

        if outcome.is_success() {
            tracing::info!(
                feed = %job.feed_id,
                outcome = %outcome,
                next_run_at = %job.next_run_at,
                "run finished"
            );
        } else {
            tracing::warn!(
                feed = %job.feed_id,
                outcome = %outcome,
                failures,
                next_run_at = %job.next_run_at,
                "run finished"
            );
        }
        outcome
    }

    async fn publish(&self, job: &mut FeedJob, snapshot: &Snapshot) -> RunOutcome {
        let has_live_message = job.last_message_ref.is_some();
        if !self
            .detector
            .should_reconcile(&job.cadence, job.last_posted.as_ref(), snapshot, has_live_message)
        {
            job.publish_failures = 0;
            job.last_error = None;
            return RunOutcome::Unchanged;
        }

        let text = match self.renderer.render(snapshot) {
            Ok(text) => text,
            Err(e) => {
                job.consecutive_failures = job.consecutive_failures.saturating_add(1);
                job.publish_failures = job.publish_failures.saturating_add(1);
                tracing::error!(feed = %job.feed_id, "render failed: {e}");
                job.last_error = Some(e.to_string());
                return RunOutcome::Failed;
            }
        };

        let result = self
            .reconciler
            .reconcile(job.feed_id, &job.channel_id, job.last_message_ref.as_deref(), &text)
            .await;

        match result {
            Ok(reconciled) => {
                tracing::debug!(
                    feed = %job.feed_id,
                    channel = %job.channel_id,
                    message_id = %reconciled.message_id,
                    removed = reconciled.removed,
                    "status message reconciled"
                );
                job.last_message_ref = Some(reconciled.message_id);
                job.last_posted = Some(snapshot.clone());
                job.degraded = false;
                job.publish_failures = 0;
                job.last_error = None;
                RunOutcome::Posted(reconciled.action)
            }
            Err(ArbinquerError::PermissionDenied(msg)) => {
                tracing::error!(
                    feed = %job.feed_id,
                    channel = %job.channel_id,
                    "missing channel permission, job degraded: {msg}"
                );
                job.degraded = true;
                job.last_error = Some(msg);
                RunOutcome::Degraded
            }
            Err(ArbinquerError::RateLimited { retry_after }) => {
                job.consecutive_failures = job.consecutive_failures.saturating_add(1);
                job.publish_failures = job.publish_failures.saturating_add(1);
                job.last_error = Some(format!("rate limited for {}ms", retry_after.as_millis()));
                RunOutcome::RateLimited(retry_after)
            }
            Err(e) => {
                job.consecutive_failures = job.consecutive_failures.saturating_add(1);
                job.publish_failures = job.publish_failures.saturating_add(1);
                tracing::warn!(
                    feed = %job.feed_id,
                    channel = %job.channel_id,
                    publish_failures = job.publish_failures,
                    "reconcile failed: {e}"
                );
                job.last_error = Some(e.to_string());
                RunOutcome::Failed
            }
        }
    }
}

/// Builder for the set of jobs to run.
pub struct SchedulerEngine {
    runner: Arc<JobRunner>,
    run_on_startup: bool,
    jobs: Vec<(FeedJob, Arc<dyn FeedSource>)>,
}

impl SchedulerEngine {
    pub fn new(runner: JobRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            run_on_startup: true,
            jobs: Vec::new(),
        }
    }

    pub fn run_on_startup(mut self, enabled: bool) -> Self {
        self.run_on_startup = enabled;
        self
    }

    pub fn add_job(&mut self, source: Arc<dyn FeedSource>, cadence: Cadence, channel_id: impl Into<String>) {
        let job = FeedJob::new(
            source.feed_id(),
            cadence,
            channel_id,
            self.runner.policy(),
            Utc::now(),
            self.run_on_startup,
        );
        self.jobs.push((job, source));
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Spawn one worker per job plus the collector.
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let table: Arc<RwLock<BTreeMap<FeedId, FeedJob>>> = Arc::new(RwLock::new(BTreeMap::new()));
        let (tx, mut rx) = mpsc::unbounded_channel::<FeedJob>();

        let mut workers = JoinSet::new();
        for (job, source) in self.jobs {
            table.write().insert(job.feed_id, job.clone());
            workers.spawn(worker(self.runner.clone(), source, job, tx.clone(), cancel.clone()));
        }
        drop(tx);

        let collector_table = table.clone();
        let collector = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                collector_table.write().insert(job.feed_id, job);
            }
        });

        tracing::info!(jobs = workers.len(), "scheduler started");
        SchedulerHandle {
            table,
            cancel,
            workers,
            collector,
        }
    }
}

async fn worker(
    runner: Arc<JobRunner>,
    source: Arc<dyn FeedSource>,
    mut job: FeedJob,
    reports: mpsc::UnboundedSender<FeedJob>,
    cancel: CancellationToken,
) {
    tracing::info!(
        feed = %job.feed_id,
        cadence = %job.cadence,
        channel = %job.channel_id,
        next_run_at = %job.next_run_at,
        "job scheduled"
    );

    loop {
        let wait = job.wait_from(Utc::now());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let started = Utc::now();
        job.state = JobState::Running;
        let _ = reports.send(job.clone());

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            fetched = source.fetch() => fetched,
        };
        // Past this point the run completes even during shutdown.
        runner.complete(&mut job, fetched, started).await;
        let _ = reports.send(job.clone());
    }

    job.state = JobState::Idle;
    let _ = reports.send(job.clone());
    tracing::debug!(feed = %job.feed_id, "job stopped");
}

/// Running scheduler.
pub struct SchedulerHandle {
    table: Arc<RwLock<BTreeMap<FeedId, FeedJob>>>,
    cancel: CancellationToken,
    workers: JoinSet<()>,
    collector: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Copy of every job's latest state.
    pub fn jobs(&self) -> Vec<FeedJob> {
        self.table.read().values().cloned().collect()
    }

    pub fn job(&self, feed_id: FeedId) -> Option<FeedJob> {
        self.table.read().get(&feed_id).cloned()
    }

    /// Cancel pending timers and fetches, wait for in-flight reconciles.
    pub async fn shutdown(mut self) -> Vec<FeedJob> {
        tracing::info!("scheduler shutting down");
        self.cancel.cancel();
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("job worker ended abnormally: {e}");
            }
        }
        if let Err(e) = (&mut self.collector).await {
            tracing::error!("job collector ended abnormally: {e}");
        }
        self.jobs()
    }
}
