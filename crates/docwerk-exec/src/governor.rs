// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Concurrency governor — at most `capacity` jobs run at once, the rest wait
// in strict FIFO order.
//
// Submission is synchronous: the job is queued (and, if a slot is free,
// started) before `submit` returns, so counters observed right after a burst
// of submissions are exact. Every job runs in its own task; a panic or error
// in one job only fails that job. The queue is unbounded: the governor delays
// work, it never rejects it.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use docwerk_core::{EngineError, JobId, JobStatus};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::invoker::{Invocation, ProcessInvoker, ProcessOutput};

type BoxedTask = Pin<Box<dyn Future<Output = bool> + Send + 'static>>;

/// A status change reported to a job's progress sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub id: JobId,
    pub label: String,
    pub status: JobStatus,
}

/// Receives [`JobEvent`]s for one or more jobs.
pub type ProgressSink = mpsc::UnboundedSender<JobEvent>;

/// One unit of governed work: a single external-process invocation attempt.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub label: String,
    pub progress: Option<ProgressSink>,
}

impl Job {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            label: label.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    fn emit(&self, status: JobStatus) {
        if let Some(sink) = &self.progress {
            let _ = sink.send(JobEvent {
                id: self.id,
                label: self.label.clone(),
                status,
            });
        }
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub capacity: usize,
    pub running: usize,
    pub queued: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Awaitable result of a submitted job.
#[derive(Debug)]
pub struct JobHandle<T> {
    id: JobId,
    rx: oneshot::Receiver<Result<T, EngineError>>,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job to finish. A job whose task panicked resolves as
    /// `ExecutionFailed`.
    pub async fn wait(self) -> Result<T, EngineError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(EngineError::failed(format!("job {} aborted", self.id))),
        }
    }
}

struct Pending {
    job: Job,
    task: BoxedTask,
}

struct State {
    capacity: usize,
    running: usize,
    waiting: VecDeque<Pending>,
    statuses: HashMap<JobId, JobStatus>,
    completed: u64,
    failed: u64,
}

impl State {
    fn transition(&mut self, id: JobId, next: JobStatus) {
        match self.statuses.get(&id).copied() {
            Some(current) if current.can_transition_to(next) => {
                if next.is_terminal() {
                    self.statuses.remove(&id);
                } else {
                    self.statuses.insert(id, next);
                }
            }
            None if next == JobStatus::Queued => {
                self.statuses.insert(id, next);
            }
            current => warn!(job_id = %id, ?current, ?next, "rejected job status transition"),
        }
    }
}

/// Bounded FIFO job runner. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct Governor {
    state: Arc<Mutex<State>>,
}

impl Governor {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        info!(capacity, "job governor ready");
        Self {
            state: Arc::new(Mutex::new(State {
                capacity,
                running: 0,
                waiting: VecDeque::new(),
                statuses: HashMap::new(),
                completed: 0,
                failed: 0,
            })),
        }
    }

    /// Queue `work` as `job`. Must be called inside a Tokio runtime.
    pub fn submit<T, F>(&self, job: Job, work: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = job.id;
        let task: BoxedTask = Box::pin(async move {
            let result = work.await;
            let ok = result.is_ok();
            let _ = tx.send(result);
            ok
        });

        if let Ok(mut state) = self.state.lock() {
            state.transition(id, JobStatus::Queued);
            debug!(job_id = %id, label = %job.label, queued = state.waiting.len() + 1, "job queued");
            job.emit(JobStatus::Queued);
            state.waiting.push_back(Pending { job, task });
        }
        self.pump();

        JobHandle { id, rx }
    }

    /// Submit and wait in one step.
    pub async fn run<T, F>(&self, job: Job, work: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        self.submit(job, work).wait().await
    }

    /// Counters are plain integers, so a poisoned lock still holds a usable
    /// state.
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        QueueSnapshot {
            capacity: state.capacity,
            running: state.running,
            queued: state.waiting.len(),
            completed: state.completed,
            failed: state.failed,
        }
    }

    /// Current status of a job that has not yet finished.
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.state.lock().ok()?.statuses.get(&id).copied()
    }

    /// Start waiting jobs while slots are free.
    fn pump(&self) {
        loop {
            let next = {
                let Ok(mut state) = self.state.lock() else {
                    return;
                };
                if state.running >= state.capacity {
                    return;
                }
                let Some(next) = state.waiting.pop_front() else {
                    return;
                };
                state.running += 1;
                state.transition(next.job.id, JobStatus::Running);
                next
            };
            self.start(next);
        }
    }

    fn start(&self, pending: Pending) {
        let Pending { job, task } = pending;
        job.emit(JobStatus::Running);
        debug!(job_id = %job.id, label = %job.label, "job running");

        let governor = self.clone();
        tokio::spawn(async move {
            // A separate task so a panic surfaces as a JoinError here.
            let ok = match tokio::spawn(task).await {
                Ok(ok) => ok,
                Err(err) => {
                    warn!(job_id = %job.id, error = %err, "job task panicked");
                    false
                }
            };
            let status = if ok { JobStatus::Done } else { JobStatus::Failed };

            if let Ok(mut state) = governor.state.lock() {
                state.running = state.running.saturating_sub(1);
                state.transition(job.id, status);
                if ok {
                    state.completed += 1;
                } else {
                    state.failed += 1;
                }
            }
            job.emit(status);
            debug!(job_id = %job.id, ?status, "job finished");

            governor.pump();
        });
    }
}

/// A [`ProcessInvoker`] that runs every invocation as one governed job.
#[derive(Clone)]
pub struct GovernedInvoker {
    governor: Governor,
    inner: Arc<dyn ProcessInvoker>,
    progress: Option<ProgressSink>,
}

impl GovernedInvoker {
    pub fn new(governor: Governor, inner: Arc<dyn ProcessInvoker>) -> Self {
        Self {
            governor,
            inner,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }
}

#[async_trait]
impl ProcessInvoker for GovernedInvoker {
    async fn invoke(&self, invocation: Invocation) -> Result<ProcessOutput, EngineError> {
        let mut job = Job::new(invocation.label());
        if let Some(sink) = &self.progress {
            job = job.with_progress(sink.clone());
        }
        let inner = Arc::clone(&self.inner);
        self.governor
            .run(job, async move { inner.invoke(invocation).await })
            .await
    }
}
