use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatcher::JobDispatcher;
use crate::error::AppError;
use crate::job::{Job, JobResult};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
        max_concurrent_jobs: usize,
    },
    JobStarted {
        job_id: Uuid,
        job_type: &'a str,
    },
    JobCompleted {
        job_id: Uuid,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
        retryable: bool,
    },
    ShuttingDown {
        worker_id: &'a str,
        in_flight: usize,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started {
                worker_id,
                max_concurrent_jobs,
            } => {
                tracing::info!(%worker_id, max_concurrent_jobs, "Worker started");
            }
            WorkerEvent::JobStarted { job_id, job_type } => {
                tracing::debug!(%job_id, %job_type, "Job accepted");
            }
            WorkerEvent::JobCompleted { job_id } => {
                tracing::debug!(%job_id, "Job finished");
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                retryable,
            } => {
                tracing::warn!(%job_id, %error, %retryable, "Job failed");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                in_flight,
            } => {
                tracing::info!(%worker_id, in_flight, "Worker shutting down, draining jobs");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Attributed to jobs that arrive without a worker id.
    pub worker_id: String,
    pub max_concurrent_jobs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            max_concurrent_jobs: 16,
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }
}

/// A job plus the channel its result goes back on.
#[derive(Debug)]
pub struct JobRequest {
    pub job: Job,
    pub reply: oneshot::Sender<JobResult>,
}

/// Producer side of a worker's intake queue.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<JobRequest>,
}

impl WorkerHandle {
    /// Create a bounded intake queue; hand the receiver to [`WorkerService::run`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<JobRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a job and wait for its result.
    pub async fn submit(&self, job: Job) -> Result<JobResult, AppError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(JobRequest { job, reply })
            .await
            .map_err(|_| AppError::WorkerUnavailable("worker is not accepting jobs".into()))?;
        rx.await
            .map_err(|_| AppError::WorkerUnavailable("job dropped before completion".into()))
    }
}

struct JobOutcome {
    job_id: Uuid,
    /// Error text and whether the caller may retry.
    failure: Option<(String, bool)>,
}

/// Executes queued jobs through a [`JobDispatcher`] with bounded concurrency.
pub struct WorkerService {
    dispatcher: JobDispatcher,
    config: WorkerConfig,
}

impl WorkerService {
    pub fn new(dispatcher: JobDispatcher, config: WorkerConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run the worker loop until cancellation or until every handle is dropped.
    ///
    /// In-flight jobs are always allowed to finish; requests still queued
    /// when the loop stops are dropped and their submitters see
    /// [`AppError::WorkerUnavailable`].
    pub async fn run<WR: WorkerReporter>(
        &self,
        mut rx: mpsc::Receiver<JobRequest>,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        let worker_id = self.config.worker_id.as_str();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs.max(1)));
        let mut tasks: JoinSet<JobOutcome> = JoinSet::new();

        reporter.report(WorkerEvent::Started {
            worker_id,
            max_concurrent_jobs: self.config.max_concurrent_jobs,
        });

        loop {
            tokio::select! {
                biased;
                () = cancel_token.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::reap(joined, reporter);
                }
                next = async {
                    let permit = Arc::clone(&semaphore).acquire_owned().await;
                    (permit, rx.recv().await)
                } => {
                    let (permit, request) = match next {
                        (Ok(permit), Some(request)) => (permit, request),
                        (_, None) => break,
                        (Err(e), _) => {
                            tracing::error!(error = %e, "Concurrency limiter closed");
                            break;
                        }
                    };

                    let JobRequest { mut job, reply } = request;
                    if job.worker_id.is_empty() {
                        job.worker_id = self.config.worker_id.clone();
                    }
                    reporter.report(WorkerEvent::JobStarted {
                        job_id: job.id,
                        job_type: &job.job_type,
                    });

                    let dispatcher = self.dispatcher.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        let result = dispatcher.execute_into_result(&job).await;
                        let failure = (!result.is_success()).then(|| {
                            let retryable = result.error_kind.is_some_and(|k| k.is_retryable());
                            (result.error.clone(), retryable)
                        });
                        if reply.send(result).is_err() {
                            tracing::debug!(job_id = %job.id, "Submitter went away, result discarded");
                        }
                        JobOutcome { job_id: job.id, failure }
                    });
                }
            }
        }

        rx.close();
        reporter.report(WorkerEvent::ShuttingDown {
            worker_id,
            in_flight: tasks.len(),
        });
        while let Some(joined) = tasks.join_next().await {
            Self::reap(joined, reporter);
        }
        reporter.report(WorkerEvent::Stopped { worker_id });

        Ok(())
    }

    fn reap<WR: WorkerReporter>(joined: Result<JobOutcome, JoinError>, reporter: &WR) {
        match joined {
            Ok(JobOutcome {
                job_id,
                failure: None,
            }) => reporter.report(WorkerEvent::JobCompleted { job_id }),
            Ok(JobOutcome {
                job_id,
                failure: Some((error, retryable)),
            }) => reporter.report(WorkerEvent::JobFailed {
                job_id,
                error: &error,
                retryable,
            }),
            Err(e) => tracing::error!(error = %e, "Job task panicked"),
        }
    }
}
