// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process job queue.
//!
//! At-least-once delivery with per-queue concurrency, exponential backoff
//! with an attempt cap, optional initial delay, recurring schedules, and a
//! dead-letter list surfaced to operators. The payout queue subscribes
//! with concurrency 1, which is what serializes the treasury nonce.
//!
//! Workers stop when the shared [`CancellationToken`] fires, the same
//! shutdown pattern every background task in this service uses.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A queued unit of work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub payload: serde_json::Value,
    /// 1-based attempt number of the current delivery.
    pub attempt: u32,
}

/// Per-job delivery options.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Wait before the first delivery.
    pub delay: Duration,
    /// Total deliveries before dead-lettering.
    pub max_attempts: u32,
    /// First retry backoff; doubles per attempt up to `backoff_cap`.
    pub backoff_base: Duration,
    /// Ceiling on the computed backoff.
    pub backoff_cap: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(600),
        }
    }
}

/// A job that exhausted its attempts.
#[derive(Debug, Clone)]
pub struct DeadJob {
    pub job: Job,
    pub last_error: String,
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
type Handler = Arc<dyn Fn(Job) -> HandlerFuture + Send + Sync>;

struct QueueState {
    sender: mpsc::UnboundedSender<(Job, JobOptions)>,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<(Job, JobOptions)>>>,
}

struct QueueInner {
    queues: Mutex<HashMap<String, QueueState>>,
    dead: Mutex<Vec<DeadJob>>,
    shutdown: CancellationToken,
}

/// Shared in-process queue. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                queues: Mutex::new(HashMap::new()),
                dead: Mutex::new(Vec::new()),
                shutdown,
            }),
        }
    }

    fn state_for(&self, name: &str) -> (mpsc::UnboundedSender<(Job, JobOptions)>, Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<(Job, JobOptions)>>>) {
        let mut queues = self.inner.queues.lock().expect("queue mutex");
        let state = queues.entry(name.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            QueueState {
                sender,
                receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            }
        });
        (state.sender.clone(), state.receiver.clone())
    }

    /// Enqueue a job for delivery.
    pub fn enqueue(&self, queue: &str, payload: serde_json::Value, opts: JobOptions) {
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            queue: queue.to_string(),
            payload,
            attempt: 1,
        };
        self.dispatch(job, opts);
    }

    fn dispatch(&self, job: Job, opts: JobOptions) {
        let (sender, _) = self.state_for(&job.queue);
        if opts.delay.is_zero() {
            let _ = sender.send((job, opts));
            return;
        }

        let shutdown = self.inner.shutdown.clone();
        let delay = opts.delay;
        let send_opts = JobOptions {
            delay: Duration::ZERO,
            ..opts
        };
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = sender.send((job, send_opts));
                }
                _ = shutdown.cancelled() => {}
            }
        });
    }

    /// Enqueue `payload` every `period` until shutdown.
    pub fn schedule_recurring(
        &self,
        queue: &str,
        payload: serde_json::Value,
        period: Duration,
        opts: JobOptions,
    ) {
        let this = self.clone();
        let queue = queue.to_string();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        this.enqueue(&queue, payload.clone(), opts.clone());
                    }
                    _ = shutdown.cancelled() => return,
                }
            }
        });
    }

    /// Attach `concurrency` workers to a queue.
    ///
    /// Each worker takes one job at a time; a failed delivery is re-queued
    /// with exponential backoff until the attempt cap, then dead-lettered.
    pub fn subscribe<F, Fut>(&self, queue: &str, concurrency: usize, handler: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |job| Box::pin(handler(job)));
        let (_, receiver) = self.state_for(queue);

        for worker in 0..concurrency.max(1) {
            let receiver = Arc::clone(&receiver);
            let handler = Arc::clone(&handler);
            let this = self.clone();
            let queue = queue.to_string();
            let shutdown = self.inner.shutdown.clone();

            tokio::spawn(async move {
                info!(queue = %queue, worker, "Queue worker starting");
                loop {
                    let next = {
                        let mut receiver = receiver.lock().await;
                        tokio::select! {
                            job = receiver.recv() => job,
                            _ = shutdown.cancelled() => None,
                        }
                    };
                    let Some((job, opts)) = next else {
                        info!(queue = %queue, worker, "Queue worker shutting down");
                        return;
                    };

                    let job_id = job.id.clone();
                    let attempt = job.attempt;
                    match handler(job.clone()).await {
                        Ok(()) => {}
                        Err(error) => {
                            if attempt >= opts.max_attempts {
                                warn!(
                                    queue = %queue,
                                    job_id = %job_id,
                                    attempt,
                                    error = %error,
                                    "Job exhausted attempts, dead-lettering"
                                );
                                this.inner.dead.lock().expect("dead letter mutex").push(DeadJob {
                                    job,
                                    last_error: error,
                                });
                            } else {
                                let backoff = opts
                                    .backoff_base
                                    .saturating_mul(2u32.saturating_pow(attempt.min(20) - 1))
                                    .min(opts.backoff_cap);
                                warn!(
                                    queue = %queue,
                                    job_id = %job_id,
                                    attempt,
                                    backoff_ms = backoff.as_millis() as u64,
                                    error = %error,
                                    "Job failed, retrying with backoff"
                                );
                                let retry = Job {
                                    attempt: attempt + 1,
                                    ..job
                                };
                                this.dispatch(
                                    retry,
                                    JobOptions {
                                        delay: backoff,
                                        ..opts
                                    },
                                );
                            }
                        }
                    }
                }
            });
        }
    }

    /// Jobs that exhausted their attempts.
    pub fn dead_letters(&self) -> Vec<DeadJob> {
        self.inner.dead.lock().expect("dead letter mutex").clone()
    }
}
