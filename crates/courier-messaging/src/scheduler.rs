use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use courier_core::{
    now_ms, Address, Message, MiddlewareError, ResultFuture, ResultSink, Transport, TransportError,
};

/// Configuration for the send scheduler worker pool and retry behavior.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.2,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), MiddlewareError> {
        if self.workers == 0 {
            return Err(MiddlewareError::InvalidConfiguration(
                "scheduler worker count must be greater than 0".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(MiddlewareError::InvalidConfiguration(
                "scheduler queue capacity must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(MiddlewareError::InvalidConfiguration(format!(
                "jitter factor {} must be within [0,1]",
                self.jitter_factor
            )));
        }
        if self.base_delay > self.max_delay {
            return Err(MiddlewareError::InvalidConfiguration(
                "base delay must not exceed max delay".into(),
            ));
        }
        Ok(())
    }
}

/// One send request: a message bound for a resolved address, plus an
/// optional completion slot the originator holds the other half of.
#[derive(Debug)]
pub struct MessageJob {
    pub address: Address,
    pub message: Message,
    attempt: u32,
    completion: Option<ResultSink<()>>,
}

impl MessageJob {
    pub fn new(address: Address, message: Message) -> Self {
        Self {
            address,
            message,
            attempt: 0,
            completion: None,
        }
    }

    /// Job whose terminal outcome (delivered, expired, fatal) is reported
    /// back through the returned future.
    pub fn tracked(address: Address, message: Message) -> (Self, ResultFuture<()>) {
        let (sink, future) = courier_core::result_pair();
        (
            Self {
                address,
                message,
                attempt: 0,
                completion: Some(sink),
            },
            future,
        )
    }

    fn finish(mut self, outcome: Result<(), MiddlewareError>) {
        if let Some(sink) = self.completion.take() {
            match outcome {
                Ok(()) => sink.resolve(()),
                Err(err) => sink.fail(err),
            }
        }
    }
}

struct QueuedJob {
    job: MessageJob,
    not_before: Instant,
}

/// Retries delivery of each message until acknowledgment by the transport
/// or expiry of the message's own ttl. Bounded queue, fixed worker pool;
/// no cross-message ordering guarantee.
pub struct SendScheduler {
    tx: mpsc::Sender<QueuedJob>,
    shutdown: CancellationToken,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    retries: Arc<AtomicU64>,
}

#[derive(Clone)]
struct WorkerContext {
    transport: Arc<dyn Transport>,
    config: SchedulerConfig,
    tx: mpsc::Sender<QueuedJob>,
    shutdown: CancellationToken,
    retries: Arc<AtomicU64>,
}

impl SendScheduler {
    /// Spawn the worker pool. Must be called from within a tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: SchedulerConfig,
    ) -> Result<Self, MiddlewareError> {
        config.validate()?;
        let (tx, rx) = mpsc::channel::<QueuedJob>(config.queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let shutdown = CancellationToken::new();
        let retries = Arc::new(AtomicU64::new(0));

        let ctx = WorkerContext {
            transport,
            config: config.clone(),
            tx: tx.clone(),
            shutdown: shutdown.clone(),
            retries: Arc::clone(&retries),
        };
        let workers = (0..config.workers)
            .map(|worker| tokio::spawn(worker_loop(ctx.clone(), Arc::clone(&rx), worker)))
            .collect();

        Ok(Self {
            tx,
            shutdown,
            workers: parking_lot::Mutex::new(workers),
            retries,
        })
    }

    /// Enqueue a job for delivery after `delay`.
    ///
    /// Rejects work that cannot possibly complete: an already-expired
    /// message fails with `ExpiredMessage` before any transport call, and a
    /// full queue fails with `SendBufferFull` as the back-pressure signal.
    /// The job's completion slot always receives the same terminal outcome
    /// the caller gets.
    pub fn schedule(&self, job: MessageJob, delay: Duration) -> Result<(), MiddlewareError> {
        let now = now_ms();
        if job.message.is_expired(now) {
            let err = MiddlewareError::ExpiredMessage {
                expiry_date_ms: job.message.expiry_date_ms,
                now_ms: now,
            };
            job.finish(Err(err.clone()));
            return Err(err);
        }
        if self.shutdown.is_cancelled() {
            let err = MiddlewareError::MessageNotSent("scheduler is shut down".into());
            job.finish(Err(err.clone()));
            return Err(err);
        }

        let queued = QueuedJob {
            job,
            not_before: Instant::now() + delay,
        };
        match self.tx.try_send(queued) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(rejected)) => {
                rejected.job.finish(Err(MiddlewareError::SendBufferFull));
                Err(MiddlewareError::SendBufferFull)
            }
            Err(TrySendError::Closed(rejected)) => {
                let err = MiddlewareError::MessageNotSent("scheduler queue closed".into());
                rejected.job.finish(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Total transient-failure retries attempted since construction.
    pub fn total_retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Stop accepting work and wind down workers, abandoning in-flight
    /// retries. Never raises; problems are logged and swallowed.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "scheduler worker ended abnormally during shutdown");
            }
        }
        debug!("send scheduler shut down");
    }
}

async fn worker_loop(
    ctx: WorkerContext,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedJob>>>,
    worker: usize,
) {
    loop {
        let queued = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            next = recv_next(&rx) => match next {
                Some(queued) => queued,
                None => break,
            },
        };

        let wait = queued.not_before.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tokio::select! {
                _ = ctx.shutdown.cancelled() => {
                    debug!(worker, "delivery abandoned during shutdown");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let mut job = queued.job;
        let now = now_ms();
        if job.message.is_expired(now) {
            warn!(message_id = %job.message.id, attempt = job.attempt, "ttl expired before delivery");
            job.finish(Err(MiddlewareError::MessageNotSent(
                "ttl expired before delivery".into(),
            )));
            continue;
        }

        match ctx.transport.send(&job.address, &job.message).await {
            Ok(()) => {
                trace!(worker, message_id = %job.message.id, attempt = job.attempt, "message delivered");
                job.finish(Ok(()));
            }
            Err(err @ TransportError::Fatal(_)) => {
                warn!(message_id = %job.message.id, error = %err, "fatal send failure, abandoning");
                job.finish(Err(MiddlewareError::MessageNotSent(err.to_string())));
            }
            Err(TransportError::Transient(reason)) => {
                job.attempt += 1;
                ctx.retries.fetch_add(1, Ordering::Relaxed);
                let delay = retry_delay(&ctx.config, job.attempt);
                debug!(
                    message_id = %job.message.id,
                    attempt = job.attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason,
                    "transient send failure, rescheduling"
                );
                resubmit(ctx.tx.clone(), ctx.shutdown.clone(), job, delay);
            }
        }
    }
}

async fn recv_next(rx: &Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedJob>>>) -> Option<QueuedJob> {
    rx.lock().await.recv().await
}

/// Re-queue after the backoff sleep without occupying a worker slot for the
/// duration of the delay.
fn resubmit(
    tx: mpsc::Sender<QueuedJob>,
    shutdown: CancellationToken,
    job: MessageJob,
    delay: Duration,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(message_id = %job.message.id, "retry abandoned during shutdown");
            }
            _ = tokio::time::sleep(delay) => {
                let message_id = job.message.id.clone();
                let queued = QueuedJob {
                    job,
                    not_before: Instant::now(),
                };
                if tx.send(queued).await.is_err() {
                    debug!(message_id = %message_id, "scheduler queue closed, retry dropped");
                }
            }
        }
    });
}

/// Capped exponential backoff with jitter.
fn retry_delay(config: &SchedulerConfig, attempt: u32) -> Duration {
    let exp = config.base_delay.as_millis() as f64
        * 2.0_f64.powi(attempt.saturating_sub(1) as i32);
    let capped = exp.min(config.max_delay.as_millis() as f64);
    let jitter_range = capped * config.jitter_factor;
    let jitter = if jitter_range > 0.0 {
        rand::thread_rng().gen_range(-jitter_range..=jitter_range)
    } else {
        0.0
    };
    Duration::from_millis((capped + jitter).max(1.0) as u64)
}
