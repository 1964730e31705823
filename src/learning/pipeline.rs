//! # Learning Pipeline
//! Bounded queue of topic jobs, dedup of in-flight topics, and a
//! fixed-size worker pool fed by a single dispatcher loop.
//!
//! Invariants:
//! - a topic is marked active at enqueue time, before any worker is
//!   scheduled, so a concurrent duplicate enqueue is rejected;
//! - the active mark is cleared on every worker exit path (success,
//!   failure, cancellation) by a finisher task that nothing cancels;
//! - at most `max_parallel` workers run at once; a full pool delays
//!   dispatch, it never errors.

use metrics::{counter, gauge};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::cache::TtlCache;
use crate::learning::config::LearningConfig;
use crate::learning::ensure_metrics_described;
use crate::learning::types::{LearningResult, Outcome, TopicJob};
use crate::learning::worker::{research_topic, WorkerContext};

/// Dedup/cache key for a topic: trimmed, lowercased.
pub(crate) fn topic_key(topic: &str) -> String {
    topic.trim().to_lowercase()
}

struct Shared {
    cfg: LearningConfig,
    ctx: Arc<WorkerContext>,
    /// Topics queued or running.
    active: Mutex<HashSet<String>>,
    /// Completion-ordered ring of results, oldest evicted first.
    history: Mutex<VecDeque<LearningResult>>,
    cache: TtlCache<String, LearningResult>,
    job_tx: mpsc::Sender<TopicJob>,
    job_rx: Mutex<Option<mpsc::Receiver<TopicJob>>>,
    shutdown_tx: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    /// In-flight research tasks by topic key, for cancellation.
    workers: Mutex<HashMap<String, AbortHandle>>,
    /// Cleanup tasks; never aborted before their worker settles.
    finishers: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

pub struct LearningPipeline {
    shared: Arc<Shared>,
}

impl LearningPipeline {
    pub fn new(cfg: LearningConfig, ctx: WorkerContext) -> Self {
        ensure_metrics_described();
        let (job_tx, job_rx) = mpsc::channel(cfg.queue_bound);
        let (shutdown_tx, _) = watch::channel(false);
        let cache = TtlCache::new(cfg.cache_ttl);
        Self {
            shared: Arc::new(Shared {
                cfg,
                ctx: Arc::new(ctx),
                active: Mutex::new(HashSet::new()),
                history: Mutex::new(VecDeque::new()),
                cache,
                job_tx,
                job_rx: Mutex::new(Some(job_rx)),
                shutdown_tx,
                dispatcher: Mutex::new(None),
                workers: Mutex::new(HashMap::new()),
                finishers: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a topic for background research. Returns `false` when the
    /// pipeline is shutting down, the topic is already active, or the
    /// queue is full.
    pub fn enqueue(&self, topic: &str, sources: Option<Vec<String>>) -> bool {
        if *self.shared.shutdown_tx.borrow() {
            counter!("learning_topics_rejected_total").increment(1);
            return false;
        }
        let key = topic_key(topic);
        if key.is_empty() {
            return false;
        }

        // Mark active before anything is scheduled so a concurrent
        // duplicate is rejected even if no worker has started yet.
        {
            let mut active = self.shared.active.lock().expect("active mutex poisoned");
            if !active.insert(key.clone()) {
                counter!("learning_topics_rejected_total").increment(1);
                return false;
            }
        }

        let job = TopicJob {
            topic: topic.trim().to_string(),
            sources,
            queued_at: chrono::Utc::now(),
        };
        match self.shared.job_tx.try_send(job) {
            Ok(()) => {
                counter!("learning_topics_enqueued_total").increment(1);
                info!(topic = %topic, "topic queued for learning");
                true
            }
            Err(_) => {
                // Queue full: roll the active mark back.
                self.shared
                    .active
                    .lock()
                    .expect("active mutex poisoned")
                    .remove(&key);
                counter!("learning_topics_rejected_total").increment(1);
                warn!(topic = %topic, "learning queue full, rejecting");
                false
            }
        }
    }

    /// Best known result for a topic: fresh cache entry first, then
    /// the newest history record, else `None` ("not yet known").
    pub fn summary(&self, topic: &str) -> Option<LearningResult> {
        let key = topic_key(topic);
        if let Some(hit) = self.shared.cache.get(&key) {
            return Some(hit);
        }
        self.shared
            .history
            .lock()
            .expect("history mutex poisoned")
            .iter()
            .rev()
            .find(|r| topic_key(&r.topic) == key)
            .cloned()
    }

    /// Spawn the dispatcher. Idempotent.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let rx = self
            .shared
            .job_rx
            .lock()
            .expect("job_rx mutex poisoned")
            .take();
        let Some(rx) = rx else {
            return;
        };
        let handle = tokio::spawn(dispatch_loop(self.shared.clone(), rx));
        *self
            .shared
            .dispatcher
            .lock()
            .expect("dispatcher mutex poisoned") = Some(handle);
        info!(
            max_parallel = self.shared.cfg.max_parallel,
            queue_bound = self.shared.cfg.queue_bound,
            "learning pipeline started"
        );
    }

    /// Stop accepting work, cancel in-flight jobs, and wait (bounded)
    /// for cleanup. Idempotent: later calls are no-ops.
    pub async fn stop(&self) {
        let was_shutting_down = self.shared.shutdown_tx.send_replace(true);
        if was_shutting_down {
            return;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        info!("learning pipeline shutting down");

        // Cancel in-flight research. Abort is non-blocking, so one
        // stuck worker cannot delay cancelling the others.
        {
            let workers = self.shared.workers.lock().expect("workers mutex poisoned");
            for (topic, handle) in workers.iter() {
                info!(topic = %topic, "cancelling in-flight research");
                handle.abort();
            }
        }

        // The dispatcher exits via the shutdown watch; bound the wait.
        let dispatcher = self
            .shared
            .dispatcher
            .lock()
            .expect("dispatcher mutex poisoned")
            .take();
        if let Some(mut handle) = dispatcher {
            if tokio::time::timeout(self.shared.cfg.cleanup_timeout, &mut handle)
                .await
                .is_err()
            {
                warn!("dispatcher did not exit in time, aborting");
                handle.abort();
            }
        }

        // Finishers run the guaranteed cleanup; give them the same
        // bounded window, then sweep whatever is left.
        let deadline = tokio::time::Instant::now() + self.shared.cfg.cleanup_timeout;
        let finishers: Vec<JoinHandle<()>> = self
            .shared
            .finishers
            .lock()
            .expect("finishers mutex poisoned")
            .drain(..)
            .collect();
        for mut f in finishers {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut f).await.is_err() {
                warn!("worker cleanup timed out");
                f.abort();
            }
        }

        // Safety net: anything still tracked gets aborted.
        let stragglers: Vec<AbortHandle> = self
            .shared
            .workers
            .lock()
            .expect("workers mutex poisoned")
            .drain()
            .map(|(_, h)| h)
            .collect();
        for h in stragglers {
            h.abort();
        }

        info!("learning pipeline stopped");
    }

    /// Running, not shutting down, dispatcher alive.
    pub fn healthy(&self) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) || *self.shared.shutdown_tx.borrow() {
            return false;
        }
        self.shared
            .dispatcher
            .lock()
            .expect("dispatcher mutex poisoned")
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Topics currently queued or running, sorted.
    pub fn active_topics(&self) -> Vec<String> {
        let mut v: Vec<String> = self
            .shared
            .active
            .lock()
            .expect("active mutex poisoned")
            .iter()
            .cloned()
            .collect();
        v.sort();
        v
    }

    /// Last `n` results in completion order.
    pub fn history_snapshot(&self, n: usize) -> Vec<LearningResult> {
        let h = self.shared.history.lock().expect("history mutex poisoned");
        let len = h.len();
        h.iter().skip(len.saturating_sub(n)).cloned().collect()
    }

    /// Drop expired cache entries. Exposed for periodic sweeps.
    pub fn evict_expired_cache(&self) -> usize {
        self.shared.cache.evict_expired()
    }
}

async fn dispatch_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<TopicJob>) {
    let sem = Arc::new(Semaphore::new(shared.cfg.max_parallel));
    let mut shutdown_rx = shared.shutdown_tx.subscribe();

    loop {
        let job = tokio::select! {
            _ = shutdown_rx.changed() => break,
            maybe = rx.recv() => match maybe {
                Some(job) => job,
                None => break,
            },
        };

        // Backpressure: at capacity, dispatch waits for a permit. A
        // shutdown during the wait releases the held job's mark.
        let permit = tokio::select! {
            _ = shutdown_rx.changed() => {
                release_active(&shared, &job.topic);
                break;
            }
            acquired = sem.clone().acquire_owned() => match acquired {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        if *shutdown_rx.borrow() {
            release_active(&shared, &job.topic);
            break;
        }

        spawn_worker(&shared, job, permit);
    }

    // Jobs still queued at shutdown terminate as cancelled: their
    // active marks must not outlive the pipeline.
    while let Ok(job) = rx.try_recv() {
        release_active(&shared, &job.topic);
        counter!("learning_topics_cancelled_total").increment(1);
    }
}

fn release_active(shared: &Arc<Shared>, topic: &str) {
    shared
        .active
        .lock()
        .expect("active mutex poisoned")
        .remove(&topic_key(topic));
}

fn spawn_worker(
    shared: &Arc<Shared>,
    job: TopicJob,
    permit: tokio::sync::OwnedSemaphorePermit,
) {
    let key = topic_key(&job.topic);
    let ctx = shared.ctx.clone();
    let topic = job.topic.clone();
    let sources = job.sources.clone();

    let queued_ms = chrono::Utc::now()
        .signed_duration_since(job.queued_at)
        .num_milliseconds();
    debug!(topic = %job.topic, queued_ms, "dispatching topic");

    let research =
        tokio::spawn(async move { research_topic(&ctx, &topic, sources).await });
    shared
        .workers
        .lock()
        .expect("workers mutex poisoned")
        .insert(key.clone(), research.abort_handle());
    gauge!("learning_workers_active").increment(1.0);

    // The finisher owns the guaranteed cleanup. It awaits the worker
    // handle in a task of its own, so cancelling the worker (or the
    // pipeline being cancelled again) cannot interrupt the cleanup.
    let finisher = tokio::spawn({
        let shared = shared.clone();
        let topic = job.topic.clone();
        async move {
            let settled = research.await;

            shared
                .workers
                .lock()
                .expect("workers mutex poisoned")
                .remove(&key);
            release_active(&shared, &topic);
            gauge!("learning_workers_active").decrement(1.0);

            match settled {
                Ok(result) => {
                    match &result.outcome {
                        Outcome::Learned => {
                            info!(topic = %topic, confidence = result.confidence, "topic learned");
                            counter!("learning_topics_completed_total").increment(1);
                        }
                        Outcome::NoReliableSources => {
                            info!(topic = %topic, "no reliable sources for topic");
                            counter!("learning_topics_completed_total").increment(1);
                        }
                        Outcome::Failed { reason } => {
                            error!(topic = %topic, reason = %reason, "topic research failed");
                            counter!("learning_topics_failed_total").increment(1);
                        }
                    }
                    record(&shared, result);
                }
                Err(join_err) if join_err.is_cancelled() => {
                    info!(topic = %topic, "topic research cancelled");
                    counter!("learning_topics_cancelled_total").increment(1);
                }
                Err(join_err) => {
                    error!(topic = %topic, error = ?join_err, "topic research panicked");
                    counter!("learning_topics_failed_total").increment(1);
                    record(
                        &shared,
                        LearningResult {
                            topic: topic.clone(),
                            outcome: Outcome::Failed {
                                reason: "worker panicked".to_string(),
                            },
                            sources: Vec::new(),
                            key_points: Vec::new(),
                            confidence: 0.0,
                            produced_at: chrono::Utc::now(),
                        },
                    );
                }
            }

            drop(permit);
        }
    });

    let mut finishers = shared.finishers.lock().expect("finishers mutex poisoned");
    finishers.retain(|h| !h.is_finished());
    finishers.push(finisher);
}

/// Append to history (ring, oldest out). Everything except hard
/// failures also lands in the cache.
fn record(shared: &Arc<Shared>, result: LearningResult) {
    let key = topic_key(&result.topic);
    if !matches!(result.outcome, Outcome::Failed { .. }) {
        shared.cache.put(key, result.clone());
    }
    let mut h = shared.history.lock().expect("history mutex poisoned");
    h.push_back(result);
    while h.len() > shared.cfg.history_cap {
        h.pop_front();
    }
    gauge!("learning_history_size").set(h.len() as f64);
}
