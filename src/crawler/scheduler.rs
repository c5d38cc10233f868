//! The pacing scheduler.
//!
//! Reshapes the bursty output of the webhook path into a paced stream of
//! fetcher submissions: one item per wake-up, a uniform random delay
//! between consecutive submissions of the same job, random selection
//! within a priority tier, and a warm-up gate that holds product
//! submissions until the ready queue is deep enough to shuffle.

use crate::config::PacingConfig;
use crate::crawler::retry;
use crate::data::crawl_jobs::ProgressField;
use crate::data::models::CrawlJobStatus;
use crate::data::{crawl_jobs, crawl_queue, job_logs};
use crate::fetcher::{CorrelationId, FetcherClient};
use rand::Rng;
use sqlx::PgPool;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Uniform draw from [min, max] seconds at millisecond granularity.
///
/// Millisecond granularity keeps the empirical inter-submission
/// distribution smooth instead of quantized to whole seconds.
pub fn uniform_pace_delay(pacing: &PacingConfig) -> Duration {
    let min = pacing.submit_delay_min_seconds;
    let max = pacing.submit_delay_max_seconds.max(min);
    let millis = rand::rng().random_range((min * 1000)..=(max * 1000));
    Duration::from_millis(millis)
}

struct SchedulerInner {
    db_pool: PgPool,
    fetcher: Arc<FetcherClient>,
    pacing: PacingConfig,
    /// Jobs with a wake-up already scheduled; the value accumulates the
    /// warm-up-gate bypass flag of collapsed kicks.
    pending: Mutex<HashMap<i64, bool>>,
    cancel: CancellationToken,
}

/// Cheaply clonable handle driving per-job submission timelines.
///
/// All state a wake-up needs lives in the queue store, so a restarted
/// process reconstructs pending work from the database alone; the in-memory
/// part is only the set of armed timers.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(db_pool: PgPool, fetcher: Arc<FetcherClient>, pacing: PacingConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                db_pool,
                fetcher,
                pacing,
                pending: Mutex::new(HashMap::new()),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// A uniform random inter-submission delay.
    pub fn pace_delay(&self) -> Duration {
        uniform_pace_delay(&self.inner.pacing)
    }

    /// Schedule a wake-up for a job after `delay`.
    ///
    /// Edge-triggered and idempotent: while a wake-up is armed for the job,
    /// further kicks collapse into it (bypass flags are OR-ed together).
    /// `bypass_gate` is set by the webhook path when the triggering result
    /// came from a search or pagination page, so discovery is never stalled
    /// by the warm-up gate waiting on itself.
    pub fn kick(&self, job_id: i64, delay: Duration, bypass_gate: bool) {
        {
            let mut pending = self.inner.pending.lock().expect("pending lock poisoned");
            match pending.entry(job_id) {
                Entry::Occupied(mut entry) => {
                    *entry.get_mut() |= bypass_gate;
                    return;
                }
                Entry::Vacant(entry) => {
                    entry.insert(bypass_gate);
                }
            }
        }

        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = scheduler.inner.cancel.cancelled() => {
                    scheduler.take_pending(job_id);
                }
                _ = tokio::time::sleep(delay) => {
                    let bypass = scheduler.take_pending(job_id);
                    scheduler.wake(job_id, bypass).await;
                }
            }
        });
    }

    /// Stop all armed wake-ups. Queue state is untouched; a later start (or
    /// the sweeper) re-arms from the database.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    fn take_pending(&self, job_id: i64) -> bool {
        self.inner
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&job_id)
            .unwrap_or(false)
    }

    /// One wake-up: decide the gate, claim one ready item, submit it, and
    /// arm the next paced wake-up.
    async fn wake(&self, job_id: i64, bypass_gate: bool) {
        let db_pool = &self.inner.db_pool;

        match crawl_jobs::status(job_id, db_pool).await {
            Ok(Some(CrawlJobStatus::Running)) => {}
            Ok(other) => {
                debug!(job_id, status = ?other, "skipping wake-up for non-running job");
                return;
            }
            Err(e) => {
                warn!(job_id, error = %e, "failed to load job status on wake-up");
                return;
            }
        }

        // Warm-up gate: while discovery is still in flight and the ready
        // pool of product items is shallow, hold product submissions so
        // shuffle-selection has entropy to work with. Discovery items are
        // always allowed through.
        let mut discovery_only = false;
        if !bypass_gate {
            match crawl_queue::ready_shape(job_id, db_pool).await {
                Ok(shape) => {
                    let gate_closed = shape.product_ready
                        < self.inner.pacing.warmup_queue_depth
                        && shape.discovery_in_flight > 0;
                    if gate_closed {
                        if shape.discovery_ready > 0 {
                            discovery_only = true;
                        } else {
                            debug!(
                                job_id,
                                product_ready = shape.product_ready,
                                "warm-up gate closed; awaiting discovery results"
                            );
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(job_id, error = %e, "failed to evaluate warm-up gate");
                }
            }
        }

        let item = match crawl_queue::claim_next_ready(job_id, discovery_only, db_pool).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                // Nothing ready: either everything is in flight or the job
                // has drained. Completion is evaluated here so the last
                // callback's kick closes the job.
                match crawl_jobs::try_complete(job_id, db_pool).await {
                    Ok(true) => {
                        info!(job_id, "crawl job completed");
                        job_logs::append_best_effort(job_id, "info", "job completed", db_pool)
                            .await;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(job_id, error = %e, "completion check failed"),
                }
                return;
            }
            Err(e) => {
                warn!(job_id, error = %e, "failed to claim next queue item");
                return;
            }
        };

        let submitted_field = if item.url_type.is_discovery() {
            ProgressField::SearchUrlsSubmitted
        } else {
            ProgressField::ProductUrlsSubmitted
        };
        if let Err(e) = crawl_jobs::bump_progress(job_id, submitted_field, 1, db_pool).await {
            warn!(job_id, error = %e, "failed to bump submission counter");
        }

        let correlation = CorrelationId::new(job_id, item.url_type, item.id);
        debug!(
            job_id,
            item_id = item.id,
            kind = item.url_type.as_str(),
            url = %item.url,
            attempt = item.retry_count + 1,
            "submitting to fetcher"
        );
        job_logs::append_best_effort(
            job_id,
            "info",
            &format!(
                "submitted {} {} (attempt {})",
                item.url_type.as_str(),
                item.url,
                item.retry_count + 1
            ),
            db_pool,
        )
        .await;

        if let Err(e) = self
            .inner
            .fetcher
            .submit(&item.url, &correlation.to_string())
            .await
        {
            warn!(job_id, item_id = item.id, error = %e, "fetcher submission failed");
            if let Err(retry_err) = retry::handle_item_failure(
                &item,
                &format!("fetcher submission failed: {e}"),
                false,
                &self.inner.pacing,
                db_pool,
            )
            .await
            {
                warn!(job_id, item_id = item.id, error = %retry_err, "retry handling failed");
            }
        }

        // Pace the next submission regardless of this one's outcome.
        self.kick(job_id, self.pace_delay(), false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pace_delays_stay_inside_the_configured_band() {
        let pacing = PacingConfig::default();
        for _ in 0..500 {
            let delay = uniform_pace_delay(&pacing);
            assert!(
                (Duration::from_secs(5)..=Duration::from_secs(15)).contains(&delay),
                "delay {delay:?} outside [5s, 15s]"
            );
        }
    }

    #[test]
    fn pace_delays_spread_over_the_band() {
        // A uniform draw over [5s, 15s] should land in both halves of the
        // band well within 500 samples.
        let pacing = PacingConfig::default();
        let (mut low, mut high) = (0, 0);
        for _ in 0..500 {
            if uniform_pace_delay(&pacing) < Duration::from_secs(10) {
                low += 1;
            } else {
                high += 1;
            }
        }
        assert!(low > 50, "only {low} draws in the lower half");
        assert!(high > 50, "only {high} draws in the upper half");
    }

    #[test]
    fn inverted_bounds_collapse_to_the_minimum() {
        let pacing = PacingConfig {
            submit_delay_min_seconds: 10,
            submit_delay_max_seconds: 2,
            ..PacingConfig::default()
        };
        let delay = uniform_pace_delay(&pacing);
        assert_eq!(delay, Duration::from_secs(10));
    }
}
