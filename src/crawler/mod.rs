//! Crawl orchestration: pacing scheduler, job coordination, webhook-result
//! ingestion, and the background sweeper.

pub mod coordinator;
pub mod ingest;
pub mod retry;
pub mod scheduler;

use crate::data::{crawl_jobs, crawl_queue, job_logs};
use crate::services::Service;
use crate::state::AppState;
use crate::status::ServiceStatus;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The crawler service managed by the application's `ServiceManager`.
///
/// Owns the background loops that keep orchestration honest across
/// restarts: the sweeper (revives due retries and stale submissions from
/// queue state alone) and the exclusion-rule cache refresh. The pacing
/// scheduler itself is a shared handle living in [`AppState`], since the
/// webhook path kicks it too.
pub struct CrawlerService {
    state: AppState,
    task_handles: Vec<JoinHandle<()>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl CrawlerService {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            task_handles: Vec::new(),
            shutdown_tx: None,
        }
    }

    async fn start(&mut self) {
        info!("CrawlerService starting");

        let (shutdown_tx, _) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        // Prime the exclusion cache before any product can reach the filter.
        if let Err(e) = self.state.exclusions.refresh(&self.state.db_pool).await {
            warn!(error = %e, "failed to load exclusion rules at startup");
        }

        // Prove the public webhook URL actually round-trips through the
        // fetcher. Until the callback arrives the status stays `Starting`;
        // a silent misconfiguration is visible instead of jobs stalling.
        self.state
            .service_statuses
            .set("webhook", ServiceStatus::Starting);
        match self
            .state
            .fetcher
            .submit_selftest(&self.state.config.webhook_base_url)
            .await
        {
            Ok(()) => debug!("webhook self-test submitted"),
            Err(e) => {
                warn!(error = %e, "webhook self-test submission failed");
                self.state
                    .service_statuses
                    .set("webhook", ServiceStatus::Error);
            }
        }

        let sweeper_state = self.state.clone();
        let sweeper_shutdown = shutdown_tx.subscribe();
        self.task_handles.push(tokio::spawn(async move {
            sweeper_loop(sweeper_state, sweeper_shutdown).await;
        }));

        let refresh_state = self.state.clone();
        let refresh_shutdown = shutdown_tx.subscribe();
        self.task_handles.push(tokio::spawn(async move {
            exclusion_refresh_loop(refresh_state, refresh_shutdown).await;
        }));

        self.state
            .service_statuses
            .set("crawler", ServiceStatus::Active);
        info!("CrawlerService started");
    }
}

#[async_trait::async_trait]
impl Service for CrawlerService {
    fn name(&self) -> &'static str {
        "crawler"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        self.start().await;
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        self.state
            .service_statuses
            .set("crawler", ServiceStatus::Disabled);
        info!("Shutting down crawler service");

        // Disarm all pending paced wake-ups; queue state carries the work
        // across the restart.
        self.state.scheduler.shutdown();

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        } else {
            warn!("No shutdown channel found for crawler service");
            return Err(anyhow::anyhow!("No shutdown channel available"));
        }

        let handles = std::mem::take(&mut self.task_handles);
        let results = futures::future::join_all(handles).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed_count = failed, "Some crawler tasks panicked during shutdown");
            return Err(anyhow::anyhow!("{} task(s) panicked", failed));
        }

        info!("All crawler tasks shutdown gracefully");
        Ok(())
    }
}

/// Crash-recovery safety net over the persistent queue.
///
/// Every tick: revive submitted items whose callback never arrived, kick
/// jobs whose delayed retries have come due (covering wake-ups lost to a
/// restart), and close out drained jobs whose final transition got lost.
/// The first tick runs immediately, which doubles as startup recovery.
async fn sweeper_loop(state: AppState, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(state.config.sweeper_interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep(&state).await;
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }
}

async fn sweep(state: &AppState) {
    let db_pool = &state.db_pool;

    match crawl_queue::revive_stale_submitted(
        state.config.stale_submitted_after,
        state.config.pacing.max_retries,
        db_pool,
    )
    .await
    {
        Ok((0, 0)) => {}
        Ok((revived, failed)) => {
            warn!(revived, failed, "recovered stale submitted items");
        }
        Err(e) => warn!(error = %e, "failed to sweep stale submitted items"),
    }

    match crawl_queue::jobs_with_ready_items(db_pool).await {
        Ok(job_ids) => {
            for job_id in job_ids {
                state.scheduler.kick(job_id, Duration::ZERO, false);
            }
        }
        Err(e) => warn!(error = %e, "failed to find jobs with ready items"),
    }

    match crawl_jobs::complete_drained(db_pool).await {
        Ok(job_ids) => {
            for job_id in job_ids {
                info!(job_id, "crawl job completed");
                job_logs::append_best_effort(job_id, "info", "job completed", db_pool).await;
            }
        }
        Err(e) => warn!(error = %e, "failed to complete drained jobs"),
    }
}

/// Timer-driven refresh of the process-wide exclusion-rule cache.
async fn exclusion_refresh_loop(state: AppState, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(state.config.exclusion_cache_ttl);
    // The startup refresh already happened; skip the immediate first tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = state.exclusions.refresh(&state.db_pool).await {
                    warn!(error = %e, "failed to refresh exclusion rules");
                }
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }
}
