//! Background reply detection. One task, one cycle at a time; inside a cycle
//! each awaiting record is checked independently under its own timeout.

use std::time::Duration;

use futures_util::{StreamExt, stream};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use outreach_db::models::ReplyCandidate;

use crate::replies::{ReplyOutcome, check_candidate};
use crate::state::{AppState, run_db};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Records checked in parallel within one cycle.
    pub concurrency: usize,
    /// Upper bound on one record's token refresh plus thread fetch.
    pub record_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            concurrency: 4,
            record_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub replied: usize,
    pub failed: usize,
}

pub struct ReplyPoller;

impl ReplyPoller {
    /// Spawn the recurring task. The first cycle runs immediately.
    pub fn start(state: AppState, config: PollerConfig) -> PollerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Reply poller started (every {:?})", config.interval);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    report = run_cycle(&state, &config) => {
                        if report.checked > 0 {
                            info!(
                                "Reply poll: {} checked, {} replied, {} failed",
                                report.checked, report.replied, report.failed
                            );
                        }
                    }
                }
            }

            info!("Reply poller stopped");
        });

        PollerHandle { cancel, task }
    }
}

pub struct PollerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the poller and wait for it to exit. An in-flight cycle is dropped;
    /// every transition it could have made is a single statement, so nothing
    /// is left half-applied.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("Reply poller task failed: {}", e);
        }
    }
}

/// Check every awaiting record once.
pub async fn run_cycle(state: &AppState, config: &PollerConfig) -> CycleReport {
    let candidates = match run_db(state, |db| db.reply_candidates()).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load reply candidates: {:#}", e);
            return CycleReport::default();
        }
    };
    check_all(state, candidates, config).await
}

/// Check a set of candidates with bounded concurrency. Shared with the
/// webhook's mailbox-wide re-check.
pub async fn check_all(state: &AppState, candidates: Vec<ReplyCandidate>, config: &PollerConfig) -> CycleReport {
    let mut report = CycleReport {
        checked: candidates.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        return report;
    }

    let record_timeout = config.record_timeout;
    let mut results = stream::iter(candidates)
        .map(|candidate| {
            let state = state.clone();
            async move {
                let outcome = tokio::time::timeout(record_timeout, check_candidate(&state, &candidate)).await;
                (candidate, outcome)
            }
        })
        .buffer_unordered(config.concurrency.max(1));

    while let Some((candidate, outcome)) = results.next().await {
        match outcome {
            Ok(Ok(ReplyOutcome::Closed { .. })) => report.replied += 1,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                report.failed += 1;
                warn!(
                    "Reply check failed for application {} (thread {}): {}",
                    candidate.application_id, candidate.thread_id, e
                );
            }
            Err(_) => {
                report.failed += 1;
                warn!(
                    "Reply check timed out for application {} (thread {})",
                    candidate.application_id, candidate.thread_id
                );
            }
        }
    }

    debug!("Cycle finished: {:?}", report);
    report
}
