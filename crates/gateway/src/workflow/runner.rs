//! The cron scheduler loop.
//!
//! Ticks on an interval, triggers due enabled jobs, and bounds per-job
//! concurrency with filesystem leases.

use chrono::{Duration, Utc};

use na_store::CronJob;

use crate::state::AppState;
use crate::workflow::{execute_job, lease};

pub struct CronRunner {
    owner: String,
}

impl Default for CronRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CronRunner {
    pub fn new() -> Self {
        Self {
            owner: format!("nextai-{}", std::process::id()),
        }
    }

    /// One scheduler tick: spawn a run for every due, enabled job that
    /// can claim a lease slot.
    pub async fn tick(&self, state: &AppState) {
        let now = Utc::now();
        for job in state.store.cron_jobs() {
            if !job.enabled {
                continue;
            }
            let cron_state = state.store.cron_state(&job.id);
            let due = cron_state
                .last_run_at
                .map_or(true, |last| now >= last + Duration::seconds(job.interval_secs as i64));
            if !due {
                continue;
            }

            let ttl = Duration::seconds(state.config.runtime.cron_lease_ttl_secs as i64);
            match lease::acquire(
                &state.leases_root,
                &job.id,
                &self.owner,
                job.max_concurrency,
                ttl,
            ) {
                Ok(Some(held)) => {
                    tracing::info!(job_id = %job.id, slot = held.slot, "cron job starting");
                    tokio::spawn(run_job(state.clone(), job, held));
                }
                Ok(None) => {
                    tracing::debug!(job_id = %job.id, "cron job skipped, no free lease slot");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "cron lease acquisition failed");
                }
            }
        }
    }
}

async fn run_job(state: AppState, job: CronJob, held: lease::CronLease) {
    let job_id = job.id.clone();
    if let Err(e) = state.store.update_cron_state(&job_id, |cs| {
        cs.last_run_at = Some(Utc::now());
        cs.last_status = "running".into();
        cs.run_count += 1;
    }) {
        tracing::warn!(job_id = %job_id, error = %e, "cron state update failed");
    }

    let result = execute_job(&state, &job).await;

    let update = state.store.update_cron_state(&job_id, |cs| match &result {
        Ok(()) => {
            cs.last_status = "ok".into();
            cs.last_error = None;
        }
        Err(e) => {
            cs.last_status = "failed".into();
            cs.last_error = Some(e.to_string());
        }
    });
    if let Err(e) = update {
        tracing::warn!(job_id = %job_id, error = %e, "cron state update failed");
    }

    match &result {
        Ok(()) => tracing::info!(job_id = %job_id, "cron job finished"),
        Err(e) => tracing::warn!(job_id = %job_id, error = %e, "cron job failed"),
    }

    if let Err(e) = lease::release(&held) {
        tracing::warn!(job_id = %job_id, error = %e, "cron lease release failed");
    }
}
