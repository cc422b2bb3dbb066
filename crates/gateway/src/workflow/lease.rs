//! Filesystem leases bounding cron concurrency.
//!
//! One lease file per held slot under `leases/<b64(job_id)>/slot-N.json`.
//! Acquisition purges expired slot files, then claims the first free slot
//! with an exclusive create. Release removes the file only while it still
//! carries our lease id; a foreign holder is respected.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use na_domain::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronLease {
    pub lease_id: String,
    pub job_id: String,
    pub owner: String,
    pub slot: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    path: PathBuf,
}

impl CronLease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn job_dir(root: &Path, job_id: &str) -> PathBuf {
    root.join(URL_SAFE_NO_PAD.encode(job_id.as_bytes()))
}

fn read_lease(path: &Path) -> Option<CronLease> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Try to acquire a slot for `job_id`. Returns `None` when every slot is
/// held by a live lease.
pub fn acquire(
    root: &Path,
    job_id: &str,
    owner: &str,
    max_concurrency: u32,
    ttl: Duration,
) -> Result<Option<CronLease>> {
    let dir = job_dir(root, job_id);
    std::fs::create_dir_all(&dir)?;
    let now = Utc::now();

    for slot in 0..max_concurrency.max(1) {
        let path = dir.join(format!("slot-{slot}.json"));

        // Purge an expired holder before attempting the claim.
        if let Some(existing) = read_lease(&path) {
            if now > existing.expires_at {
                tracing::debug!(
                    job_id = %job_id,
                    slot,
                    expired_owner = %existing.owner,
                    "reclaiming expired cron lease"
                );
                let _ = std::fs::remove_file(&path);
            }
        }

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path);
        let mut file = match file {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::Io(e)),
        };

        let lease = CronLease {
            lease_id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_owned(),
            owner: owner.to_owned(),
            slot,
            acquired_at: now,
            expires_at: now + ttl,
            path: path.clone(),
        };
        use std::io::Write;
        let json = serde_json::to_string_pretty(&lease)?;
        file.write_all(json.as_bytes())?;
        return Ok(Some(lease));
    }

    Ok(None)
}

/// Release a lease. The slot file is removed only while its `lease_id`
/// still matches ours; a foreign holder keeps the slot.
pub fn release(lease: &CronLease) -> Result<()> {
    match read_lease(&lease.path) {
        Some(on_disk) if on_disk.lease_id == lease.lease_id => {
            std::fs::remove_file(&lease.path)?;
            Ok(())
        }
        Some(on_disk) => {
            tracing::warn!(
                job_id = %lease.job_id,
                slot = lease.slot,
                holder = %on_disk.owner,
                "slot file taken over by a foreign lease, leaving it"
            );
            Ok(())
        }
        None => Ok(()),
    }
}

/// Count live (unexpired) lease files for a job.
pub fn live_count(root: &Path, job_id: &str) -> usize {
    let dir = job_dir(root, job_id);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return 0;
    };
    let now = Utc::now();
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| read_lease(&e.path()))
        .filter(|l| now <= l.expires_at)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_most_n_live_leases() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::seconds(60);

        let a = acquire(dir.path(), "job-1", "owner-a", 2, ttl).unwrap();
        let b = acquire(dir.path(), "job-1", "owner-b", 2, ttl).unwrap();
        let c = acquire(dir.path(), "job-1", "owner-c", 2, ttl).unwrap();

        assert!(a.is_some());
        assert!(b.is_some());
        assert!(c.is_none(), "third acquisition must fail at max_concurrency=2");
        assert_eq!(live_count(dir.path(), "job-1"), 2);
    }

    #[test]
    fn release_frees_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::seconds(60);

        let lease = acquire(dir.path(), "job-1", "owner", 1, ttl).unwrap().unwrap();
        assert!(acquire(dir.path(), "job-1", "owner", 1, ttl).unwrap().is_none());

        release(&lease).unwrap();
        assert!(acquire(dir.path(), "job-1", "owner", 1, ttl).unwrap().is_some());
    }

    #[test]
    fn expired_lease_is_reclaimable() {
        let dir = tempfile::tempdir().unwrap();

        let stale = acquire(dir.path(), "job-1", "crashed", 1, Duration::seconds(-5))
            .unwrap()
            .unwrap();
        assert!(Utc::now() > stale.expires_at);
        assert_eq!(live_count(dir.path(), "job-1"), 0);

        let fresh = acquire(dir.path(), "job-1", "successor", 1, Duration::seconds(60)).unwrap();
        assert!(fresh.is_some(), "expired slot must be reclaimable");
    }

    #[test]
    fn release_respects_foreign_holder() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::seconds(60);

        let ours = acquire(dir.path(), "job-1", "us", 1, ttl).unwrap().unwrap();

        // Simulate takeover: a different lease id lands in our slot file.
        let mut foreign = ours.clone();
        foreign.lease_id = "someone-else".into();
        std::fs::write(ours.path(), serde_json::to_string(&foreign).unwrap()).unwrap();

        release(&ours).unwrap();
        assert!(
            ours.path().exists(),
            "release must not remove a foreign holder's file"
        );
    }

    #[test]
    fn jobs_are_isolated_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ttl = Duration::seconds(60);
        acquire(dir.path(), "job-a", "o", 1, ttl).unwrap().unwrap();
        let other = acquire(dir.path(), "job-b", "o", 1, ttl).unwrap();
        assert!(other.is_some());
        assert_eq!(live_count(dir.path(), "job-a"), 1);
        assert_eq!(live_count(dir.path(), "job-b"), 1);
    }
}
