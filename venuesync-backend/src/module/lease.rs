///! Advisory job leases
///!
///! Single-flight guard for long-running jobs. A lease is keyed by job name,
///! expires after its TTL and is released when its guard is dropped.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::clock::Clock;

#[derive(Debug, Clone)]
struct Lease {
    token: Uuid,
    expires_at: DateTime<Utc>,
}

/// Table of held leases, shared by everything that may start the same job
pub struct JobLeases {
    clock: Arc<dyn Clock>,
    leases: Arc<Mutex<HashMap<String, Lease>>>,
}

impl JobLeases {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            leases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Take the lease for `job` unless a live one is held elsewhere.
    pub fn try_acquire(&self, job: &str, ttl: Duration) -> Option<LeaseGuard> {
        let now = self.clock.now();
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(held) = leases.get(job) {
            if held.expires_at > now {
                tracing::debug!("Lease '{}' is held until {}", job, held.expires_at);
                return None;
            }
            tracing::warn!("Lease '{}' expired at {}, taking it over", job, held.expires_at);
        }

        let token = Uuid::now_v7();
        leases.insert(
            job.to_string(),
            Lease {
                token,
                expires_at: now + ttl,
            },
        );

        Some(LeaseGuard {
            job: job.to_string(),
            token,
            leases: self.leases.clone(),
        })
    }

    /// Whether a live lease is currently held for `job`
    pub fn is_held(&self, job: &str) -> bool {
        let now = self.clock.now();
        let leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        leases.get(job).is_some_and(|l| l.expires_at > now)
    }
}

/// Releases the lease on drop, unless another holder has taken it over since
pub struct LeaseGuard {
    job: String,
    token: Uuid,
    leases: Arc<Mutex<HashMap<String, Lease>>>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        if leases.get(&self.job).is_some_and(|l| l.token == self.token) {
            leases.remove(&self.job);
        }
    }
}
