// 🔒 Named leases guarding gold-layer read-modify-write
//
// A unit of work locks its site and every party it will touch. Keys are taken
// in sorted order so two units sharing parties cannot deadlock, and a busy
// key is retried with exponential backoff until the attempt budget runs out.
// The unit never proceeds against gold state without all of its leases.

use crate::config::SyncConfig;
use crate::error::{PipelineError, PipelineResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Proof of holding a lease; only the owner token can release it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub resource: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

impl LockToken {
    pub fn new(resource: &str, expires_at: DateTime<Utc>) -> Self {
        LockToken {
            resource: resource.to_string(),
            owner: uuid::Uuid::new_v4().to_string(),
            expires_at,
        }
    }
}

#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// `None` when someone else holds an unexpired lease on `resource`
    async fn try_acquire(&self, resource: &str, ttl: Duration) -> Result<Option<LockToken>>;

    /// `false` when the lease had already expired and been taken over
    async fn release(&self, token: &LockToken) -> Result<bool>;
}

pub fn site_resource(cph: &str) -> String {
    format!("site:{}", cph)
}

pub fn party_resource(customer_number: &str) -> String {
    format!("party:{}", customer_number)
}

// ============================================================================
// In-process lock
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryLock {
    leases: Mutex<HashMap<String, LockToken>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, resource: &str) -> bool {
        self.leases
            .lock()
            .map(|l| l.get(resource).is_some_and(|t| t.expires_at > Utc::now()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn try_acquire(&self, resource: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)?;
        let mut leases = self.leases.lock().map_err(|_| anyhow!("lock table mutex poisoned"))?;

        if let Some(current) = leases.get(resource) {
            if current.expires_at > now {
                return Ok(None);
            }
        }

        let token = LockToken::new(resource, now + ttl);
        leases.insert(resource.to_string(), token.clone());
        Ok(Some(token))
    }

    async fn release(&self, token: &LockToken) -> Result<bool> {
        let mut leases = self.leases.lock().map_err(|_| anyhow!("lock table mutex poisoned"))?;
        match leases.get(&token.resource) {
            Some(current) if current.owner == token.owner => {
                leases.remove(&token.resource);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// Retry with backoff
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        RetryPolicy {
            initial: Duration::from_millis(config.lock_retry_initial_ms),
            max: Duration::from_millis(config.lock_retry_max_ms),
            max_attempts: config.lock_max_attempts,
        }
    }

    /// Delay after the given failed attempt (1-based), doubling up to `max`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from_config(&SyncConfig::default())
    }
}

pub async fn acquire_with_retry<L>(
    lock: &L,
    resource: &str,
    ttl: Duration,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> PipelineResult<LockToken>
where
    L: DistributedLock + ?Sized,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        if let Some(token) = lock.try_acquire(resource, ttl).await? {
            if attempt > 1 {
                debug!(resource, attempt, "Lock acquired after retry");
            }
            return Ok(token);
        }

        if attempt >= policy.max_attempts {
            return Err(PipelineError::LockContention {
                resource: resource.to_string(),
                attempts: attempt,
            });
        }

        let delay = policy.backoff(attempt);
        warn!(
            resource,
            attempt,
            backoff_ms = delay.as_millis() as u64,
            "Lock busy, will retry after backoff"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled { stage: "lock" }),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

// ============================================================================
// Ordered multi-key acquisition
// ============================================================================

/// All leases held by one unit of work
#[derive(Debug, Default)]
pub struct LockSet {
    tokens: Vec<LockToken>,
}

impl LockSet {
    /// Acquire every resource in sorted order. On failure, leases already
    /// taken are released before the error is returned.
    pub async fn acquire<L>(
        lock: &L,
        mut resources: Vec<String>,
        ttl: Duration,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> PipelineResult<LockSet>
    where
        L: DistributedLock + ?Sized,
    {
        resources.sort();
        resources.dedup();

        let mut set = LockSet::default();
        for resource in &resources {
            match acquire_with_retry(lock, resource, ttl, policy, cancel).await {
                Ok(token) => set.tokens.push(token),
                Err(err) => {
                    if let Err(release_err) = set.release(lock).await {
                        warn!(error = %release_err, "Failed to release partial lock set");
                    }
                    return Err(err);
                }
            }
        }
        Ok(set)
    }

    pub fn resources(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.resource.as_str()).collect()
    }

    /// Release in reverse acquisition order
    pub async fn release<L>(self, lock: &L) -> Result<()>
    where
        L: DistributedLock + ?Sized,
    {
        for token in self.tokens.iter().rev() {
            if !lock.release(token).await? {
                warn!(resource = %token.resource, "Lease expired before release");
            }
        }
        Ok(())
    }
}
