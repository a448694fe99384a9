//! Engine configuration: constructed values, fluent overrides, env fallbacks.

use chrono::Duration as ChronoDuration;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::utils::id_generator::IdGenerator;

/// Lock manager knobs.
#[derive(Clone, Debug)]
pub struct LockConfig {
    /// Lease TTL written into the shared store.
    pub ttl: ChronoDuration,
    /// Interval of the background renewal task while a lock is held.
    pub renew_schedule_rate: Duration,
    /// Local lock cache bound (pure capacity control).
    pub cache_capacity: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: ChronoDuration::seconds(30),
            renew_schedule_rate: Duration::from_secs(10),
            cache_capacity: 100_000,
        }
    }
}

impl LockConfig {
    #[must_use]
    pub fn with_ttl(mut self, ttl: ChronoDuration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_renew_schedule_rate(mut self, rate: Duration) -> Self {
        self.renew_schedule_rate = rate;
        self
    }

    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

/// Top-level engine configuration.
///
/// `worker_id` identifies this process as a lease holder across the
/// cluster. It resolves, in order: explicit value, `FLOWMESH_WORKER_ID`
/// from the environment (a `.env` file is honored), a generated id.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub worker_id: String,
    pub lock: LockConfig,
    pub retry: RetryPolicy,
    /// Operator identity attached to callback notifications.
    pub operator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_id: Self::resolve_worker_id(None),
            lock: LockConfig::default(),
            retry: RetryPolicy::default(),
            operator: "system".to_string(),
        }
    }
}

impl EngineConfig {
    fn resolve_worker_id(provided: Option<String>) -> String {
        if let Some(id) = provided {
            return id;
        }
        dotenvy::dotenv().ok();
        std::env::var("FLOWMESH_WORKER_ID")
            .unwrap_or_else(|_| IdGenerator::new().generate_worker_id())
    }

    #[must_use]
    pub fn new(worker_id: Option<String>) -> Self {
        Self {
            worker_id: Self::resolve_worker_id(worker_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }
}
