// search-mcp-server/src/rate_limit.rs
// ============================================================================
// Module: Rate Limiting
// Description: Token-bucket rate limiter keyed by tier and identifier.
// Purpose: Bound request rates per caller without penalizing idle callers.
// Dependencies: serde, tokio
// ============================================================================

//! ## Overview
//! Each (tier, identifier) pair owns a token bucket refilled on read from a
//! monotonic clock. Buckets are created lazily at full capacity. A periodic
//! sweep evicts buckets that are simultaneously idle and effectively full;
//! eviction never changes the outcome of an in-flight check.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum idle time before a bucket becomes evictable.
pub const DEFAULT_IDLE_EVICTION: Duration = Duration::from_secs(60 * 60);
/// Period of the background eviction sweep.
pub const DEFAULT_EVICTION_PERIOD: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Capacity and refill rate for one tier.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierLimits {
    /// Maximum tokens a bucket can hold.
    #[serde(rename = "maxTokens")]
    pub max_tokens: f64,
    /// Tokens added per second.
    #[serde(rename = "refillRate")]
    pub refill_rate: f64,
}

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Tier limits keyed by tier name.
    pub tiers: BTreeMap<String, TierLimits>,
    /// Idle time before a full bucket becomes evictable.
    pub idle_eviction: Duration,
    /// Period of the background eviction sweep.
    pub eviction_period: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert(
            "default".to_string(),
            TierLimits {
                max_tokens: 100.0,
                refill_rate: 10.0,
            },
        );
        tiers.insert(
            "authenticated".to_string(),
            TierLimits {
                max_tokens: 1000.0,
                refill_rate: 50.0,
            },
        );
        tiers.insert(
            "premium".to_string(),
            TierLimits {
                max_tokens: 5000.0,
                refill_rate: 200.0,
            },
        );
        Self {
            tiers,
            idle_eviction: DEFAULT_IDLE_EVICTION,
            eviction_period: DEFAULT_EVICTION_PERIOD,
        }
    }
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Whole tokens left after the check.
    pub remaining: u64,
    /// Milliseconds until the bucket is full again.
    #[serde(rename = "resetAfterMs")]
    pub reset_after_ms: u64,
    /// Seconds before a retry can succeed; present only on denial.
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Snapshot statistics for the limiter.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    /// Live buckets across all tiers.
    #[serde(rename = "totalBuckets")]
    pub total_buckets: usize,
    /// Live bucket counts per tier.
    #[serde(rename = "bucketsByTier")]
    pub buckets_by_tier: BTreeMap<String, u64>,
    /// Configured tier limits.
    pub tiers: BTreeMap<String, TierLimits>,
}

// ============================================================================
// SECTION: Limiter
// ============================================================================

/// Rolling state for one (tier, identifier) pair.
///
/// # Invariants
/// - `0 <= tokens <= max_tokens` at every observation.
#[derive(Debug)]
struct Bucket {
    /// Current token balance.
    tokens: f64,
    /// Last refill instant; doubles as the last-use marker.
    last_refill: Instant,
    /// Tier capacity.
    max_tokens: f64,
    /// Tier refill rate in tokens per second.
    refill_rate: f64,
}

impl Bucket {
    /// Refills from the elapsed time and clamps to capacity.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Milliseconds until the bucket reaches capacity.
    fn reset_after_ms(&self) -> u64 {
        if self.refill_rate <= 0.0 {
            return 0;
        }
        let deficit = self.max_tokens - self.tokens;
        (deficit / self.refill_rate * 1000.0).ceil() as u64
    }
}

/// Token-bucket rate limiter keyed by (tier, identifier).
pub struct RateLimiter {
    /// Limiter configuration.
    config: RateLimiterConfig,
    /// Buckets keyed by (tier, identifier).
    buckets: Mutex<HashMap<(String, String), Bucket>>,
}

impl RateLimiter {
    /// Creates a limiter from configuration.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Checks and updates the bucket for the given caller.
    ///
    /// Unknown tiers fall back to the `default` tier; with no tiers
    /// configured at all the limiter allows everything.
    pub fn check(&self, tier: &str, identifier: &str, cost: f64) -> RateLimitDecision {
        let Some(limits) = self
            .config
            .tiers
            .get(tier)
            .or_else(|| self.config.tiers.get("default"))
            .copied()
        else {
            return RateLimitDecision {
                allowed: true,
                remaining: u64::MAX,
                reset_after_ms: 0,
                retry_after_secs: None,
            };
        };
        let now = Instant::now();
        let Ok(mut buckets) = self.buckets.lock() else {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_after_ms: 0,
                retry_after_secs: Some(1),
            };
        };
        let bucket = buckets
            .entry((tier.to_string(), identifier.to_string()))
            .or_insert_with(|| Bucket {
                tokens: limits.max_tokens,
                last_refill: now,
                max_tokens: limits.max_tokens,
                refill_rate: limits.refill_rate,
            });
        bucket.refill(now);
        if bucket.tokens >= cost {
            bucket.tokens -= cost;
            RateLimitDecision {
                allowed: true,
                remaining: bucket.tokens.floor() as u64,
                reset_after_ms: bucket.reset_after_ms(),
                retry_after_secs: None,
            }
        } else {
            let deficit = cost - bucket.tokens;
            let retry_after_secs = if bucket.refill_rate > 0.0 {
                ((deficit / bucket.refill_rate).ceil() as u64).max(1)
            } else {
                u64::MAX
            };
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_after_ms: bucket.reset_after_ms(),
                retry_after_secs: Some(retry_after_secs),
            }
        }
    }

    /// Removes buckets that are idle past the threshold and effectively full.
    ///
    /// Returns the number of evicted buckets.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let threshold = self.config.idle_eviction;
        let Ok(mut buckets) = self.buckets.lock() else {
            return 0;
        };
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            let idle = now.duration_since(bucket.last_refill);
            if idle < threshold {
                return true;
            }
            let effective = (bucket.tokens + idle.as_secs_f64() * bucket.refill_rate)
                .min(bucket.max_tokens);
            effective < bucket.max_tokens
        });
        before - buckets.len()
    }

    /// Returns a snapshot of bucket counts and tier configuration.
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        let mut total_buckets = 0;
        let mut buckets_by_tier = BTreeMap::new();
        if let Ok(table) = self.buckets.lock() {
            total_buckets = table.len();
            for (tier, _) in table.keys() {
                *buckets_by_tier.entry(tier.clone()).or_insert(0u64) += 1;
            }
        }
        RateLimiterStats {
            total_buckets,
            buckets_by_tier,
            tiers: self.config.tiers.clone(),
        }
    }

    /// Spawns the periodic best-effort eviction sweep.
    #[must_use]
    pub fn spawn_eviction(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let period = limiter.config.eviction_period;
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                limiter.evict_idle();
            }
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_with(tier: &str, max_tokens: f64, refill_rate: f64) -> RateLimiter {
        let mut tiers = BTreeMap::new();
        tiers.insert(
            tier.to_string(),
            TierLimits {
                max_tokens,
                refill_rate,
            },
        );
        RateLimiter::new(RateLimiterConfig {
            tiers,
            idle_eviction: DEFAULT_IDLE_EVICTION,
            eviction_period: DEFAULT_EVICTION_PERIOD,
        })
    }

    #[test]
    fn successive_checks_on_full_bucket_count_down() {
        let limiter = limiter_with("default", 10.0, 0.0);
        let first = limiter.check("default", "caller", 1.0);
        let second = limiter.check("default", "caller", 1.0);
        assert!(first.allowed);
        assert!(second.allowed);
        assert_eq!(first.remaining, 9);
        assert_eq!(second.remaining, 8);
    }

    #[test]
    fn empty_bucket_denies_with_positive_retry_after() {
        let limiter = limiter_with("default", 2.0, 0.0);
        assert!(limiter.check("default", "caller", 1.0).allowed);
        assert!(limiter.check("default", "caller", 1.0).allowed);
        let denied = limiter.check("default", "caller", 1.0);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after_secs.is_some_and(|secs| secs > 0));
    }

    #[test]
    fn full_cost_drains_bucket_exactly() {
        let limiter = limiter_with("default", 5.0, 0.0);
        let drained = limiter.check("default", "caller", 5.0);
        assert!(drained.allowed);
        assert_eq!(drained.remaining, 0);
        let denied = limiter.check("default", "caller", 5.0);
        assert!(!denied.allowed);
    }

    #[test]
    fn retry_after_reflects_refill_rate() {
        let limiter = limiter_with("default", 1.0, 0.5);
        assert!(limiter.check("default", "caller", 1.0).allowed);
        let denied = limiter.check("default", "caller", 1.0);
        assert_eq!(denied.retry_after_secs, Some(2));
    }

    #[test]
    fn buckets_are_isolated_per_identifier_and_tier() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        let drained = limiter.check("default", "a", 100.0);
        assert!(drained.allowed);
        assert!(limiter.check("default", "b", 1.0).allowed);
        assert!(limiter.check("authenticated", "a", 1.0).allowed);
        assert!(!limiter.check("default", "a", 100.0).allowed);
    }

    #[test]
    fn unknown_tier_falls_back_to_default_limits() {
        let limiter = limiter_with("default", 1.0, 0.0);
        assert!(limiter.check("mystery", "caller", 1.0).allowed);
        assert!(!limiter.check("mystery", "caller", 1.0).allowed);
    }

    #[test]
    fn eviction_spares_drained_buckets() {
        let mut tiers = BTreeMap::new();
        tiers.insert(
            "default".to_string(),
            TierLimits {
                max_tokens: 2.0,
                refill_rate: 0.0,
            },
        );
        let limiter = RateLimiter::new(RateLimiterConfig {
            tiers,
            idle_eviction: Duration::ZERO,
            eviction_period: DEFAULT_EVICTION_PERIOD,
        });
        limiter.check("default", "full", 0.0);
        limiter.check("default", "drained", 2.0);
        let evicted = limiter.evict_idle();
        assert_eq!(evicted, 1);
        assert_eq!(limiter.stats().total_buckets, 1);
    }

    #[test]
    fn stats_count_buckets_per_tier() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        limiter.check("default", "a", 1.0);
        limiter.check("default", "b", 1.0);
        limiter.check("authenticated", "a", 1.0);
        let stats = limiter.stats();
        assert_eq!(stats.total_buckets, 3);
        assert_eq!(stats.buckets_by_tier.get("default"), Some(&2));
        assert_eq!(stats.buckets_by_tier.get("authenticated"), Some(&1));
    }
}
