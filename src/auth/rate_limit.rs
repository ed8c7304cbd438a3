// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-IP token-bucket rate limiting.
//!
//! Three global tiers apply to every request: 10/s burst, 100/min
//! sustained, 1000/h. Sensitive auth routes carry an extra, tighter
//! bucket (login 5/min, registration 3/min, refresh 10/min). A request
//! passes only if every applicable bucket has a token; tokens are taken
//! from all buckets together so tiers cannot drift.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Route classes with their own extra bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Everything without a tighter limit.
    General,
    Login,
    Register,
    Refresh,
}

/// (capacity, refill per second)
type TierSpec = (f64, f64);

const TIER_BURST: TierSpec = (10.0, 10.0);
const TIER_SUSTAINED: TierSpec = (100.0, 100.0 / 60.0);
const TIER_HOURLY: TierSpec = (1000.0, 1000.0 / 3600.0);

fn route_tier(class: RouteClass) -> Option<TierSpec> {
    match class {
        RouteClass::General => None,
        RouteClass::Login => Some((5.0, 5.0 / 60.0)),
        RouteClass::Register => Some((3.0, 3.0 / 60.0)),
        RouteClass::Refresh => Some((10.0, 10.0 / 60.0)),
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

impl Bucket {
    fn refill(&mut self, spec: TierSpec, now: DateTime<Utc>) {
        let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * spec.1).min(spec.0);
        self.last_refill = now;
    }

    /// Seconds until one token is available.
    fn retry_after(&self, spec: TierSpec) -> u64 {
        if self.tokens >= 1.0 {
            0
        } else {
            ((1.0 - self.tokens) / spec.1).ceil() as u64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BucketKey {
    Burst,
    Sustained,
    Hourly,
    Route(RouteClass),
}

/// Shared per-IP limiter.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<(IpAddr, BucketKey), Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and consume one request from every applicable bucket.
    ///
    /// On rejection returns the number of seconds after which a retry can
    /// succeed (for the `Retry-After` header).
    pub fn check(&self, ip: IpAddr, class: RouteClass, now: DateTime<Utc>) -> Result<(), u64> {
        let mut specs: Vec<(BucketKey, TierSpec)> = vec![
            (BucketKey::Burst, TIER_BURST),
            (BucketKey::Sustained, TIER_SUSTAINED),
            (BucketKey::Hourly, TIER_HOURLY),
        ];
        if let Some(spec) = route_tier(class) {
            specs.push((BucketKey::Route(class), spec));
        }

        let mut buckets = self.buckets.lock().expect("rate limiter mutex");

        // Refill everything first, then admit only if all have a token.
        let mut retry_after = 0u64;
        for (key, spec) in &specs {
            let bucket = buckets.entry((ip, *key)).or_insert(Bucket {
                tokens: spec.0,
                last_refill: now,
            });
            bucket.refill(*spec, now);
            if bucket.tokens < 1.0 {
                retry_after = retry_after.max(bucket.retry_after(*spec));
            }
        }
        if retry_after > 0 {
            return Err(retry_after.max(1));
        }

        for (key, _) in &specs {
            if let Some(bucket) = buckets.get_mut(&(ip, *key)) {
                bucket.tokens -= 1.0;
            }
        }
        Ok(())
    }
}
