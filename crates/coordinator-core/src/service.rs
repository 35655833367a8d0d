//! Service table: per-service concurrency and sliding-window rate
//! admission.
//!
//! A `Service` is a named admission bucket. It does not execute anything
//! itself; the scheduler consults [`ServiceTable::can_admit`] before
//! dispatching a unit bound to that service, and calls
//! [`ServiceTable::reserve`] / [`ServiceTable::release`] around the
//! handler invocation.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::CoordinatorError;

/// A parsed rate limit: at most `count` dispatches per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub count: u32,
    pub window: Duration,
}

/// Parse a rate-limit string:
///
/// ```text
/// rate := INT "/" unit
/// unit := "sec" | "min" | "hour" | INT
/// ```
///
/// `"60/min"` -> 60 per 60s. `"1000/hour"` -> 1000 per 3600s.
/// `"10/sec"` -> 10 per 1s. `"3/60"` -> 3 per 60s.
pub fn parse_rate(spec: &str) -> Result<RateLimit, CoordinatorError> {
    let (count_str, unit_str) = spec.split_once('/').ok_or_else(|| {
        CoordinatorError::RateFormatError(format!(
            "expected \"<count>/<unit>\", got {spec:?}"
        ))
    })?;

    let count: u32 = count_str.parse().map_err(|_| {
        CoordinatorError::RateFormatError(format!("not an integer count: {count_str:?}"))
    })?;

    let seconds = match unit_str {
        "sec" => 1,
        "min" => 60,
        "hour" => 3600,
        other => other.parse::<u64>().map_err(|_| {
            CoordinatorError::RateFormatError(format!(
                "unit must be sec/min/hour or an integer second count, got {other:?}"
            ))
        })?,
    };

    if seconds == 0 {
        return Err(CoordinatorError::RateFormatError(
            "window must be a positive number of seconds".to_string(),
        ));
    }

    Ok(RateLimit {
        count,
        window: Duration::from_secs(seconds),
    })
}

/// Registered configuration for one named service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub concurrent: Option<u32>,
    pub rate: Option<RateLimit>,
}

impl ServiceSpec {
    /// Two specs are "the same" registration iff their limits match.
    /// Used to detect conflicting `register_service` calls.
    fn conflicts_with(&self, other: &ServiceSpec) -> bool {
        self.concurrent != other.concurrent || self.rate != other.rate
    }
}

/// Live counters for a single service: active-use count and a ring of
/// recent dispatch timestamps for the sliding rate window.
#[derive(Debug, Default)]
struct ServiceCounters {
    active_count: u32,
    dispatch_ring: VecDeque<DateTime<Utc>>,
}

impl ServiceCounters {
    /// Evict ring entries that have aged out of `window`, then return the
    /// number remaining (the windowed dispatch count).
    fn evict_and_count(&mut self, window: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        while let Some(front) = self.dispatch_ring.front() {
            if *front <= cutoff {
                self.dispatch_ring.pop_front();
            } else {
                break;
            }
        }
        self.dispatch_ring.len()
    }
}

/// Holds every registered service's limits and live usage counters.
#[derive(Debug, Default)]
pub struct ServiceTable {
    specs: HashMap<String, ServiceSpec>,
    counters: HashMap<String, ServiceCounters>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, or validate an idempotent re-registration.
    /// Returns `CONFIG_ERROR` if the name is already registered with
    /// different limits.
    pub fn register(
        &mut self,
        name: &str,
        concurrent: Option<u32>,
        rate: Option<RateLimit>,
    ) -> Result<(), CoordinatorError> {
        let spec = ServiceSpec {
            name: name.to_string(),
            concurrent,
            rate,
        };
        if let Some(existing) = self.specs.get(name) {
            if existing.conflicts_with(&spec) {
                return Err(CoordinatorError::ConfigError(format!(
                    "service {name:?} already registered with different parameters"
                )));
            }
            return Ok(());
        }
        self.specs.insert(name.to_string(), spec);
        self.counters.insert(name.to_string(), ServiceCounters::default());
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// True iff a dispatch to `service` may proceed right now: the
    /// concurrency ceiling has headroom and the sliding rate window has
    /// not been exhausted.
    pub fn can_admit(&mut self, service: &str, now: DateTime<Utc>) -> bool {
        let Some(spec) = self.specs.get(service) else {
            // Unregistered services admit unconditionally; task
            // registration already validated the service exists, so this
            // only happens for services nobody ever registered tasks
            // against, which callers cannot reach through the public API.
            return true;
        };
        let concurrent_ok = match spec.concurrent {
            Some(limit) => {
                let active = self.counters.get(service).map(|c| c.active_count).unwrap_or(0);
                active < limit
            }
            None => true,
        };
        if !concurrent_ok {
            return false;
        }
        match spec.rate {
            Some(rate) => {
                let counters = self.counters.entry(service.to_string()).or_default();
                let windowed = counters.evict_and_count(rate.window, now);
                (windowed as u32) < rate.count
            }
            None => true,
        }
    }

    /// Reserve a slot: increment `active_count` and record a dispatch
    /// timestamp. Must only be called immediately after `can_admit`
    /// returned true for the same service.
    pub fn reserve(&mut self, service: &str, now: DateTime<Utc>) {
        let counters = self.counters.entry(service.to_string()).or_default();
        counters.active_count += 1;
        counters.dispatch_ring.push_back(now);
    }

    /// Release a slot held by a terminated handler invocation.
    pub fn release(&mut self, service: &str) {
        if let Some(counters) = self.counters.get_mut(service) {
            counters.active_count = counters.active_count.saturating_sub(1);
        }
    }

    pub fn active_count(&self, service: &str) -> u32 {
        self.counters.get(service).map(|c| c.active_count).unwrap_or(0)
    }
}
