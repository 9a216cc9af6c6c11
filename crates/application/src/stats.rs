//! Interceptor counters
//!
//! Every counter is kept locally as an atomic, so tests and operators can take
//! a [`StatsSnapshot`], and mirrored to the `metrics` facade so whatever
//! recorder the host process installs sees the same numbers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of [`InterceptorStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Calls that entered the interceptor
    pub rpcs_observed: u64,
    /// Calls matched by a subscription
    pub rpcs_intercepted: u64,
    /// Faults popped from preloaded queues
    pub preloaded_faults_served: u64,
    /// Messages forwarded to a controller
    pub round_trips: u64,
    /// Round trips abandoned because no reply arrived in time
    pub controller_timeouts: u64,
    /// Messages that continued unmodified after a failed round trip
    pub pass_through_fallbacks: u64,
    /// Controller replies handed to a waiting message
    pub replies_delivered: u64,
    /// Controller replies nobody was waiting for
    pub replies_dropped: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
}

/// Atomic counters for interceptor activity
#[derive(Debug, Default)]
pub struct InterceptorStats {
    rpcs_observed: AtomicU64,
    rpcs_intercepted: AtomicU64,
    preloaded_faults_served: AtomicU64,
    round_trips: AtomicU64,
    controller_timeouts: AtomicU64,
    pass_through_fallbacks: AtomicU64,
    replies_delivered: AtomicU64,
    replies_dropped: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
}

impl InterceptorStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rpc_observed(&self) {
        self.rpcs_observed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faultline_rpcs_observed_total").increment(1);
    }

    pub fn rpc_intercepted(&self) {
        self.rpcs_intercepted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faultline_rpcs_intercepted_total").increment(1);
    }

    pub fn preloaded_fault_served(&self) {
        self.preloaded_faults_served.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faultline_preloaded_faults_total").increment(1);
    }

    pub fn round_trip(&self) {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faultline_round_trips_total").increment(1);
    }

    pub fn controller_timeout(&self) {
        self.controller_timeouts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faultline_controller_timeouts_total").increment(1);
    }

    pub fn pass_through(&self, reason: &'static str) {
        self.pass_through_fallbacks.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faultline_pass_through_total", "reason" => reason).increment(1);
    }

    pub fn reply(&self, delivered: bool) {
        if delivered {
            self.replies_delivered.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("faultline_replies_total", "outcome" => "delivered").increment(1);
        } else {
            self.replies_dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("faultline_replies_total", "outcome" => "dropped").increment(1);
        }
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faultline_sessions_total", "event" => "opened").increment(1);
    }

    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("faultline_sessions_total", "event" => "closed").increment(1);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rpcs_observed: self.rpcs_observed.load(Ordering::Relaxed),
            rpcs_intercepted: self.rpcs_intercepted.load(Ordering::Relaxed),
            preloaded_faults_served: self.preloaded_faults_served.load(Ordering::Relaxed),
            round_trips: self.round_trips.load(Ordering::Relaxed),
            controller_timeouts: self.controller_timeouts.load(Ordering::Relaxed),
            pass_through_fallbacks: self.pass_through_fallbacks.load(Ordering::Relaxed),
            replies_delivered: self.replies_delivered.load(Ordering::Relaxed),
            replies_dropped: self.replies_dropped.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
        }
    }
}
