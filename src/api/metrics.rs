//! Metrics Collection
//!
//! Counters for the peer transport, exposed through the HTTP API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for the peer transport
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Handshakes accepted
    pub handshakes_accepted: AtomicU64,

    /// Handshakes rejected
    pub handshakes_rejected: AtomicU64,

    /// RPC calls answered (success or failure)
    pub rpc_calls: AtomicU64,

    /// RPC calls answered with a failure response
    pub rpc_failures: AtomicU64,

    /// Sessions currently open
    pub active_sessions: AtomicU64,

    /// Peers written to the directory by discovery
    pub peers_discovered: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn inc_handshakes_accepted(&self) {
        self.handshakes_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_handshakes_rejected(&self) {
        self.handshakes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one answered call
    pub fn record_rpc(&self, success: bool) {
        self.rpc_calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.rpc_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        // Saturating: never wrap below zero
        let _ = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn add_peers_discovered(&self, count: u64) {
        self.peers_discovered.fetch_add(count, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let series = [
            ("uptime_seconds", "Service uptime in seconds", "gauge", self.uptime_secs()),
            (
                "handshakes_accepted",
                "Accepted handshakes",
                "counter",
                self.handshakes_accepted.load(Ordering::Relaxed),
            ),
            (
                "handshakes_rejected",
                "Rejected handshakes",
                "counter",
                self.handshakes_rejected.load(Ordering::Relaxed),
            ),
            (
                "rpc_calls_total",
                "RPC calls answered",
                "counter",
                self.rpc_calls.load(Ordering::Relaxed),
            ),
            (
                "rpc_failures_total",
                "RPC calls answered with a failure",
                "counter",
                self.rpc_failures.load(Ordering::Relaxed),
            ),
            (
                "active_sessions",
                "Open peer sessions",
                "gauge",
                self.active_sessions.load(Ordering::Relaxed),
            ),
            (
                "peers_discovered",
                "Peers written to the directory by discovery",
                "counter",
                self.peers_discovered.load(Ordering::Relaxed),
            ),
        ];

        let mut output = String::new();
        for (name, help, kind, value) in series {
            output.push_str(&format!(
                "# HELP kratos_peer_rpc_{name} {help}\n\
                 # TYPE kratos_peer_rpc_{name} {kind}\n\
                 kratos_peer_rpc_{name} {value}\n\n"
            ));
        }
        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "handshakes": {
                "accepted": self.handshakes_accepted.load(Ordering::Relaxed),
                "rejected": self.handshakes_rejected.load(Ordering::Relaxed),
            },
            "rpc": {
                "calls": self.rpc_calls.load(Ordering::Relaxed),
                "failures": self.rpc_failures.load(Ordering::Relaxed),
            },
            "active_sessions": self.active_sessions.load(Ordering::Relaxed),
            "peers_discovered": self.peers_discovered.load(Ordering::Relaxed),
        })
    }
}
