//! Data types pushed to dashboard viewers over WebSocket.
//! Keep this module minimal and stable — it defines the wire format.
//!
//! The engine carries raw numeric values only (bytes, bytes/sec, percent);
//! human formatting is the dashboard's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point-in-time readout of the host counters. Built fresh on every
/// engine tick and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RawCounterSnapshot {
    pub cpu_load: f64,
    /// One entry per logical core, insertion order = core index.
    pub per_core: Vec<f32>,
    pub mem_total: u64,
    pub mem_used: u64,
    pub disks: Vec<DiskPartition>,
    pub interfaces: Vec<IfaceCounters>,
    pub os: OsFacts,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DiskPartition {
    pub fs: String,
    pub size: u64,
    pub used: u64,
    pub available: u64,
}

/// Cumulative interface counters as reported by the OS. Monotonic in the
/// common case, but they reset on interface restart, so downstream delta
/// math must tolerate a later value being smaller than an earlier one.
#[derive(Debug, Clone)]
pub struct IfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub up: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsFacts {
    pub platform: String,
    pub distro: String,
    pub release: String,
    pub hostname: String,
    pub uptime: u64,
}

// ---------- Derived sample (the push-channel message body) ----------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreLoad {
    pub core: usize,
    pub load: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuReport {
    pub load: f64,
    pub cores: usize,
    #[serde(rename = "perCore", default, skip_serializing_if = "Vec::is_empty")]
    pub per_core: Vec<CoreLoad>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryReport {
    pub total: u64,
    pub used: u64,
    #[serde(rename = "usedPercent")]
    pub used_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskReport {
    pub fs: String,
    pub size: u64,
    pub used: u64,
    pub available: u64,
    #[serde(rename = "usedPercent")]
    pub used_percent: f64,
}

/// Per-interface throughput plus the raw counters it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetReport {
    pub interface: String,
    /// bytes/sec, clamped at zero on counter reset
    pub rx_sec: f64,
    pub tx_sec: f64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// A snapshot with throughput derived from the previous one. This is what
/// sessions push, what `/api/system-info` returns, and what gets persisted
/// as the last-known sample for late joiners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedSample {
    pub cpu: CpuReport,
    pub memory: MemoryReport,
    pub disk: Vec<DiskReport>,
    pub network: Vec<NetReport>,
    pub os: OsFacts,
    /// capture instant, unix epoch milliseconds
    pub timestamp: i64,
}

impl DerivedSample {
    /// Throughput of the first interface, the one charted by the history
    /// channels. `(rx_sec, tx_sec)`, zero when the host has no interfaces.
    pub fn primary_rates(&self) -> (f64, f64) {
        self.network
            .first()
            .map(|n| (n.rx_sec, n.tx_sec))
            .unwrap_or((0.0, 0.0))
    }
}
