//! Rolling metric history: four bounded, time-windowed buffers (cpu,
//! memory, network download/upload) plus the last known full sample,
//! persisted as JSON so a restart can serve charts to late joiners.
//!
//! Loading is deliberately forgiving: a missing, truncated or
//! wrong-shaped file degrades to empty history, never to an error.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PersistenceError;
use crate::types::DerivedSample;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// chart label, local wall-clock `HH:MM:SS`
    pub time: String,
    pub value: f64,
    /// capture instant, unix epoch milliseconds
    pub timestamp: i64,
}

/// FIFO buffer capped both by point count and by point age.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    points: VecDeque<HistoryPoint>,
    cap: usize,
    window_ms: i64,
}

impl HistoryBuffer {
    pub fn new(cap: usize, window: Duration) -> Self {
        Self {
            points: VecDeque::with_capacity(cap),
            cap,
            window_ms: window.as_millis() as i64,
        }
    }

    pub fn from_points(points: Vec<HistoryPoint>, cap: usize, window: Duration) -> Self {
        let mut buf = Self::new(cap, window);
        for p in points {
            buf.push(p);
        }
        buf
    }

    /// Append a point, evicting anything older than the window first and
    /// then the oldest points until under capacity. A zero-capacity buffer
    /// stores nothing.
    pub fn push(&mut self, point: HistoryPoint) {
        if self.cap == 0 {
            return;
        }
        let horizon = point.timestamp - self.window_ms;
        while self.points.front().is_some_and(|p| p.timestamp < horizon) {
            self.points.pop_front();
        }
        while self.points.len() >= self.cap {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_vec(&self) -> Vec<HistoryPoint> {
        self.points.iter().cloned().collect()
    }
}

// ---------- Persisted shapes ----------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedNetwork {
    #[serde(default)]
    pub download: Vec<HistoryPoint>,
    #[serde(default)]
    pub upload: Vec<HistoryPoint>,
}

/// On-disk history record. Field layout matches what the dashboard's
/// history endpoint serves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedHistory {
    #[serde(default)]
    pub cpu: Vec<HistoryPoint>,
    #[serde(default)]
    pub memory: Vec<HistoryPoint>,
    #[serde(default)]
    pub network: PersistedNetwork,
    #[serde(default)]
    pub timestamp: String,
}

/// What `/api/history` returns and what a freshly connected viewer gets
/// before the first live tick.
#[derive(Debug, Clone, Serialize)]
pub struct HistorySnapshot {
    #[serde(flatten)]
    pub history: PersistedHistory,
    #[serde(rename = "lastSample", skip_serializing_if = "Option::is_none")]
    pub last_sample: Option<Arc<DerivedSample>>,
}

// ---------- Storage medium ----------

/// Durable storage for the two records. Loads never fail: corrupt or
/// absent state comes back as defaults.
pub trait HistorySink: Send + Sync {
    fn save_history(&self, history: &PersistedHistory) -> Result<(), PersistenceError>;
    fn load_history(&self) -> PersistedHistory;
    fn save_last_sample(&self, sample: &DerivedSample) -> Result<(), PersistenceError>;
    fn load_last_sample(&self) -> Option<DerivedSample>;
}

/// JSON files in a data directory: `history.json` and `last_sample.json`.
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn history_path(&self) -> PathBuf {
        self.dir.join("history.json")
    }

    fn last_sample_path(&self) -> PathBuf {
        self.dir.join("last_sample.json")
    }

    /// Write next to the target and rename over it, so a crash mid-write
    /// leaves the old file intact rather than a half-written one.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl HistorySink for JsonFileSink {
    fn save_history(&self, history: &PersistedHistory) -> Result<(), PersistenceError> {
        let data = serde_json::to_vec(history)?;
        self.write_atomic(&self.history_path(), &data)
    }

    fn load_history(&self) -> PersistedHistory {
        let raw = match fs::read_to_string(self.history_path()) {
            Ok(s) => s,
            Err(_) => return PersistedHistory::default(),
        };
        // Field-by-field recovery: one malformed channel must not wipe the
        // others, and a non-object file means no history at all.
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("history file unreadable, starting empty: {e}");
                return PersistedHistory::default();
            }
        };
        let channel = |v: Option<&serde_json::Value>| -> Vec<HistoryPoint> {
            v.cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default()
        };
        PersistedHistory {
            cpu: channel(value.get("cpu")),
            memory: channel(value.get("memory")),
            network: PersistedNetwork {
                download: channel(value.get("network").and_then(|n| n.get("download"))),
                upload: channel(value.get("network").and_then(|n| n.get("upload"))),
            },
            timestamp: value
                .get("timestamp")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn save_last_sample(&self, sample: &DerivedSample) -> Result<(), PersistenceError> {
        let data = serde_json::to_vec(sample)?;
        self.write_atomic(&self.last_sample_path(), &data)
    }

    fn load_last_sample(&self) -> Option<DerivedSample> {
        let raw = fs::read_to_string(self.last_sample_path()).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

// ---------- The store ----------

pub struct HistoryStore {
    cpu: HistoryBuffer,
    memory: HistoryBuffer,
    download: HistoryBuffer,
    upload: HistoryBuffer,
    last_sample: Option<Arc<DerivedSample>>,
    sink: Box<dyn HistorySink>,
}

impl HistoryStore {
    /// Restore the store from durable state (or defaults when there is
    /// none worth keeping).
    pub fn load(sink: Box<dyn HistorySink>, cap: usize, window: Duration) -> Self {
        let persisted = sink.load_history();
        let last_sample = sink.load_last_sample().map(Arc::new);
        Self {
            cpu: HistoryBuffer::from_points(persisted.cpu, cap, window),
            memory: HistoryBuffer::from_points(persisted.memory, cap, window),
            download: HistoryBuffer::from_points(persisted.network.download, cap, window),
            upload: HistoryBuffer::from_points(persisted.network.upload, cap, window),
            last_sample,
            sink,
        }
    }

    /// Record one engine tick: append to all four channels, remember the
    /// sample for late joiners, persist both records. Persistence failure
    /// is logged and the store keeps going in memory.
    pub fn record(&mut self, sample: &Arc<DerivedSample>) {
        let time = Utc
            .timestamp_millis_opt(sample.timestamp)
            .single()
            .unwrap_or_else(Utc::now)
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string();
        let point = |value: f64| HistoryPoint {
            time: time.clone(),
            value,
            timestamp: sample.timestamp,
        };

        let (rx_sec, tx_sec) = sample.primary_rates();
        self.cpu.push(point(sample.cpu.load));
        self.memory.push(point(sample.memory.used_percent));
        self.download.push(point(rx_sec));
        self.upload.push(point(tx_sec));
        self.last_sample = Some(sample.clone());

        let history = self.persisted();
        if let Err(e) = self.sink.save_history(&history) {
            warn!("history not persisted: {e}");
        }
        if let Err(e) = self.sink.save_last_sample(sample) {
            warn!("last sample not persisted: {e}");
        }
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            history: self.persisted(),
            last_sample: self.last_sample.clone(),
        }
    }

    pub fn last_sample(&self) -> Option<Arc<DerivedSample>> {
        self.last_sample.clone()
    }

    fn persisted(&self) -> PersistedHistory {
        PersistedHistory {
            cpu: self.cpu.to_vec(),
            memory: self.memory.to_vec(),
            network: PersistedNetwork {
                download: self.download.to_vec(),
                upload: self.upload.to_vec(),
            },
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn pt(ts: i64, value: f64) -> HistoryPoint {
        HistoryPoint {
            time: "00:00:00".into(),
            value,
            timestamp: ts,
        }
    }

    fn sample(ts: i64, cpu: f64, rx: f64, tx: f64) -> Arc<DerivedSample> {
        Arc::new(DerivedSample {
            cpu: CpuReport {
                load: cpu,
                cores: 1,
                per_core: Vec::new(),
            },
            memory: MemoryReport {
                total: 100,
                used: 50,
                used_percent: 50.0,
            },
            disk: Vec::new(),
            network: vec![NetReport {
                interface: "eth0".into(),
                rx_sec: rx,
                tx_sec: tx,
                rx_bytes: 0,
                tx_bytes: 0,
            }],
            os: OsFacts {
                platform: "linux".into(),
                distro: "d".into(),
                release: "r".into(),
                hostname: "h".into(),
                uptime: 0,
            },
            timestamp: ts,
        })
    }

    /// Discards writes; loads nothing. For exercising the in-memory side.
    struct NullSink;
    impl HistorySink for NullSink {
        fn save_history(&self, _: &PersistedHistory) -> Result<(), PersistenceError> {
            Ok(())
        }
        fn load_history(&self) -> PersistedHistory {
            PersistedHistory::default()
        }
        fn save_last_sample(&self, _: &DerivedSample) -> Result<(), PersistenceError> {
            Ok(())
        }
        fn load_last_sample(&self) -> Option<DerivedSample> {
            None
        }
    }

    #[test]
    fn buffer_never_exceeds_cap_and_evicts_fifo() {
        let mut buf = HistoryBuffer::new(3, Duration::from_secs(3600));
        for i in 0..10 {
            buf.push(pt(i * 1_000, i as f64));
            assert!(buf.len() <= 3);
        }
        let values: Vec<f64> = buf.to_vec().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn degenerate_capacities_still_hold_the_cap() {
        let mut none = HistoryBuffer::new(0, Duration::from_secs(3600));
        none.push(pt(0, 1.0));
        none.push(pt(1_000, 2.0));
        assert_eq!(none.len(), 0);

        let mut one = HistoryBuffer::new(1, Duration::from_secs(3600));
        one.push(pt(0, 1.0));
        one.push(pt(1_000, 2.0));
        let values: Vec<f64> = one.to_vec().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0]);
    }

    #[test]
    fn points_older_than_window_are_evicted_under_capacity() {
        let mut buf = HistoryBuffer::new(100, Duration::from_secs(60));
        buf.push(pt(0, 1.0));
        buf.push(pt(30_000, 2.0));
        // 90s later: the first point is past the window, second is not
        buf.push(pt(90_000, 3.0));
        let values: Vec<f64> = buf.to_vec().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 3.0]);
    }

    #[test]
    fn store_records_all_four_channels() {
        let mut store = HistoryStore::load(Box::new(NullSink), 30, Duration::from_secs(3600));
        store.record(&sample(1_000, 42.0, 1_024.0, 512.0));
        let snap = store.snapshot();
        assert_eq!(snap.history.cpu[0].value, 42.0);
        assert_eq!(snap.history.memory[0].value, 50.0);
        assert_eq!(snap.history.network.download[0].value, 1_024.0);
        assert_eq!(snap.history.network.upload[0].value, 512.0);
        assert!(snap.last_sample.is_some());
    }

    #[test]
    fn file_sink_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let history = PersistedHistory {
            cpu: vec![pt(1, 1.0), pt(2, 2.0)],
            memory: vec![pt(1, 60.0)],
            network: PersistedNetwork {
                download: vec![pt(1, 100.0)],
                upload: vec![pt(1, 50.0)],
            },
            timestamp: "2026-01-01T00:00:00Z".into(),
        };
        sink.save_history(&history).unwrap();
        let loaded = sink.load_history();
        assert_eq!(loaded.cpu, history.cpu);
        assert_eq!(loaded.memory, history.memory);
        assert_eq!(loaded.network.download, history.network.download);
        assert_eq!(loaded.network.upload, history.network.upload);

        let s = sample(5, 10.0, 0.0, 0.0);
        sink.save_last_sample(&s).unwrap();
        assert_eq!(sink.load_last_sample().unwrap().timestamp, 5);
    }

    #[test]
    fn corrupt_history_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{ definitely not json").unwrap();
        let sink = JsonFileSink::new(dir.path());
        let loaded = sink.load_history();
        assert!(loaded.cpu.is_empty());
        assert!(loaded.network.download.is_empty());
    }

    #[test]
    fn malformed_channel_resets_only_that_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"{"cpu": 42, "memory": [{"time":"t","value":1.5,"timestamp":9}], "network": {"download": "no"}}"#,
        )
        .unwrap();
        let sink = JsonFileSink::new(dir.path());
        let loaded = sink.load_history();
        assert!(loaded.cpu.is_empty());
        assert_eq!(
            loaded.memory,
            vec![HistoryPoint {
                time: "t".into(),
                value: 1.5,
                timestamp: 9,
            }]
        );
        assert!(loaded.network.download.is_empty());
    }

    #[test]
    fn corrupt_last_sample_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("last_sample.json"), "[1,2,3]").unwrap();
        let sink = JsonFileSink::new(dir.path());
        assert!(sink.load_last_sample().is_none());
    }
}
