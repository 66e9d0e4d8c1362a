//! Shared engine state: persistent sysinfo handles, the published-sample
//! channel and the history store.
//!
//! Writer discipline: only the engine tick in `sampler.rs` mutates the
//! sysinfo handles, the previous snapshot and the history store. Session
//! loops observe the latest `DerivedSample` through the watch channel,
//! which hands them a complete published value, never a mid-update view.

use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::sync::Arc;

use sysinfo::{Disks, Networks, System};
use tokio::sync::{watch, Mutex};

use crate::config::Config;
use crate::history::HistoryStore;
use crate::types::DerivedSample;
use crate::uptime::SiteStatus;

pub type SharedSample = Option<Arc<DerivedSample>>;

#[derive(Clone)]
pub struct AppState {
    pub sys: Arc<Mutex<System>>,
    pub networks: Arc<Mutex<Networks>>,
    pub disks: Arc<Mutex<Disks>>,
    pub history: Arc<Mutex<HistoryStore>>,
    pub config: Arc<Config>,
    pub hostname: String,

    /// latest published sample; `None` until the first tick completes
    pub sample_tx: watch::Sender<SharedSample>,
    pub sample_rx: watch::Receiver<SharedSample>,

    /// latest uptime-probe results, one entry per monitored site
    pub site_status_tx: watch::Sender<Vec<SiteStatus>>,
    pub site_status_rx: watch::Receiver<Vec<SiteStatus>>,

    /// flipped to true once, when the process is asked to stop
    pub shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,

    pub client_count: Arc<AtomicUsize>,
    next_session_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: Config, history: HistoryStore) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        // Keep Networks alive across ticks so cumulative totals accrue
        let networks = Networks::new_with_refreshed_list();
        let disks = Disks::new_with_refreshed_list();

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".into());

        let (sample_tx, sample_rx) = watch::channel(None);
        let (site_status_tx, site_status_rx) = watch::channel(Vec::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            sys: Arc::new(Mutex::new(sys)),
            networks: Arc::new(Mutex::new(networks)),
            disks: Arc::new(Mutex::new(disks)),
            history: Arc::new(Mutex::new(history)),
            config: Arc::new(config),
            hostname,
            sample_tx,
            sample_rx,
            site_status_tx,
            site_status_rx,
            shutdown_tx,
            shutdown_rx,
            client_count: Arc::new(AtomicUsize::new(0)),
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_session_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Latest published sample, if any tick has completed.
    pub fn latest_sample(&self) -> SharedSample {
        self.sample_rx.borrow().clone()
    }
}
