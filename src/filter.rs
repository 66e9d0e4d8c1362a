//! Change filter: decides whether a freshly derived sample differs enough
//! from the last one a session actually received to justify a push.
//!
//! The comparison baseline is per session, so a viewer that lagged behind
//! measures change against what *it* last saw, not against what some other
//! viewer saw.

use crate::types::DerivedSample;

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// percentage points of overall CPU load
    pub cpu: f64,
    /// percentage points of memory used
    pub mem: f64,
    /// percentage points of any one partition's used space
    pub disk: f64,
    /// bytes/sec on any interface's rx or tx rate; `None` disables the check
    pub net: Option<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            mem: 1.0,
            disk: 1.0,
            net: None,
        }
    }
}

/// True when `new` should be pushed given `last` was the previous push.
/// Always true for the first sample of a session.
pub fn should_emit(
    thresholds: &Thresholds,
    new: &DerivedSample,
    last: Option<&DerivedSample>,
) -> bool {
    let last = match last {
        Some(l) => l,
        None => return true,
    };

    if (new.cpu.load - last.cpu.load).abs() >= thresholds.cpu {
        return true;
    }
    if (new.memory.used_percent - last.memory.used_percent).abs() >= thresholds.mem {
        return true;
    }
    // Compare partitions by filesystem id; a partition appearing or
    // disappearing counts as a change.
    for d in &new.disk {
        match last.disk.iter().find(|p| p.fs == d.fs) {
            Some(prev) => {
                if (d.used_percent - prev.used_percent).abs() >= thresholds.disk {
                    return true;
                }
            }
            None => return true,
        }
    }
    if new.disk.len() != last.disk.len() {
        return true;
    }
    if let Some(net) = thresholds.net {
        for n in &new.network {
            let (prev_rx, prev_tx) = last
                .network
                .iter()
                .find(|p| p.interface == n.interface)
                .map(|p| (p.rx_sec, p.tx_sec))
                .unwrap_or((0.0, 0.0));
            if (n.rx_sec - prev_rx).abs() >= net || (n.tx_sec - prev_tx).abs() >= net {
                return true;
            }
        }
    }
    false
}
