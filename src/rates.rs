//! Rate calculator: turns cumulative interface byte counters into
//! throughput using the wall-clock time between two snapshots.
//!
//! Counters reset when an interface restarts or rolls over, so a later
//! reading can be smaller than an earlier one; rates are clamped at zero
//! rather than ever going negative. CPU, memory and disk are instantaneous
//! percentages and pass through without differencing.

use crate::types::{
    CoreLoad, CpuReport, DerivedSample, DiskReport, MemoryReport, NetReport, RawCounterSnapshot,
};

pub fn derive(previous: Option<&RawCounterSnapshot>, current: &RawCounterSnapshot) -> DerivedSample {
    let elapsed_secs = previous
        .map(|p| {
            let ms = current
                .taken_at
                .signed_duration_since(p.taken_at)
                .num_milliseconds();
            ms as f64 / 1000.0
        })
        .unwrap_or(0.0);

    let network = current
        .interfaces
        .iter()
        .map(|iface| {
            let (rx_sec, tx_sec) = match previous {
                Some(prev) if elapsed_secs > 0.0 => prev
                    .interfaces
                    .iter()
                    .find(|p| p.name == iface.name)
                    .map(|p| {
                        // wrapping_sub would hide a reset; a signed diff
                        // clamped at zero is what we want
                        let rx = iface.rx_bytes as f64 - p.rx_bytes as f64;
                        let tx = iface.tx_bytes as f64 - p.tx_bytes as f64;
                        ((rx / elapsed_secs).max(0.0), (tx / elapsed_secs).max(0.0))
                    })
                    .unwrap_or((0.0, 0.0)),
                _ => (0.0, 0.0),
            };
            NetReport {
                interface: iface.name.clone(),
                rx_sec,
                tx_sec,
                rx_bytes: iface.rx_bytes,
                tx_bytes: iface.tx_bytes,
            }
        })
        .collect();

    let disk = current
        .disks
        .iter()
        .map(|d| DiskReport {
            fs: d.fs.clone(),
            size: d.size,
            used: d.used,
            available: d.available,
            used_percent: percent(d.used, d.size),
        })
        .collect();

    DerivedSample {
        cpu: CpuReport {
            load: current.cpu_load,
            cores: current.per_core.len(),
            per_core: current
                .per_core
                .iter()
                .enumerate()
                .map(|(core, &load)| CoreLoad { core, load })
                .collect(),
        },
        memory: MemoryReport {
            total: current.mem_total,
            used: current.mem_used,
            used_percent: percent(current.mem_used, current.mem_total),
        },
        disk,
        network,
        os: current.os.clone(),
        timestamp: current.taken_at.timestamp_millis(),
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiskPartition, IfaceCounters, OsFacts};
    use chrono::{TimeZone, Utc};

    fn snap(at_ms: i64, rx: u64, tx: u64) -> RawCounterSnapshot {
        RawCounterSnapshot {
            cpu_load: 12.5,
            per_core: vec![10.0, 15.0],
            mem_total: 8 << 30,
            mem_used: 2 << 30,
            disks: vec![DiskPartition {
                fs: "/dev/sda1".into(),
                size: 100,
                used: 25,
                available: 75,
            }],
            interfaces: vec![IfaceCounters {
                name: "eth0".into(),
                rx_bytes: rx,
                tx_bytes: tx,
                up: true,
            }],
            os: OsFacts {
                platform: "linux".into(),
                distro: "Debian".into(),
                release: "12".into(),
                hostname: "box".into(),
                uptime: 100,
            },
            taken_at: Utc.timestamp_millis_opt(at_ms).unwrap(),
        }
    }

    #[test]
    fn rates_from_byte_deltas() {
        let a = snap(0, 1_000, 500);
        let b = snap(2_000, 5_000, 1_500);
        let s = derive(Some(&a), &b);
        assert_eq!(s.network[0].rx_sec, 2_000.0);
        assert_eq!(s.network[0].tx_sec, 500.0);
        assert_eq!(s.network[0].rx_bytes, 5_000);
    }

    #[test]
    fn no_previous_means_zero_rates() {
        let s = derive(None, &snap(1_000, 123_456, 654_321));
        assert_eq!(s.network[0].rx_sec, 0.0);
        assert_eq!(s.network[0].tx_sec, 0.0);
    }

    #[test]
    fn counter_reset_clamps_to_zero() {
        // interface restarted: counters went backwards
        let a = snap(0, 9_000_000, 9_000_000);
        let b = snap(1_000, 1_000, 2_000);
        let s = derive(Some(&a), &b);
        assert_eq!(s.network[0].rx_sec, 0.0);
        assert_eq!(s.network[0].tx_sec, 0.0);
    }

    #[test]
    fn non_positive_elapsed_means_zero_rates() {
        let a = snap(5_000, 1_000, 1_000);
        let b = snap(5_000, 9_000, 9_000);
        let s = derive(Some(&a), &b);
        assert_eq!(s.network[0].rx_sec, 0.0);
        let c = snap(4_000, 9_000, 9_000);
        assert_eq!(derive(Some(&a), &c).network[0].rx_sec, 0.0);
    }

    #[test]
    fn new_interface_gets_zero_rate() {
        let a = snap(0, 1_000, 1_000);
        let mut b = snap(1_000, 2_000, 2_000);
        b.interfaces[0].name = "wlan0".into();
        let s = derive(Some(&a), &b);
        assert_eq!(s.network[0].interface, "wlan0");
        assert_eq!(s.network[0].rx_sec, 0.0);
    }

    #[test]
    fn percentages_pass_through() {
        let s = derive(None, &snap(0, 0, 0));
        assert_eq!(s.cpu.load, 12.5);
        assert_eq!(s.cpu.cores, 2);
        assert_eq!(s.disk[0].used_percent, 25.0);
        assert_eq!(s.memory.used_percent, 25.0);
    }
}
