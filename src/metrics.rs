//! Counter collection using sysinfo. One call per engine tick produces a
//! complete `RawCounterSnapshot` or a `ProviderError`; nothing half-built
//! ever leaves this module.

use chrono::Utc;
use once_cell::sync::OnceCell;
use sysinfo::Networks;

use crate::error::ProviderError;
use crate::state::AppState;
use crate::types::{DiskPartition, IfaceCounters, OsFacts, RawCounterSnapshot};

// Per-core loads can be noisy on very wide machines; HOSTBEAT_PER_CORE=0
// reduces the wire format to the overall load and core count.
fn per_core_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("HOSTBEAT_PER_CORE")
            .map(|v| v != "0")
            .unwrap_or(true)
    })
}

/// Read every counter channel once. Pure read: no engine state changes
/// beyond the sysinfo handles' own bookkeeping.
pub async fn collect_snapshot(state: &AppState) -> Result<RawCounterSnapshot, ProviderError> {
    let (cpu_load, per_core, mem_total, mem_used) = {
        let mut sys = state.sys.lock().await;
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sys.refresh_cpu_usage();
            sys.refresh_memory();
        }))
        .map_err(|e| ProviderError::Unavailable(format!("sysinfo refresh panicked: {e:?}")))?;

        let per_core: Vec<f32> = if per_core_enabled() {
            sys.cpus().iter().map(|c| c.cpu_usage()).collect()
        } else {
            Vec::new()
        };
        let mem_total = sys.total_memory();
        let mem_used = mem_total.saturating_sub(sys.available_memory());
        (sys.global_cpu_usage() as f64, per_core, mem_total, mem_used)
    };

    let disks = {
        let mut disks = state.disks.lock().await;
        disks.refresh(false); // keep partitions that momentarily vanish
        disks
            .iter()
            .filter(|d| d.total_space() > 0)
            .map(|d| DiskPartition {
                fs: d.name().to_string_lossy().into_owned(),
                size: d.total_space(),
                used: d.total_space().saturating_sub(d.available_space()),
                available: d.available_space(),
            })
            .collect()
    };

    let interfaces = {
        let mut nets = state.networks.lock().await;
        nets.refresh(true);
        collect_interfaces(&nets)
    };

    Ok(RawCounterSnapshot {
        cpu_load,
        per_core,
        mem_total,
        mem_used,
        disks,
        interfaces,
        os: os_facts(state),
        taken_at: Utc::now(),
    })
}

fn collect_interfaces(nets: &Networks) -> Vec<IfaceCounters> {
    let mut interfaces: Vec<IfaceCounters> = nets
        .iter()
        .map(|(name, data)| IfaceCounters {
            name: name.clone(),
            rx_bytes: data.total_received(),
            tx_bytes: data.total_transmitted(),
            // sysinfo has no operstate; an address on the interface is the
            // closest portable signal for "link up"
            up: !data.ip_networks().is_empty(),
        })
        .collect();
    // Stable ordering with real interfaces ahead of loopback: the first
    // entry feeds the network history channels.
    interfaces.sort_by(|a, b| {
        let loop_a = a.name.starts_with("lo");
        let loop_b = b.name.starts_with("lo");
        loop_a.cmp(&loop_b).then_with(|| a.name.cmp(&b.name))
    });
    interfaces
}

fn os_facts(state: &AppState) -> OsFacts {
    OsFacts {
        platform: std::env::consts::OS.to_string(),
        distro: sysinfo::System::name().unwrap_or_else(|| "unknown".into()),
        release: sysinfo::System::os_version().unwrap_or_else(|| "unknown".into()),
        hostname: state.hostname.clone(),
        uptime: sysinfo::System::uptime(),
    }
}
