//! Runtime configuration. Everything comes from `HOSTBEAT_*` environment
//! variables with sane defaults; the listen port can also be given as
//! `--port`/`-p` on the command line.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::filter::Thresholds;
use crate::uptime::{parse_sites, Site};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// engine-wide sampling cadence
    pub tick: Duration,
    /// per-session push cadence
    pub push_interval: Duration,
    /// budget for one full counter readout before the tick is skipped
    pub sample_timeout: Duration,
    pub thresholds: Thresholds,
    /// capacity C of each rolling history buffer
    pub history_len: usize,
    /// retention window W; older points are evicted even under capacity
    pub history_window: Duration,
    pub max_retries: u32,
    /// base backoff delay after a transient push failure
    pub retry_delay: Duration,
    /// a session silent for longer than this is disconnected
    pub ping_timeout: Duration,
    pub data_dir: PathBuf,
    /// external sites probed for uptime; empty disables probing
    pub probe_sites: Vec<Site>,
    pub probe_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            tick: Duration::from_millis(1000),
            push_interval: Duration::from_millis(1000),
            sample_timeout: Duration::from_millis(5000),
            thresholds: Thresholds::default(),
            history_len: 30,
            history_window: Duration::from_secs(3600),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            ping_timeout: Duration::from_secs(30),
            data_dir: PathBuf::from("data"),
            probe_sites: parse_sites(DEFAULT_PROBE_SITES),
            probe_interval: Duration::from_secs(60),
        }
    }
}

const DEFAULT_PROBE_SITES: &str =
    "Google=https://www.google.com,Cloudflare=https://www.cloudflare.com";

impl Config {
    pub fn from_env() -> Self {
        let d = Config::default();
        Config {
            port: env_parse("HOSTBEAT_PORT", d.port),
            tick: Duration::from_millis(env_parse("HOSTBEAT_TICK_MS", 1000u64)),
            push_interval: Duration::from_millis(env_parse("HOSTBEAT_PUSH_MS", 1000u64)),
            sample_timeout: Duration::from_millis(env_parse("HOSTBEAT_SAMPLE_TIMEOUT_MS", 5000u64)),
            thresholds: Thresholds {
                cpu: env_parse("HOSTBEAT_CPU_THRESHOLD", 1.0),
                mem: env_parse("HOSTBEAT_MEM_THRESHOLD", 1.0),
                disk: env_parse("HOSTBEAT_DISK_THRESHOLD", 1.0),
                net: std::env::var("HOSTBEAT_NET_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok()),
            },
            history_len: env_parse("HOSTBEAT_HISTORY_LEN", d.history_len),
            history_window: Duration::from_secs(env_parse("HOSTBEAT_HISTORY_WINDOW_SECS", 3600u64)),
            max_retries: env_parse("HOSTBEAT_MAX_RETRIES", d.max_retries),
            retry_delay: Duration::from_millis(env_parse("HOSTBEAT_RETRY_DELAY_MS", 1000u64)),
            ping_timeout: Duration::from_secs(env_parse("HOSTBEAT_PING_TIMEOUT_SECS", 30u64)),
            data_dir: std::env::var_os("HOSTBEAT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.data_dir),
            // set HOSTBEAT_PROBE_SITES= (empty) to turn probing off
            probe_sites: std::env::var("HOSTBEAT_PROBE_SITES")
                .map(|v| parse_sites(&v))
                .unwrap_or(d.probe_sites),
            probe_interval: Duration::from_secs(env_parse("HOSTBEAT_PROBE_INTERVAL_SECS", 60u64)),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Accepts `--port N`, `-p N` and `--port=N`; anything unparseable falls
/// back to the default.
pub fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut long: Option<String> = None;
    let mut short: Option<String> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "--port" => long = it.next(),
            "-p" => short = it.next(),
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    long = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    long.or(short)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_long_short_and_assign() {
        let d = 5000;
        assert_eq!(
            parse_port(vec!["hostbeat".into(), "--port".into(), "9001".into()], d),
            9001
        );
        assert_eq!(
            parse_port(vec!["hostbeat".into(), "-p".into(), "9002".into()], d),
            9002
        );
        assert_eq!(parse_port(vec!["hostbeat".into(), "--port=9003".into()], d), 9003);
        assert_eq!(parse_port(vec!["hostbeat".into()], d), d);
        assert_eq!(
            parse_port(vec!["hostbeat".into(), "--port".into(), "junk".into()], d),
            d
        );
    }
}
