//! External site uptime probes: each configured site gets its own task
//! that fetches the URL on a fixed interval, records status/latency, and
//! publishes the combined status list so every session can broadcast it.
//!
//! Probe results never touch the metrics engine; they ride the same push
//! channel as their own `websiteStatus` frame.

use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::state::AppState;

/// A probe slower than this counts as down.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteStatus {
    pub name: String,
    pub url: String,
    /// HTTP status code, 0 when the request never completed
    pub status: u16,
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

/// Parse `HOSTBEAT_PROBE_SITES`: comma-separated entries, each either
/// `Name=URL` or a bare URL (which doubles as its own name). Empty input
/// means no probing.
pub fn parse_sites(spec: &str) -> Vec<Site> {
    spec.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            Some(match entry.split_once('=') {
                Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => Site {
                    name: name.trim().to_string(),
                    url: url.trim().to_string(),
                },
                _ => Site {
                    name: entry.to_string(),
                    url: entry.to_string(),
                },
            })
        })
        .collect()
}

fn online(status: u16) -> bool {
    (200..400).contains(&status)
}

async fn probe(client: &Client, site: &Site) -> SiteStatus {
    let started = Instant::now();
    match client.get(&site.url).send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            SiteStatus {
                name: site.name.clone(),
                url: site.url.clone(),
                status,
                response_time_ms: started.elapsed().as_millis() as u64,
                online: online(status),
                error: None,
                timestamp: Utc::now().to_rfc3339(),
            }
        }
        Err(e) => SiteStatus {
            name: site.name.clone(),
            url: site.url.clone(),
            status: 0,
            response_time_ms: 0,
            online: false,
            error: Some(e.to_string()),
            timestamp: Utc::now().to_rfc3339(),
        },
    }
}

/// One task per configured site. Results are merged into the shared
/// status list keyed by URL; the watch channel tells sessions to rebroadcast.
pub fn spawn_site_monitors(state: AppState) -> Vec<JoinHandle<()>> {
    let sites = state.config.probe_sites.clone();
    if sites.is_empty() {
        return Vec::new();
    }
    let client = Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .unwrap_or_default();

    sites
        .into_iter()
        .map(|site| {
            let state = state.clone();
            let client = client.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(state.config.probe_interval);
                loop {
                    ticker.tick().await;
                    let status = probe(&client, &site).await;
                    debug!(site = %status.name, online = status.online, "site probed");
                    state.site_status_tx.send_modify(|list| {
                        match list.iter_mut().find(|s| s.url == status.url) {
                            Some(slot) => *slot = status.clone(),
                            None => list.push(status.clone()),
                        }
                    });
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_bare_entries() {
        let sites = parse_sites("Google=https://www.google.com, https://example.org ,");
        assert_eq!(
            sites,
            vec![
                Site {
                    name: "Google".into(),
                    url: "https://www.google.com".into(),
                },
                Site {
                    name: "https://example.org".into(),
                    url: "https://example.org".into(),
                },
            ]
        );
        assert!(parse_sites("").is_empty());
        assert!(parse_sites(" , ,").is_empty());
    }

    #[test]
    fn online_means_2xx_or_3xx() {
        assert!(!online(0));
        assert!(!online(199));
        assert!(online(200));
        assert!(online(301));
        assert!(online(399));
        assert!(!online(404));
        assert!(!online(500));
    }
}
