//! WebSocket upgrade and per-connection push loop.
//!
//! Every viewer gets its own loop with its own timers, change-filter
//! baseline and retry budget. Loops never share mutable state, so one
//! slow or dying session cannot delay another: they all just observe the
//! engine's latest published sample.
//!
//! Wire protocol, JSON text frames:
//!   server → client  {"type":"history", "data":{…}}      on connect
//!   server → client  {"type":"systemInfo", "data":{…}}    on each push
//!   client → server  "ping"                               keep-alive
//!   server → client  {"type":"pong", "timestamp":…, "id":…}

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde_json::json;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{info, warn};

use crate::error::{PushError, SessionTimeout};
use crate::filter::should_emit;
use crate::session::{DisconnectReason, Session, SessionEvent, SessionState};
use crate::state::AppState;

/// A send stuck longer than this counts as a timed-out push.
const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    // Viewer accounting, decremented on disconnect (drop).
    state.client_count.fetch_add(1, Ordering::Relaxed);
    struct ClientGuard(AppState);
    impl Drop for ClientGuard {
        fn drop(&mut self) {
            self.0.client_count.fetch_sub(1, Ordering::Relaxed);
        }
    }
    let _guard = ClientGuard(state.clone());

    let id = state.next_session_id();
    let cfg = state.config.clone();
    let mut session = Session::new(id, cfg.max_retries, cfg.retry_delay, Instant::now());
    let (mut tx, mut rx) = socket.split();

    // Pre-populate the viewer's charts from history and the last known
    // sample before the first live tick reaches it.
    let greeting = {
        let history = state.history.lock().await;
        json!({ "type": "history", "data": history.snapshot() }).to_string()
    };
    if tx.send(Message::Text(greeting)).await.is_err() {
        info!(session = id, "viewer gone before greeting");
        return;
    }
    // Current uptime-probe results, if any site has been probed yet
    let statuses = state.site_status_rx.borrow().clone();
    if !statuses.is_empty() {
        let frame = json!({ "type": "websiteStatus", "data": statuses }).to_string();
        let _ = tx.send(Message::Text(frame)).await;
    }
    session.apply(SessionEvent::Established);
    info!(
        session = id,
        viewers = state.client_count.load(Ordering::Relaxed),
        "session connected"
    );

    let mut push = interval(cfg.push_interval);
    push.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut liveness = interval(liveness_period(cfg.ping_timeout));
    let mut site_rx = state.site_status_rx.clone();
    let mut shutdown_rx = state.shutdown_rx.clone();
    // While Reconnecting, pushes stay parked until this instant.
    let mut resume_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = push.tick() => match session.state {
                SessionState::Connected => {
                    let Some(sample) = state.latest_sample() else { continue };
                    if !should_emit(&cfg.thresholds, &sample, session.last_emitted.as_deref()) {
                        continue;
                    }
                    let frame = json!({ "type": "systemInfo", "data": &*sample }).to_string();
                    match timeout(PUSH_TIMEOUT, tx.send(Message::Text(frame))).await {
                        Ok(Ok(())) => {
                            session.apply(SessionEvent::PushOk);
                            session.last_emitted = Some(sample);
                        }
                        Ok(Err(e)) => {
                            warn!("{}", PushError { session: id, reason: e.to_string() });
                            park_on(&mut session, DisconnectReason::Transport, &mut resume_at);
                        }
                        Err(_) => {
                            warn!("{}", PushError { session: id, reason: "send timed out".into() });
                            park_on(&mut session, DisconnectReason::Timeout, &mut resume_at);
                        }
                    }
                }
                SessionState::Reconnecting { .. } => {
                    if resume_at.is_some_and(|t| Instant::now() >= t) {
                        resume_at = None;
                        session.apply(SessionEvent::BackoffElapsed);
                    }
                }
                _ => {}
            },
            _ = liveness.tick() => {
                if session.is_stale(Instant::now(), cfg.ping_timeout) {
                    warn!(session = id, "{}", SessionTimeout(cfg.ping_timeout));
                    session.apply(SessionEvent::Disconnected(DisconnectReason::Stale));
                }
            }
            changed = site_rx.changed() => {
                if changed.is_ok() {
                    let statuses = site_rx.borrow_and_update().clone();
                    let frame = json!({ "type": "websiteStatus", "data": statuses }).to_string();
                    // Best effort: the push loop and the liveness window
                    // own failure accounting, not this broadcast.
                    let _ = tx.send(Message::Text(frame)).await;
                }
            }
            _ = shutdown_rx.changed() => {
                session.apply(SessionEvent::Disconnected(DisconnectReason::Shutdown));
            }
            inbound = rx.next() => match inbound {
                Some(Ok(Message::Text(text))) if text == "ping" => {
                    session.note_ping(Instant::now());
                    let pong = json!({
                        "type": "pong",
                        "timestamp": Utc::now().to_rfc3339(),
                        "id": id,
                    });
                    // A lost pong is not a push failure; the liveness
                    // window is the arbiter here.
                    let _ = tx.send(Message::Text(pong.to_string())).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    session.apply(SessionEvent::Disconnected(DisconnectReason::PeerClosed));
                }
                Some(Err(_)) => {
                    session.apply(SessionEvent::Disconnected(DisconnectReason::PeerClosed));
                }
                Some(Ok(_)) => {}
            },
        }

        if session.is_terminated() {
            break;
        }
    }

    // Best-effort close; the peer may already be gone.
    let _ = tx.send(Message::Close(None)).await;
    if let SessionState::Terminated(reason) = session.state {
        info!(session = id, ?reason, "session closed");
    }
}

/// Enter backoff after a transient failure, or fall through to
/// termination once the budget is spent.
fn park_on(session: &mut Session, reason: DisconnectReason, resume_at: &mut Option<Instant>) {
    if let SessionState::Reconnecting { attempt } =
        session.apply(SessionEvent::Disconnected(reason))
    {
        let delay = session.backoff_delay();
        info!(
            session = session.id,
            attempt, "push failed, retrying in {delay:?}"
        );
        *resume_at = Some(Instant::now() + delay);
    }
}

fn liveness_period(ping_timeout: Duration) -> Duration {
    (ping_timeout / 2).max(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_check_runs_at_half_the_window() {
        assert_eq!(
            liveness_period(Duration::from_secs(30)),
            Duration::from_secs(15)
        );
        // never busier than once a second
        assert_eq!(
            liveness_period(Duration::from_millis(500)),
            Duration::from_secs(1)
        );
    }
}
