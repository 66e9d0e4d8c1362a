//! Per-viewer session lifecycle: an explicit state machine with a retry
//! budget and exponential backoff, replacing scattered ad hoc reconnect
//! timers. Transitions are pure so they can be tested without a scheduler;
//! the WebSocket loop in `ws.rs` drives them and owns the actual timers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::types::DerivedSample;

/// Why a session left `Connected`. Only transport-level trouble is worth
/// retrying; everything else means the viewer is gone for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// send failed but the peer may still be reachable
    Transport,
    /// a push attempt timed out
    Timeout,
    /// no liveness signal within the window
    Stale,
    /// the peer closed the socket
    PeerClosed,
    /// retry budget exhausted
    RetriesExhausted,
    Shutdown,
}

impl DisconnectReason {
    pub fn is_transient(self) -> bool {
        matches!(self, DisconnectReason::Transport | DisconnectReason::Timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    /// push loop parked until the backoff delay elapses
    Reconnecting { attempt: u32 },
    Terminated(DisconnectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Established,
    PushOk,
    Disconnected(DisconnectReason),
    BackoffElapsed,
}

/// One connected viewer. Owns its retry counter, staleness clock and the
/// last sample actually delivered (the change-filter baseline — never
/// shared with other sessions).
pub struct Session {
    pub id: u64,
    pub state: SessionState,
    pub retries: u32,
    pub last_ping: Instant,
    pub last_emitted: Option<Arc<DerivedSample>>,
    max_retries: u32,
    retry_delay: Duration,
}

/// Backoff growth stops here no matter the attempt count.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

impl Session {
    pub fn new(id: u64, max_retries: u32, retry_delay: Duration, now: Instant) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
            retries: 0,
            last_ping: now,
            last_emitted: None,
            max_retries,
            retry_delay,
        }
    }

    /// Apply one lifecycle event and return the resulting state.
    /// `Terminated` is absorbing; applying further events is a no-op, so
    /// teardown paths may fire redundantly without harm.
    pub fn apply(&mut self, event: SessionEvent) -> SessionState {
        use SessionEvent::*;
        use SessionState::*;

        self.state = match (self.state, event) {
            (Terminated(r), _) => Terminated(r),
            (_, Disconnected(reason)) => {
                if !reason.is_transient() {
                    Terminated(reason)
                } else {
                    self.retries += 1;
                    if self.retries >= self.max_retries {
                        Terminated(DisconnectReason::RetriesExhausted)
                    } else {
                        Reconnecting {
                            attempt: self.retries,
                        }
                    }
                }
            }
            (Connecting, Established) => Connected,
            (Connected, PushOk) => {
                self.retries = 0;
                Connected
            }
            (Reconnecting { .. }, BackoffElapsed) => Connected,
            (s, _) => s,
        };
        self.state
    }

    /// Delay before the next push attempt: doubles per retry, capped.
    pub fn backoff_delay(&self) -> Duration {
        let attempt = match self.state {
            SessionState::Reconnecting { attempt } => attempt.max(1),
            _ => 1,
        };
        let factor = 2u32.saturating_pow(attempt - 1);
        self.retry_delay.saturating_mul(factor).min(BACKOFF_CAP)
    }

    pub fn note_ping(&mut self, now: Instant) {
        self.last_ping = now;
        self.retries = 0;
    }

    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.duration_since(self.last_ping) > timeout
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, SessionState::Terminated(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSPORT: SessionEvent = SessionEvent::Disconnected(DisconnectReason::Transport);

    fn session() -> Session {
        Session::new(1, 3, Duration::from_millis(1000), Instant::now())
    }

    #[test]
    fn connects_then_pushes() {
        let mut s = session();
        assert_eq!(s.apply(SessionEvent::Established), SessionState::Connected);
        assert_eq!(s.apply(SessionEvent::PushOk), SessionState::Connected);
        assert_eq!(s.retries, 0);
    }

    #[test]
    fn third_push_failure_terminates_with_max_retries_three() {
        let mut s = session();
        s.apply(SessionEvent::Established);
        assert_eq!(s.apply(TRANSPORT), SessionState::Reconnecting { attempt: 1 });
        s.apply(SessionEvent::BackoffElapsed);
        assert_eq!(s.apply(TRANSPORT), SessionState::Reconnecting { attempt: 2 });
        s.apply(SessionEvent::BackoffElapsed);
        assert_eq!(
            s.apply(TRANSPORT),
            SessionState::Terminated(DisconnectReason::RetriesExhausted)
        );
        // absorbing: no resurrection after termination
        assert_eq!(
            s.apply(SessionEvent::BackoffElapsed),
            SessionState::Terminated(DisconnectReason::RetriesExhausted)
        );
    }

    #[test]
    fn successful_push_resets_the_retry_budget() {
        let mut s = session();
        s.apply(SessionEvent::Established);
        s.apply(TRANSPORT);
        s.apply(SessionEvent::BackoffElapsed);
        s.apply(SessionEvent::PushOk);
        assert_eq!(s.retries, 0);
        s.apply(TRANSPORT);
        assert_eq!(s.state, SessionState::Reconnecting { attempt: 1 });
    }

    #[test]
    fn push_timeout_is_also_transient() {
        let mut s = session();
        s.apply(SessionEvent::Established);
        assert_eq!(
            s.apply(SessionEvent::Disconnected(DisconnectReason::Timeout)),
            SessionState::Reconnecting { attempt: 1 }
        );
    }

    #[test]
    fn peer_close_is_terminal_from_any_state() {
        let mut s = session();
        s.apply(SessionEvent::Established);
        s.apply(TRANSPORT);
        assert_eq!(
            s.apply(SessionEvent::Disconnected(DisconnectReason::PeerClosed)),
            SessionState::Terminated(DisconnectReason::PeerClosed)
        );
    }

    #[test]
    fn liveness_expiry_terminates() {
        let mut s = session();
        s.apply(SessionEvent::Established);
        assert_eq!(
            s.apply(SessionEvent::Disconnected(DisconnectReason::Stale)),
            SessionState::Terminated(DisconnectReason::Stale)
        );
    }

    #[test]
    fn shutdown_is_terminal_even_mid_backoff() {
        let mut s = session();
        s.apply(SessionEvent::Established);
        s.apply(TRANSPORT);
        assert_eq!(
            s.apply(SessionEvent::Disconnected(DisconnectReason::Shutdown)),
            SessionState::Terminated(DisconnectReason::Shutdown)
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut s = session();
        s.apply(SessionEvent::Established);
        s.apply(TRANSPORT);
        assert_eq!(s.backoff_delay(), Duration::from_millis(1000));
        s.apply(SessionEvent::BackoffElapsed);
        s.apply(TRANSPORT);
        assert_eq!(s.backoff_delay(), Duration::from_millis(2000));

        let mut long = Session::new(2, 100, Duration::from_millis(1000), Instant::now());
        long.apply(SessionEvent::Established);
        for _ in 0..20 {
            long.apply(TRANSPORT);
            long.apply(SessionEvent::BackoffElapsed);
        }
        long.apply(TRANSPORT);
        assert_eq!(long.backoff_delay(), Duration::from_secs(30));
    }

    #[test]
    fn staleness_uses_injected_clock() {
        let t0 = Instant::now();
        let mut s = Session::new(3, 3, Duration::from_millis(1000), t0);
        let timeout = Duration::from_secs(30);
        assert!(!s.is_stale(t0 + Duration::from_secs(29), timeout));
        assert!(s.is_stale(t0 + Duration::from_secs(31), timeout));
        s.note_ping(t0 + Duration::from_secs(31));
        assert!(!s.is_stale(t0 + Duration::from_secs(60), timeout));
    }
}
