use crate::network::PeerIdentity;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Delay between two rejoin attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Cooperative cancellation flag shared between the loop and its owner
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Guest-side rejoin schedule after losing the host
///
/// Each attempt waits one retry interval. A failed attempt schedules the
/// next one; the token is checked before every attempt and before every
/// rescheduling, so a cancelled loop goes quiet at its next step.
#[derive(Debug)]
pub struct RecoveryLoop {
    room: PeerIdentity,
    token: CancelToken,
    interval: Duration,
    next_attempt: Option<Instant>,
    attempts: u32,
}

impl RecoveryLoop {
    pub fn start(room: PeerIdentity, token: CancelToken, interval: Duration, now: Instant) -> Self {
        info!(%room, retry_in_ms = interval.as_millis() as u64, "Entering host recovery mode");
        Self {
            room,
            token,
            interval,
            next_attempt: Some(now + interval),
            attempts: 0,
        }
    }

    pub fn room(&self) -> &PeerIdentity {
        &self.room
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// When the next attempt is due, if one is scheduled
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.token.is_cancelled() {
            None
        } else {
            self.next_attempt
        }
    }

    /// Claim the attempt due at `now`, returning the room to dial
    pub fn take_attempt(&mut self, now: Instant) -> Option<PeerIdentity> {
        if self.token.is_cancelled() {
            self.next_attempt = None;
            return None;
        }
        match self.next_attempt {
            Some(at) if at <= now => {
                self.next_attempt = None;
                self.attempts += 1;
                info!(room = %self.room, attempt = self.attempts, "Trying to rejoin room");
                Some(self.room.clone())
            }
            _ => None,
        }
    }

    /// Whether an attempt has been made and not yet answered
    pub fn awaiting_result(&self) -> bool {
        self.attempts > 0 && self.next_attempt.is_none() && !self.token.is_cancelled()
    }

    /// The last attempt failed; schedule another unless cancelled
    ///
    /// Returns `false` when the loop has been cancelled.
    pub fn attempt_failed(&mut self, now: Instant) -> bool {
        if self.token.is_cancelled() {
            debug!(room = %self.room, "Recovery cancelled, not rescheduling");
            self.next_attempt = None;
            return false;
        }
        debug!(
            attempt = self.attempts,
            "Waiting {}ms before retry",
            self.interval.as_millis()
        );
        self.next_attempt = Some(now + self.interval);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recovery(now: Instant) -> RecoveryLoop {
        RecoveryLoop::start("host".into(), CancelToken::new(), DEFAULT_RETRY_INTERVAL, now)
    }

    #[test]
    fn test_first_attempt_waits_one_interval() {
        let t0 = Instant::now();
        let mut recovery = recovery(t0);
        assert_eq!(recovery.next_deadline(), Some(t0 + DEFAULT_RETRY_INTERVAL));
        assert_eq!(recovery.take_attempt(t0 + Duration::from_secs(2)), None);

        let at = t0 + DEFAULT_RETRY_INTERVAL;
        assert_eq!(recovery.take_attempt(at), Some("host".into()));
        assert_eq!(recovery.attempts(), 1);
        assert!(recovery.awaiting_result());
        assert_eq!(recovery.next_deadline(), None);
        // Claimed attempts are not handed out twice
        assert_eq!(recovery.take_attempt(at), None);
    }

    #[test]
    fn test_failure_reschedules() {
        let t0 = Instant::now();
        let mut recovery = recovery(t0);
        let mut now = t0;
        for attempt in 1..=3 {
            now += DEFAULT_RETRY_INTERVAL;
            assert!(recovery.take_attempt(now).is_some());
            assert_eq!(recovery.attempts(), attempt);
            assert!(recovery.attempt_failed(now));
            assert_eq!(recovery.next_deadline(), Some(now + DEFAULT_RETRY_INTERVAL));
        }
    }

    #[test]
    fn test_cancel_stops_attempts_and_rescheduling() {
        let t0 = Instant::now();
        let token = CancelToken::new();
        let mut recovery =
            RecoveryLoop::start("host".into(), token.clone(), DEFAULT_RETRY_INTERVAL, t0);
        let now = t0 + DEFAULT_RETRY_INTERVAL;
        assert!(recovery.take_attempt(now).is_some());

        token.cancel();
        assert!(recovery.is_cancelled());
        assert!(!recovery.attempt_failed(now));
        assert_eq!(recovery.next_deadline(), None);
        assert_eq!(recovery.take_attempt(now + DEFAULT_RETRY_INTERVAL * 10), None);
        assert!(!recovery.awaiting_result());
    }

    #[test]
    fn test_token_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }
}
