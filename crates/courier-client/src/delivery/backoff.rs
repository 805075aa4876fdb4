use std::time::Duration;

pub const FLOOR_SECS: u64 = 3;
pub const STEP_SECS: u64 = 3;
pub const CEILING_SECS: u64 = 30;

/// Poll interval state: linear growth from 3s to 30s on idle or failed polls,
/// reset to 3s after a delivered batch.
///
/// Each method returns how long to sleep before the next poll. On idle the
/// sleep is the interval in force before growth, so consecutive empty polls
/// wait 3s, 6s, 9s ... up to 30s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    secs: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { secs: FLOOR_SECS }
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Duration {
        Duration::from_secs(self.secs)
    }

    pub fn on_delivery(&mut self) -> Duration {
        self.secs = FLOOR_SECS;
        self.current()
    }

    /// Empty poll or transient failure.
    pub fn on_idle(&mut self) -> Duration {
        let delay = self.current();
        self.secs = (self.secs + STEP_SECS).min(CEILING_SECS);
        delay
    }

    /// Credentials rejected; nothing will change until the operator acts.
    pub fn on_auth_expired(&mut self) -> Duration {
        self.secs = CEILING_SECS;
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(d: Duration) -> u64 {
        d.as_secs()
    }

    #[test]
    fn idle_polls_grow_linearly_to_ceiling() {
        let mut backoff = Backoff::new();
        let sleeps: Vec<u64> = (0..12).map(|_| secs(backoff.on_idle())).collect();
        assert_eq!(sleeps, vec![3, 6, 9, 12, 15, 18, 21, 24, 27, 30, 30, 30]);
        assert_eq!(secs(backoff.current()), CEILING_SECS);
    }

    #[test]
    fn delivery_resets_to_floor() {
        let mut backoff = Backoff::new();
        backoff.on_idle();
        backoff.on_idle();
        assert_eq!(secs(backoff.on_delivery()), FLOOR_SECS);
        assert_eq!(secs(backoff.on_idle()), FLOOR_SECS);
    }

    #[test]
    fn auth_expiry_jumps_to_ceiling() {
        let mut backoff = Backoff::new();
        assert_eq!(secs(backoff.on_auth_expired()), CEILING_SECS);
        assert_eq!(secs(backoff.on_idle()), CEILING_SECS);
        assert_eq!(secs(backoff.on_delivery()), FLOOR_SECS);
    }
}
