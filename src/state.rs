//! State projector: maintains one [`PumpState`] per pump address and
//! applies the status anti-flap policy.
//!
//! The pump idles by rapidly alternating DC1 between `NOT_PROGRAMMED` (0)
//! and `FILLING_COMPLETED` (5) as a keepalive. Naively exporting every
//! DC1 as seen would make the projection flicker; naively latching the
//! first value seen would hide real transitions like RESET or
//! AUTHORIZED. `StatusHistory::observe` implements the compromise below.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use itertools::Itertools;

const HISTORY_CAP: usize = 10;
const RECENT_WINDOW: Duration = Duration::from_secs(2);
const STABILIZE_COUNT: usize = 3;

#[derive(Debug, Clone, Copy)]
struct HistEntry {
    status: u8,
    at: Instant,
}

/// Ring of recent DC1 samples plus the currently-exported, stabilized
/// status for one pump.
#[derive(Debug, Clone)]
pub struct StatusHistory {
    history: VecDeque<HistEntry>,
    current: Option<u8>,
}

impl Default for StatusHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHistory {
    /// Create an empty history with no exported status yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_CAP),
            current: None,
        }
    }

    /// The currently exported (stabilized) status, if any sample has been
    /// observed yet.
    #[must_use]
    pub fn current(&self) -> Option<u8> {
        self.current
    }

    /// Feed one incoming DC1 sample and return the (possibly unchanged)
    /// exported status.
    ///
    /// Priority order:
    /// `presence(1) > presence(2) > presence(5) > (presence(0) &&
    /// count(0)>=3) > (mode != current && count(mode)>=3) > keep current`.
    pub fn observe(&mut self, status: u8, now: Instant) -> u8 {
        self.history.push_back(HistEntry { status, at: now });
        while self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }

        let recent: Vec<u8> = self
            .history
            .iter()
            .filter(|e| now.saturating_duration_since(e.at) <= RECENT_WINDOW)
            .map(|e| e.status)
            .collect();

        let counts = recent.iter().copied().counts();
        let presence = |s: u8| counts.contains_key(&s);
        let count = |s: u8| counts.get(&s).copied().unwrap_or(0);

        let exported = if presence(1) {
            1
        } else if presence(2) {
            2
        } else if presence(5) {
            5
        } else if presence(0) && count(0) >= STABILIZE_COUNT {
            0
        } else if let Some((&mode, &mode_count)) = counts
            .iter()
            .max_by_key(|(&s, &c)| (c, std::cmp::Reverse(s)))
        {
            if Some(mode) != self.current && mode_count >= STABILIZE_COUNT {
                mode
            } else {
                self.current.unwrap_or(status)
            }
        } else {
            self.current.unwrap_or(status)
        };

        self.current = Some(exported);
        exported
    }
}

/// A decoded nozzle/price reading, stored verbatim (already price-range
/// validated by [`crate::decode::decode`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NozzleReading {
    /// Unit price.
    pub price: f64,
    /// Nozzle number.
    pub nozzle: u8,
    /// Whether the nozzle is out.
    pub nozzle_out: bool,
}

/// Per-pump projected state, owned solely by [`StateProjector`].
#[derive(Debug, Clone)]
pub struct PumpState {
    /// Pump bus address.
    pub address: u8,
    /// Stabilized, exported status.
    pub status: u8,
    /// Last filled volume, if any DC2 has been seen.
    pub volume: Option<f64>,
    /// Last filled amount, if any DC2 has been seen.
    pub amount: Option<f64>,
    /// Last nozzle/price reading, if any DC3 has been seen.
    pub nozzle: Option<NozzleReading>,
    /// Last identity, if any DC9 has been seen.
    pub identity: Option<String>,
    /// Timestamp of the last update of any kind.
    pub last_update: Instant,
    history: StatusHistory,
}

impl PumpState {
    fn new(address: u8, status: u8, now: Instant) -> Self {
        let mut history = StatusHistory::new();
        history.observe(status, now);
        Self {
            address,
            status,
            volume: None,
            amount: None,
            nozzle: None,
            identity: None,
            last_update: now,
            history,
        }
    }
}

/// Owns every pump's [`PumpState`], created lazily on first valid frame
/// for an address.
#[derive(Debug, Clone, Default)]
pub struct StateProjector {
    pumps: std::collections::HashMap<u8, PumpState>,
}

impl StateProjector {
    /// Create an empty projector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pumps: std::collections::HashMap::new(),
        }
    }

    /// Read-only snapshot of a pump's state, if it has ever been seen.
    #[must_use]
    pub fn get(&self, address: u8) -> Option<&PumpState> {
        self.pumps.get(&address)
    }

    /// Drop a pump's state, e.g. on a configuration change that abandons
    /// the address.
    pub fn remove(&mut self, address: u8) {
        self.pumps.remove(&address);
    }

    /// Apply an incoming DC1 status sample for `address`, returning the
    /// stabilized status now in effect.
    pub fn observe_status(&mut self, address: u8, status: u8, now: Instant) -> u8 {
        match self.pumps.get_mut(&address) {
            Some(state) => {
                let exported = state.history.observe(status, now);
                state.status = exported;
                state.last_update = now;
                exported
            }
            None => {
                let state = PumpState::new(address, status, now);
                let exported = state.status;
                self.pumps.insert(address, state);
                exported
            }
        }
    }

    /// Record a DC2 volume/amount reading.
    pub fn observe_volume_amount(&mut self, address: u8, volume: f64, amount: f64, now: Instant) {
        let state = self.ensure(address, now);
        state.volume = Some(volume);
        state.amount = Some(amount);
        state.last_update = now;
    }

    /// Record a DC3 nozzle/price reading (already price-range validated).
    pub fn observe_nozzle(&mut self, address: u8, reading: NozzleReading, now: Instant) {
        let state = self.ensure(address, now);
        state.nozzle = Some(reading);
        state.last_update = now;
    }

    /// Record a DC9 identity reading.
    pub fn observe_identity(&mut self, address: u8, identity: String, now: Instant) {
        let state = self.ensure(address, now);
        state.identity = Some(identity);
        state.last_update = now;
    }

    fn ensure(&mut self, address: u8, now: Instant) -> &mut PumpState {
        self.pumps
            .entry(address)
            .or_insert_with(|| PumpState::new(address, 0, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_initializes_current() {
        let mut h = StatusHistory::new();
        let now = Instant::now();
        assert_eq!(h.observe(5, now), 5);
    }

    #[test]
    fn priority_status_wins_over_idle_presence() {
        let mut h = StatusHistory::new();
        let t0 = Instant::now();
        h.observe(0, t0);
        h.observe(5, t0 + Duration::from_millis(100));
        // A single RESET sample immediately overrides 0/5 presence (P8).
        let exported = h.observe(1, t0 + Duration::from_millis(200));
        assert_eq!(exported, 1);
    }

    #[test]
    fn authorized_also_overrides_idle() {
        let mut h = StatusHistory::new();
        let t0 = Instant::now();
        h.observe(0, t0);
        let exported = h.observe(2, t0 + Duration::from_millis(50));
        assert_eq!(exported, 2);
    }

    #[test]
    fn idle_alternation_converges_and_sticks_at_five() {
        // P7: alternating DC1(0)/DC1(5) within 2s windows; once 5 has been
        // observed, every subsequent step exports 5 while the alternation
        // persists.
        let mut h = StatusHistory::new();
        let t0 = Instant::now();
        let sequence = [0u8, 5, 0, 5, 0, 5];
        let mut exported_after_first_five = false;
        for (i, &s) in sequence.iter().enumerate() {
            let now = t0 + Duration::from_millis(300 * i as u64);
            let exported = h.observe(s, now);
            if s == 5 {
                assert_eq!(exported, 5);
                exported_after_first_five = true;
            } else if exported_after_first_five {
                assert_eq!(exported, 5, "step {i} should still read 5");
            }
        }
    }

    #[test]
    fn zero_needs_three_recent_samples_to_stabilize() {
        let mut h = StatusHistory::new();
        let t0 = Instant::now();
        h.observe(7, t0); // arbitrary non-priority starting status
        // Two 0s aren't enough yet.
        let e = h.observe(0, t0 + Duration::from_millis(10));
        assert_eq!(e, 7);
        let e = h.observe(0, t0 + Duration::from_millis(20));
        assert_eq!(e, 7);
        // Third 0 within the window stabilizes it.
        let e = h.observe(0, t0 + Duration::from_millis(30));
        assert_eq!(e, 0);
    }

    #[test]
    fn samples_outside_window_are_not_recent() {
        let mut h = StatusHistory::new();
        let t0 = Instant::now();
        h.observe(1, t0);
        // Far outside the 2s window: priority rule for status 1 should no
        // longer apply, and 5 stabilizes instead.
        let far = t0 + Duration::from_secs(10);
        h.observe(5, far);
        h.observe(5, far + Duration::from_millis(10));
        let e = h.observe(5, far + Duration::from_millis(20));
        assert_eq!(e, 5);
    }

    #[test]
    fn projector_creates_state_lazily() {
        let mut proj = StateProjector::new();
        assert!(proj.get(0x50).is_none());
        proj.observe_status(0x50, 5, Instant::now());
        assert!(proj.get(0x50).is_some());
        assert_eq!(proj.get(0x50).unwrap().status, 5);
    }

    #[test]
    fn projector_remove_drops_state() {
        let mut proj = StateProjector::new();
        proj.observe_status(0x50, 5, Instant::now());
        proj.remove(0x50);
        assert!(proj.get(0x50).is_none());
    }

    #[test]
    fn projector_updates_volume_and_nozzle_independently_of_status() {
        let mut proj = StateProjector::new();
        let now = Instant::now();
        proj.observe_volume_amount(0x51, 10.0, 20.0, now);
        let s = proj.get(0x51).unwrap();
        assert_eq!(s.volume, Some(10.0));
        assert_eq!(s.amount, Some(20.0));
    }
}
