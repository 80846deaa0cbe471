use embedded_time::duration::Microseconds;

/// Timing of the bit-banged bus.
///
/// Both ends of a bus should share the same `Config`; the slave's
/// `session_gap` must exceed the master's `cs_settle`, or every byte ends
/// up in its own session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    /// Length of each SCK phase.
    pub half_period: Microseconds<u32>,
    /// Hold time after chip-select is asserted or deasserted.
    pub cs_settle: Microseconds<u32>,
    /// Longest the slave waits for any single line transition.
    pub poll_timeout: Microseconds<u32>,
    /// Chip-select high time that closes a slave session.
    pub session_gap: Microseconds<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            half_period: Microseconds(3),
            cs_settle: Microseconds(6),
            poll_timeout: Microseconds(10_000),
            session_gap: Microseconds(1_000),
        }
    }
}

impl Config {
    pub fn with_half_period(mut self, half_period: Microseconds<u32>) -> Self {
        self.half_period = half_period;
        self
    }

    pub fn with_cs_settle(mut self, cs_settle: Microseconds<u32>) -> Self {
        self.cs_settle = cs_settle;
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Microseconds<u32>) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_session_gap(mut self, session_gap: Microseconds<u32>) -> Self {
        self.session_gap = session_gap;
        self
    }

    /// One full clock cycle.
    pub fn bit_period(&self) -> Microseconds<u32> {
        Microseconds(self.half_period.0.saturating_mul(2))
    }
}
