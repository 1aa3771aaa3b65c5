//! The Trickle algorithm (RFC 6206) driving DIO transmissions.
//!
//! The interval `I` starts at `2^i_min` ms and doubles until `2^i_max` ms.
//! Within every interval a DIO is due once, at a random time `t` in
//! `[I/2, I)`, and it is only sent when fewer than `k` consistent DIOs were
//! heard during the interval. A redundancy constant of zero disables the
//! suppression.

use crate::{rand::Rand, time::Duration, time::Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrickleTimer {
    started: bool,

    i_min: u32,
    i_max: u32,
    k: usize,

    i: Duration,
    t: Duration,
    t_expiration: Instant,
    i_expiration: Instant,
    counter: usize,
    fired: bool,
}

impl Default for TrickleTimer {
    fn default() -> Self {
        Self::new(
            super::consts::DEFAULT_DIO_INTERVAL_MIN as u32,
            super::consts::DEFAULT_DIO_INTERVAL_MIN as u32
                + super::consts::DEFAULT_DIO_INTERVAL_DOUBLINGS as u32,
            super::consts::DEFAULT_DIO_REDUNDANCY_CONSTANT as usize,
        )
    }
}

impl TrickleTimer {
    /// Create a new, stopped, Trickle timer.
    pub(crate) const fn new(i_min: u32, i_max: u32, k: usize) -> Self {
        Self {
            started: false,
            i_min,
            i_max,
            k,
            i: Duration::ZERO,
            t: Duration::ZERO,
            t_expiration: Instant::ZERO,
            i_expiration: Instant::ZERO,
            counter: 0,
            fired: false,
        }
    }

    /// Create a timer from the DIO parameters of a DODAG configuration.
    pub(crate) const fn from_dio_params(interval_min: u8, doublings: u8, redundancy: u8) -> Self {
        Self::new(
            interval_min as u32,
            interval_min as u32 + doublings as u32,
            redundancy as usize,
        )
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started
    }

    /// Start the timer with `I = Imin`.
    ///
    /// The first interval is not drawn from `[Imin, Imax]` so that a fresh
    /// DODAG forms quickly.
    pub(crate) fn start(&mut self, now: Instant, rand: &mut Rand) {
        if self.started {
            return;
        }

        self.started = true;
        self.reset(self.min_expiration(), now, rand);
    }

    pub(crate) fn stop(&mut self) {
        self.started = false;
    }

    /// Advance the timer. Returns `true` when a DIO must be sent now.
    pub(crate) fn poll(&mut self, now: Instant, rand: &mut Rand) -> bool {
        if !self.started {
            return false;
        }

        let mut transmit = false;
        if !self.fired && now >= self.t_expiration {
            self.fired = true;
            transmit = self.can_transmit();
            if !transmit {
                net_trace!("trickle: suppressed, heard {} consistent DIOs", self.counter);
            }
        }

        if now >= self.i_expiration {
            self.expire(now, rand);
        }

        transmit
    }

    /// The next instant at which [`TrickleTimer::poll`] has something to do.
    pub(crate) fn poll_at(&self) -> Option<Instant> {
        if !self.started {
            None
        } else if self.fired {
            Some(self.i_expiration)
        } else {
            Some(self.t_expiration.min(self.i_expiration))
        }
    }

    fn set_t(&mut self, now: Instant, rand: &mut Rand) {
        let half = self.i.total_micros() / 2;
        let t = Duration::from_micros(half + rand.rand_range(0, half.max(1)));

        self.t = t;
        self.t_expiration = now + t;
        self.fired = false;
    }

    /// Signal the Trickle timer that a consistency has been heard.
    pub(crate) fn hear_consistent(&mut self) {
        self.counter += 1;
    }

    /// Signal the Trickle timer that an inconsistency has been heard.
    ///
    /// Nothing changes when the interval is already at its minimum. Returns
    /// whether the timer was reset.
    pub(crate) fn hear_inconsistent(&mut self, now: Instant, rand: &mut Rand) -> bool {
        if !self.started {
            self.start(now, rand);
            return true;
        }

        let i = self.min_expiration();
        if self.i > i {
            self.reset(i, now, rand);
            true
        } else {
            false
        }
    }

    /// Check if the trickle timer can transmit.
    pub(crate) fn can_transmit(&self) -> bool {
        self.k == 0 || self.counter < self.k
    }

    /// Start a new interval, doubling `I` up to `Imax`.
    pub(crate) fn expire(&mut self, now: Instant, rand: &mut Rand) {
        let max_interval = self.max_expiration();
        let i = if self.i >= max_interval {
            max_interval
        } else {
            // Double the interval I
            (self.i + self.i).min(max_interval)
        };

        self.reset(i, now, rand);
    }

    fn reset(&mut self, i: Duration, now: Instant, rand: &mut Rand) {
        self.i = i;
        self.i_expiration = now + self.i;
        self.counter = 0;
        self.set_t(now, rand);
    }

    pub(crate) fn max_expiration(&self) -> Duration {
        Duration::from_millis(1u64 << self.i_max.min(40))
    }

    pub(crate) fn min_expiration(&self) -> Duration {
        Duration::from_millis(1u64 << self.i_min.min(40))
    }

    /// The current interval `I`.
    pub(crate) fn interval(&self) -> Duration {
        self.i
    }

    /// Consistent transmissions heard in the current interval.
    pub(crate) fn counter(&self) -> usize {
        self.counter
    }
}
