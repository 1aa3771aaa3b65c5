//! Lollipop sequence counters, see [RFC 6550 § 7.2].
//!
//! Values from 128 up form the linear "stick" used right after a restart.
//! Values up to 127 form a circular space of size 128. Counters that are
//! too far apart within the same region are not comparable.
//!
//! [RFC 6550 § 7.2]: https://datatracker.ietf.org/doc/html/rfc6550#section-7.2

use core::cmp::Ordering;

/// Last value of the circular region.
pub const CIRCULAR_REGION: u8 = 127;
/// The sequence window used for comparisons.
pub const SEQUENCE_WINDOW: u8 = 16;
/// Initial counter value, `256 - SEQUENCE_WINDOW`.
pub const INIT: u8 = 240;

/// A lollipop counter used for DODAG versions, DTSNs, DAO sequence numbers
/// and path sequences.
#[derive(Debug, Clone, Copy, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceCounter(u8);

impl Default for SequenceCounter {
    fn default() -> Self {
        Self(INIT)
    }
}

impl From<u8> for SequenceCounter {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for SequenceCounter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SequenceCounter {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Whether the counter is still in the linear region after a restart.
    pub const fn is_init(&self) -> bool {
        self.0 > CIRCULAR_REGION
    }

    /// Increment the counter. The linear region wraps from 255 into the
    /// circular region at 0, the circular region wraps from 127 to 0.
    pub fn increment(&mut self) {
        self.0 = if self.0 > CIRCULAR_REGION {
            self.0.wrapping_add(1)
        } else {
            (self.0 + 1) & CIRCULAR_REGION
        };
    }

    /// The lollipop "greater than" relation.
    pub fn greater_than(&self, other: &Self) -> bool {
        let a = self.0 as i16;
        let b = other.0 as i16;
        let circular = CIRCULAR_REGION as i16;
        let window = SEQUENCE_WINDOW as i16;

        match (a > circular, b > circular) {
            // A restarted counter against one in the circular region.
            (true, false) => 256 + b - a > window,
            (false, true) => 256 + a - b <= window,
            _ => (a > b && a - b < window) || (a < b && b - a > circular + 1 - window),
        }
    }
}

impl PartialEq for SequenceCounter {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for SequenceCounter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.0 == other.0 {
            Some(Ordering::Equal)
        } else if self.greater_than(other) {
            Some(Ordering::Greater)
        } else if other.greater_than(self) {
            Some(Ordering::Less)
        } else {
            None
        }
    }
}
