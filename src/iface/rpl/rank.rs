//! Implementation of the Rank comparison in RPL.
//!
//! A Rank can be thought of as a fixed-point number, where the position of the radix point between
//! the integer part and the fractional part is determined by `MinHopRankIncrease`.
//! `MinHopRankIncrease` is the minimum increase in Rank between a node and any of its DODAG
//! parents. This value is provisioned by the DODAG root.
//!
//! When Ranks are compared, only the integer portion is used:
//! - **Rank M is less than Rank N**: M is closer to the DODAG root than N and may safely be a
//!   DODAG parent of N.
//! - **Ranks are equal**: routing through a node with equal Rank may cause a routing loop.
//! - **Rank M is greater than Rank N**: M may be in the sub-DODAG of N.
//!
//! Equality and ordering therefore look at [`Rank::dag_rank`]; use [`Rank::value`] when the exact
//! advertised value matters.

use super::consts::{DEFAULT_MIN_HOP_RANK_INCREASE, INFINITE_RANK};

/// The Rank is the expression of the relative position within a DODAG Version with regard to
/// neighbors, and it is not necessarily a good indication or a proper expression of a distance or
/// a path cost to the root.
#[derive(Debug, Clone, Copy, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rank {
    value: u16,
    min_hop_rank_increase: u16,
}

impl core::fmt::Display for Rank {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_infinite() {
            write!(f, "Rank(inf)")
        } else {
            write!(f, "Rank({}.{})", self.dag_rank(), self.value % self.min_hop_rank_increase)
        }
    }
}

impl Rank {
    pub const INFINITE: Self = Rank::new(INFINITE_RANK, DEFAULT_MIN_HOP_RANK_INCREASE);

    /// The ROOT_RANK is the smallest rank possible.
    /// DAG_RANK(ROOT_RANK) should be 1. See RFC6550 § 17.
    pub const ROOT: Self = Rank::new(DEFAULT_MIN_HOP_RANK_INCREASE, DEFAULT_MIN_HOP_RANK_INCREASE);

    /// Create a new Rank from some value and a `MinHopRankIncrease`.
    /// A `MinHopRankIncrease` of zero is treated as one.
    pub const fn new(value: u16, min_hop_rank_increase: u16) -> Self {
        Self {
            value,
            min_hop_rank_increase: if min_hop_rank_increase == 0 {
                1
            } else {
                min_hop_rank_increase
            },
        }
    }

    /// The rank of a root using this `MinHopRankIncrease`.
    pub const fn root(min_hop_rank_increase: u16) -> Self {
        Self::new(min_hop_rank_increase, min_hop_rank_increase)
    }

    /// The infinite rank using this `MinHopRankIncrease`.
    pub const fn infinite(min_hop_rank_increase: u16) -> Self {
        Self::new(INFINITE_RANK, min_hop_rank_increase)
    }

    /// Return the integer part of the Rank.
    pub const fn dag_rank(&self) -> u16 {
        self.value / self.min_hop_rank_increase
    }

    /// Return the raw Rank value.
    pub const fn value(&self) -> u16 {
        self.value
    }

    pub const fn min_hop_rank_increase(&self) -> u16 {
        self.min_hop_rank_increase
    }

    pub const fn is_infinite(&self) -> bool {
        self.value == INFINITE_RANK
    }

    /// The same raw value seen with another `MinHopRankIncrease`.
    pub const fn with_min_hop_rank_increase(&self, min_hop_rank_increase: u16) -> Self {
        Self::new(self.value, min_hop_rank_increase)
    }

    /// Add `increase`, saturating at the infinite rank.
    pub const fn saturating_add(&self, increase: u16) -> Self {
        Self::new(self.value.saturating_add(increase), self.min_hop_rank_increase)
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.dag_rank() == other.dag_rank()
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        self.dag_rank().partial_cmp(&other.dag_rank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculate_rank() {
        let r = Rank::new(27, 16);
        assert_eq!(r.dag_rank(), 1);
        assert_eq!(Rank::new(27, 0).dag_rank(), 27);
    }

    #[test]
    fn comparison() {
        let r1 = Rank::ROOT;
        let r2 = Rank::new(300, 256);
        assert!(r1 == r2);
        assert_ne!(r1.value(), r2.value());

        let r1 = Rank::new(16, 16);
        let r2 = Rank::new(32, 16);
        assert!(r1 < r2);

        let r1 = Rank::ROOT;
        let r2 = Rank::INFINITE;
        assert!(r1 < r2);
    }

    #[test]
    fn saturation() {
        assert!(Rank::new(0xff00, 256).saturating_add(0x200).is_infinite());
        assert_eq!(Rank::ROOT.saturating_add(256).value(), 512);
        assert_eq!(format!("{}", Rank::new(600, 256)), "Rank(2.88)");
        assert_eq!(format!("{}", Rank::INFINITE), "Rank(inf)");
    }
}
