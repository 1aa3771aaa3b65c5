use super::{Choice, ObjectiveFunction, Parent, Rank};
use crate::iface::rpl::consts::{DEFAULT_MAX_RANK_INCREASE, DEFAULT_MIN_HOP_RANK_INCREASE};

/// Objective Function Zero (RFC 6552).
///
/// Every hop adds `MinHopRankIncrease` to the rank. Parents are compared on
/// their rank plus the ETX of the link towards them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObjectiveFunction0 {
    max_rank_increase: u16,
    min_hop_rank_increase: u16,
}

impl Default for ObjectiveFunction0 {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_HOP_RANK_INCREASE, DEFAULT_MAX_RANK_INCREASE)
    }
}

impl ObjectiveFunction0 {
    pub const OCP: u16 = 0;

    pub(crate) fn new(min_hop_rank_increase: u16, max_rank_increase: u16) -> Self {
        Self {
            min_hop_rank_increase,
            max_rank_increase,
        }
    }

    /// Parents closer than this are considered equivalent.
    fn min_difference(&self) -> u32 {
        let mhri = self.min_hop_rank_increase as u32;
        mhri + mhri / 2
    }

    fn path_cost(&self, p: &Parent) -> u32 {
        p.rank.dag_rank() as u32 * self.min_hop_rank_increase as u32 + p.link_metric as u32
    }
}

impl ObjectiveFunction for ObjectiveFunction0 {
    fn ocp(&self) -> u16 {
        Self::OCP
    }

    fn calculate_rank(&self, parent: Option<&Parent>, base_rank: u16) -> Rank {
        let base_rank = match (parent, base_rank) {
            (None, 0) => return Rank::infinite(self.min_hop_rank_increase),
            (Some(p), 0) => p.rank.value(),
            (_, base) => base,
        };

        Rank::new(base_rank, self.min_hop_rank_increase).saturating_add(self.min_hop_rank_increase)
    }

    fn best_parent(&self, p1: &Parent, p2: &Parent, preferred: Option<&Parent>) -> Choice {
        let r1 = self.path_cost(p1);
        let r2 = self.path_cost(p2);
        let min_diff = self.min_difference();

        if r1 < r2 + min_diff && r1 + min_diff > r2 {
            if preferred.map(|p| p.address) == Some(p1.address) {
                return Choice::First;
            }
            if preferred.map(|p| p.address) == Some(p2.address) {
                return Choice::Second;
            }
        }

        if r1 < r2 {
            Choice::First
        } else {
            Choice::Second
        }
    }

    fn max_rank_increase(&self) -> u16 {
        self.max_rank_increase
    }

    fn set_max_rank_increase(&mut self, max_rank_increase: u16) {
        self.max_rank_increase = max_rank_increase;
    }

    fn min_hop_rank_increase(&self) -> u16 {
        self.min_hop_rank_increase
    }

    fn set_min_hop_rank_increase(&mut self, min_hop_rank_increase: u16) {
        self.min_hop_rank_increase = min_hop_rank_increase.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::parent;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::root(Some(256), 0, 512)]
    #[case::deeper(Some(1024), 0, 1280)]
    #[case::explicit_base(Some(1024), 300, 556)]
    #[case::saturates(Some(0xff80), 0, 0xffff)]
    #[case::no_parent_with_base(None, 512, 768)]
    #[case::no_parent(None, 0, 0xffff)]
    fn rank_increase(#[case] parent_rank: Option<u16>, #[case] base: u16, #[case] expected: u16) {
        let of = ObjectiveFunction0::default();
        let p = parent_rank.map(|rank| parent(1, rank, 256));
        assert_eq!(of.calculate_rank(p.as_ref(), base).value(), expected);
    }

    #[test]
    fn lower_cost_wins() {
        let of = ObjectiveFunction0::default();
        let near = parent(1, 256, 128);
        let far = parent(2, 1024, 128);

        assert_eq!(of.best_parent(&near, &far, None), Choice::First);
        assert_eq!(of.best_parent(&far, &near, None), Choice::Second);
        // Far beyond the hysteresis band: the preferred parent is dropped.
        assert_eq!(of.best_parent(&near, &far, Some(&far)), Choice::First);
    }

    #[test]
    fn hysteresis_keeps_preferred_parent() {
        let of = ObjectiveFunction0::default();
        let current = parent(1, 512, 384);
        let candidate = parent(2, 512, 128);

        assert_eq!(of.best_parent(&candidate, &current, None), Choice::First);
        assert_eq!(
            of.best_parent(&candidate, &current, Some(&current)),
            Choice::Second
        );
    }
}
