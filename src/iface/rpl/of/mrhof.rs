use super::{Choice, ObjectiveFunction, Parent, Rank};
use crate::iface::neighbor::ETX_DIVISOR;
use crate::iface::rpl::consts::{DEFAULT_MAX_RANK_INCREASE, DEFAULT_MIN_HOP_RANK_INCREASE};
use crate::wire::rpl::options::METRIC_AGGREGATION_ADDITIVE;
use crate::wire::{RplMetricContainer, RplMetricObject};

/// The Minimum Rank with Hysteresis Objective Function (RFC 6719), using
/// the ETX metric.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mrhof {
    max_rank_increase: u16,
    min_hop_rank_increase: u16,
}

impl Default for Mrhof {
    fn default() -> Self {
        Self {
            max_rank_increase: DEFAULT_MAX_RANK_INCREASE,
            min_hop_rank_increase: DEFAULT_MIN_HOP_RANK_INCREASE,
        }
    }
}

impl Mrhof {
    pub const OCP: u16 = 1;

    /// Switch only to a parent whose path is at least half a transmission
    /// cheaper.
    const PARENT_SWITCH_THRESHOLD: u32 = ETX_DIVISOR as u32 / 2;
    /// Path cost through no parent at all.
    const MAX_PATH_COST: u32 = 100 * ETX_DIVISOR as u32;

    /// The path ETX through `p`: what it advertised plus the link towards it.
    ///
    /// Parents without an ETX metric container are judged on their rank.
    fn path_metric(p: Option<&Parent>) -> u32 {
        let Some(p) = p else {
            return Self::MAX_PATH_COST;
        };

        let advertised = match p.mc {
            Some(RplMetricContainer {
                object: RplMetricObject::Etx(etx),
                ..
            }) => etx,
            _ => p.rank.value(),
        };
        advertised as u32 + p.link_metric as u32
    }
}

impl ObjectiveFunction for Mrhof {
    fn ocp(&self) -> u16 {
        Self::OCP
    }

    fn calculate_rank(&self, parent: Option<&Parent>, base_rank: u16) -> Rank {
        let (base_rank, increase) = match (parent, base_rank) {
            (None, 0) => return Rank::infinite(self.min_hop_rank_increase),
            (None, base) => (base, self.initial_link_metric()),
            (Some(p), 0) => (p.rank.value(), p.link_metric),
            (Some(p), base) => (base, p.link_metric),
        };

        Rank::new(base_rank, self.min_hop_rank_increase)
            .saturating_add(increase.max(self.min_hop_rank_increase))
    }

    fn best_parent(&self, p1: &Parent, p2: &Parent, preferred: Option<&Parent>) -> Choice {
        let m1 = Self::path_metric(Some(p1));
        let m2 = Self::path_metric(Some(p2));

        if let Some(preferred) = preferred {
            let close = m1 < m2 + Self::PARENT_SWITCH_THRESHOLD
                && m1 + Self::PARENT_SWITCH_THRESHOLD > m2;
            if close && preferred.address == p1.address {
                return Choice::First;
            }
            if close && preferred.address == p2.address {
                return Choice::Second;
            }
        }

        if m1 < m2 {
            Choice::First
        } else {
            Choice::Second
        }
    }

    fn metric_container(
        &self,
        is_root: bool,
        preferred: Option<&Parent>,
    ) -> Option<RplMetricContainer> {
        let path_metric = if is_root {
            0
        } else {
            Self::path_metric(preferred)
        };

        Some(RplMetricContainer {
            flags: 0,
            aggregation: METRIC_AGGREGATION_ADDITIVE,
            precedence: 0,
            object: RplMetricObject::Etx(path_metric.min(u16::MAX as u32) as u16),
        })
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

    fn with_etx(mut p: Parent, etx: u16) -> Parent {
        p.mc = Some(RplMetricContainer {
            flags: 0,
            aggregation: METRIC_AGGREGATION_ADDITIVE,
            precedence: 0,
            object: RplMetricObject::Etx(etx),
        });
        p
    }

    #[test]
    fn rank_follows_link_metric() {
        let of = Mrhof::default();
        let p = parent(1, 256, 300);
        assert_eq!(of.calculate_rank(Some(&p), 0).value(), 556);

        // Never less than one hop.
        let p = parent(1, 256, 128);
        assert_eq!(of.calculate_rank(Some(&p), 0).value(), 512);

        assert!(of.calculate_rank(None, 0).is_infinite());
        assert_eq!(of.calculate_rank(None, 512).value(), 768);
    }

    #[test]
    fn path_metric_prefers_advertised_etx() {
        let of = Mrhof::default();
        // Same rank, but the first parent has a much better path ETX.
        let good = with_etx(parent(1, 768, 128), 256);
        let bad = with_etx(parent(2, 768, 128), 1024);
        assert_eq!(of.best_parent(&good, &bad, None), Choice::First);
        assert_eq!(of.best_parent(&bad, &good, None), Choice::Second);
    }

    #[test]
    fn switch_threshold() {
        let of = Mrhof::default();
        let current = with_etx(parent(1, 512, 200), 256);
        let slightly_better = with_etx(parent(2, 512, 160), 256);
        let much_better = with_etx(parent(3, 512, 128), 128);

        assert_eq!(
            of.best_parent(&slightly_better, &current, Some(&current)),
            Choice::Second
        );
        assert_eq!(
            of.best_parent(&much_better, &current, Some(&current)),
            Choice::First
        );
    }

    #[test]
    fn metric_container() {
        let of = Mrhof::default();
        let root_mc = of.metric_container(true, None).unwrap();
        assert_eq!(root_mc.object, RplMetricObject::Etx(0));

        let p = with_etx(parent(1, 256, 200), 0);
        let mc = of.metric_container(false, Some(&p)).unwrap();
        assert_eq!(mc.object, RplMetricObject::Etx(200));
    }
}
