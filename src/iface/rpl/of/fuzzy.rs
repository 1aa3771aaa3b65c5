//! A fuzzy-logic objective function combining QoS and energy.
//!
//! Two Sugeno-style inference stages turn four crisp inputs into a route
//! quality between 0 and 100:
//!
//!  1. link ETX and delay (hops times link ETX) give a QoS score,
//!  2. that QoS score and the remaining energy along the path give the
//!     quality.
//!
//! Each rule fires with the minimum of its antecedent memberships and
//! outputs a singleton; the stage result is the weighted average of the rule
//! outputs. The rank increase through a parent shrinks as the quality grows,
//! from three hops for a useless route down to a single hop.
//!
//! The membership breakpoints come from [`FuzzyConfig`]. Only their
//! piecewise-linear shapes are fixed here.

use super::{Choice, ObjectiveFunction, Parent, Rank};
use crate::iface::rpl::config::FuzzyConfig;
use crate::iface::rpl::consts::{DEFAULT_MAX_RANK_INCREASE, DEFAULT_MIN_HOP_RANK_INCREASE};
use crate::wire::rpl::options::METRIC_AGGREGATION_ADDITIVE;
use crate::wire::{RplMetricContainer, RplMetricObject};

/// Degree of membership, from 0 to `FULL`.
type Degree = u32;
const FULL: Degree = 100;

/// Memberships in the "low", "medium" and "high" sets of a variable.
fn fuzzify(x: u32, [a, b, c]: [u32; 3]) -> [Degree; 3] {
    [falling(x, a, b), triangle(x, a, b, c), rising(x, b, c)]
}

/// Full up to `a`, zero from `b` on.
fn falling(x: u32, a: u32, b: u32) -> Degree {
    if x <= a {
        FULL
    } else if x >= b {
        0
    } else {
        ramp(b - x, b - a)
    }
}

/// Zero up to `a`, full from `b` on.
fn rising(x: u32, a: u32, b: u32) -> Degree {
    FULL - falling(x, a, b)
}

fn triangle(x: u32, a: u32, b: u32, c: u32) -> Degree {
    if x <= a || x >= c {
        0
    } else if x <= b {
        ramp(x - a, b - a)
    } else {
        ramp(c - x, c - b)
    }
}

/// `num / den` as a degree, `num <= den`.
fn ramp(num: u32, den: u32) -> Degree {
    (num as u64 * FULL as u64 / den.max(1) as u64) as Degree
}

/// Run a 3x3 rule base: `outputs[i][j]` is the output of the rule
/// "first is `i` and second is `j`".
fn infer(first: [Degree; 3], second: [Degree; 3], outputs: &[[u32; 3]; 3]) -> u32 {
    let mut weights = 0;
    let mut sum = 0;
    for (i, row) in outputs.iter().enumerate() {
        for (j, output) in row.iter().enumerate() {
            let strength = first[i].min(second[j]);
            weights += strength;
            sum += strength * output;
        }
    }

    if weights == 0 {
        0
    } else {
        sum / weights
    }
}

/// QoS from link ETX (rows: low, medium, high) and delay (columns).
const QOS_RULES: [[u32; 3]; 3] = [[100, 80, 50], [70, 50, 30], [40, 20, 0]];
/// Quality from QoS (rows: low, medium, high) and energy (columns).
const QUALITY_RULES: [[u32; 3]; 3] = [[0, 10, 30], [20, 50, 70], [40, 80, 100]];

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FuzzyOf {
    max_rank_increase: u16,
    min_hop_rank_increase: u16,
    config: FuzzyConfig,
}

impl FuzzyOf {
    /// Taken from the experimental range of RFC 6550 § 20.6.
    pub const OCP: u16 = 0xf0;

    pub(crate) fn new(config: FuzzyConfig) -> Self {
        Self {
            max_rank_increase: DEFAULT_MAX_RANK_INCREASE,
            min_hop_rank_increase: DEFAULT_MIN_HOP_RANK_INCREASE,
            config,
        }
    }

    fn path_energy(&self, p: &Parent) -> u32 {
        match p.mc {
            Some(RplMetricContainer {
                object: RplMetricObject::Energy { estimation, .. },
                ..
            }) => estimation as u32,
            _ => FULL,
        }
    }

    /// Route quality through `p`, from 0 to 100.
    pub(crate) fn quality(&self, p: &Parent) -> u32 {
        let etx = p.link_metric as u32;
        let hops = (p.rank.dag_rank() as u32).max(1);
        let delay = hops.saturating_mul(etx);
        let energy = self.path_energy(p).min(self.config.energy_estimation as u32);

        let qos = infer(
            fuzzify(etx, self.config.etx),
            fuzzify(delay, self.config.delay),
            &QOS_RULES,
        );
        infer(
            fuzzify(qos, self.config.qos),
            fuzzify(energy, self.config.energy),
            &QUALITY_RULES,
        )
    }

    fn rank_increase(&self, p: &Parent) -> u16 {
        let mhri = self.min_hop_rank_increase as u32;
        let quality = self.quality(p).min(FULL);
        let increase = mhri + (FULL - quality) * mhri / 50;
        increase.min(u16::MAX as u32) as u16
    }
}

impl ObjectiveFunction for FuzzyOf {
    fn ocp(&self) -> u16 {
        Self::OCP
    }

    fn calculate_rank(&self, parent: Option<&Parent>, base_rank: u16) -> Rank {
        let (base_rank, increase) = match (parent, base_rank) {
            (None, 0) => return Rank::infinite(self.min_hop_rank_increase),
            (None, base) => (base, self.min_hop_rank_increase),
            (Some(p), 0) => (p.rank.value(), self.rank_increase(p)),
            (Some(p), base) => (base, self.rank_increase(p)),
        };

        Rank::new(base_rank, self.min_hop_rank_increase).saturating_add(increase)
    }

    fn best_parent(&self, p1: &Parent, p2: &Parent, preferred: Option<&Parent>) -> Choice {
        let r1 = self.calculate_rank(Some(p1), 0).value() as u32;
        let r2 = self.calculate_rank(Some(p2), 0).value() as u32;
        let min_diff = self.min_hop_rank_increase as u32 / 2;

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

    /// Advertise the bottleneck energy of the path: ours, or less if the
    /// path through our parent has less.
    fn metric_container(
        &self,
        is_root: bool,
        preferred: Option<&Parent>,
    ) -> Option<RplMetricContainer> {
        let own = self.config.energy_estimation as u32;
        let estimation = match preferred {
            Some(p) if !is_root => own.min(self.path_energy(p)),
            _ => own,
        };

        Some(RplMetricContainer {
            flags: 0,
            aggregation: METRIC_AGGREGATION_ADDITIVE,
            precedence: 0,
            object: RplMetricObject::Energy {
                flags: 0,
                estimation: estimation as u8,
            },
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
    use rstest::rstest;

    fn with_energy(mut p: Parent, estimation: u8) -> Parent {
        p.mc = Some(RplMetricContainer {
            flags: 0,
            aggregation: METRIC_AGGREGATION_ADDITIVE,
            precedence: 0,
            object: RplMetricObject::Energy {
                flags: 0,
                estimation,
            },
        });
        p
    }

    #[rstest]
    #[case::below(10, 100)]
    #[case::at_a(20, 100)]
    #[case::middle(35, 50)]
    #[case::at_b(50, 0)]
    #[case::above(90, 0)]
    fn falling_edge(#[case] x: u32, #[case] expected: Degree) {
        assert_eq!(falling(x, 20, 50), expected);
    }

    #[test]
    fn wide_breakpoints() {
        let breakpoints = [0, 2_000_000_000, 4_000_000_000];
        assert_eq!(fuzzify(1_000_000_000, breakpoints), [50, 50, 0]);
        assert_eq!(falling(1, 0, u32::MAX), 99);
    }

    #[test]
    fn memberships() {
        assert_eq!(fuzzify(0, [20, 50, 80]), [100, 0, 0]);
        assert_eq!(fuzzify(50, [20, 50, 80]), [0, 100, 0]);
        assert_eq!(fuzzify(65, [20, 50, 80]), [0, 50, 50]);
        assert_eq!(fuzzify(200, [20, 50, 80]), [0, 0, 100]);
    }

    #[test]
    fn weighted_average() {
        // Only the (low, low) and (low, medium) rules fire, equally.
        let out = infer([100, 0, 0], [50, 50, 0], &QOS_RULES);
        assert_eq!(out, 90);
        assert_eq!(infer([0; 3], [0; 3], &QOS_RULES), 0);
    }

    #[test]
    fn quality_bounds() {
        let of = FuzzyOf::new(FuzzyConfig::default());

        // A perfect link to the root with full batteries.
        let best = with_energy(parent(1, 256, 128), 100);
        assert_eq!(of.quality(&best), 100);
        assert_eq!(of.calculate_rank(Some(&best), 0).value(), 512);

        // A lossy link to a deep node with empty batteries.
        let worst = with_energy(parent(2, 256 * 10, 1024), 0);
        assert_eq!(of.quality(&worst), 0);
        assert_eq!(of.calculate_rank(Some(&worst), 0).value(), 2560 + 3 * 256);
    }

    #[test]
    fn energy_matters() {
        let of = FuzzyOf::new(FuzzyConfig::default());
        let full = with_energy(parent(1, 512, 192), 100);
        let drained = with_energy(parent(2, 512, 192), 10);

        assert!(of.quality(&full) > of.quality(&drained));
        assert_eq!(of.best_parent(&drained, &full, None), Choice::Second);
    }

    #[test]
    fn advertises_bottleneck_energy() {
        let mut config = FuzzyConfig::default();
        config.energy_estimation = 70;
        let of = FuzzyOf::new(config);

        let p = with_energy(parent(1, 256, 128), 40);
        let mc = of.metric_container(false, Some(&p)).unwrap();
        assert_eq!(
            mc.object,
            RplMetricObject::Energy {
                flags: 0,
                estimation: 40
            }
        );

        let mc = of.metric_container(true, None).unwrap();
        assert_eq!(
            mc.object,
            RplMetricObject::Energy {
                flags: 0,
                estimation: 70
            }
        );
    }
}
