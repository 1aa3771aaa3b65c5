//! Objective functions.
//!
//! An objective function turns link and path metrics into a rank, and
//! decides which of two candidate parents (or DODAGs) is preferred. The
//! active function is chosen per instance from the Objective Code Point of
//! the DODAG Configuration option and dispatched through [`Of`].

use crate::iface::neighbor::{TxStatus, ETX_DIVISOR};
use crate::wire::RplMetricContainer;

use super::config::{FuzzyConfig, ObjectiveFunctionKind};
use super::dag::Dag;
use super::parents::Parent;
use super::rank::Rank;

#[cfg(feature = "proto-rpl-fuzzy")]
mod fuzzy;
#[cfg(feature = "proto-rpl-mrhof")]
mod mrhof;
#[cfg(feature = "proto-rpl-of0")]
mod of0;

#[cfg(feature = "proto-rpl-fuzzy")]
pub use fuzzy::FuzzyOf;
#[cfg(feature = "proto-rpl-mrhof")]
pub use mrhof::Mrhof;
#[cfg(feature = "proto-rpl-of0")]
pub use of0::ObjectiveFunction0;

/// Which of two candidates an objective function prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Choice {
    First,
    Second,
}

pub trait ObjectiveFunction {
    /// The Objective Code Point advertised in the DODAG Configuration.
    fn ocp(&self) -> u16;

    /// Forget any state tied to the current DODAG version.
    fn reset(&mut self) {}

    /// Link metric of a parent no transmission was reported for yet.
    fn initial_link_metric(&self) -> u16 {
        INITIAL_LINK_METRIC
    }

    /// Feed the outcome of a unicast transmission to a parent.
    fn neighbor_link_callback(&self, parent: &mut Parent, status: TxStatus, numtx: u8) {
        update_link_etx(parent, status, numtx);
    }

    /// Choose between two parents of the same DODAG. When both are close,
    /// the `preferred` parent is kept.
    fn best_parent(&self, p1: &Parent, p2: &Parent, preferred: Option<&Parent>) -> Choice;

    /// Prefer grounded DODAGs, then the higher preference, then the lower
    /// rank.
    fn best_dag(&self, d1: &Dag, d2: &Dag) -> Choice {
        if d1.grounded != d2.grounded {
            return if d1.grounded {
                Choice::First
            } else {
                Choice::Second
            };
        }

        if d1.preference != d2.preference {
            return if d1.preference > d2.preference {
                Choice::First
            } else {
                Choice::Second
            };
        }

        if d1.rank.value() < d2.rank.value() {
            Choice::First
        } else {
            Choice::Second
        }
    }

    /// The rank of this node through `parent`.
    ///
    /// A `base_rank` of zero means "the rank of the parent". Without a parent
    /// and without a base rank, the result is infinite.
    fn calculate_rank(&self, parent: Option<&Parent>, base_rank: u16) -> Rank;

    /// The metric container this node advertises in its DIOs.
    fn metric_container(
        &self,
        is_root: bool,
        preferred: Option<&Parent>,
    ) -> Option<RplMetricContainer> {
        let _ = (is_root, preferred);
        None
    }

    /// Return the MaxRankIncrease value of an Objective Function.
    fn max_rank_increase(&self) -> u16;
    /// Set the MaxRankIncrease value of an Objective Function.
    fn set_max_rank_increase(&mut self, max_rank_increase: u16);

    /// Return the MinHopRankIncrease value of an Objective Function.
    fn min_hop_rank_increase(&self) -> u16;
    /// Set the MinHopRankIncrease value of an Objective Function.
    fn set_min_hop_rank_increase(&mut self, min_hop_rank_increase: u16);
}

/// Link metric before any transmission: an ETX of 2.
pub(crate) const INITIAL_LINK_METRIC: u16 = 2 * ETX_DIVISOR;

const ETX_SCALE: u32 = 100;
const ETX_ALPHA: u32 = 90;
/// ETX charged for a frame that was never acknowledged.
const MAX_LINK_METRIC: u32 = 10;

/// Exponentially weighted moving average of the link ETX.
pub(crate) fn update_link_etx(parent: &mut Parent, status: TxStatus, numtx: u8) {
    let packet_etx = match status {
        TxStatus::Ok => numtx.max(1) as u32 * ETX_DIVISOR as u32,
        TxStatus::NoAck => MAX_LINK_METRIC * ETX_DIVISOR as u32,
        TxStatus::Collision | TxStatus::Error => return,
    };

    let new_etx = if parent.link_metric_valid {
        (parent.link_metric as u32 * ETX_ALPHA + packet_etx * (ETX_SCALE - ETX_ALPHA)) / ETX_SCALE
    } else {
        parent.link_metric_valid = true;
        packet_etx
    };

    net_trace!(
        "rpl: ETX of {} changed from {} to {} (status {:?}, numtx {})",
        parent.address,
        parent.link_metric,
        new_etx,
        status,
        numtx
    );
    parent.link_metric = new_etx.min(u16::MAX as u32) as u16;
}

/// The objective function of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Of {
    #[cfg(feature = "proto-rpl-of0")]
    Of0(ObjectiveFunction0),
    #[cfg(feature = "proto-rpl-mrhof")]
    Mrhof(Mrhof),
    #[cfg(feature = "proto-rpl-fuzzy")]
    Fuzzy(FuzzyOf),
}

impl Default for Of {
    fn default() -> Self {
        Self::new(ObjectiveFunctionKind::default(), &FuzzyConfig::default())
    }
}

macro_rules! dispatch {
    ($self:expr, $of:ident => $e:expr) => {
        match $self {
            #[cfg(feature = "proto-rpl-of0")]
            Of::Of0($of) => $e,
            #[cfg(feature = "proto-rpl-mrhof")]
            Of::Mrhof($of) => $e,
            #[cfg(feature = "proto-rpl-fuzzy")]
            Of::Fuzzy($of) => $e,
        }
    };
}

impl Of {
    pub fn new(kind: ObjectiveFunctionKind, fuzzy: &FuzzyConfig) -> Self {
        let _ = fuzzy;
        match kind {
            #[cfg(feature = "proto-rpl-of0")]
            ObjectiveFunctionKind::Of0 => Of::Of0(ObjectiveFunction0::default()),
            #[cfg(feature = "proto-rpl-mrhof")]
            ObjectiveFunctionKind::Mrhof => Of::Mrhof(Mrhof::default()),
            #[cfg(feature = "proto-rpl-fuzzy")]
            ObjectiveFunctionKind::Fuzzy => Of::Fuzzy(FuzzyOf::new(*fuzzy)),
        }
    }

    /// The objective function with this Objective Code Point, if supported.
    pub fn from_ocp(ocp: u16, fuzzy: &FuzzyConfig) -> Option<Self> {
        let kind = match ocp {
            #[cfg(feature = "proto-rpl-of0")]
            ObjectiveFunction0::OCP => ObjectiveFunctionKind::Of0,
            #[cfg(feature = "proto-rpl-mrhof")]
            Mrhof::OCP => ObjectiveFunctionKind::Mrhof,
            #[cfg(feature = "proto-rpl-fuzzy")]
            FuzzyOf::OCP => ObjectiveFunctionKind::Fuzzy,
            _ => return None,
        };
        Some(Self::new(kind, fuzzy))
    }

    pub fn kind(&self) -> ObjectiveFunctionKind {
        match self {
            #[cfg(feature = "proto-rpl-of0")]
            Of::Of0(_) => ObjectiveFunctionKind::Of0,
            #[cfg(feature = "proto-rpl-mrhof")]
            Of::Mrhof(_) => ObjectiveFunctionKind::Mrhof,
            #[cfg(feature = "proto-rpl-fuzzy")]
            Of::Fuzzy(_) => ObjectiveFunctionKind::Fuzzy,
        }
    }
}

impl ObjectiveFunction for Of {
    fn ocp(&self) -> u16 {
        dispatch!(self, of => of.ocp())
    }

    fn reset(&mut self) {
        dispatch!(self, of => of.reset())
    }

    fn initial_link_metric(&self) -> u16 {
        dispatch!(self, of => of.initial_link_metric())
    }

    fn neighbor_link_callback(&self, parent: &mut Parent, status: TxStatus, numtx: u8) {
        dispatch!(self, of => of.neighbor_link_callback(parent, status, numtx))
    }

    fn best_parent(&self, p1: &Parent, p2: &Parent, preferred: Option<&Parent>) -> Choice {
        dispatch!(self, of => of.best_parent(p1, p2, preferred))
    }

    fn best_dag(&self, d1: &Dag, d2: &Dag) -> Choice {
        dispatch!(self, of => of.best_dag(d1, d2))
    }

    fn calculate_rank(&self, parent: Option<&Parent>, base_rank: u16) -> Rank {
        dispatch!(self, of => of.calculate_rank(parent, base_rank))
    }

    fn metric_container(
        &self,
        is_root: bool,
        preferred: Option<&Parent>,
    ) -> Option<RplMetricContainer> {
        dispatch!(self, of => of.metric_container(is_root, preferred))
    }

    fn max_rank_increase(&self) -> u16 {
        dispatch!(self, of => of.max_rank_increase())
    }

    fn set_max_rank_increase(&mut self, max_rank_increase: u16) {
        dispatch!(self, of => of.set_max_rank_increase(max_rank_increase))
    }

    fn min_hop_rank_increase(&self) -> u16 {
        dispatch!(self, of => of.min_hop_rank_increase())
    }

    fn set_min_hop_rank_increase(&mut self, min_hop_rank_increase: u16) {
        dispatch!(self, of => of.set_min_hop_rank_increase(min_hop_rank_increase))
    }
}
