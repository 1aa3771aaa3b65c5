use crate::config::RPL_MAX_DAG_PER_INSTANCE;
use crate::time::{Duration, Instant};
use crate::wire::{
    Ipv6Address, RplDodagConfiguration, RplInstanceId, RplMetricContainer, RplModeOfOperation,
    RplPrefixInformation, RplSequenceCounter,
};

use super::consts;
use super::of::{ObjectiveFunction, Of};
use super::parents::ParentHandle;
use super::rank::Rank;
use super::trickle::TrickleTimer;

/// Identifies a DODAG: an index in the instance table and an index in the
/// DODAG table of that instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DagRef {
    pub(crate) instance: usize,
    pub(crate) dag: usize,
}

impl DagRef {
    pub fn instance(&self) -> usize {
        self.instance
    }

    pub fn dag(&self) -> usize {
        self.dag
    }
}

/// A DODAG version this node knows of.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dag {
    pub(crate) used: bool,
    pub(crate) joined: bool,
    pub dag_id: Ipv6Address,
    pub version: RplSequenceCounter,
    pub grounded: bool,
    pub preference: u8,
    /// Our rank in this DODAG.
    pub rank: Rank,
    /// The lowest rank we advertised in this DODAG version.
    pub min_rank: Rank,
    /// Seconds before a DODAG we did not join is forgotten.
    pub(crate) lifetime: u32,
    pub(crate) preferred_parent: Option<ParentHandle>,
    pub prefix: Option<RplPrefixInformation>,
}

impl Default for Dag {
    fn default() -> Self {
        Self {
            used: false,
            joined: false,
            dag_id: Ipv6Address::UNSPECIFIED,
            version: RplSequenceCounter::default(),
            grounded: false,
            preference: consts::DEFAULT_PREFERENCE,
            rank: Rank::INFINITE,
            min_rank: Rank::INFINITE,
            lifetime: 0,
            preferred_parent: None,
            prefix: None,
        }
    }
}

impl Dag {
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn preferred_parent(&self) -> Option<ParentHandle> {
        self.preferred_parent
    }
}

/// A DAO waiting for its acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct PendingDaoAck {
    pub(crate) sequence: RplSequenceCounter,
    pub(crate) retransmissions: u8,
    pub(crate) deadline: Instant,
    /// Parent the DAO was sent to.
    pub(crate) parent: Ipv6Address,
}

/// Downward route maintenance of an instance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct DaoState {
    /// When the next DAO is due.
    pub(crate) timer: Option<Instant>,
    /// When our routes must be refreshed.
    pub(crate) lifetime_timer: Option<Instant>,
    pub(crate) sequence: RplSequenceCounter,
    pub(crate) pending_ack: Option<PendingDaoAck>,
}

/// A RPL instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instance {
    pub(crate) used: bool,
    pub id: RplInstanceId,
    pub(crate) of: Of,
    pub mode_of_operation: RplModeOfOperation,
    pub dio_interval_min: u8,
    pub dio_interval_doublings: u8,
    pub dio_redundancy: u8,
    pub default_lifetime: u8,
    pub lifetime_unit: u16,
    pub dtsn_out: RplSequenceCounter,
    /// The metric container advertised in our DIOs.
    pub(crate) mc: Option<RplMetricContainer>,
    pub(crate) current_dag: Option<usize>,
    pub(crate) dags: [Dag; RPL_MAX_DAG_PER_INSTANCE],
    pub(crate) dio_timer: TrickleTimer,
    pub(crate) dao: DaoState,
    /// A DAO-ACK accepted our last DAO.
    pub has_downward_route: bool,
    /// A neighbor waiting for a unicast DIO, and when to send it.
    pub(crate) unicast_dio: Option<(Ipv6Address, Instant)>,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            used: false,
            id: RplInstanceId::from(consts::RPL_DEFAULT_INSTANCE),
            of: Of::default(),
            mode_of_operation: RplModeOfOperation::default(),
            dio_interval_min: consts::DEFAULT_DIO_INTERVAL_MIN,
            dio_interval_doublings: consts::DEFAULT_DIO_INTERVAL_DOUBLINGS,
            dio_redundancy: consts::DEFAULT_DIO_REDUNDANCY_CONSTANT,
            default_lifetime: consts::DEFAULT_LIFETIME,
            lifetime_unit: consts::DEFAULT_LIFETIME_UNIT,
            dtsn_out: RplSequenceCounter::default(),
            mc: None,
            current_dag: None,
            dags: core::array::from_fn(|_| Dag::default()),
            dio_timer: TrickleTimer::default(),
            dao: DaoState::default(),
            has_downward_route: false,
            unicast_dio: None,
        }
    }
}

impl Instance {
    pub(crate) fn new(id: RplInstanceId) -> Self {
        Self {
            used: true,
            id,
            ..Self::default()
        }
    }

    pub fn objective_function(&self) -> &Of {
        &self.of
    }

    pub fn min_hop_rank_increase(&self) -> u16 {
        self.of.min_hop_rank_increase()
    }

    pub fn max_rank_increase(&self) -> u16 {
        self.of.max_rank_increase()
    }

    /// A rank value as seen by this instance.
    pub fn rank(&self, value: u16) -> Rank {
        Rank::new(value, self.min_hop_rank_increase())
    }

    pub fn root_rank(&self) -> Rank {
        Rank::root(self.min_hop_rank_increase())
    }

    pub fn infinite_rank(&self) -> Rank {
        Rank::infinite(self.min_hop_rank_increase())
    }

    pub fn is_storing(&self) -> bool {
        self.mode_of_operation.is_storing()
    }

    pub fn has_downward_routes(&self) -> bool {
        self.mode_of_operation != RplModeOfOperation::NoDownwardRoutesMaintained
    }

    pub fn current_dag(&self) -> Option<&Dag> {
        self.dags.get(self.current_dag?)
    }

    pub(crate) fn current_dag_mut(&mut self) -> Option<&mut Dag> {
        self.dags.get_mut(self.current_dag?)
    }

    pub fn dags(&self) -> impl Iterator<Item = &Dag> + '_ {
        self.dags.iter().filter(|d| d.used)
    }

    /// Whether this node is the root of its current DODAG.
    pub fn is_root(&self) -> bool {
        self.current_dag()
            .map(|d| d.rank.value() == self.root_rank().value())
            .unwrap_or(false)
    }

    /// Whether this node has joined a DODAG of this instance.
    pub fn is_joined(&self) -> bool {
        self.current_dag().map(|d| d.joined).unwrap_or(false)
    }

    pub(crate) fn find_dag(&self, dag_id: &Ipv6Address) -> Option<usize> {
        self.dags
            .iter()
            .position(|d| d.used && d.dag_id == *dag_id)
    }

    /// Reserve a DODAG slot. Returns `None` when the table is full.
    pub(crate) fn alloc_dag(&mut self, dag_id: Ipv6Address) -> Option<usize> {
        let index = self.dags.iter().position(|d| !d.used)?;
        let infinite = self.infinite_rank();
        self.dags[index] = Dag {
            used: true,
            dag_id,
            rank: infinite,
            min_rank: infinite,
            ..Dag::default()
        };
        Some(index)
    }

    /// A lifetime expressed in `lifetime_unit`s.
    pub fn lifetime(&self, units: u8) -> Duration {
        Duration::from_secs(units as u64 * self.lifetime_unit as u64)
    }

    /// Lifetime of the default route and of the routes we advertise.
    pub fn default_route_lifetime(&self) -> Duration {
        self.lifetime(self.default_lifetime)
    }

    /// When something given `units` of lifetime at `now` expires. `None`
    /// for the infinite lifetime.
    pub(crate) fn expiration(&self, now: Instant, units: u8) -> Option<Instant> {
        if units == consts::INFINITE_LIFETIME {
            None
        } else {
            Some(now + self.lifetime(units))
        }
    }

    /// Whether `rank` may be advertised in the DODAG `dag`, given the lowest
    /// rank advertised so far and the maximum rank increase.
    pub fn acceptable_rank(&self, dag: &Dag, rank: Rank) -> bool {
        let max_rank_increase = self.max_rank_increase();
        !rank.is_infinite()
            && (max_rank_increase == 0
                || rank.dag_rank() <= dag.min_rank.saturating_add(max_rank_increase).dag_rank())
    }

    /// Seconds after which an unjoined DODAG without DIOs is forgotten.
    pub(crate) fn dag_lifetime(&self) -> u32 {
        let max_interval_ms =
            1u64 << (self.dio_interval_min as u32 + self.dio_interval_doublings as u32).min(40);
        (max_interval_ms / 1000).min(u32::MAX as u64) as u32 * consts::DAG_LIFETIME_INTERVALS
    }

    /// The DODAG Configuration option we advertise.
    pub fn dodag_configuration(&self) -> RplDodagConfiguration {
        RplDodagConfiguration {
            authentication_enabled: false,
            path_control_size: 0,
            dio_interval_doublings: self.dio_interval_doublings,
            dio_interval_min: self.dio_interval_min,
            dio_redundancy_constant: self.dio_redundancy,
            max_rank_increase: self.max_rank_increase(),
            minimum_hop_rank_increase: self.min_hop_rank_increase(),
            objective_code_point: self.of.ocp(),
            default_lifetime: self.default_lifetime,
            lifetime_unit: self.lifetime_unit,
        }
    }

    /// Take the parameters of a DODAG Configuration.
    pub(crate) fn apply_configuration(&mut self, conf: &RplDodagConfiguration) {
        self.dio_interval_doublings = conf.dio_interval_doublings;
        self.dio_interval_min = conf.dio_interval_min;
        self.dio_redundancy = conf.dio_redundancy_constant;
        self.of.set_max_rank_increase(conf.max_rank_increase);
        self.of
            .set_min_hop_rank_increase(conf.minimum_hop_rank_increase);
        self.default_lifetime = conf.default_lifetime;
        self.lifetime_unit = conf.lifetime_unit;
        self.dio_timer = TrickleTimer::from_dio_params(
            self.dio_interval_min,
            self.dio_interval_doublings,
            self.dio_redundancy,
        );
    }

    /// Whether a DIO of another DODAG may coexist with ours in this instance.
    pub(crate) fn is_compatible(
        &self,
        conf: &RplDodagConfiguration,
        mode_of_operation: RplModeOfOperation,
    ) -> bool {
        self.of.ocp() == conf.objective_code_point
            && self.mode_of_operation == mode_of_operation
            && self.max_rank_increase() == conf.max_rank_increase
            && self.min_hop_rank_increase() == conf.minimum_hop_rank_increase
            && self.dio_interval_doublings == conf.dio_interval_doublings
            && self.dio_interval_min == conf.dio_interval_min
            && self.dio_redundancy == conf.dio_redundancy_constant
            && self.default_lifetime == conf.default_lifetime
            && self.lifetime_unit == conf.lifetime_unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Instance {
        Instance::new(RplInstanceId::from(consts::RPL_DEFAULT_INSTANCE))
    }

    #[test]
    fn acceptable_rank() {
        let inst = instance();
        let mut dag = Dag::default();
        dag.min_rank = inst.rank(512);

        // min_rank 2 + max increase 7.
        assert!(inst.acceptable_rank(&dag, inst.rank(512)));
        assert!(inst.acceptable_rank(&dag, inst.rank(9 * 256 + 255)));
        assert!(!inst.acceptable_rank(&dag, inst.rank(10 * 256)));
        assert!(!inst.acceptable_rank(&dag, inst.infinite_rank()));
    }

    #[test]
    fn unlimited_rank_increase() {
        let mut inst = instance();
        inst.of.set_max_rank_increase(0);
        let mut dag = Dag::default();
        dag.min_rank = inst.rank(512);

        assert!(inst.acceptable_rank(&dag, inst.rank(0xff00)));
        assert!(!inst.acceptable_rank(&dag, inst.infinite_rank()));
    }

    #[test]
    fn dag_table() {
        let mut inst = instance();
        let a = Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 1);
        let b = Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 2);

        let ia = inst.alloc_dag(a).unwrap();
        let ib = inst.alloc_dag(b).unwrap();
        assert_ne!(ia, ib);
        assert_eq!(inst.find_dag(&b), Some(ib));
        assert!(inst.dags[ia].rank.is_infinite());

        if RPL_MAX_DAG_PER_INSTANCE == 2 {
            assert!(inst.alloc_dag(Ipv6Address::LOCALHOST).is_none());
        }
    }

    #[test]
    fn configuration_compatibility() {
        let inst = instance();
        let mut conf = inst.dodag_configuration();
        assert!(inst.is_compatible(&conf, inst.mode_of_operation));

        conf.dio_interval_min += 1;
        assert!(!inst.is_compatible(&conf, inst.mode_of_operation));
    }

    #[test]
    fn dag_lifetime() {
        let inst = instance();
        // 2^20 ms is 1048 s, three intervals.
        assert_eq!(inst.dag_lifetime(), 1048 * 3);
        assert_eq!(inst.default_route_lifetime(), Duration::from_secs(30 * 60));
        assert_eq!(inst.expiration(Instant::ZERO, consts::INFINITE_LIFETIME), None);
        assert_eq!(
            inst.expiration(Instant::ZERO, 2),
            Some(Instant::from_secs(120))
        );
    }
}
