use crate::wire::{
    Ipv6Address, Ipv6Cidr, RplDodagConfiguration, RplInstanceId, RplModeOfOperation,
};

use super::consts;
use super::of::{ObjectiveFunction, Of};

/// The objective function a root advertises and a node accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ObjectiveFunctionKind {
    #[cfg(feature = "proto-rpl-of0")]
    Of0,
    #[cfg(feature = "proto-rpl-mrhof")]
    Mrhof,
    #[cfg(feature = "proto-rpl-fuzzy")]
    Fuzzy,
}

impl Default for ObjectiveFunctionKind {
    fn default() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(feature = "proto-rpl-mrhof")] {
                Self::Mrhof
            } else if #[cfg(feature = "proto-rpl-of0")] {
                Self::Of0
            } else {
                Self::Fuzzy
            }
        }
    }
}

/// Breakpoints of the membership functions of the fuzzy objective function.
///
/// Every linguistic variable has three breakpoints `[a, b, c]`: "low" is full
/// up to `a` and gone at `b`, "medium" is a triangle over `[a, c]` peaking at
/// `b`, and "high" rises from `b` and is full from `c` on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FuzzyConfig {
    /// Link ETX, with a divisor of 128.
    pub etx: [u32; 3],
    /// Hop count times link ETX, with a divisor of 128.
    pub delay: [u32; 3],
    /// Remaining energy along the path, in percent.
    pub energy: [u32; 3],
    /// Intermediate QoS, in percent.
    pub qos: [u32; 3],
    /// Energy this node advertises, in percent.
    pub energy_estimation: u8,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            etx: [128, 256, 512],
            delay: [256, 768, 1536],
            energy: [20, 50, 80],
            qos: [30, 50, 70],
            energy_estimation: 100,
        }
    }
}

/// The DODAG a root creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RootConfig {
    pub instance_id: RplInstanceId,
    /// `None` uses the global address of the node, or its link-local
    /// address when no prefix is configured.
    pub dodag_id: Option<Ipv6Address>,
    /// Prefix advertised in DIOs, from which nodes autoconfigure an address.
    pub prefix: Option<Ipv6Cidr>,
}

impl RootConfig {
    pub fn new(instance_id: RplInstanceId, dodag_id: Ipv6Address) -> Self {
        Self {
            instance_id,
            dodag_id: Some(dodag_id),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: Ipv6Cidr) -> Self {
        self.prefix = Some(prefix);
        self
    }
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            instance_id: RplInstanceId::from(consts::RPL_DEFAULT_INSTANCE),
            dodag_id: None,
            prefix: None,
        }
    }
}

/// Runtime configuration of the RPL engine.
///
/// The DODAG parameters only matter on a root: other nodes take them from
/// the DODAG Configuration option of the DIOs they hear.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RplConfig {
    pub(crate) mode_of_operation: RplModeOfOperation,
    pub(crate) objective_function: ObjectiveFunctionKind,
    pub(crate) root: Option<RootConfig>,
    pub(crate) dio_interval_min: u8,
    pub(crate) dio_interval_doublings: u8,
    pub(crate) dio_redundancy_constant: u8,
    pub(crate) max_rank_increase: u16,
    pub(crate) min_hop_rank_increase: u16,
    pub(crate) default_lifetime: u8,
    pub(crate) lifetime_unit: u16,
    pub(crate) preference: u8,
    pub(crate) grounded: bool,
    pub(crate) dao_ack: bool,
    pub(crate) fuzzy: FuzzyConfig,
    pub(crate) seed: u64,
}

impl Default for RplConfig {
    fn default() -> Self {
        Self::new(RplModeOfOperation::StoringModeWithoutMulticast)
    }
}

impl RplConfig {
    pub fn new(mode_of_operation: RplModeOfOperation) -> Self {
        Self {
            mode_of_operation,
            objective_function: ObjectiveFunctionKind::default(),
            root: None,
            dio_interval_min: consts::DEFAULT_DIO_INTERVAL_MIN,
            dio_interval_doublings: consts::DEFAULT_DIO_INTERVAL_DOUBLINGS,
            dio_redundancy_constant: consts::DEFAULT_DIO_REDUNDANCY_CONSTANT,
            max_rank_increase: consts::DEFAULT_MAX_RANK_INCREASE,
            min_hop_rank_increase: consts::DEFAULT_MIN_HOP_RANK_INCREASE,
            default_lifetime: consts::DEFAULT_LIFETIME,
            lifetime_unit: consts::DEFAULT_LIFETIME_UNIT,
            preference: consts::DEFAULT_PREFERENCE,
            grounded: false,
            dao_ack: true,
            fuzzy: FuzzyConfig::default(),
            seed: 0,
        }
    }

    /// Make this node the root of a DODAG.
    pub fn add_root_config(mut self, root: RootConfig) -> Self {
        self.root = Some(root);
        self
    }

    pub fn with_objective_function(mut self, of: ObjectiveFunctionKind) -> Self {
        self.objective_function = of;
        self
    }

    pub fn with_dio_intmin(mut self, value: u8) -> Self {
        self.dio_interval_min = value;
        self
    }

    pub fn with_dio_intdoubl(mut self, value: u8) -> Self {
        self.dio_interval_doublings = value;
        self
    }

    pub fn with_dio_redundancy(mut self, value: u8) -> Self {
        self.dio_redundancy_constant = value;
        self
    }

    /// A value of zero does not limit the rank increase.
    pub fn with_max_rank_increase(mut self, value: u16) -> Self {
        self.max_rank_increase = value;
        self
    }

    pub fn with_min_hop_rank_increase(mut self, value: u16) -> Self {
        self.min_hop_rank_increase = value.max(1);
        self
    }

    /// Route lifetime, in units of `lifetime_unit` seconds.
    pub fn with_lifetime(mut self, default_lifetime: u8, lifetime_unit: u16) -> Self {
        self.default_lifetime = default_lifetime;
        self.lifetime_unit = lifetime_unit;
        self
    }

    pub fn with_preference(mut self, value: u8) -> Self {
        self.preference = value & 0b111;
        self
    }

    pub fn with_grounded(mut self, value: bool) -> Self {
        self.grounded = value;
        self
    }

    /// Request a DAO-ACK for every DAO and retransmit until it arrives.
    pub fn with_dao_ack(mut self, value: bool) -> Self {
        self.dao_ack = value;
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: FuzzyConfig) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    /// Seed of the random generator used for timer jitter.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn mode_of_operation(&self) -> RplModeOfOperation {
        self.mode_of_operation
    }

    pub fn objective_function(&self) -> ObjectiveFunctionKind {
        self.objective_function
    }

    pub fn root(&self) -> Option<&RootConfig> {
        self.root.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.root.is_some()
    }

    /// The DODAG Configuration a root built from this configuration
    /// advertises. Also the defaults for DIOs that carry none.
    pub(crate) fn dodag_configuration(&self) -> RplDodagConfiguration {
        RplDodagConfiguration {
            authentication_enabled: false,
            path_control_size: 0,
            dio_interval_doublings: self.dio_interval_doublings,
            dio_interval_min: self.dio_interval_min,
            dio_redundancy_constant: self.dio_redundancy_constant,
            max_rank_increase: self.max_rank_increase,
            minimum_hop_rank_increase: self.min_hop_rank_increase,
            objective_code_point: Of::new(self.objective_function, &self.fuzzy).ocp(),
            default_lifetime: self.default_lifetime,
            lifetime_unit: self.lifetime_unit,
        }
    }
}
