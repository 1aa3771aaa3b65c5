//! The RPL engine (RFC 6550).
//!
//! [`Rpl`] owns every table of the routing protocol: the instances and their
//! DODAGs, the candidate parents, the routes learnt from DAOs, the neighbor
//! cache and, on a non-storing root, the node table used for source routing.
//!
//! The engine never performs I/O. Inbound control messages, link-layer
//! feedback and neighbor reachability changes are pushed as [`Event`]s, and
//! [`Rpl::poll`] processes them one at a time, to completion, together with
//! the timers that are due. Messages to send end up in an outbox collected
//! with [`Rpl::drain_outbox`], and topology changes relevant to the TSCH
//! scheduler with [`Rpl::drain_notifications`].

#[macro_use]
mod stats;

mod config;
pub(crate) mod consts;
mod dag;
mod event;
mod hbh;
mod icmp;
mod logic;
mod ns;
pub mod of;
mod parents;
mod rank;
mod timers;
mod trickle;

use heapless::{Deque, Vec};

use crate::config::{
    EVENT_QUEUE_SIZE, NOTIFICATION_QUEUE_SIZE, OUTBOX_SIZE, RPL_MAX_INSTANCES, RPL_MAX_PACKET_LEN,
};
use crate::iface::neighbor::NeighborTable;
use crate::iface::route::Routes;
use crate::rand::Rand;
use crate::time::Instant;
use crate::wire::{
    self, Ieee802154Address, Ipv6Address, Ipv6AddressExt, Ipv6Cidr, RplInstanceId, RplPacket,
    RplRepr,
};

pub use self::config::{FuzzyConfig, ObjectiveFunctionKind, RootConfig, RplConfig};
pub use self::dag::{Dag, DagRef, Instance};
pub use self::event::{Event, TimerKind};
pub use self::ns::{NsNode, NsNodeTable, SourceRoute};
pub use self::of::{ObjectiveFunction, Of};
pub use self::parents::{Parent, ParentHandle, ParentTable};
pub use self::rank::Rank;
pub use self::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A fixed-size table is full.
    OutOfMemory,
    UnsupportedObjectiveFunction,
    UnsupportedModeOfOperation,
    /// The operation is reserved to the root of the DODAG.
    NotRoot,
    NotJoined,
    UnknownInstance,
    Malformed,
    /// A packet went down a path that does not lead to its destination.
    ForwardingError,
    /// The rank in a Hop-by-Hop option shows a routing loop.
    RankError,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::UnsupportedObjectiveFunction => write!(f, "unsupported objective function"),
            Error::UnsupportedModeOfOperation => write!(f, "unsupported mode of operation"),
            Error::NotRoot => write!(f, "not the root of the DODAG"),
            Error::NotJoined => write!(f, "not joined to a DODAG"),
            Error::UnknownInstance => write!(f, "unknown RPL instance"),
            Error::Malformed => write!(f, "malformed message"),
            Error::ForwardingError => write!(f, "forwarding error"),
            Error::RankError => write!(f, "rank error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// A topology change the TSCH scheduler must follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notification {
    /// The preferred parent, which is also the TSCH time source, changed.
    NewTimeSource {
        old: Option<Ieee802154Address>,
        new: Option<Ieee802154Address>,
    },
    /// A neighbor became the next hop of a downward route.
    ChildAdded(Ieee802154Address),
    /// A neighbor is no longer the next hop of any downward route.
    ChildRemoved(Ieee802154Address),
}

/// An emitted RPL control message, ready to be put in an IPv6 packet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Outgoing {
    pub src: Ipv6Address,
    pub dst: Ipv6Address,
    pub hop_limit: u8,
    /// The ICMPv6 message, checksum included.
    pub payload: Vec<u8, RPL_MAX_PACKET_LEN>,
}

impl Outgoing {
    /// Decode the message again.
    pub fn repr(&self) -> wire::Result<RplRepr> {
        let packet = RplPacket::new_checked(&self.payload[..])?;
        RplRepr::parse(&packet)
    }
}

/// The RPL control plane of one node.
#[derive(Debug)]
pub struct Rpl {
    config: RplConfig,
    hardware_addr: Ieee802154Address,
    link_local: Ipv6Address,
    /// The address autoconfigured from the prefix of the joined DODAG.
    global_addr: Option<Ipv6Cidr>,

    instances: [Instance; RPL_MAX_INSTANCES],
    parents: ParentTable,
    routes: Routes,
    neighbors: NeighborTable,
    ns_nodes: NsNodeTable,
    stats: Stats,

    rand: Rand,
    now: Instant,
    next_periodic: Instant,
    next_dis: Option<Instant>,
    /// Link-layer address of the preferred parent last announced to the
    /// scheduler.
    time_source: Option<Ieee802154Address>,

    events: Deque<Event, EVENT_QUEUE_SIZE>,
    outbox: Deque<Outgoing, OUTBOX_SIZE>,
    notifications: Deque<Notification, NOTIFICATION_QUEUE_SIZE>,
}

impl Rpl {
    /// Create the engine of the node with this link-layer address.
    ///
    /// A node configured as root creates its DODAG right away. Other nodes
    /// start soliciting DIOs after a short delay.
    pub fn new(config: RplConfig, hardware_addr: Ieee802154Address, now: Instant) -> Self {
        let link_local = hardware_addr
            .as_link_local_address()
            .unwrap_or(Ipv6Address::UNSPECIFIED);
        let root = config.root;

        let mut rpl = Self {
            rand: Rand::new(config.seed),
            config,
            hardware_addr,
            link_local,
            global_addr: None,
            instances: core::array::from_fn(|_| Instance::default()),
            parents: ParentTable::new(),
            routes: Routes::new(),
            neighbors: NeighborTable::new(),
            ns_nodes: NsNodeTable::new(),
            stats: Stats::default(),
            now,
            next_periodic: now + consts::PERIODIC_INTERVAL,
            next_dis: None,
            time_source: None,
            events: Deque::new(),
            outbox: Deque::new(),
            notifications: Deque::new(),
        };

        match root {
            Some(root) => {
                if let Err(e) = rpl.set_root(root) {
                    net_debug!("rpl: could not create the DODAG: {}", e);
                }
            }
            None => rpl.next_dis = Some(now + consts::DIS_START_DELAY),
        }

        rpl
    }

    pub fn config(&self) -> &RplConfig {
        &self.config
    }

    pub fn hardware_addr(&self) -> Ieee802154Address {
        self.hardware_addr
    }

    pub fn link_local_address(&self) -> Ipv6Address {
        self.link_local
    }

    /// The global address autoconfigured from the DODAG prefix.
    pub fn global_address(&self) -> Option<Ipv6Address> {
        self.global_addr.map(|cidr| cidr.address())
    }

    /// Whether `addr` is one of our unicast addresses.
    pub fn has_address(&self, addr: &Ipv6Address) -> bool {
        *addr == self.link_local || Some(*addr) == self.global_address()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn parents(&self) -> &ParentTable {
        &self.parents
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// The child to parent relations known to a non-storing root.
    pub fn ns_nodes(&self) -> &NsNodeTable {
        &self.ns_nodes
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> + '_ {
        self.instances.iter().filter(|i| i.used)
    }

    pub fn instance(&self, id: RplInstanceId) -> Option<&Instance> {
        self.instance_index(id).map(|i| &self.instances[i])
    }

    /// The instance used for traffic that does not name one: the first one
    /// we joined.
    pub fn default_instance(&self) -> Option<&Instance> {
        self.default_instance_index().map(|i| &self.instances[i])
    }

    /// The current DODAG of the default instance.
    pub fn dag(&self) -> Option<&Dag> {
        self.default_instance()?.current_dag()
    }

    /// Our rank in the current DODAG of the default instance.
    pub fn rank(&self) -> Option<Rank> {
        self.dag().map(|dag| dag.rank)
    }

    pub fn is_root(&self) -> bool {
        self.default_instance().map(Instance::is_root).unwrap_or(false)
    }

    pub fn is_joined(&self) -> bool {
        self.instances().any(Instance::is_joined)
    }

    /// The preferred parent in the current DODAG of the default instance.
    pub fn preferred_parent(&self) -> Option<&Parent> {
        self.parents.get(self.dag()?.preferred_parent?)
    }

    /// Collect the messages to send, oldest first.
    pub fn drain_outbox(&mut self) -> impl Iterator<Item = Outgoing> + '_ {
        core::iter::from_fn(move || self.outbox.pop_front())
    }

    /// Collect the topology changes for the scheduler, oldest first.
    pub fn drain_notifications(&mut self) -> impl Iterator<Item = Notification> + '_ {
        core::iter::from_fn(move || self.notifications.pop_front())
    }

    pub(crate) fn instance_index(&self, id: RplInstanceId) -> Option<usize> {
        self.instances
            .iter()
            .position(|inst| inst.used && inst.id == id)
    }

    pub(crate) fn default_instance_index(&self) -> Option<usize> {
        self.instances
            .iter()
            .position(|inst| inst.used && inst.current_dag.is_some())
            .or_else(|| self.instances.iter().position(|inst| inst.used))
    }

    /// Link-layer address of a neighbor, from the neighbor cache or from the
    /// interface identifier of its address.
    pub(crate) fn hardware_addr_of(&self, addr: &Ipv6Address) -> Ieee802154Address {
        self.neighbors
            .lookup(addr)
            .map(|n| n.hardware_addr)
            .unwrap_or_else(|| Ieee802154Address::from_ipv6_iid(addr))
    }

    /// Source address for a message to `dst`.
    pub(crate) fn source_for(&self, dst: &Ipv6Address) -> Ipv6Address {
        if dst.is_routable_unicast() {
            self.global_address().unwrap_or(self.link_local)
        } else {
            self.link_local
        }
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        net_trace!("rpl: notifying {:?}", notification);
        if self.notifications.push_back(notification).is_err() {
            rpl_stat!(self.stats, mem_overflows);
            net_debug!("rpl: notification queue full, dropping {:?}", notification);
        }
    }

    /// Emit `repr` from `src` to `dst` into the outbox.
    pub(crate) fn dispatch(&mut self, src: Ipv6Address, dst: Ipv6Address, repr: &RplRepr) {
        let mut payload = Vec::new();
        if payload.resize(repr.buffer_len(), 0).is_err() {
            rpl_stat!(self.stats, mem_overflows);
            net_debug!("rpl: {} does not fit in a packet", repr);
            return;
        }

        let mut packet = RplPacket::new_unchecked(&mut payload[..]);
        repr.emit(&mut packet);
        packet.fill_checksum(&src, &dst);

        net_trace!("rpl: sending {} to {}", repr, dst);
        let outgoing = Outgoing {
            src,
            dst,
            hop_limit: consts::HOP_LIMIT,
            payload,
        };
        if self.outbox.push_back(outgoing).is_err() {
            rpl_stat!(self.stats, mem_overflows);
            net_debug!("rpl: outbox full, dropping {}", repr);
        }
    }
}
