//! Orchestra, an autonomous TSCH scheduler (Duquennoy et al., SenSys 2015).
//!
//! Orchestra never negotiates cells. Every node derives its schedule from
//! the RPL topology it already knows: its time source (the preferred
//! parent) and its children (the next hops of its downward routes). Each
//! [`Rule`] owns one slotframe and places links in it by hashing link-layer
//! addresses, so that two neighbors compute the same cell independently.
//!
//! Topology changes come from the RPL engine as [`Notification`]s, see
//! [`Orchestra::process_notifications`].

use heapless::Vec;

use crate::config::{ORCHESTRA_MAX_CHILDREN, TSCH_MAX_SLOTFRAMES};
use crate::iface::neighbor::TxStatus;
use crate::iface::rpl::{Notification, Rpl};
use crate::wire::Ieee802154Address;

use super::schedule::{Error, Schedule};

mod default_common;
mod eb_per_time_source;
mod unicast_per_neighbor;

pub use self::default_common::DefaultCommon;
pub use self::eb_per_time_source::EbPerTimeSource;
pub use self::unicast_per_neighbor::UnicastPerNeighborRplStoring;

/// Hash of a link-layer address that Orchestra turns into a timeslot.
pub type LinkAddrHash = fn(&Ieee802154Address) -> u16;

/// The last octet of the address.
pub fn last_octet_hash(addr: &Ieee802154Address) -> u16 {
    addr.last_octet().unwrap_or(0) as u16
}

/// Which side of a unicast link owns the timeslot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnicastMode {
    /// A node listens in its own timeslot; neighbors send there.
    ReceiverBased,
    /// A node sends in its own timeslot; neighbors listen there.
    SenderBased,
}

/// Slotframe periods and channel offsets of the rules.
///
/// Periods are best chosen mutually prime, so that the slotframes do not
/// keep colliding on the same absolute slots.
#[derive(Debug, Clone, Copy)]
pub struct OrchestraConfig {
    pub eb_period: u16,
    pub eb_channel_offset: u16,
    pub unicast_period: u16,
    pub unicast_channel_offset: u16,
    pub unicast_mode: UnicastMode,
    pub common_period: u16,
    pub common_channel_offset: u16,
    pub hash: LinkAddrHash,
}

impl Default for OrchestraConfig {
    fn default() -> Self {
        Self {
            eb_period: 397,
            eb_channel_offset: 0,
            unicast_period: 17,
            unicast_channel_offset: 2,
            unicast_mode: UnicastMode::ReceiverBased,
            common_period: 31,
            common_channel_offset: 1,
            hash: last_octet_hash,
        }
    }
}

impl OrchestraConfig {
    pub fn with_unicast_mode(mut self, mode: UnicastMode) -> Self {
        self.unicast_mode = mode;
        self
    }

    pub fn with_unicast_period(mut self, period: u16) -> Self {
        self.unicast_period = period;
        self
    }

    pub fn with_hash(mut self, hash: LinkAddrHash) -> Self {
        self.hash = hash;
        self
    }

    /// The timeslot of `addr` in a slotframe of `period` timeslots.
    pub fn timeslot(&self, addr: &Ieee802154Address, period: u16) -> u16 {
        (self.hash)(addr) % period.max(1)
    }
}

/// What Orchestra knows of the RPL topology.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Topology {
    pub own: Ieee802154Address,
    /// The preferred parent, which is also our time source.
    pub parent: Option<Ieee802154Address>,
    /// The parent acknowledged one of our frames, so it has a link to us.
    pub parent_knows_us: bool,
    pub children: Vec<Ieee802154Address, ORCHESTRA_MAX_CHILDREN>,
}

impl Topology {
    pub fn is_child(&self, addr: &Ieee802154Address) -> bool {
        self.children.contains(addr)
    }

    pub fn is_parent(&self, addr: &Ieee802154Address) -> bool {
        self.parent.as_ref() == Some(addr)
    }
}

/// The kind of frame waiting to be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameKind {
    /// An Enhanced Beacon.
    Beacon,
    Data,
    Command,
}

/// A frame waiting to be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    pub dst: Ieee802154Address,
    pub kind: FrameKind,
}

/// The cell a frame is sent in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Selection {
    pub slotframe: u16,
    pub timeslot: u16,
}

/// What a rule sees when it reacts to a change.
pub struct Context<'a> {
    pub config: &'a OrchestraConfig,
    pub topology: &'a Topology,
    pub schedule: &'a mut Schedule,
}

/// A slotframe and the policy that fills it.
pub trait Rule {
    /// Create the slotframe `handle` and its static links.
    fn init(&mut self, handle: u16, cx: &mut Context) -> Result<(), Error>;

    /// Claim a frame. The first rule that does picks its cell.
    fn select_packet(
        &self,
        config: &OrchestraConfig,
        topology: &Topology,
        packet: &Packet,
    ) -> Option<Selection>;

    /// The time source changed. The topology already has the new one.
    fn new_time_source(
        &mut self,
        cx: &mut Context,
        old: Option<Ieee802154Address>,
        new: Option<Ieee802154Address>,
    ) {
        let _ = (cx, old, new);
    }

    /// A child appeared. The topology already has it.
    fn child_added(&mut self, cx: &mut Context, addr: Ieee802154Address) {
        let _ = (cx, addr);
    }

    /// A child left. The topology no longer has it.
    fn child_removed(&mut self, cx: &mut Context, addr: Ieee802154Address) {
        let _ = (cx, addr);
    }
}

/// One of the rules, in the order they are consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AnyRule {
    EbPerTimeSource(EbPerTimeSource),
    UnicastPerNeighbor(UnicastPerNeighborRplStoring),
    DefaultCommon(DefaultCommon),
}

macro_rules! dispatch {
    ($self:expr, $rule:ident => $e:expr) => {
        match $self {
            AnyRule::EbPerTimeSource($rule) => $e,
            AnyRule::UnicastPerNeighbor($rule) => $e,
            AnyRule::DefaultCommon($rule) => $e,
        }
    };
}

impl Rule for AnyRule {
    fn init(&mut self, handle: u16, cx: &mut Context) -> Result<(), Error> {
        dispatch!(self, rule => rule.init(handle, cx))
    }

    fn select_packet(
        &self,
        config: &OrchestraConfig,
        topology: &Topology,
        packet: &Packet,
    ) -> Option<Selection> {
        dispatch!(self, rule => rule.select_packet(config, topology, packet))
    }

    fn new_time_source(
        &mut self,
        cx: &mut Context,
        old: Option<Ieee802154Address>,
        new: Option<Ieee802154Address>,
    ) {
        dispatch!(self, rule => rule.new_time_source(cx, old, new))
    }

    fn child_added(&mut self, cx: &mut Context, addr: Ieee802154Address) {
        dispatch!(self, rule => rule.child_added(cx, addr))
    }

    fn child_removed(&mut self, cx: &mut Context, addr: Ieee802154Address) {
        dispatch!(self, rule => rule.child_removed(cx, addr))
    }
}

/// The scheduler: a TSCH schedule kept in line with the RPL topology.
#[derive(Debug)]
pub struct Orchestra {
    config: OrchestraConfig,
    topology: Topology,
    rules: Vec<AnyRule, TSCH_MAX_SLOTFRAMES>,
    schedule: Schedule,
}

impl Orchestra {
    /// The usual rule set: Enhanced Beacons, per-neighbor unicast for
    /// storing mode, and a shared slot for everything else.
    pub fn new(own: Ieee802154Address, config: OrchestraConfig) -> Result<Self, Error> {
        let mut rules = Vec::new();
        for rule in [
            AnyRule::EbPerTimeSource(EbPerTimeSource::default()),
            AnyRule::UnicastPerNeighbor(UnicastPerNeighborRplStoring::default()),
            AnyRule::DefaultCommon(DefaultCommon::default()),
        ] {
            rules.push(rule).map_err(|_| Error::OutOfMemory)?;
        }
        Self::with_rules(own, config, rules)
    }

    /// Orchestra with custom rules. Rule `i` gets slotframe handle `i`.
    pub fn with_rules(
        own: Ieee802154Address,
        config: OrchestraConfig,
        mut rules: Vec<AnyRule, TSCH_MAX_SLOTFRAMES>,
    ) -> Result<Self, Error> {
        let topology = Topology {
            own,
            parent: None,
            parent_knows_us: false,
            children: Vec::new(),
        };
        let mut schedule = Schedule::new();
        let mut cx = Context {
            config: &config,
            topology: &topology,
            schedule: &mut schedule,
        };
        for (handle, rule) in rules.iter_mut().enumerate() {
            rule.init(handle as u16, &mut cx)?;
        }
        net_debug!("orchestra: started with {} rules", rules.len());

        Ok(Self {
            config,
            topology,
            rules,
            schedule,
        })
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn config(&self) -> &OrchestraConfig {
        &self.config
    }

    /// Pick the cell of an outgoing frame: the first rule that claims it
    /// wins.
    pub fn packet_ready(&self, packet: &Packet) -> Option<Selection> {
        let selection = self
            .rules
            .iter()
            .find_map(|rule| rule.select_packet(&self.config, &self.topology, packet));
        net_trace!("orchestra: {:?} to {} goes to {:?}", packet.kind, packet.dst, selection);
        selection
    }

    /// A frame to `dst` was sent. An acknowledgement from the parent proves
    /// it installed a link to us.
    pub fn packet_sent(&mut self, dst: &Ieee802154Address, status: TxStatus) {
        if status == TxStatus::Ok && self.topology.is_parent(dst) && !self.topology.parent_knows_us
        {
            net_debug!("orchestra: parent {} knows us", dst);
            self.topology.parent_knows_us = true;
        }
    }

    pub fn new_time_source(
        &mut self,
        old: Option<Ieee802154Address>,
        new: Option<Ieee802154Address>,
    ) {
        net_debug!("orchestra: new time source {:?} (was {:?})", new, old);
        self.topology.parent = new;
        self.topology.parent_knows_us = false;
        self.for_each_rule(|rule, cx| rule.new_time_source(cx, old, new));
    }

    pub fn child_added(&mut self, addr: Ieee802154Address) {
        if self.topology.is_child(&addr) {
            return;
        }
        if self.topology.children.push(addr).is_err() {
            net_debug!("orchestra: too many children, ignoring {}", addr);
            return;
        }
        net_debug!("orchestra: child {} added", addr);
        self.for_each_rule(|rule, cx| rule.child_added(cx, addr));
    }

    pub fn child_removed(&mut self, addr: Ieee802154Address) {
        let Some(index) = self.topology.children.iter().position(|c| *c == addr) else {
            return;
        };
        self.topology.children.swap_remove(index);
        net_debug!("orchestra: child {} removed", addr);
        self.for_each_rule(|rule, cx| rule.child_removed(cx, addr));
    }

    pub fn handle_notification(&mut self, notification: Notification) {
        match notification {
            Notification::NewTimeSource { old, new } => self.new_time_source(old, new),
            Notification::ChildAdded(addr) => self.child_added(addr),
            Notification::ChildRemoved(addr) => self.child_removed(addr),
        }
    }

    /// Follow every topology change the RPL engine reported since the last
    /// call.
    pub fn process_notifications(&mut self, rpl: &mut Rpl) {
        for notification in rpl.drain_notifications() {
            self.handle_notification(notification);
        }
    }

    fn for_each_rule<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut AnyRule, &mut Context),
    {
        let mut cx = Context {
            config: &self.config,
            topology: &self.topology,
            schedule: &mut self.schedule,
        };
        for rule in self.rules.iter_mut() {
            f(rule, &mut cx);
        }
    }
}
