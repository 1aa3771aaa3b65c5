use crate::tsch::schedule::{Error, Link, LinkOptions, LinkType};
use crate::wire::Ieee802154Address;

use super::{Context, FrameKind, OrchestraConfig, Packet, Rule, Selection, Topology, UnicastMode};

/// Unicast traffic between RPL neighbors in storing mode.
///
/// Every node owns one timeslot, picked by hashing its address. With
/// [`UnicastMode::ReceiverBased`] it listens there and its parent and
/// children send there; with [`UnicastMode::SenderBased`] it is the other
/// way around. Neighbors whose hashes collide share the timeslot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnicastPerNeighborRplStoring {
    handle: u16,
}

/// Options of the link in a node's own timeslot.
fn own_options(mode: UnicastMode) -> LinkOptions {
    match mode {
        UnicastMode::ReceiverBased => LinkOptions::RX,
        UnicastMode::SenderBased => LinkOptions::TX | LinkOptions::SHARED,
    }
}

/// Options of the link in the timeslot of a neighbor.
fn neighbor_options(mode: UnicastMode) -> LinkOptions {
    match mode {
        UnicastMode::ReceiverBased => LinkOptions::TX | LinkOptions::SHARED,
        UnicastMode::SenderBased => LinkOptions::RX,
    }
}

impl UnicastPerNeighborRplStoring {
    fn timeslot(config: &OrchestraConfig, addr: &Ieee802154Address) -> u16 {
        config.timeslot(addr, config.unicast_period)
    }

    fn link(&self, cx: &Context, timeslot: u16, options: LinkOptions) -> Link {
        Link {
            slotframe: self.handle,
            timeslot,
            channel_offset: cx.config.unicast_channel_offset,
            options,
            link_type: LinkType::Normal,
            addr: Ieee802154Address::BROADCAST,
        }
    }

    fn add_neighbor_link(&self, cx: &mut Context, addr: &Ieee802154Address) {
        let mode = cx.config.unicast_mode;
        let timeslot = Self::timeslot(cx.config, addr);
        let mut options = neighbor_options(mode);
        if timeslot == Self::timeslot(cx.config, &cx.topology.own) {
            options |= own_options(mode);
        }

        let link = self.link(cx, timeslot, options);
        match cx.schedule.add_link(link) {
            Ok(_) => net_trace!("orchestra: unicast link for {} at {}", addr, timeslot),
            Err(e) => net_debug!("orchestra: no unicast link for {}: {}", addr, e),
        }
    }

    /// Remove the link of a neighbor we no longer talk to, unless the
    /// parent, a child, or we ourselves still hash to its timeslot.
    fn remove_neighbor_link(&self, cx: &mut Context, addr: &Ieee802154Address) {
        let config = cx.config;
        let timeslot = Self::timeslot(config, addr);
        if cx.schedule.link(self.handle, timeslot).is_none() {
            return;
        }

        let topology = cx.topology;
        let still_used = topology
            .parent
            .iter()
            .chain(topology.children.iter())
            .any(|n| Self::timeslot(config, n) == timeslot);
        if still_used {
            net_trace!("orchestra: timeslot {} of {} still in use", timeslot, addr);
            return;
        }

        if timeslot == Self::timeslot(config, &topology.own) {
            let link = self.link(cx, timeslot, own_options(config.unicast_mode));
            if let Err(e) = cx.schedule.add_link(link) {
                net_debug!("orchestra: cannot restore our unicast link: {}", e);
            }
        } else {
            cx.schedule.remove_link(self.handle, timeslot);
            net_trace!("orchestra: removed the unicast link of {}", addr);
        }
    }

    fn has_link_to(topology: &Topology, addr: &Ieee802154Address) -> bool {
        (topology.is_parent(addr) && topology.parent_knows_us) || topology.is_child(addr)
    }
}

impl Rule for UnicastPerNeighborRplStoring {
    fn init(&mut self, handle: u16, cx: &mut Context) -> Result<(), Error> {
        self.handle = handle;
        cx.schedule.add_slotframe(handle, cx.config.unicast_period)?;

        let own = Self::timeslot(cx.config, &cx.topology.own);
        let link = self.link(cx, own, own_options(cx.config.unicast_mode));
        cx.schedule.add_link(link)?;
        Ok(())
    }

    fn select_packet(
        &self,
        config: &OrchestraConfig,
        topology: &Topology,
        packet: &Packet,
    ) -> Option<Selection> {
        if packet.kind != FrameKind::Data
            || !packet.dst.is_unicast()
            || !Self::has_link_to(topology, &packet.dst)
        {
            return None;
        }

        let owner = match config.unicast_mode {
            UnicastMode::ReceiverBased => &packet.dst,
            UnicastMode::SenderBased => &topology.own,
        };
        Some(Selection {
            slotframe: self.handle,
            timeslot: Self::timeslot(config, owner),
        })
    }

    fn new_time_source(
        &mut self,
        cx: &mut Context,
        old: Option<Ieee802154Address>,
        new: Option<Ieee802154Address>,
    ) {
        if old == new {
            return;
        }
        if let Some(old) = old {
            self.remove_neighbor_link(cx, &old);
        }
        if let Some(new) = new {
            self.add_neighbor_link(cx, &new);
        }
    }

    fn child_added(&mut self, cx: &mut Context, addr: Ieee802154Address) {
        self.add_neighbor_link(cx, &addr);
    }

    fn child_removed(&mut self, cx: &mut Context, addr: Ieee802154Address) {
        self.remove_neighbor_link(cx, &addr);
    }
}
