use crate::tsch::schedule::{Error, Link, LinkOptions, LinkType};
use crate::wire::Ieee802154Address;

use super::{Context, FrameKind, OrchestraConfig, Packet, Rule, Selection, Topology};

/// Enhanced Beacons: every node beacons in the timeslot of its own hash and
/// listens in the timeslot of its time source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EbPerTimeSource {
    handle: u16,
}

impl EbPerTimeSource {
    fn own_link(&self, cx: &Context, timeslot: u16, options: LinkOptions) -> Link {
        Link {
            slotframe: self.handle,
            timeslot,
            channel_offset: cx.config.eb_channel_offset,
            options,
            link_type: LinkType::Advertising,
            addr: Ieee802154Address::BROADCAST,
        }
    }

    fn add(cx: &mut Context, link: Link) {
        if let Err(e) = cx.schedule.add_link(link) {
            net_debug!("orchestra: cannot add EB link {}: {}", link, e);
        }
    }
}

impl Rule for EbPerTimeSource {
    fn init(&mut self, handle: u16, cx: &mut Context) -> Result<(), Error> {
        self.handle = handle;
        let period = cx.config.eb_period;
        cx.schedule.add_slotframe(handle, period)?;

        let own = cx.config.timeslot(&cx.topology.own, period);
        let link = self.own_link(cx, own, LinkOptions::TX);
        cx.schedule.add_link(link)?;
        Ok(())
    }

    fn select_packet(
        &self,
        config: &OrchestraConfig,
        topology: &Topology,
        packet: &Packet,
    ) -> Option<Selection> {
        if packet.kind != FrameKind::Beacon {
            return None;
        }
        Some(Selection {
            slotframe: self.handle,
            timeslot: config.timeslot(&topology.own, config.eb_period),
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
        let period = cx.config.eb_period;
        let own = cx.config.timeslot(&cx.topology.own, period);

        if let Some(old) = old {
            let timeslot = cx.config.timeslot(&old, period);
            if timeslot == own {
                // Back to beaconing only.
                let link = self.own_link(cx, own, LinkOptions::TX);
                Self::add(cx, link);
            } else {
                cx.schedule.remove_link(self.handle, timeslot);
            }
        }

        if let Some(new) = new {
            let timeslot = cx.config.timeslot(&new, period);
            let options = LinkOptions::RX | LinkOptions::TIME_KEEPING;
            let link = if timeslot == own {
                self.own_link(cx, timeslot, options | LinkOptions::TX)
            } else {
                Link {
                    addr: new,
                    ..self.own_link(cx, timeslot, options)
                }
            };
            Self::add(cx, link);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{addr, orchestra};
    use super::*;

    #[test]
    fn listens_to_the_time_source() {
        let mut orchestra = orchestra(0x10);
        orchestra.new_time_source(None, Some(addr(0x01)));

        let rx = orchestra.schedule().link(0, 0x01).unwrap();
        assert_eq!(rx.options, LinkOptions::RX | LinkOptions::TIME_KEEPING);
        assert_eq!(rx.addr, addr(0x01));

        orchestra.new_time_source(Some(addr(0x01)), Some(addr(0x02)));
        assert!(orchestra.schedule().link(0, 0x01).is_none());
        assert!(orchestra.schedule().link(0, 0x02).is_some());
        assert_eq!(orchestra.schedule().links_in(0).count(), 2);
    }

    #[test]
    fn time_source_sharing_our_timeslot() {
        let mut orchestra = orchestra(0x10);
        let parent = Ieee802154Address::Extended([0x00, 0x12, 0x4b, 0, 0, 0, 0x01, 0x10]);

        orchestra.new_time_source(None, Some(parent));
        let link = orchestra.schedule().link(0, 0x10).unwrap();
        assert_eq!(
            link.options,
            LinkOptions::TX | LinkOptions::RX | LinkOptions::TIME_KEEPING
        );

        // Losing it keeps our own beacon link.
        orchestra.new_time_source(Some(parent), None);
        assert_eq!(
            orchestra.schedule().link(0, 0x10).unwrap().options,
            LinkOptions::TX
        );
    }
}
