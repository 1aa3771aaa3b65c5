use crate::tsch::schedule::{Error, Link, LinkOptions, LinkType};
use crate::wire::Ieee802154Address;

use super::{Context, OrchestraConfig, Packet, Rule, Selection, Topology};

/// A single shared timeslot every node uses for broadcast and for whatever
/// no other rule claimed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DefaultCommon {
    handle: u16,
}

impl Rule for DefaultCommon {
    fn init(&mut self, handle: u16, cx: &mut Context) -> Result<(), Error> {
        self.handle = handle;
        cx.schedule.add_slotframe(handle, cx.config.common_period)?;
        cx.schedule.add_link(Link {
            slotframe: handle,
            timeslot: 0,
            channel_offset: cx.config.common_channel_offset,
            options: LinkOptions::TX | LinkOptions::RX | LinkOptions::SHARED,
            link_type: LinkType::Normal,
            addr: Ieee802154Address::BROADCAST,
        })?;
        Ok(())
    }

    fn select_packet(
        &self,
        _config: &OrchestraConfig,
        _topology: &Topology,
        _packet: &Packet,
    ) -> Option<Selection> {
        Some(Selection {
            slotframe: self.handle,
            timeslot: 0,
        })
    }
}
