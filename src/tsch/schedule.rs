use core::fmt;

use bitflags::bitflags;
use heapless::Vec;

use crate::config::{TSCH_MAX_LINKS, TSCH_MAX_SLOTFRAMES};
use crate::wire::Ieee802154Address;

bitflags! {
    /// What a node does in the timeslot of a link.
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct LinkOptions: u8 {
        const TX           = 0b0001;
        const RX           = 0b0010;
        /// Contention based, with CSMA back-off.
        const SHARED       = 0b0100;
        /// Frames received on the link resynchronise our clock.
        const TIME_KEEPING = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkType {
    Normal,
    /// Reserved to Enhanced Beacons.
    Advertising,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A slotframe with this handle already exists.
    SlotframeExists,
    UnknownSlotframe,
    /// Slotframes have at least one timeslot.
    EmptySlotframe,
    /// The timeslot does not fit in the slotframe.
    InvalidTimeslot,
    /// The schedule has no room left.
    OutOfMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SlotframeExists => write!(f, "slotframe already exists"),
            Error::UnknownSlotframe => write!(f, "unknown slotframe"),
            Error::EmptySlotframe => write!(f, "empty slotframe"),
            Error::InvalidTimeslot => write!(f, "timeslot out of the slotframe"),
            Error::OutOfMemory => write!(f, "schedule full"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// A repeating sequence of `size` timeslots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Slotframe {
    pub handle: u16,
    pub size: u16,
}

impl Slotframe {
    /// The timeslot of this slotframe the absolute slot number falls in.
    pub fn timeslot(&self, asn: u64) -> u16 {
        (asn % self.size as u64) as u16
    }
}

/// A cell of the schedule: one timeslot of one slotframe on one channel
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Link {
    pub slotframe: u16,
    pub timeslot: u16,
    pub channel_offset: u16,
    pub options: LinkOptions,
    pub link_type: LinkType,
    /// The neighbor the link is dedicated to, or broadcast.
    pub addr: Ieee802154Address,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sf {} ts {} ch {} {:?} {:?} {}",
            self.slotframe,
            self.timeslot,
            self.channel_offset,
            self.options,
            self.link_type,
            self.addr
        )
    }
}

/// The TSCH schedule: slotframes and, within each, at most one link per
/// timeslot.
#[derive(Debug, Default)]
pub struct Schedule {
    slotframes: Vec<Slotframe, TSCH_MAX_SLOTFRAMES>,
    links: Vec<Link, TSCH_MAX_LINKS>,
}

impl Schedule {
    pub const fn new() -> Self {
        Self {
            slotframes: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn add_slotframe(&mut self, handle: u16, size: u16) -> Result<(), Error> {
        if size == 0 {
            return Err(Error::EmptySlotframe);
        }
        if self.slotframe(handle).is_some() {
            return Err(Error::SlotframeExists);
        }
        self.slotframes
            .push(Slotframe { handle, size })
            .map_err(|_| Error::OutOfMemory)?;
        net_debug!("tsch: added slotframe {} of size {}", handle, size);
        Ok(())
    }

    /// Remove a slotframe together with its links.
    pub fn remove_slotframe(&mut self, handle: u16) -> Option<Slotframe> {
        let index = self.slotframes.iter().position(|sf| sf.handle == handle)?;
        self.links.retain(|l| l.slotframe != handle);
        Some(self.slotframes.swap_remove(index))
    }

    pub fn slotframe(&self, handle: u16) -> Option<&Slotframe> {
        self.slotframes.iter().find(|sf| sf.handle == handle)
    }

    pub fn slotframes(&self) -> impl Iterator<Item = &Slotframe> {
        self.slotframes.iter()
    }

    /// Install a link, replacing the one at the same timeslot of the same
    /// slotframe. Returns the replaced link.
    pub fn add_link(&mut self, link: Link) -> Result<Option<Link>, Error> {
        let sf = self.slotframe(link.slotframe).ok_or(Error::UnknownSlotframe)?;
        if link.timeslot >= sf.size {
            return Err(Error::InvalidTimeslot);
        }

        let old = self.remove_link(link.slotframe, link.timeslot);
        if let Err(link) = self.links.push(link) {
            net_debug!("tsch: no room for the link {}", link);
            return Err(Error::OutOfMemory);
        }
        net_trace!("tsch: added link {}", link);
        Ok(old)
    }

    pub fn link(&self, slotframe: u16, timeslot: u16) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| l.slotframe == slotframe && l.timeslot == timeslot)
    }

    pub fn remove_link(&mut self, slotframe: u16, timeslot: u16) -> Option<Link> {
        let index = self
            .links
            .iter()
            .position(|l| l.slotframe == slotframe && l.timeslot == timeslot)?;
        let link = self.links.swap_remove(index);
        net_trace!("tsch: removed link {}", link);
        Some(link)
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn links_in(&self, slotframe: u16) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(move |l| l.slotframe == slotframe)
    }

    /// The link active at an absolute slot number. When several slotframes
    /// have a link there, the lowest slotframe handle wins.
    pub fn active_link(&self, asn: u64) -> Option<&Link> {
        self.slotframes
            .iter()
            .filter_map(|sf| self.link(sf.handle, sf.timeslot(asn)))
            .min_by_key(|l| l.slotframe)
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.slotframes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(slotframe: u16, timeslot: u16, options: LinkOptions) -> Link {
        Link {
            slotframe,
            timeslot,
            channel_offset: 0,
            options,
            link_type: LinkType::Normal,
            addr: Ieee802154Address::BROADCAST,
        }
    }

    #[test]
    fn slotframes() {
        let mut schedule = Schedule::new();
        schedule.add_slotframe(0, 7).unwrap();
        assert_eq!(schedule.add_slotframe(0, 11), Err(Error::SlotframeExists));
        assert_eq!(schedule.add_slotframe(1, 0), Err(Error::EmptySlotframe));
        schedule.add_slotframe(1, 11).unwrap();

        schedule.add_link(link(0, 3, LinkOptions::TX)).unwrap();
        schedule.add_link(link(1, 3, LinkOptions::RX)).unwrap();
        assert_eq!(schedule.remove_slotframe(0).map(|sf| sf.size), Some(7));
        assert_eq!(schedule.links().count(), 1);
        assert!(schedule.remove_slotframe(0).is_none());
    }

    #[test]
    fn one_link_per_timeslot() {
        let mut schedule = Schedule::new();
        schedule.add_slotframe(0, 7).unwrap();

        assert_eq!(schedule.add_link(link(0, 3, LinkOptions::TX)), Ok(None));
        let old = schedule.add_link(link(0, 3, LinkOptions::RX)).unwrap();
        assert_eq!(old.map(|l| l.options), Some(LinkOptions::TX));
        assert_eq!(schedule.links_in(0).count(), 1);
        assert_eq!(schedule.link(0, 3).unwrap().options, LinkOptions::RX);

        assert_eq!(
            schedule.add_link(link(0, 7, LinkOptions::RX)),
            Err(Error::InvalidTimeslot)
        );
        assert_eq!(
            schedule.add_link(link(4, 0, LinkOptions::RX)),
            Err(Error::UnknownSlotframe)
        );
    }

    #[test]
    fn full_schedule() {
        let mut schedule = Schedule::new();
        schedule.add_slotframe(0, 397).unwrap();
        for ts in 0..TSCH_MAX_LINKS as u16 {
            schedule.add_link(link(0, ts, LinkOptions::RX)).unwrap();
        }
        assert_eq!(
            schedule.add_link(link(0, 300, LinkOptions::RX)),
            Err(Error::OutOfMemory)
        );
        // Replacing still works.
        schedule.add_link(link(0, 0, LinkOptions::TX)).unwrap();
    }

    #[test]
    fn active_link_prefers_the_lowest_handle() {
        let mut schedule = Schedule::new();
        schedule.add_slotframe(2, 3).unwrap();
        schedule.add_slotframe(1, 5).unwrap();
        schedule.add_link(link(2, 0, LinkOptions::SHARED)).unwrap();
        schedule.add_link(link(1, 0, LinkOptions::RX)).unwrap();

        assert_eq!(schedule.active_link(15).unwrap().slotframe, 1);
        assert_eq!(schedule.active_link(6).unwrap().slotframe, 2);
        assert!(schedule.active_link(7).is_none());
    }
}
