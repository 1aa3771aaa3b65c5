use rpl_orchestra::time::*;
use rpl_orchestra::tsch::orchestra::Selection;
use rpl_orchestra::wire::*;

use super::Position;

#[derive(Debug, Clone)]
pub struct Message {
    pub at: Instant,
    pub to: Ieee802154Address,
    pub from: (usize, Position),
    pub src: Ipv6Address,
    pub dst: Ipv6Address,
    /// The ICMPv6 RPL message.
    pub data: Vec<u8>,
    /// Times the message was forwarded before this frame.
    pub hops: u8,
    /// The cell Orchestra picked for the frame.
    pub cell: Option<Selection>,
}

impl Message {
    pub fn is_broadcast(&self) -> bool {
        self.to == Ieee802154Address::BROADCAST
    }

    pub fn rpl(&self) -> Option<RplRepr> {
        let packet = RplPacket::new_checked(&self.data[..]).ok()?;
        packet.verify_checksum(&self.src, &self.dst).then_some(())?;
        RplRepr::parse(&packet).ok()
    }

    pub fn is_dis(&self) -> bool {
        matches!(self.rpl(), Some(RplRepr::DodagInformationSolicitation(_)))
    }

    pub fn is_dio(&self) -> bool {
        matches!(self.rpl(), Some(RplRepr::DodagInformationObject(_)))
    }

    pub fn is_dao(&self) -> bool {
        matches!(self.rpl(), Some(RplRepr::DestinationAdvertisementObject(_)))
    }

    pub fn is_dao_ack(&self) -> bool {
        matches!(
            self.rpl(),
            Some(RplRepr::DestinationAdvertisementObjectAck(_))
        )
    }

    /// A DAO withdrawing its targets.
    pub fn is_no_path_dao(&self) -> bool {
        let Some(RplRepr::DestinationAdvertisementObject(dao)) = self.rpl() else {
            return false;
        };
        dao.options.iter().any(|opt| {
            matches!(opt, RplOptionRepr::TransitInformation(transit) if transit.path_lifetime == 0)
        })
    }

    /// Whether the frame was sent by node `id`.
    pub fn is_from(&self, id: usize) -> bool {
        self.from.0 == id
    }
}
