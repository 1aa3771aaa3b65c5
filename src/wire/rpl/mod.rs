//! RPL control messages carried in ICMPv6. See [RFC 6550 § 6].
//!
//! [RFC 6550 § 6]: https://datatracker.ietf.org/doc/html/rfc6550#section-6

use super::{Error, Result};
use crate::config::RPL_MAX_OPTIONS;
use crate::wire::icmpv6::Message;
use crate::wire::ipv6::{Address, AddressExt};

pub use crate::wire::icmpv6::Packet;

pub mod hbh;
pub mod instance_id;
pub mod options;
pub mod sequence_counter;

pub use instance_id::InstanceId;
pub use sequence_counter::SequenceCounter;

mod field {
    use crate::wire::field::*;

    pub const RPL_INSTANCE_ID: usize = 4;

    // DODAG information solicitation fields (DIS)
    pub const DIS_FLAGS: usize = 4;
    pub const DIS_RESERVED: usize = 5;
    pub const DIS_OPTIONS: usize = 6;

    // DODAG information object fields (DIO)
    pub const DIO_VERSION_NUMBER: usize = 5;
    pub const DIO_RANK: Field = 6..8;
    pub const DIO_FLAGS_MOP_PRF: usize = 8;
    pub const DIO_DTSN: usize = 9;
    pub const DIO_FLAGS: usize = 10;
    pub const DIO_RESERVED: usize = 11;
    pub const DIO_DODAG_ID: Field = 12..12 + 16;

    // Destination advertisement object (DAO)
    pub const DAO_FLAGS: usize = 5;
    pub const DAO_RESERVED: usize = 6;
    pub const DAO_SEQUENCE: usize = 7;
    pub const DAO_DODAG_ID: Field = 8..8 + 16;

    // Destination advertisement object ack (DAO-ACK)
    pub const DAO_ACK_FLAGS: usize = 5;
    pub const DAO_ACK_SEQUENCE: usize = 6;
    pub const DAO_ACK_STATUS: usize = 7;
    pub const DAO_ACK_DODAG_ID: Field = 8..8 + 16;
}

enum_with_unknown! {
    /// RPL Control Message subtypes, carried in the ICMPv6 code field.
    pub enum RplControlMessage(u8) {
        DodagInformationSolicitation = 0x00,
        DodagInformationObject = 0x01,
        DestinationAdvertisementObject = 0x02,
        DestinationAdvertisementObjectAck = 0x03,
        SecureDodagInformationSolicitation = 0x80,
        SecureDodagInformationObject = 0x81,
        SecureDestinationAdvertisementObject = 0x82,
        SecureDestinationAdvertisementObjectAck = 0x83,
        ConsistencyCheck = 0x8a,
    }
}

impl core::fmt::Display for RplControlMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RplControlMessage::DodagInformationSolicitation => write!(f, "DIS"),
            RplControlMessage::DodagInformationObject => write!(f, "DIO"),
            RplControlMessage::DestinationAdvertisementObject => write!(f, "DAO"),
            RplControlMessage::DestinationAdvertisementObjectAck => write!(f, "DAO-ACK"),
            RplControlMessage::SecureDodagInformationSolicitation => write!(f, "secure DIS"),
            RplControlMessage::SecureDodagInformationObject => write!(f, "secure DIO"),
            RplControlMessage::SecureDestinationAdvertisementObject => write!(f, "secure DAO"),
            RplControlMessage::SecureDestinationAdvertisementObjectAck => {
                write!(f, "secure DAO-ACK")
            }
            RplControlMessage::ConsistencyCheck => write!(f, "consistency check"),
            RplControlMessage::Unknown(id) => write!(f, "unknown RPL code {id:#04x}"),
        }
    }
}

enum_with_unknown! {
    /// Mode of operation advertised in the DIO (RFC 6550 § 6.3.1).
    pub enum ModeOfOperation(u8) {
        NoDownwardRoutesMaintained = 0x00,
        NonStoringMode = 0x01,
        StoringModeWithoutMulticast = 0x02,
        StoringModeWithMulticast = 0x03,
    }
}

impl Default for ModeOfOperation {
    fn default() -> Self {
        Self::StoringModeWithoutMulticast
    }
}

impl ModeOfOperation {
    /// Whether nodes keep downward routes in their own routing table.
    pub fn is_storing(&self) -> bool {
        matches!(
            self,
            Self::StoringModeWithoutMulticast | Self::StoringModeWithMulticast
        )
    }
}

/// DAO-ACK status: the DAO was accepted.
pub const DAO_ACK_STATUS_ACCEPT: u8 = 0;
/// DAO-ACK status values from 128 up are rejections.
pub const DAO_ACK_STATUS_REJECT: u8 = 128;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Validate the fixed part of a RPL control message.
    ///
    /// Called by [`Packet::check_len`] for messages of type
    /// [`Message::RplControl`]. Secured messages are not supported and
    /// always fail.
    pub(crate) fn check_rpl_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        let fixed = match RplControlMessage::from(self.msg_code()) {
            RplControlMessage::DodagInformationSolicitation => field::DIS_OPTIONS,
            RplControlMessage::DodagInformationObject => field::DIO_DODAG_ID.end,
            RplControlMessage::DestinationAdvertisementObject => {
                if len <= field::DAO_FLAGS {
                    return Err(Error);
                }
                if self.dao_dodag_id_present() {
                    field::DAO_DODAG_ID.end
                } else {
                    field::DAO_SEQUENCE + 1
                }
            }
            RplControlMessage::DestinationAdvertisementObjectAck => {
                if len <= field::DAO_ACK_FLAGS {
                    return Err(Error);
                }
                if self.dao_ack_dodag_id_present() {
                    field::DAO_ACK_DODAG_ID.end
                } else {
                    field::DAO_ACK_STATUS + 1
                }
            }
            _ => return Err(Error),
        };

        if len < fixed {
            Err(Error)
        } else {
            Ok(())
        }
    }

    /// Offset of the first option, for a checked packet.
    fn options_offset(&self) -> usize {
        match RplControlMessage::from(self.msg_code()) {
            RplControlMessage::DodagInformationSolicitation => field::DIS_OPTIONS,
            RplControlMessage::DodagInformationObject => field::DIO_DODAG_ID.end,
            RplControlMessage::DestinationAdvertisementObject if self.dao_dodag_id_present() => {
                field::DAO_DODAG_ID.end
            }
            RplControlMessage::DestinationAdvertisementObject => field::DAO_SEQUENCE + 1,
            RplControlMessage::DestinationAdvertisementObjectAck
                if self.dao_ack_dodag_id_present() =>
            {
                field::DAO_ACK_DODAG_ID.end
            }
            _ => field::DAO_ACK_STATUS + 1,
        }
    }

    /// Return the RPL instance ID.
    #[inline]
    pub fn rpl_instance_id(&self) -> InstanceId {
        get!(self.buffer, into: InstanceId, field: field::RPL_INSTANCE_ID)
    }
}

impl<'p, T: AsRef<[u8]> + ?Sized> Packet<&'p T> {
    /// Return the option octets of a checked RPL control message.
    pub fn options(&self) -> Result<&'p [u8]> {
        self.check_rpl_len()?;
        let buffer: &'p [u8] = self.buffer.as_ref();
        Ok(&buffer[self.options_offset()..])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_rpl_instance_id(&mut self, value: u8) {
        set!(self.buffer, value, field: field::RPL_INSTANCE_ID)
    }

    /// Return the option octets. The message code and the D flag must be
    /// set before calling this.
    pub fn options_mut(&mut self) -> &mut [u8] {
        let offset = self.options_offset();
        &mut self.buffer.as_mut()[offset..]
    }
}

/// Accessors for the DODAG information solicitation (DIS) message.
///
/// ```txt
///  0                   1                   2
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Flags     |   Reserved    |   Option(s)...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn clear_dis_flags(&mut self) {
        self.buffer.as_mut()[field::DIS_FLAGS] = 0;
        self.buffer.as_mut()[field::DIS_RESERVED] = 0;
    }
}

/// Getters for the DODAG information object (DIO) message.
///
/// ```txt
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | RPLInstanceID |Version Number |             Rank              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |G|0| MOP | Prf |     DTSN      |     Flags     |   Reserved    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// +                            DODAGID                            +
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Option(s)...
/// +-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn dio_version_number(&self) -> u8 {
        get!(self.buffer, field: field::DIO_VERSION_NUMBER)
    }

    #[inline]
    pub fn dio_rank(&self) -> u16 {
        get!(self.buffer, u16, field: field::DIO_RANK)
    }

    #[inline]
    pub fn dio_grounded(&self) -> bool {
        get!(self.buffer, bool, field: field::DIO_FLAGS_MOP_PRF, shift: 7, mask: 0b1)
    }

    #[inline]
    pub fn dio_mode_of_operation(&self) -> ModeOfOperation {
        get!(self.buffer, into: ModeOfOperation, field: field::DIO_FLAGS_MOP_PRF, shift: 3, mask: 0b111)
    }

    #[inline]
    pub fn dio_dodag_preference(&self) -> u8 {
        get!(self.buffer, field: field::DIO_FLAGS_MOP_PRF, mask: 0b111)
    }

    /// Return the destination advertisement trigger sequence number.
    #[inline]
    pub fn dio_dtsn(&self) -> u8 {
        get!(self.buffer, field: field::DIO_DTSN)
    }

    #[inline]
    pub fn dio_dodag_id(&self) -> Address {
        get!(self.buffer, into: Address, fun: from_bytes, field: field::DIO_DODAG_ID)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_dio_version_number(&mut self, value: u8) {
        set!(self.buffer, value, field: field::DIO_VERSION_NUMBER)
    }

    #[inline]
    pub fn set_dio_rank(&mut self, value: u16) {
        set!(self.buffer, value, u16, field: field::DIO_RANK)
    }

    /// Set the G flag, the mode of operation and the preference at once.
    pub fn set_dio_flags(&mut self, grounded: bool, mode: ModeOfOperation, preference: u8) {
        let buffer = self.buffer.as_mut();
        buffer[field::DIO_FLAGS_MOP_PRF] =
            ((grounded as u8) << 7) | ((u8::from(mode) & 0b111) << 3) | (preference & 0b111);
        buffer[field::DIO_FLAGS] = 0;
        buffer[field::DIO_RESERVED] = 0;
    }

    #[inline]
    pub fn set_dio_dtsn(&mut self, value: u8) {
        set!(self.buffer, value, field: field::DIO_DTSN)
    }

    #[inline]
    pub fn set_dio_dodag_id(&mut self, address: Address) {
        set!(self.buffer, address: address, field: field::DIO_DODAG_ID)
    }
}

/// Getters for the Destination Advertisement Object (DAO) message.
///
/// ```txt
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | RPLInstanceID |K|D|   Flags   |   Reserved    | DAOSequence   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// +                            DODAGID*                           +
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Option(s)...
/// +-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]>> Packet<T> {
    /// The K flag: the sender expects a DAO-ACK.
    #[inline]
    pub fn dao_ack_request(&self) -> bool {
        get!(self.buffer, bool, field: field::DAO_FLAGS, shift: 7, mask: 0b1)
    }

    #[inline]
    pub fn dao_dodag_id_present(&self) -> bool {
        get!(self.buffer, bool, field: field::DAO_FLAGS, shift: 6, mask: 0b1)
    }

    #[inline]
    pub fn dao_sequence(&self) -> u8 {
        get!(self.buffer, field: field::DAO_SEQUENCE)
    }

    #[inline]
    pub fn dao_dodag_id(&self) -> Option<Address> {
        self.dao_dodag_id_present()
            .then(|| Address::from_bytes(&self.buffer.as_ref()[field::DAO_DODAG_ID]))
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_dao_flags(&mut self, expect_ack: bool, dodag_id_present: bool) {
        let buffer = self.buffer.as_mut();
        buffer[field::DAO_FLAGS] = ((expect_ack as u8) << 7) | ((dodag_id_present as u8) << 6);
        buffer[field::DAO_RESERVED] = 0;
    }

    #[inline]
    pub fn set_dao_sequence(&mut self, value: u8) {
        set!(self.buffer, value, field: field::DAO_SEQUENCE)
    }

    #[inline]
    pub fn set_dao_dodag_id(&mut self, address: Address) {
        set!(self.buffer, address: address, field: field::DAO_DODAG_ID)
    }
}

/// Getters for the DAO acknowledgement (DAO-ACK) message.
///
/// ```txt
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | RPLInstanceID |D|  Reserved   |  DAOSequence  |    Status     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// +                            DODAGID*                           +
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn dao_ack_dodag_id_present(&self) -> bool {
        get!(self.buffer, bool, field: field::DAO_ACK_FLAGS, shift: 7, mask: 0b1)
    }

    #[inline]
    pub fn dao_ack_sequence(&self) -> u8 {
        get!(self.buffer, field: field::DAO_ACK_SEQUENCE)
    }

    #[inline]
    pub fn dao_ack_status(&self) -> u8 {
        get!(self.buffer, field: field::DAO_ACK_STATUS)
    }

    #[inline]
    pub fn dao_ack_dodag_id(&self) -> Option<Address> {
        self.dao_ack_dodag_id_present()
            .then(|| Address::from_bytes(&self.buffer.as_ref()[field::DAO_ACK_DODAG_ID]))
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_dao_ack_dodag_id_present(&mut self, value: bool) {
        self.buffer.as_mut()[field::DAO_ACK_FLAGS] = (value as u8) << 7;
    }

    #[inline]
    pub fn set_dao_ack_sequence(&mut self, value: u8) {
        set!(self.buffer, value, field: field::DAO_ACK_SEQUENCE)
    }

    #[inline]
    pub fn set_dao_ack_status(&mut self, value: u8) {
        set!(self.buffer, value, field: field::DAO_ACK_STATUS)
    }

    #[inline]
    pub fn set_dao_ack_dodag_id(&mut self, address: Address) {
        set!(self.buffer, address: address, field: field::DAO_ACK_DODAG_ID)
    }
}

/// Options carried by a single RPL control message.
pub type Options = heapless::Vec<options::Repr, RPL_MAX_OPTIONS>;

/// A high-level representation of a RPL control message.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Repr {
    DodagInformationSolicitation(DodagInformationSolicitation),
    DodagInformationObject(DodagInformationObject),
    DestinationAdvertisementObject(DestinationAdvertisementObject),
    DestinationAdvertisementObjectAck(DestinationAdvertisementObjectAck),
}

/// A RPL DODAG Information Solicitation (DIS).
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DodagInformationSolicitation {
    pub options: Options,
}

/// A RPL DODAG Information Object (DIO).
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DodagInformationObject {
    pub rpl_instance_id: InstanceId,
    pub version_number: SequenceCounter,
    pub rank: u16,
    pub grounded: bool,
    pub mode_of_operation: ModeOfOperation,
    pub dodag_preference: u8,
    pub dtsn: SequenceCounter,
    pub dodag_id: Address,
    pub options: Options,
}

/// A RPL Destination Advertisement Object (DAO).
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DestinationAdvertisementObject {
    pub rpl_instance_id: InstanceId,
    pub expect_ack: bool,
    pub sequence: SequenceCounter,
    pub dodag_id: Option<Address>,
    pub options: Options,
}

/// A RPL DAO acknowledgement (DAO-ACK).
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DestinationAdvertisementObjectAck {
    pub rpl_instance_id: InstanceId,
    pub sequence: SequenceCounter,
    pub status: u8,
    pub dodag_id: Option<Address>,
}

impl core::fmt::Display for Repr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Repr::DodagInformationSolicitation(_) => write!(f, "DIS"),
            Repr::DodagInformationObject(dio) => write!(
                f,
                "DIO IID={} V={} R={} G={} MOP={:?} Pref={} DTSN={} DODAGID={}",
                dio.rpl_instance_id,
                dio.version_number,
                dio.rank,
                dio.grounded,
                dio.mode_of_operation,
                dio.dodag_preference,
                dio.dtsn,
                dio.dodag_id
            ),
            Repr::DestinationAdvertisementObject(dao) => write!(
                f,
                "DAO IID={} K={} Seq={} DODAGID={:?}",
                dao.rpl_instance_id, dao.expect_ack, dao.sequence, dao.dodag_id
            ),
            Repr::DestinationAdvertisementObjectAck(ack) => write!(
                f,
                "DAO-ACK IID={} Seq={} Status={} DODAGID={:?}",
                ack.rpl_instance_id, ack.sequence, ack.status, ack.dodag_id
            ),
        }
    }
}

impl Repr {
    /// The options of the message. A DAO-ACK never carries any.
    pub fn options(&self) -> &[options::Repr] {
        match self {
            Repr::DodagInformationSolicitation(DodagInformationSolicitation { options })
            | Repr::DodagInformationObject(DodagInformationObject { options, .. })
            | Repr::DestinationAdvertisementObject(DestinationAdvertisementObject {
                options,
                ..
            }) => &options[..],
            Repr::DestinationAdvertisementObjectAck(_) => &[],
        }
    }

    /// Parse a RPL control message.
    ///
    /// The whole message is rejected if any option is malformed, if the
    /// message carries more options than fit in [`Options`], or if it is a
    /// secured or unknown message. Padding options are dropped.
    pub fn parse<T: AsRef<[u8]> + ?Sized>(packet: &Packet<&T>) -> Result<Self> {
        packet.check_len()?;
        if packet.msg_type() != Message::RplControl {
            return Err(Error);
        }

        let mut options = Options::new();
        for opt in options::OptionsIterator::new(packet.options()?) {
            match opt? {
                options::Repr::Pad1 | options::Repr::PadN(_) => {}
                opt => options.push(opt).map_err(|_| Error)?,
            }
        }

        match RplControlMessage::from(packet.msg_code()) {
            RplControlMessage::DodagInformationSolicitation => Ok(
                Repr::DodagInformationSolicitation(DodagInformationSolicitation { options }),
            ),
            RplControlMessage::DodagInformationObject => {
                Ok(Repr::DodagInformationObject(DodagInformationObject {
                    rpl_instance_id: packet.rpl_instance_id(),
                    version_number: packet.dio_version_number().into(),
                    rank: packet.dio_rank(),
                    grounded: packet.dio_grounded(),
                    mode_of_operation: packet.dio_mode_of_operation(),
                    dodag_preference: packet.dio_dodag_preference(),
                    dtsn: packet.dio_dtsn().into(),
                    dodag_id: packet.dio_dodag_id(),
                    options,
                }))
            }
            RplControlMessage::DestinationAdvertisementObject => Ok(
                Repr::DestinationAdvertisementObject(DestinationAdvertisementObject {
                    rpl_instance_id: packet.rpl_instance_id(),
                    expect_ack: packet.dao_ack_request(),
                    sequence: packet.dao_sequence().into(),
                    dodag_id: packet.dao_dodag_id(),
                    options,
                }),
            ),
            RplControlMessage::DestinationAdvertisementObjectAck => Ok(
                Repr::DestinationAdvertisementObjectAck(DestinationAdvertisementObjectAck {
                    rpl_instance_id: packet.rpl_instance_id(),
                    sequence: packet.dao_ack_sequence().into(),
                    status: packet.dao_ack_status(),
                    dodag_id: packet.dao_ack_dodag_id(),
                }),
            ),
            _ => Err(Error),
        }
    }

    /// Return the length of the emitted message, ICMPv6 header and options
    /// included.
    pub fn buffer_len(&self) -> usize {
        let fixed = match self {
            Repr::DodagInformationSolicitation(_) => field::DIS_OPTIONS,
            Repr::DodagInformationObject(_) => field::DIO_DODAG_ID.end,
            Repr::DestinationAdvertisementObject(DestinationAdvertisementObject {
                dodag_id: Some(_),
                ..
            })
            | Repr::DestinationAdvertisementObjectAck(DestinationAdvertisementObjectAck {
                dodag_id: Some(_),
                ..
            }) => field::DAO_DODAG_ID.end,
            Repr::DestinationAdvertisementObject(_)
            | Repr::DestinationAdvertisementObjectAck(_) => field::DAO_SEQUENCE + 1,
        };
        fixed + self.options().iter().map(|o| o.buffer_len()).sum::<usize>()
    }

    /// Emit the message into a buffer of exactly `buffer_len()` octets.
    ///
    /// The ICMPv6 checksum is left zeroed; it depends on the IPv6 addresses
    /// and is filled in with [`Packet::fill_checksum`].
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(&self, packet: &mut Packet<&mut T>) {
        packet.set_msg_type(Message::RplControl);
        packet.set_checksum(0);

        match self {
            Repr::DodagInformationSolicitation(_) => {
                packet.set_msg_code(RplControlMessage::DodagInformationSolicitation.into());
                packet.clear_dis_flags();
            }
            Repr::DodagInformationObject(dio) => {
                packet.set_msg_code(RplControlMessage::DodagInformationObject.into());
                packet.set_rpl_instance_id(dio.rpl_instance_id.into());
                packet.set_dio_version_number(dio.version_number.value());
                packet.set_dio_rank(dio.rank);
                packet.set_dio_flags(dio.grounded, dio.mode_of_operation, dio.dodag_preference);
                packet.set_dio_dtsn(dio.dtsn.value());
                packet.set_dio_dodag_id(dio.dodag_id);
            }
            Repr::DestinationAdvertisementObject(dao) => {
                packet.set_msg_code(RplControlMessage::DestinationAdvertisementObject.into());
                packet.set_rpl_instance_id(dao.rpl_instance_id.into());
                packet.set_dao_flags(dao.expect_ack, dao.dodag_id.is_some());
                packet.set_dao_sequence(dao.sequence.value());
                if let Some(id) = dao.dodag_id {
                    packet.set_dao_dodag_id(id);
                }
            }
            Repr::DestinationAdvertisementObjectAck(ack) => {
                packet.set_msg_code(RplControlMessage::DestinationAdvertisementObjectAck.into());
                packet.set_rpl_instance_id(ack.rpl_instance_id.into());
                packet.set_dao_ack_dodag_id_present(ack.dodag_id.is_some());
                packet.set_dao_ack_sequence(ack.sequence.value());
                packet.set_dao_ack_status(ack.status);
                if let Some(id) = ack.dodag_id {
                    packet.set_dao_ack_dodag_id(id);
                }
            }
        }

        let mut buffer = packet.options_mut();
        for opt in self.options() {
            let len = opt.buffer_len();
            let (head, rest) = core::mem::take(&mut buffer).split_at_mut(len);
            opt.emit(&mut options::Packet::new_unchecked(head));
            buffer = rest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::options::{
        DodagConfiguration, PrefixInformation, Repr as OptionRepr, RplTarget, TransitInformation,
    };
    use super::*;
    use rstest::rstest;

    static DIO: [u8; 76] = [
        0x9b, 0x01, 0x00, 0x00, 0x00, 0xf0, 0x00, 0x80, 0x08, 0xf0, 0x00, 0x00, 0xfd, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01, 0x04, 0x0e,
        0x00, 0x08, 0x0c, 0x00, 0x04, 0x00, 0x00, 0x80, 0x00, 0x01, 0x00, 0x1e, 0x00, 0x3c, 0x08,
        0x1e, 0x40, 0x40, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00,
        0xfd, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];

    static DAO: [u8; 50] = [
        0x9b, 0x02, 0x00, 0x00, 0x00, 0x80, 0x00, 0xf1, 0x05, 0x12, 0x00, 0x80, 0xfd, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, 0x02, 0x00, 0x02, 0x00, 0x02, 0x06, 0x14,
        0x00, 0x00, 0x00, 0x1e, 0xfd, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x01, 0x00,
        0x01, 0x00, 0x01, 0x00, 0x01,
    ];

    fn root_address() -> Address {
        Address::new(0xfd00, 0, 0, 0, 0x0201, 0x0001, 0x0001, 0x0001)
    }

    fn emit(repr: &Repr) -> std::vec::Vec<u8> {
        let mut buffer = std::vec![0u8; repr.buffer_len()];
        repr.emit(&mut Packet::new_unchecked(&mut buffer[..]));
        buffer
    }

    #[test]
    fn dio_packet() {
        let packet = Packet::new_checked(&DIO[..]).unwrap();
        assert_eq!(
            RplControlMessage::from(packet.msg_code()),
            RplControlMessage::DodagInformationObject
        );

        let repr = Repr::parse(&packet).unwrap();
        let Repr::DodagInformationObject(dio) = &repr else {
            panic!("expected a DIO, got {repr}");
        };
        assert_eq!(dio.rpl_instance_id, InstanceId::from(0));
        assert_eq!(dio.version_number, 240.into());
        assert_eq!(dio.rank, 128);
        assert!(!dio.grounded);
        assert_eq!(dio.mode_of_operation, ModeOfOperation::NonStoringMode);
        assert_eq!(dio.dodag_preference, 0);
        assert_eq!(dio.dtsn, 240.into());
        assert_eq!(dio.dodag_id, root_address());

        assert_eq!(
            dio.options[0],
            OptionRepr::DodagConfiguration(DodagConfiguration {
                authentication_enabled: false,
                path_control_size: 0,
                dio_interval_doublings: 8,
                dio_interval_min: 12,
                dio_redundancy_constant: 0,
                max_rank_increase: 1024,
                minimum_hop_rank_increase: 128,
                objective_code_point: 1,
                default_lifetime: 30,
                lifetime_unit: 60,
            })
        );
        assert_eq!(
            dio.options[1],
            OptionRepr::PrefixInformation(PrefixInformation {
                prefix_length: 64,
                on_link: false,
                autonomous_address_configuration: true,
                router_address: false,
                valid_lifetime: u32::MAX,
                preferred_lifetime: u32::MAX,
                destination_prefix: Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 0),
            })
        );

        assert_eq!(&emit(&repr)[..], &DIO[..]);
    }

    #[test]
    fn dao_packet() {
        let packet = Packet::new_checked(&DAO[..]).unwrap();
        let repr = Repr::parse(&packet).unwrap();
        let Repr::DestinationAdvertisementObject(dao) = &repr else {
            panic!("expected a DAO, got {repr}");
        };
        assert!(dao.expect_ack);
        assert_eq!(dao.sequence, 241.into());
        assert_eq!(dao.dodag_id, None);
        assert_eq!(
            dao.options[..],
            [
                OptionRepr::RplTarget(RplTarget {
                    prefix_length: 128,
                    prefix: Address::new(0xfd00, 0, 0, 0, 0x0202, 0x0002, 0x0002, 0x0002),
                }),
                OptionRepr::TransitInformation(TransitInformation {
                    external: false,
                    path_control: 0,
                    path_sequence: 0,
                    path_lifetime: 30,
                    parent_address: Some(root_address()),
                }),
            ]
        );

        assert_eq!(&emit(&repr)[..], &DAO[..]);
    }

    #[rstest]
    #[case::without_dodag_id(&[0x9b, 0x03, 0x00, 0x00, 0x00, 0x00, 0xf1, 0x00][..], 0, 241, None)]
    #[case::with_dodag_id(
        &[
            0x9b, 0x03, 0x00, 0x00, 0x1e, 0x80, 0xf0, 0x00, 0xfe, 0x80, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
        ][..],
        30,
        240,
        Some(Address::new(0xfe80, 0, 0, 0, 0x0200, 0, 0, 1)),
    )]
    fn dao_ack_packet(
        #[case] data: &[u8],
        #[case] instance: u8,
        #[case] sequence: u8,
        #[case] dodag_id: Option<Address>,
    ) {
        let packet = Packet::new_checked(data).unwrap();
        let repr = Repr::parse(&packet).unwrap();
        assert_eq!(
            repr,
            Repr::DestinationAdvertisementObjectAck(DestinationAdvertisementObjectAck {
                rpl_instance_id: InstanceId::from(instance),
                sequence: sequence.into(),
                status: DAO_ACK_STATUS_ACCEPT,
                dodag_id,
            })
        );
        assert_eq!(&emit(&repr)[..], data);
    }

    #[rstest]
    #[case::short_dio(&DIO[..27])]
    #[case::dao_missing_dodag_id(&[0x9b, 0x02, 0x00, 0x00, 0x00, 0x40, 0x00, 0xf1][..])]
    #[case::secure_dis(&[0x9b, 0x80, 0x00, 0x00, 0x00, 0x00][..])]
    #[case::consistency_check(&[0x9b, 0x8a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00][..])]
    fn rejected_header(#[case] data: &[u8]) {
        assert_eq!(Packet::new_checked(data).err(), Some(Error));
    }

    #[test]
    fn truncated_option_rejects_message() {
        // Drop the last octet of the prefix information option.
        let packet = Packet::new_checked(&DIO[..75]).unwrap();
        assert_eq!(Repr::parse(&packet), Err(Error));
    }

    #[test]
    fn padding_is_dropped() {
        let mut data = std::vec![0x9b, 0x00, 0x00, 0x00, 0x00, 0x00];
        data.extend_from_slice(&[0x00, 0x01, 0x02, 0x00, 0x00]);
        let packet = Packet::new_checked(&data[..]).unwrap();
        assert_eq!(
            Repr::parse(&packet).unwrap(),
            Repr::DodagInformationSolicitation(DodagInformationSolicitation::default())
        );
    }

    #[test]
    fn too_many_options() {
        let mut data = std::vec![0x9b, 0x00, 0x00, 0x00, 0x00, 0x00];
        for i in 0..=RPL_MAX_OPTIONS as u8 {
            data.extend_from_slice(&[0x09, 0x04, 0x00, 0x00, 0x00, i]);
        }
        let packet = Packet::new_checked(&data[..]).unwrap();
        assert_eq!(Repr::parse(&packet), Err(Error));
    }

    #[test]
    fn emitted_dio_with_checksum_verifies() {
        let src = Address::new(0xfe80, 0, 0, 0, 0x0212, 0x4b00, 0, 1);
        let dst = crate::wire::ipv6::LINK_LOCAL_ALL_RPL_NODES;
        let repr = Repr::parse(&Packet::new_checked(&DIO[..]).unwrap()).unwrap();

        let mut buffer = emit(&repr);
        let mut packet = Packet::new_unchecked(&mut buffer[..]);
        packet.fill_checksum(&src, &dst);
        assert!(packet.verify_checksum(&src, &dst));
        assert_eq!(Repr::parse(&Packet::new_checked(&buffer[..]).unwrap()), Ok(repr));
    }
}
