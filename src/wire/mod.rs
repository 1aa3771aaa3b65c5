/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation* of the RPL
control plane. It provides two levels of functionality.

 * First, `Packet` views extract fields from and insert fields into
   sequences of octets, e.g. [RplPacket] for ICMPv6 RPL control messages
   or [RplHopByHopPacket] for the RPL Hop-by-Hop option.
 * Second, `Repr` types give a compact high-level representation that can
   be parsed from and emitted into octets, e.g. [RplRepr].

The `Packet` family guarantees that once `Packet::check_len()` returned
`Ok(())` no accessor will panic. `Repr::parse()` never panics on a checked
packet and `Repr::emit()` never panics as long as the buffer is exactly
`Repr::buffer_len()` octets long.

Parsing is strict: an option whose length field is inconsistent with the
option type or with the remaining buffer makes the *whole* message
invalid. Callers never observe a partially decoded message.
*/

use core::fmt;

mod field {
    pub type Field = ::core::ops::Range<usize>;
    pub type Rest = ::core::ops::RangeFrom<usize>;
}

pub mod icmpv6;
pub mod ieee802154;
pub mod ipv6;
pub mod rpl;

pub use self::icmpv6::{Message as Icmpv6Message, Packet as Icmpv6Packet};

pub use self::ieee802154::Address as Ieee802154Address;

pub use self::ipv6::{Address as Ipv6Address, AddressExt as Ipv6AddressExt, Cidr as Ipv6Cidr};

pub use self::rpl::{
    hbh::{HopByHopOption as RplHopByHopRepr, Packet as RplHopByHopPacket},
    options::{
        DodagConfiguration as RplDodagConfiguration, MetricContainer as RplMetricContainer,
        MetricObject as RplMetricObject, OptionType as RplOptionType, Packet as RplOptionPacket,
        PrefixInformation as RplPrefixInformation, Repr as RplOptionRepr,
        RplTarget as RplTargetRepr, SolicitedInformation as RplSolicitedInformation,
        TransitInformation as RplTransitInformation,
    },
    DestinationAdvertisementObject as RplDao, DestinationAdvertisementObjectAck as RplDaoAck,
    DodagInformationObject as RplDio, DodagInformationSolicitation as RplDis,
    InstanceId as RplInstanceId, ModeOfOperation as RplModeOfOperation,
    RplControlMessage, SequenceCounter as RplSequenceCounter, Packet as RplPacket,
    Repr as RplRepr,
};

/// Parsing a packet failed.
///
/// Either it is malformed, or it is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error;

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire::Error")
    }
}

pub type Result<T> = core::result::Result<T, Error>;
