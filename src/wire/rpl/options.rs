use super::{Error, InstanceId, Result, SequenceCounter};
use crate::wire::ipv6::{Address, AddressExt};

/// A read/write wrapper around a RPL Control Message Option.
#[derive(Debug, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

enum_with_unknown! {
    pub enum OptionType(u8) {
        Pad1 = 0x00,
        PadN = 0x01,
        DagMetricContainer = 0x02,
        RouteInformation = 0x03,
        DodagConfiguration = 0x04,
        RplTarget = 0x05,
        TransitInformation = 0x06,
        SolicitedInformation = 0x07,
        PrefixInformation = 0x08,
        RplTargetDescriptor = 0x09,
    }
}

impl OptionType {
    /// Smallest valid value of the Option Length field for this type.
    fn min_length(&self) -> usize {
        match self {
            OptionType::Pad1 | OptionType::PadN => 0,
            OptionType::DagMetricContainer => 4,
            OptionType::RouteInformation => 6,
            OptionType::DodagConfiguration => 14,
            OptionType::RplTarget => 2,
            OptionType::TransitInformation => 4,
            OptionType::SolicitedInformation => 19,
            OptionType::PrefixInformation => 30,
            OptionType::RplTargetDescriptor => 4,
            OptionType::Unknown(_) => 0,
        }
    }
}

impl From<&Repr> for OptionType {
    fn from(repr: &Repr) -> Self {
        match repr {
            Repr::Pad1 => Self::Pad1,
            Repr::PadN(_) => Self::PadN,
            Repr::DagMetricContainer(_) => Self::DagMetricContainer,
            Repr::RouteInformation { .. } => Self::RouteInformation,
            Repr::DodagConfiguration { .. } => Self::DodagConfiguration,
            Repr::RplTarget { .. } => Self::RplTarget,
            Repr::TransitInformation { .. } => Self::TransitInformation,
            Repr::SolicitedInformation { .. } => Self::SolicitedInformation,
            Repr::PrefixInformation { .. } => Self::PrefixInformation,
            Repr::RplTargetDescriptor { .. } => Self::RplTargetDescriptor,
        }
    }
}

mod field {
    use crate::wire::field::*;

    pub const TYPE: usize = 0;
    pub const LENGTH: usize = 1;

    pub const PADN: Rest = 2..;

    // DAG Metric Container, one routing metric object (RFC 6551 § 2.1).
    pub const MC_TYPE: usize = 2;
    pub const MC_FLAGS_HIGH: usize = 3;
    pub const MC_FLAGS_LOW: usize = 4;
    pub const MC_LENGTH: usize = 5;
    pub const MC_BODY: Rest = 6..;
    pub const MC_ETX: Field = 6..8;
    pub const MC_ENERGY_FLAGS: usize = 6;
    pub const MC_ENERGY_ESTIMATION: usize = 7;

    // Route Information fields.
    pub const ROUTE_INFO_PREFIX_LENGTH: usize = 2;
    pub const ROUTE_INFO_PREFERENCE: usize = 3;
    pub const ROUTE_INFO_LIFETIME: Field = 4..8;
    pub const ROUTE_INFO_PREFIX: Rest = 8..;

    // DODAG Configuration fields.
    pub const DODAG_CONF_FLAGS: usize = 2;
    pub const DODAG_CONF_DIO_INTERVAL_DOUBLINGS: usize = 3;
    pub const DODAG_CONF_DIO_INTERVAL_MINIMUM: usize = 4;
    pub const DODAG_CONF_DIO_REDUNDANCY_CONSTANT: usize = 5;
    pub const DODAG_CONF_DIO_MAX_RANK_INCREASE: Field = 6..8;
    pub const DODAG_CONF_MIN_HOP_RANK_INCREASE: Field = 8..10;
    pub const DODAG_CONF_OBJECTIVE_CODE_POINT: Field = 10..12;
    pub const DODAG_CONF_RESERVED: usize = 12;
    pub const DODAG_CONF_DEFAULT_LIFETIME: usize = 13;
    pub const DODAG_CONF_LIFETIME_UNIT: Field = 14..16;

    // RPL Target fields.
    pub const RPL_TARGET_FLAGS: usize = 2;
    pub const RPL_TARGET_PREFIX_LENGTH: usize = 3;
    pub const RPL_TARGET_PREFIX: Rest = 4..;

    // Transit Information fields.
    pub const TRANSIT_INFO_FLAGS: usize = 2;
    pub const TRANSIT_INFO_PATH_CONTROL: usize = 3;
    pub const TRANSIT_INFO_PATH_SEQUENCE: usize = 4;
    pub const TRANSIT_INFO_PATH_LIFETIME: usize = 5;
    pub const TRANSIT_INFO_PARENT_ADDRESS: Field = 6..6 + 16;

    // Solicited Information fields.
    pub const SOLICITED_INFO_RPL_INSTANCE_ID: usize = 2;
    pub const SOLICITED_INFO_FLAGS: usize = 3;
    pub const SOLICITED_INFO_DODAG_ID: Field = 4..20;
    pub const SOLICITED_INFO_VERSION_NUMBER: usize = 20;

    // Prefix Information fields.
    pub const PREFIX_INFO_PREFIX_LENGTH: usize = 2;
    pub const PREFIX_INFO_FLAGS: usize = 3;
    pub const PREFIX_INFO_VALID_LIFETIME: Field = 4..8;
    pub const PREFIX_INFO_PREFERRED_LIFETIME: Field = 8..12;
    pub const PREFIX_INFO_RESERVED2: Field = 12..16;
    pub const PREFIX_INFO_PREFIX: Field = 16..16 + 16;

    // RPL Target Descriptor fields.
    pub const TARGET_DESCRIPTOR: Field = 2..6;
}

/// Number of octets needed to carry a prefix of `prefix_len` bits.
fn prefix_octets(prefix_len: u8) -> usize {
    (prefix_len.min(128) as usize).div_ceil(8)
}

impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    #[inline]
    pub fn new_checked(buffer: T) -> Result<Self> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error)` when the buffer is shorter than the option
    /// length claims, or when the option length is too small for the type.
    pub fn check_len(&self) -> Result<()> {
        let data = self.buffer.as_ref();
        if data.is_empty() {
            return Err(Error);
        }
        let option_type = self.option_type();
        if option_type == OptionType::Pad1 {
            return Ok(());
        }
        if data.len() < 2 {
            return Err(Error);
        }

        let len = self.option_length() as usize;
        if data.len() < 2 + len || len < option_type.min_length() {
            return Err(Error);
        }

        match option_type {
            OptionType::DagMetricContainer => {
                if len < 4 + data[field::MC_LENGTH] as usize {
                    return Err(Error);
                }
            }
            OptionType::RouteInformation => {
                if len < 6 + prefix_octets(data[field::ROUTE_INFO_PREFIX_LENGTH]) {
                    return Err(Error);
                }
            }
            OptionType::RplTarget => {
                if data[field::RPL_TARGET_PREFIX_LENGTH] > 128
                    || len < 2 + prefix_octets(data[field::RPL_TARGET_PREFIX_LENGTH])
                {
                    return Err(Error);
                }
            }
            OptionType::TransitInformation => {
                if len != 4 && len < 20 {
                    return Err(Error);
                }
            }
            _ => {}
        }

        Ok(())
    }

    #[inline]
    pub fn option_type(&self) -> OptionType {
        OptionType::from(self.buffer.as_ref()[field::TYPE])
    }

    #[inline]
    pub fn option_length(&self) -> u8 {
        get!(self.buffer, field: field::LENGTH)
    }

    /// Total size of the option on the wire, header included.
    #[inline]
    pub fn total_len(&self) -> usize {
        match self.option_type() {
            OptionType::Pad1 => 1,
            _ => 2 + self.option_length() as usize,
        }
    }
}

impl<'p, T: AsRef<[u8]> + ?Sized> Packet<&'p T> {
    /// Return the octets following this option, if any.
    #[inline]
    pub fn next_option(&self) -> Option<&'p [u8]> {
        let rest = self.buffer.as_ref().get(self.total_len()..)?;
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_option_type(&mut self, option_type: OptionType) {
        self.buffer.as_mut()[field::TYPE] = option_type.into();
    }

    #[inline]
    pub fn set_option_length(&mut self, length: u8) {
        self.buffer.as_mut()[field::LENGTH] = length;
    }

    #[inline]
    pub fn clear_padn(&mut self, size: u8) {
        for b in &mut self.buffer.as_mut()[field::PADN][..size as usize] {
            *b = 0;
        }
    }
}

/// Getters for the DAG Metric Container option, carrying a single
/// routing metric object.
///
/// ```txt
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 0x02 | Option Length | Routing-MC-Type |Res Flags|P|C|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |O|R| A |  Prec |    Length     |      Object body ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn metric_type(&self) -> u8 {
        get!(self.buffer, field: field::MC_TYPE)
    }

    /// The P, C, O and R flags folded into one value.
    #[inline]
    pub fn metric_flags(&self) -> u8 {
        let high = self.buffer.as_ref()[field::MC_FLAGS_HIGH];
        let low = self.buffer.as_ref()[field::MC_FLAGS_LOW];
        (high << 1) | (low >> 7)
    }

    #[inline]
    pub fn metric_aggregation(&self) -> u8 {
        get!(self.buffer, field: field::MC_FLAGS_LOW, shift: 4, mask: 0b111)
    }

    #[inline]
    pub fn metric_precedence(&self) -> u8 {
        get!(self.buffer, field: field::MC_FLAGS_LOW, mask: 0b1111)
    }

    #[inline]
    pub fn metric_length(&self) -> u8 {
        get!(self.buffer, field: field::MC_LENGTH)
    }

    #[inline]
    pub fn metric_etx(&self) -> u16 {
        get!(self.buffer, u16, field: field::MC_ETX)
    }

    #[inline]
    pub fn metric_energy_flags(&self) -> u8 {
        get!(self.buffer, field: field::MC_ENERGY_FLAGS)
    }

    #[inline]
    pub fn metric_energy_estimation(&self) -> u8 {
        get!(self.buffer, field: field::MC_ENERGY_ESTIMATION)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_metric_header(&mut self, kind: u8, flags: u8, aggregation: u8, precedence: u8) {
        let buffer = self.buffer.as_mut();
        buffer[field::MC_TYPE] = kind;
        buffer[field::MC_FLAGS_HIGH] = flags >> 1;
        buffer[field::MC_FLAGS_LOW] =
            ((flags & 1) << 7) | ((aggregation & 0b111) << 4) | (precedence & 0b1111);
    }

    #[inline]
    pub fn set_metric_length(&mut self, value: u8) {
        set!(self.buffer, value, field: field::MC_LENGTH)
    }

    #[inline]
    pub fn set_metric_etx(&mut self, value: u16) {
        set!(self.buffer, value, u16, field: field::MC_ETX)
    }

    #[inline]
    pub fn set_metric_energy(&mut self, flags: u8, estimation: u8) {
        self.buffer.as_mut()[field::MC_ENERGY_FLAGS] = flags;
        self.buffer.as_mut()[field::MC_ENERGY_ESTIMATION] = estimation;
    }
}

/// Getters for the Route Information option.
///
/// ```txt
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 0x03 | Option Length | Prefix Length |Resvd|Prf|Resvd|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        Route Lifetime                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// .                   Prefix (Variable Length)                    .
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn route_info_prefix_length(&self) -> u8 {
        get!(self.buffer, field: field::ROUTE_INFO_PREFIX_LENGTH)
    }

    #[inline]
    pub fn route_info_preference(&self) -> u8 {
        get!(self.buffer, field: field::ROUTE_INFO_PREFERENCE, shift: 3, mask: 0b11)
    }

    #[inline]
    pub fn route_info_lifetime(&self) -> u32 {
        get!(self.buffer, u32, field: field::ROUTE_INFO_LIFETIME)
    }

    /// The route prefix, zero-padded to a full address.
    pub fn route_info_prefix(&self) -> Address {
        let n = prefix_octets(self.route_info_prefix_length());
        let mut bytes = [0u8; 16];
        bytes[..n].copy_from_slice(&self.buffer.as_ref()[field::ROUTE_INFO_PREFIX][..n]);
        Address::from(bytes)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_route_info(&mut self, prefix_length: u8, preference: u8, lifetime: u32) {
        let buffer = self.buffer.as_mut();
        buffer[field::ROUTE_INFO_PREFIX_LENGTH] = prefix_length;
        buffer[field::ROUTE_INFO_PREFERENCE] = (preference & 0b11) << 3;
        set!(buffer, lifetime, u32, field: field::ROUTE_INFO_LIFETIME);
    }

    pub fn set_route_info_prefix(&mut self, prefix: &Address, prefix_length: u8) {
        let n = prefix_octets(prefix_length);
        self.buffer.as_mut()[field::ROUTE_INFO_PREFIX][..n]
            .copy_from_slice(&prefix.mask(prefix_length)[..n]);
    }
}

/// Getters for the DODAG Configuration option.
///
/// ```txt
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 0x04 |Opt Length = 14| Flags |A| PCS | DIOIntDoubl.  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  DIOIntMin.   |   DIORedun.   |        MaxRankIncrease        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      MinHopRankIncrease       |              OCP              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Reserved    | Def. Lifetime |      Lifetime Unit            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn authentication_enabled(&self) -> bool {
        get!(self.buffer, bool, field: field::DODAG_CONF_FLAGS, shift: 3, mask: 0b1)
    }

    #[inline]
    pub fn path_control_size(&self) -> u8 {
        get!(self.buffer, field: field::DODAG_CONF_FLAGS, mask: 0b111)
    }

    #[inline]
    pub fn dio_interval_doublings(&self) -> u8 {
        get!(self.buffer, field: field::DODAG_CONF_DIO_INTERVAL_DOUBLINGS)
    }

    #[inline]
    pub fn dio_interval_minimum(&self) -> u8 {
        get!(self.buffer, field: field::DODAG_CONF_DIO_INTERVAL_MINIMUM)
    }

    #[inline]
    pub fn dio_redundancy_constant(&self) -> u8 {
        get!(self.buffer, field: field::DODAG_CONF_DIO_REDUNDANCY_CONSTANT)
    }

    #[inline]
    pub fn max_rank_increase(&self) -> u16 {
        get!(self.buffer, u16, field: field::DODAG_CONF_DIO_MAX_RANK_INCREASE)
    }

    #[inline]
    pub fn minimum_hop_rank_increase(&self) -> u16 {
        get!(self.buffer, u16, field: field::DODAG_CONF_MIN_HOP_RANK_INCREASE)
    }

    #[inline]
    pub fn objective_code_point(&self) -> u16 {
        get!(self.buffer, u16, field: field::DODAG_CONF_OBJECTIVE_CODE_POINT)
    }

    #[inline]
    pub fn default_lifetime(&self) -> u8 {
        get!(self.buffer, field: field::DODAG_CONF_DEFAULT_LIFETIME)
    }

    #[inline]
    pub fn lifetime_unit(&self) -> u16 {
        get!(self.buffer, u16, field: field::DODAG_CONF_LIFETIME_UNIT)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_dodag_conf_flags(&mut self, authentication_enabled: bool, path_control_size: u8) {
        self.buffer.as_mut()[field::DODAG_CONF_FLAGS] =
            ((authentication_enabled as u8) << 3) | (path_control_size & 0b111);
        self.buffer.as_mut()[field::DODAG_CONF_RESERVED] = 0;
    }

    pub fn set_dodag_conf_timers(&mut self, doublings: u8, minimum: u8, redundancy: u8) {
        let buffer = self.buffer.as_mut();
        buffer[field::DODAG_CONF_DIO_INTERVAL_DOUBLINGS] = doublings;
        buffer[field::DODAG_CONF_DIO_INTERVAL_MINIMUM] = minimum;
        buffer[field::DODAG_CONF_DIO_REDUNDANCY_CONSTANT] = redundancy;
    }

    #[inline]
    pub fn set_dodag_conf_max_rank_increase(&mut self, value: u16) {
        set!(self.buffer, value, u16, field: field::DODAG_CONF_DIO_MAX_RANK_INCREASE)
    }

    #[inline]
    pub fn set_dodag_conf_minimum_hop_rank_increase(&mut self, value: u16) {
        set!(self.buffer, value, u16, field: field::DODAG_CONF_MIN_HOP_RANK_INCREASE)
    }

    #[inline]
    pub fn set_dodag_conf_objective_code_point(&mut self, value: u16) {
        set!(self.buffer, value, u16, field: field::DODAG_CONF_OBJECTIVE_CODE_POINT)
    }

    #[inline]
    pub fn set_dodag_conf_default_lifetime(&mut self, value: u8) {
        set!(self.buffer, value, field: field::DODAG_CONF_DEFAULT_LIFETIME)
    }

    #[inline]
    pub fn set_dodag_conf_lifetime_unit(&mut self, value: u16) {
        set!(self.buffer, value, u16, field: field::DODAG_CONF_LIFETIME_UNIT)
    }
}

/// Getters for the RPL Target option.
///
/// ```txt
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 0x05 | Option Length |     Flags     | Prefix Length |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// .                Target Prefix (Variable Length)                .
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn target_prefix_length(&self) -> u8 {
        get!(self.buffer, field: field::RPL_TARGET_PREFIX_LENGTH)
    }

    /// The target prefix, zero-padded to a full address.
    pub fn target_prefix(&self) -> Address {
        let n = prefix_octets(self.target_prefix_length());
        let mut bytes = [0u8; 16];
        bytes[..n].copy_from_slice(&self.buffer.as_ref()[field::RPL_TARGET_PREFIX][..n]);
        Address::from(bytes)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_rpl_target(&mut self, prefix: &Address, prefix_length: u8) {
        let n = prefix_octets(prefix_length);
        let buffer = self.buffer.as_mut();
        buffer[field::RPL_TARGET_FLAGS] = 0;
        buffer[field::RPL_TARGET_PREFIX_LENGTH] = prefix_length;
        buffer[field::RPL_TARGET_PREFIX][..n].copy_from_slice(&prefix.mask(prefix_length)[..n]);
    }
}

/// Getters for the Transit Information option.
///
/// ```txt
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 0x06 | Option Length |E|    Flags    | Path Control  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Path Sequence | Path Lifetime |                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+        Parent Address*        +
/// .                                                               .
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn is_external(&self) -> bool {
        get!(self.buffer, bool, field: field::TRANSIT_INFO_FLAGS, shift: 7, mask: 0b1)
    }

    #[inline]
    pub fn path_control(&self) -> u8 {
        get!(self.buffer, field: field::TRANSIT_INFO_PATH_CONTROL)
    }

    #[inline]
    pub fn path_sequence(&self) -> u8 {
        get!(self.buffer, field: field::TRANSIT_INFO_PATH_SEQUENCE)
    }

    #[inline]
    pub fn path_lifetime(&self) -> u8 {
        get!(self.buffer, field: field::TRANSIT_INFO_PATH_LIFETIME)
    }

    /// The parent address, present in non-storing mode.
    #[inline]
    pub fn parent_address(&self) -> Option<Address> {
        if self.option_length() >= 20 {
            Some(Address::from_bytes(
                &self.buffer.as_ref()[field::TRANSIT_INFO_PARENT_ADDRESS],
            ))
        } else {
            None
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_transit_info(
        &mut self,
        external: bool,
        path_control: u8,
        path_sequence: u8,
        path_lifetime: u8,
    ) {
        let buffer = self.buffer.as_mut();
        buffer[field::TRANSIT_INFO_FLAGS] = (external as u8) << 7;
        buffer[field::TRANSIT_INFO_PATH_CONTROL] = path_control;
        buffer[field::TRANSIT_INFO_PATH_SEQUENCE] = path_sequence;
        buffer[field::TRANSIT_INFO_PATH_LIFETIME] = path_lifetime;
    }

    #[inline]
    pub fn set_transit_info_parent_address(&mut self, address: Address) {
        set!(self.buffer, address: address, field: field::TRANSIT_INFO_PARENT_ADDRESS)
    }
}

/// Getters for the Solicited Information option.
///
/// ```txt
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 0x07 |Opt Length = 19| RPLInstanceID |V|I|D|  Flags  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// .                            DODAGID                            .
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |Version Number |
/// +-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn solicited_instance_id(&self) -> InstanceId {
        get!(self.buffer, into: InstanceId, field: field::SOLICITED_INFO_RPL_INSTANCE_ID)
    }

    #[inline]
    pub fn version_predicate(&self) -> bool {
        get!(self.buffer, bool, field: field::SOLICITED_INFO_FLAGS, shift: 7, mask: 0b1)
    }

    #[inline]
    pub fn instance_id_predicate(&self) -> bool {
        get!(self.buffer, bool, field: field::SOLICITED_INFO_FLAGS, shift: 6, mask: 0b1)
    }

    #[inline]
    pub fn dodag_id_predicate(&self) -> bool {
        get!(self.buffer, bool, field: field::SOLICITED_INFO_FLAGS, shift: 5, mask: 0b1)
    }

    #[inline]
    pub fn solicited_dodag_id(&self) -> Address {
        get!(self.buffer, into: Address, fun: from_bytes, field: field::SOLICITED_INFO_DODAG_ID)
    }

    #[inline]
    pub fn solicited_version_number(&self) -> u8 {
        get!(self.buffer, field: field::SOLICITED_INFO_VERSION_NUMBER)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_solicited_info(&mut self, repr: &SolicitedInformation) {
        let flags = ((repr.version_predicate as u8) << 7)
            | ((repr.instance_id_predicate as u8) << 6)
            | ((repr.dodag_id_predicate as u8) << 5);
        let instance_id = u8::from(repr.rpl_instance_id);
        let dodag_id = repr.dodag_id;
        let version = repr.version_number.value();

        set!(self.buffer, instance_id, field: field::SOLICITED_INFO_RPL_INSTANCE_ID);
        set!(self.buffer, flags, field: field::SOLICITED_INFO_FLAGS);
        set!(self.buffer, address: dodag_id, field: field::SOLICITED_INFO_DODAG_ID);
        set!(self.buffer, version, field: field::SOLICITED_INFO_VERSION_NUMBER);
    }
}

/// Getters for the Prefix Information option.
///
/// ```txt
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 0x08 |Opt Length = 30| Prefix Length |L|A|R|Reserved1|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Valid Lifetime                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Preferred Lifetime                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Reserved2                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// .                            Prefix                             .
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn prefix_info_prefix_length(&self) -> u8 {
        get!(self.buffer, field: field::PREFIX_INFO_PREFIX_LENGTH)
    }

    #[inline]
    pub fn on_link(&self) -> bool {
        get!(self.buffer, bool, field: field::PREFIX_INFO_FLAGS, shift: 7, mask: 0b1)
    }

    #[inline]
    pub fn autonomous_address_configuration(&self) -> bool {
        get!(self.buffer, bool, field: field::PREFIX_INFO_FLAGS, shift: 6, mask: 0b1)
    }

    #[inline]
    pub fn router_address(&self) -> bool {
        get!(self.buffer, bool, field: field::PREFIX_INFO_FLAGS, shift: 5, mask: 0b1)
    }

    #[inline]
    pub fn valid_lifetime(&self) -> u32 {
        get!(self.buffer, u32, field: field::PREFIX_INFO_VALID_LIFETIME)
    }

    #[inline]
    pub fn preferred_lifetime(&self) -> u32 {
        get!(self.buffer, u32, field: field::PREFIX_INFO_PREFERRED_LIFETIME)
    }

    #[inline]
    pub fn destination_prefix(&self) -> Address {
        get!(self.buffer, into: Address, fun: from_bytes, field: field::PREFIX_INFO_PREFIX)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_prefix_info(&mut self, repr: &PrefixInformation) {
        let flags = ((repr.on_link as u8) << 7)
            | ((repr.autonomous_address_configuration as u8) << 6)
            | ((repr.router_address as u8) << 5);
        let prefix_length = repr.prefix_length;
        let valid = repr.valid_lifetime;
        let preferred = repr.preferred_lifetime;
        let prefix = repr.destination_prefix;

        set!(self.buffer, prefix_length, field: field::PREFIX_INFO_PREFIX_LENGTH);
        set!(self.buffer, flags, field: field::PREFIX_INFO_FLAGS);
        set!(self.buffer, valid, u32, field: field::PREFIX_INFO_VALID_LIFETIME);
        set!(self.buffer, preferred, u32, field: field::PREFIX_INFO_PREFERRED_LIFETIME);
        self.buffer.as_mut()[field::PREFIX_INFO_RESERVED2].fill(0);
        set!(self.buffer, address: prefix, field: field::PREFIX_INFO_PREFIX);
    }
}

impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn descriptor(&self) -> u32 {
        get!(self.buffer, u32, field: field::TARGET_DESCRIPTOR)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_descriptor(&mut self, value: u32) {
        set!(self.buffer, value, u32, field: field::TARGET_DESCRIPTOR)
    }
}

/// Routing metric object type carried in the DAG Metric Container.
pub const METRIC_TYPE_ENERGY: u8 = 2;
/// Routing metric object type for the expected transmission count.
pub const METRIC_TYPE_ETX: u8 = 7;

/// Aggregation of a routing metric along the path (RFC 6551 § 2.1).
pub const METRIC_AGGREGATION_ADDITIVE: u8 = 0;

/// The body of a routing metric object.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MetricObject {
    /// Path ETX, fixed point with a divisor of 128.
    Etx(u16),
    /// Node energy: flags and an estimation in percent of the full battery.
    Energy { flags: u8, estimation: u8 },
}

/// A DAG Metric Container with one routing metric object.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MetricContainer {
    pub flags: u8,
    pub aggregation: u8,
    pub precedence: u8,
    pub object: MetricObject,
}

/// A high-level representation of a RPL Route Information option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouteInformation {
    pub prefix_length: u8,
    pub preference: u8,
    pub lifetime: u32,
    pub prefix: Address,
}

/// A high-level representation of a RPL DODAG Configuration option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DodagConfiguration {
    pub authentication_enabled: bool,
    pub path_control_size: u8,
    pub dio_interval_doublings: u8,
    pub dio_interval_min: u8,
    pub dio_redundancy_constant: u8,
    pub max_rank_increase: u16,
    pub minimum_hop_rank_increase: u16,
    pub objective_code_point: u16,
    pub default_lifetime: u8,
    pub lifetime_unit: u16,
}

/// A high-level representation of a RPL Target option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RplTarget {
    pub prefix_length: u8,
    pub prefix: Address,
}

/// A high-level representation of a RPL Transit Information option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitInformation {
    pub external: bool,
    pub path_control: u8,
    pub path_sequence: u8,
    pub path_lifetime: u8,
    pub parent_address: Option<Address>,
}

/// A high-level representation of a RPL Solicited Information option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SolicitedInformation {
    pub rpl_instance_id: InstanceId,
    pub version_predicate: bool,
    pub instance_id_predicate: bool,
    pub dodag_id_predicate: bool,
    pub dodag_id: Address,
    pub version_number: SequenceCounter,
}

/// A high-level representation of a RPL Prefix Information option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PrefixInformation {
    pub prefix_length: u8,
    pub on_link: bool,
    pub autonomous_address_configuration: bool,
    pub router_address: bool,
    pub valid_lifetime: u32,
    pub preferred_lifetime: u32,
    pub destination_prefix: Address,
}

/// A high-level representation of a RPL option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Repr {
    Pad1,
    PadN(u8),
    DagMetricContainer(MetricContainer),
    RouteInformation(RouteInformation),
    DodagConfiguration(DodagConfiguration),
    RplTarget(RplTarget),
    TransitInformation(TransitInformation),
    SolicitedInformation(SolicitedInformation),
    PrefixInformation(PrefixInformation),
    RplTargetDescriptor(u32),
}

impl core::fmt::Display for Repr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Repr::Pad1 => write!(f, "Pad1"),
            Repr::PadN(n) => write!(f, "PadN({n})"),
            Repr::DagMetricContainer(MetricContainer { object, .. }) => match object {
                MetricObject::Etx(etx) => write!(f, "MC ETX={etx}"),
                MetricObject::Energy { flags, estimation } => {
                    write!(f, "MC Energy flags={flags:#x} estimation={estimation}")
                }
            },
            Repr::RouteInformation(RouteInformation {
                prefix_length,
                preference,
                lifetime,
                prefix,
            }) => write!(
                f,
                "ROUTE INFO {prefix}/{prefix_length} Preference={preference} Lifetime={lifetime}"
            ),
            Repr::DodagConfiguration(DodagConfiguration {
                dio_interval_doublings,
                dio_interval_min,
                dio_redundancy_constant,
                max_rank_increase,
                minimum_hop_rank_increase,
                objective_code_point,
                default_lifetime,
                lifetime_unit,
                ..
            }) => write!(
                f,
                "DODAG CONF IntD={dio_interval_doublings} IntMin={dio_interval_min} \
                RedCst={dio_redundancy_constant} MaxRankIncr={max_rank_increase} \
                MinHopRankIncr={minimum_hop_rank_increase} OCP={objective_code_point} \
                DefaultLifetime={default_lifetime} LifeUnit={lifetime_unit}"
            ),
            Repr::RplTarget(RplTarget {
                prefix_length,
                prefix,
            }) => write!(f, "RPL Target {prefix}/{prefix_length}"),
            Repr::TransitInformation(TransitInformation {
                path_sequence,
                path_lifetime,
                parent_address,
                ..
            }) => write!(
                f,
                "Transit Info PathSqnc={path_sequence} PathLifetime={path_lifetime} \
                Parent={parent_address:?}"
            ),
            Repr::SolicitedInformation(SolicitedInformation {
                rpl_instance_id,
                dodag_id,
                version_number,
                ..
            }) => write!(
                f,
                "Solicited Info IID={rpl_instance_id} DODAGID={dodag_id} Version={version_number}"
            ),
            Repr::PrefixInformation(PrefixInformation {
                prefix_length,
                destination_prefix,
                valid_lifetime,
                ..
            }) => write!(
                f,
                "Prefix Info {destination_prefix}/{prefix_length} Valid={valid_lifetime}"
            ),
            Repr::RplTargetDescriptor(d) => write!(f, "Target Descriptor {d:#x}"),
        }
    }
}

impl Repr {
    /// Parse a RPL option. Returns `Ok(None)` for option types that are not
    /// understood; the caller skips those by their length.
    pub fn parse<T: AsRef<[u8]> + ?Sized>(packet: &Packet<&T>) -> Result<Option<Self>> {
        packet.check_len()?;

        Ok(Some(match packet.option_type() {
            OptionType::Pad1 => Repr::Pad1,
            OptionType::PadN => Repr::PadN(packet.option_length()),
            OptionType::DagMetricContainer => {
                let object = match (packet.metric_type(), packet.metric_length()) {
                    (METRIC_TYPE_ETX, 2) => MetricObject::Etx(packet.metric_etx()),
                    (METRIC_TYPE_ENERGY, 2) => MetricObject::Energy {
                        flags: packet.metric_energy_flags(),
                        estimation: packet.metric_energy_estimation(),
                    },
                    _ => return Err(Error),
                };
                Repr::DagMetricContainer(MetricContainer {
                    flags: packet.metric_flags(),
                    aggregation: packet.metric_aggregation(),
                    precedence: packet.metric_precedence(),
                    object,
                })
            }
            OptionType::RouteInformation => Repr::RouteInformation(RouteInformation {
                prefix_length: packet.route_info_prefix_length(),
                preference: packet.route_info_preference(),
                lifetime: packet.route_info_lifetime(),
                prefix: packet.route_info_prefix(),
            }),
            OptionType::DodagConfiguration => Repr::DodagConfiguration(DodagConfiguration {
                authentication_enabled: packet.authentication_enabled(),
                path_control_size: packet.path_control_size(),
                dio_interval_doublings: packet.dio_interval_doublings(),
                dio_interval_min: packet.dio_interval_minimum(),
                dio_redundancy_constant: packet.dio_redundancy_constant(),
                max_rank_increase: packet.max_rank_increase(),
                minimum_hop_rank_increase: packet.minimum_hop_rank_increase(),
                objective_code_point: packet.objective_code_point(),
                default_lifetime: packet.default_lifetime(),
                lifetime_unit: packet.lifetime_unit(),
            }),
            OptionType::RplTarget => Repr::RplTarget(RplTarget {
                prefix_length: packet.target_prefix_length(),
                prefix: packet.target_prefix(),
            }),
            OptionType::TransitInformation => Repr::TransitInformation(TransitInformation {
                external: packet.is_external(),
                path_control: packet.path_control(),
                path_sequence: packet.path_sequence(),
                path_lifetime: packet.path_lifetime(),
                parent_address: packet.parent_address(),
            }),
            OptionType::SolicitedInformation => {
                Repr::SolicitedInformation(SolicitedInformation {
                    rpl_instance_id: packet.solicited_instance_id(),
                    version_predicate: packet.version_predicate(),
                    instance_id_predicate: packet.instance_id_predicate(),
                    dodag_id_predicate: packet.dodag_id_predicate(),
                    dodag_id: packet.solicited_dodag_id(),
                    version_number: packet.solicited_version_number().into(),
                })
            }
            OptionType::PrefixInformation => Repr::PrefixInformation(PrefixInformation {
                prefix_length: packet.prefix_info_prefix_length(),
                on_link: packet.on_link(),
                autonomous_address_configuration: packet.autonomous_address_configuration(),
                router_address: packet.router_address(),
                valid_lifetime: packet.valid_lifetime(),
                preferred_lifetime: packet.preferred_lifetime(),
                destination_prefix: packet.destination_prefix(),
            }),
            OptionType::RplTargetDescriptor => Repr::RplTargetDescriptor(packet.descriptor()),
            OptionType::Unknown(_) => return Ok(None),
        }))
    }

    /// Return the length of the emitted option, header included.
    pub fn buffer_len(&self) -> usize {
        match self {
            Repr::Pad1 => 1,
            Repr::PadN(size) => 2 + *size as usize,
            Repr::DagMetricContainer(_) => 2 + 4 + 2,
            Repr::RouteInformation(RouteInformation { prefix_length, .. }) => {
                2 + 6 + prefix_octets(*prefix_length)
            }
            Repr::DodagConfiguration { .. } => 2 + 14,
            Repr::RplTarget(RplTarget { prefix_length, .. }) => {
                2 + 2 + prefix_octets(*prefix_length)
            }
            Repr::TransitInformation(TransitInformation { parent_address, .. }) => {
                2 + 4 + if parent_address.is_some() { 16 } else { 0 }
            }
            Repr::SolicitedInformation { .. } => 2 + 2 + 16 + 1,
            Repr::PrefixInformation { .. } => 2 + 30,
            Repr::RplTargetDescriptor { .. } => 2 + 4,
        }
    }

    /// Emit the option into a buffer of exactly `buffer_len()` octets.
    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(&self, packet: &mut Packet<&mut T>) {
        packet.set_option_type(self.into());
        if !matches!(self, Repr::Pad1) {
            packet.set_option_length((self.buffer_len() - 2) as u8);
        }

        match self {
            Repr::Pad1 => {}
            Repr::PadN(size) => packet.clear_padn(*size),
            Repr::DagMetricContainer(MetricContainer {
                flags,
                aggregation,
                precedence,
                object,
            }) => {
                let kind = match object {
                    MetricObject::Etx(_) => METRIC_TYPE_ETX,
                    MetricObject::Energy { .. } => METRIC_TYPE_ENERGY,
                };
                packet.set_metric_header(kind, *flags, *aggregation, *precedence);
                packet.set_metric_length(2);
                match object {
                    MetricObject::Etx(etx) => packet.set_metric_etx(*etx),
                    MetricObject::Energy { flags, estimation } => {
                        packet.set_metric_energy(*flags, *estimation)
                    }
                }
            }
            Repr::RouteInformation(RouteInformation {
                prefix_length,
                preference,
                lifetime,
                prefix,
            }) => {
                packet.set_route_info(*prefix_length, *preference, *lifetime);
                packet.set_route_info_prefix(prefix, *prefix_length);
            }
            Repr::DodagConfiguration(conf) => {
                packet.set_dodag_conf_flags(conf.authentication_enabled, conf.path_control_size);
                packet.set_dodag_conf_timers(
                    conf.dio_interval_doublings,
                    conf.dio_interval_min,
                    conf.dio_redundancy_constant,
                );
                packet.set_dodag_conf_max_rank_increase(conf.max_rank_increase);
                packet.set_dodag_conf_minimum_hop_rank_increase(conf.minimum_hop_rank_increase);
                packet.set_dodag_conf_objective_code_point(conf.objective_code_point);
                packet.set_dodag_conf_default_lifetime(conf.default_lifetime);
                packet.set_dodag_conf_lifetime_unit(conf.lifetime_unit);
            }
            Repr::RplTarget(RplTarget {
                prefix_length,
                prefix,
            }) => packet.set_rpl_target(prefix, *prefix_length),
            Repr::TransitInformation(TransitInformation {
                external,
                path_control,
                path_sequence,
                path_lifetime,
                parent_address,
            }) => {
                packet.set_transit_info(*external, *path_control, *path_sequence, *path_lifetime);
                if let Some(address) = parent_address {
                    packet.set_transit_info_parent_address(*address);
                }
            }
            Repr::SolicitedInformation(info) => packet.set_solicited_info(info),
            Repr::PrefixInformation(info) => packet.set_prefix_info(info),
            Repr::RplTargetDescriptor(descriptor) => packet.set_descriptor(*descriptor),
        }
    }
}

/// An iterator over the options of a RPL message.
///
/// Yields an error and stops at the first option with an inconsistent
/// length. Options of unknown type are skipped.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OptionsIterator<'a> {
    data: &'a [u8],
    hit_error: bool,
}

impl<'a> OptionsIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            hit_error: false,
        }
    }
}

impl<'a> Iterator for OptionsIterator<'a> {
    type Item = Result<Repr>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.data.is_empty() && !self.hit_error {
            let parsed = Packet::new_checked(self.data)
                .and_then(|hdr| Ok((hdr.total_len(), Repr::parse(&hdr)?)));
            match parsed {
                Ok((len, repr)) => {
                    self.data = &self.data[len..];
                    if let Some(repr) = repr {
                        return Some(Ok(repr));
                    }
                }
                Err(e) => {
                    self.hit_error = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dodag_configuration() {
        let data = [
            0x04, 0x0e, 0x00, 0x08, 0x0c, 0x00, 0x04, 0x00, 0x00, 0x80, 0x00, 0x01, 0x00, 0x1e,
            0x00, 0x3c,
        ];
        let packet = Packet::new_checked(&data[..]).unwrap();
        let repr = Repr::parse(&packet).unwrap().unwrap();
        assert_eq!(
            repr,
            Repr::DodagConfiguration(DodagConfiguration {
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

        let mut buffer = [0u8; 16];
        repr.emit(&mut Packet::new_unchecked(&mut buffer[..]));
        assert_eq!(buffer, data);
    }

    #[test]
    fn metric_container_etx() {
        let data = [0x02, 0x06, 0x07, 0x00, 0x00, 0x02, 0x01, 0x80];
        let packet = Packet::new_checked(&data[..]).unwrap();
        let repr = Repr::parse(&packet).unwrap().unwrap();
        assert_eq!(
            repr,
            Repr::DagMetricContainer(MetricContainer {
                flags: 0,
                aggregation: METRIC_AGGREGATION_ADDITIVE,
                precedence: 0,
                object: MetricObject::Etx(384),
            })
        );

        let mut buffer = [0u8; 8];
        repr.emit(&mut Packet::new_unchecked(&mut buffer[..]));
        assert_eq!(buffer, data);
    }

    #[test]
    fn unsupported_metric_is_an_error() {
        let data = [0x02, 0x06, 0x03, 0x00, 0x00, 0x02, 0x01, 0x80];
        let packet = Packet::new_checked(&data[..]).unwrap();
        assert_eq!(Repr::parse(&packet), Err(Error));
    }

    #[test]
    fn short_target_prefix() {
        // A /64 target only carries eight octets of prefix.
        let data = [
            0x05, 0x0a, 0x00, 0x40, 0xfd, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let packet = Packet::new_checked(&data[..]).unwrap();
        let repr = Repr::parse(&packet).unwrap().unwrap();
        assert_eq!(
            repr,
            Repr::RplTarget(RplTarget {
                prefix_length: 64,
                prefix: Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 0),
            })
        );
        assert_eq!(repr.buffer_len(), data.len());
    }

    #[test]
    fn length_beyond_buffer() {
        // PadN claiming four octets with only two present.
        let data = [0x01, 0x04, 0x00, 0x00];
        assert_eq!(Packet::new_checked(&data[..]).err(), Some(Error));
    }

    #[test]
    fn length_too_small_for_type() {
        // DODAG configuration with a length of 2.
        let data = [0x04, 0x02, 0x00, 0x08];
        assert_eq!(Packet::new_checked(&data[..]).err(), Some(Error));

        // Target claiming a /128 with only four octets of prefix.
        let data = [0x05, 0x06, 0x00, 0x80, 0xfd, 0x00, 0x00, 0x00];
        assert_eq!(Packet::new_checked(&data[..]).err(), Some(Error));
    }

    #[test]
    fn iterator_skips_unknown_and_stops_on_error() {
        let data = [
            0x00, // Pad1
            0x42, 0x02, 0xaa, 0xbb, // unknown type, skipped
            0x09, 0x04, 0x00, 0x00, 0x00, 0x07, // target descriptor
            0x01, 0x05, 0x00, // truncated PadN
        ];
        let mut iter = OptionsIterator::new(&data[..]);
        assert_eq!(iter.next(), Some(Ok(Repr::Pad1)));
        assert_eq!(iter.next(), Some(Ok(Repr::RplTargetDescriptor(7))));
        assert_eq!(iter.next(), Some(Err(Error)));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn transit_information_with_parent() {
        let parent = Address::new(0xfd00, 0, 0, 0, 0x0201, 0x0001, 0x0001, 0x0001);
        let repr = Repr::TransitInformation(TransitInformation {
            external: false,
            path_control: 0,
            path_sequence: 240,
            path_lifetime: 30,
            parent_address: Some(parent),
        });
        let mut buffer = [0u8; 22];
        repr.emit(&mut Packet::new_unchecked(&mut buffer[..]));
        assert_eq!(&buffer[..6], &[0x06, 0x14, 0x00, 0x00, 0xf0, 0x1e]);

        let packet = Packet::new_checked(&buffer[..]).unwrap();
        assert_eq!(Repr::parse(&packet).unwrap(), Some(repr));
    }
}
