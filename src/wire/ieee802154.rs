use core::fmt;

use super::ipv6::{Address as Ipv6Address, AddressExt};

/// A IEEE 802.15.4 link-layer address.
///
/// The Orchestra scheduler identifies neighbors by this address, and the
/// RPL layer derives it from the interface identifier of a link-local
/// IPv6 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    Absent,
    Short([u8; 2]),
    Extended([u8; 8]),
}

impl Address {
    pub const BROADCAST: Address = Address::Short([0xff; 2]);

    pub fn is_unicast(&self) -> bool {
        !self.is_broadcast() && *self != Address::Absent
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Address::Absent => &[],
            Address::Short(value) => value,
            Address::Extended(value) => value,
        }
    }

    /// The last octet of the address, or `None` when absent.
    pub fn last_octet(&self) -> Option<u8> {
        self.as_bytes().last().copied()
    }

    /// Convert the address to a modified EUI-64 interface identifier.
    pub fn as_iid(&self) -> Option<[u8; 8]> {
        match self {
            Address::Absent => None,
            Address::Short(value) => Some([0, 0, 0, 0xff, 0xfe, 0, value[0], value[1]]),
            Address::Extended(value) => {
                let mut bytes = *value;
                bytes[0] ^= 1 << 1;
                Some(bytes)
            }
        }
    }

    /// The link-local IPv6 address (RFC 4944) for this link-layer address.
    pub fn as_link_local_address(&self) -> Option<Ipv6Address> {
        let mut bytes = [0; 16];
        bytes[0] = 0xfe;
        bytes[1] = 0x80;
        bytes[8..].copy_from_slice(&self.as_iid()?);

        Some(Ipv6Address::from(bytes))
    }

    /// Recover the link-layer address from the interface identifier of an
    /// IPv6 address. The inverse of [`Address::as_link_local_address`].
    pub fn from_ipv6_iid(addr: &Ipv6Address) -> Address {
        let iid = addr.iid();
        if iid[..6] == [0, 0, 0, 0xff, 0xfe, 0] {
            Address::Short([iid[6], iid[7]])
        } else {
            let mut bytes = iid;
            bytes[0] ^= 1 << 1;
            Address::Extended(bytes)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "not-present"),
            Self::Short(bytes) => write!(f, "{:02x}-{:02x}", bytes[0], bytes[1]),
            Self::Extended(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, "-")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}
