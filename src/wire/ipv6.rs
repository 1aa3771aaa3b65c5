use core::fmt;

/// Size of an IPv6 address in octets.
pub const ADDR_SIZE: usize = 16;

/// The link-local [all RPL nodes multicast address].
///
/// [all RPL nodes multicast address]: https://www.rfc-editor.org/rfc/rfc6550.html#section-20.19
pub const LINK_LOCAL_ALL_RPL_NODES: Address = Address::new(0xff02, 0, 0, 0, 0, 0, 0, 0x1a);

/// The link-local [all nodes multicast address].
///
/// [all nodes multicast address]: https://tools.ietf.org/html/rfc4291#section-2.7.1
pub const LINK_LOCAL_ALL_NODES: Address = Address::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

pub use core::net::Ipv6Addr as Address;

pub trait AddressExt {
    /// Construct an IPv6 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not sixteen octets long.
    fn from_bytes(data: &[u8]) -> Address;

    /// Query whether the IPv6 address is in the [link-local] scope.
    ///
    /// [link-local]: https://tools.ietf.org/html/rfc4291#section-2.5.6
    fn is_link_local(&self) -> bool;

    /// Query whether the IPv6 address is a routable unicast address, i.e.
    /// neither multicast, unspecified nor link-local.
    fn is_routable_unicast(&self) -> bool;

    /// The address with every bit after `prefix_len` cleared.
    fn mask(&self, prefix_len: u8) -> [u8; ADDR_SIZE];

    /// The last eight octets, the interface identifier.
    fn iid(&self) -> [u8; 8];

    /// Combine the first `prefix_len` bits of `self` with the interface
    /// identifier of `iid_source`.
    fn with_iid_of(&self, prefix_len: u8, iid_source: &Address) -> Address;
}

impl AddressExt for Address {
    fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; ADDR_SIZE];
        bytes.copy_from_slice(data);
        Address::from(bytes)
    }

    fn is_link_local(&self) -> bool {
        self.octets()[0..8] == [0xfe, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    }

    fn is_routable_unicast(&self) -> bool {
        !(self.is_multicast() || self.is_unspecified() || self.is_link_local())
    }

    fn mask(&self, prefix_len: u8) -> [u8; ADDR_SIZE] {
        let prefix_len = prefix_len.min(128) as usize;
        let mut bytes = [0u8; ADDR_SIZE];
        let octets = self.octets();
        let full = prefix_len / 8;
        bytes[..full].copy_from_slice(&octets[..full]);
        if full < ADDR_SIZE {
            let rem = prefix_len % 8;
            bytes[full] = octets[full] & !(0xffu8.checked_shr(rem as u32).unwrap_or(0));
        }
        bytes
    }

    fn iid(&self) -> [u8; 8] {
        let mut iid = [0u8; 8];
        iid.copy_from_slice(&self.octets()[8..]);
        iid
    }

    fn with_iid_of(&self, prefix_len: u8, iid_source: &Address) -> Address {
        let mut bytes = self.mask(prefix_len.min(64));
        bytes[8..].copy_from_slice(&iid_source.iid());
        Address::from(bytes)
    }
}

/// An IPv6 prefix: an address and a prefix length.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cidr {
    address: Address,
    prefix_len: u8,
}

impl Cidr {
    /// The default route `::/0`.
    pub const DEFAULT: Cidr = Cidr {
        address: Address::UNSPECIFIED,
        prefix_len: 0,
    };

    /// Create an IPv6 CIDR block. A prefix length above 128 is clamped.
    pub fn new(address: Address, prefix_len: u8) -> Cidr {
        Cidr {
            address,
            prefix_len: prefix_len.min(128),
        }
    }

    /// A host route for `address`.
    pub fn host(address: Address) -> Cidr {
        Cidr::new(address, 128)
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Query whether the block contains the given address.
    pub fn contains_addr(&self, addr: &Address) -> bool {
        if self.prefix_len == 0 {
            return true;
        }

        self.address.mask(self.prefix_len) == addr.mask(self.prefix_len)
    }

    /// Two blocks describe the same prefix, ignoring the host bits.
    pub fn same_prefix(&self, other: &Cidr) -> bool {
        self.prefix_len == other.prefix_len && self.contains_addr(&other.address)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PREFIX: Address = Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 0);

    #[test]
    fn link_local() {
        assert!(Address::new(0xfe80, 0, 0, 0, 0x0200, 0, 0, 1).is_link_local());
        assert!(!Address::new(0xfd00, 0, 0, 0, 0x0200, 0, 0, 1).is_link_local());
        assert!(!LINK_LOCAL_ALL_RPL_NODES.is_routable_unicast());
        assert!(Address::new(0xfd00, 0, 0, 0, 0x0200, 0, 0, 1).is_routable_unicast());
    }

    #[test]
    fn masking() {
        let addr = Address::new(0xfd00, 0xabcd, 0, 0, 0x0200, 0, 0, 1);
        assert_eq!(Address::from(addr.mask(16)), PREFIX);
        assert_eq!(addr.mask(128), addr.octets());
        assert_eq!(addr.mask(0), [0; 16]);
        assert_eq!(addr.mask(12)[1], 0x00);
        assert_eq!(Address::new(0xffff, 0, 0, 0, 0, 0, 0, 0).mask(12)[1], 0xf0);
    }

    #[test]
    fn iid_combination() {
        let ll = Address::new(0xfe80, 0, 0, 0, 0x0212, 0x4b00, 0x0001, 0x0203);
        let global = PREFIX.with_iid_of(64, &ll);
        assert_eq!(global, Address::new(0xfd00, 0, 0, 0, 0x0212, 0x4b00, 0x0001, 0x0203));
    }

    #[test]
    fn cidr_contains() {
        let cidr = Cidr::new(PREFIX, 64);
        assert!(cidr.contains_addr(&Address::new(0xfd00, 0, 0, 0, 1, 2, 3, 4)));
        assert!(!cidr.contains_addr(&Address::new(0xfd00, 0, 0, 1, 1, 2, 3, 4)));
        assert!(Cidr::DEFAULT.contains_addr(&Address::LOCALHOST));
        assert!(cidr.same_prefix(&Cidr::new(Address::new(0xfd00, 0, 0, 0, 9, 9, 9, 9), 64)));
    }
}
