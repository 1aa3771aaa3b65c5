use super::{Error, InstanceId, Result};

/// IPv6 option type of the RPL option (RFC 6553 / RFC 9008).
pub const OPTION_TYPE: u8 = 0x63;
/// Length of the option data without sub-TLVs.
pub const DATA_LEN: usize = 4;

mod field {
    use crate::wire::field::*;

    pub const FLAGS: usize = 0;
    pub const INSTANCE_ID: usize = 1;
    pub const SENDER_RANK: Field = 2..4;
}

/// A read/write wrapper around the data of the RPL Packet Information
/// option, carried in an IPv6 Hop-by-Hop header (RFC 6553).
/// ```txt
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///                                 +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///                                 |  Option Type  |  Opt Data Len |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |O|R|F|0|0|0|0|0| RPLInstanceID |          SenderRank           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         (sub-TLVs)                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
/// The wrapper starts at the flags octet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    #[inline]
    pub fn new_unchecked(buffer: T) -> Self {
        Self { buffer }
    }

    #[inline]
    pub fn new_checked(buffer: T) -> Result<Self> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Returns `Err(Error)` if the buffer is too short. Trailing sub-TLVs
    /// are allowed and ignored.
    #[inline]
    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() >= DATA_LEN {
            Ok(())
        } else {
            Err(Error)
        }
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the Down (O) flag.
    #[inline]
    pub fn is_down(&self) -> bool {
        get!(self.buffer, bool, field: field::FLAGS, shift: 7, mask: 0b1)
    }

    /// Return the Rank-Error (R) flag.
    #[inline]
    pub fn has_rank_error(&self) -> bool {
        get!(self.buffer, bool, field: field::FLAGS, shift: 6, mask: 0b1)
    }

    /// Return the Forwarding-Error (F) flag.
    #[inline]
    pub fn has_forwarding_error(&self) -> bool {
        get!(self.buffer, bool, field: field::FLAGS, shift: 5, mask: 0b1)
    }

    #[inline]
    pub fn rpl_instance_id(&self) -> InstanceId {
        get!(self.buffer, into: InstanceId, field: field::INSTANCE_ID)
    }

    #[inline]
    pub fn sender_rank(&self) -> u16 {
        get!(self.buffer, u16, field: field::SENDER_RANK)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_is_down(&mut self, value: bool) {
        set!(self.buffer, value, bool, field: field::FLAGS, shift: 7, mask: 0b1)
    }

    #[inline]
    pub fn set_has_rank_error(&mut self, value: bool) {
        set!(self.buffer, value, bool, field: field::FLAGS, shift: 6, mask: 0b1)
    }

    #[inline]
    pub fn set_has_forwarding_error(&mut self, value: bool) {
        set!(self.buffer, value, bool, field: field::FLAGS, shift: 5, mask: 0b1)
    }

    /// Clear the reserved bits of the flags octet.
    #[inline]
    pub fn clear_reserved(&mut self) {
        self.buffer.as_mut()[field::FLAGS] &= 0b1110_0000;
    }

    #[inline]
    pub fn set_rpl_instance_id(&mut self, value: u8) {
        set!(self.buffer, value, field: field::INSTANCE_ID)
    }

    #[inline]
    pub fn set_sender_rank(&mut self, value: u16) {
        set!(self.buffer, value, u16, field: field::SENDER_RANK)
    }
}

/// A high-level representation of the RPL Hop-by-Hop option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HopByHopOption {
    pub down: bool,
    pub rank_error: bool,
    pub forwarding_error: bool,
    pub instance_id: InstanceId,
    pub sender_rank: u16,
}

impl HopByHopOption {
    pub fn parse<T: AsRef<[u8]> + ?Sized>(opt: &Packet<&T>) -> Result<Self> {
        opt.check_len()?;
        Ok(Self {
            down: opt.is_down(),
            rank_error: opt.has_rank_error(),
            forwarding_error: opt.has_forwarding_error(),
            instance_id: opt.rpl_instance_id(),
            sender_rank: opt.sender_rank(),
        })
    }

    pub const fn buffer_len(&self) -> usize {
        DATA_LEN
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(&self, opt: &mut Packet<&mut T>) {
        opt.clear_reserved();
        opt.set_is_down(self.down);
        opt.set_has_rank_error(self.rank_error);
        opt.set_has_forwarding_error(self.forwarding_error);
        opt.set_rpl_instance_id(self.instance_id.into());
        opt.set_sender_rank(self.sender_rank);
    }
}

impl core::fmt::Display for HopByHopOption {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "down={} rank_error={} forw_error={} IID={} sender_rank={}",
            self.down, self.rank_error, self.forwarding_error, self.instance_id, self.sender_rank
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_emit() {
        let data = [0b1100_0000, 0x1e, 0x02, 0x00];
        let packet = Packet::new_checked(&data[..]).unwrap();
        let repr = HopByHopOption::parse(&packet).unwrap();
        assert_eq!(
            repr,
            HopByHopOption {
                down: true,
                rank_error: true,
                forwarding_error: false,
                instance_id: InstanceId::from(0x1e),
                sender_rank: 512,
            }
        );

        let mut buffer = [0xffu8; 4];
        repr.emit(&mut Packet::new_unchecked(&mut buffer[..]));
        assert_eq!(buffer, data);
    }

    #[test]
    fn truncated() {
        assert_eq!(Packet::new_checked(&[0u8; 3][..]).err(), Some(Error));
        assert!(Packet::new_checked(&[0u8; 6][..]).is_ok());
    }
}
