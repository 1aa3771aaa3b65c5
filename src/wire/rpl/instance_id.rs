/// An RPL Instance ID.
///
/// The most significant bit distinguishes global instances (learnt from
/// DIOs) from local instances. Only the full octet matters when comparing
/// instances, so conversions are lossless.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InstanceId {
    Global(u8),
    Local(u8),
}

impl From<u8> for InstanceId {
    fn from(val: u8) -> Self {
        const MASK: u8 = 0b0111_1111;

        if val & 0b1000_0000 == 0 {
            Self::Global(val & MASK)
        } else {
            Self::Local(val & MASK)
        }
    }
}

impl From<InstanceId> for u8 {
    fn from(val: InstanceId) -> Self {
        match val {
            InstanceId::Global(val) => val & 0b0111_1111,
            InstanceId::Local(val) => 0b1000_0000 | val,
        }
    }
}

impl core::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#04x}", u8::from(*self))
    }
}

impl InstanceId {
    /// Return the real part of the ID.
    pub fn id(&self) -> u8 {
        match self {
            Self::Global(val) | Self::Local(val) => *val,
        }
    }

    /// For a local instance, whether the DODAG ID is the destination of the
    /// IPv6 packet (the D flag).
    #[inline]
    pub fn dodag_is_destination(&self) -> bool {
        match self {
            Self::Global(_) => false,
            Self::Local(val) => ((val >> 6) & 0b1) == 0b1,
        }
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self, InstanceId::Local(_))
    }

    #[inline]
    pub fn is_global(&self) -> bool {
        matches!(self, InstanceId::Global(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(InstanceId::from(0x1e), InstanceId::Global(0x1e));
        assert_eq!(u8::from(InstanceId::from(0x1e)), 0x1e);
        assert_eq!(InstanceId::from(0xc1), InstanceId::Local(0x41));
        assert_eq!(u8::from(InstanceId::Local(0x41)), 0xc1);
        assert!(InstanceId::from(0xc1).dodag_is_destination());
        assert!(!InstanceId::from(0x81).dodag_is_destination());
    }
}
