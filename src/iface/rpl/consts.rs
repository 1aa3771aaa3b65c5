use crate::time::Duration;

/// The instance a node joins or roots when nothing else is configured.
pub const RPL_DEFAULT_INSTANCE: u8 = 0x1e;

/// Rank value of a node that cannot reach the root.
pub const INFINITE_RANK: u16 = 0xffff;

// ------------------------------------
// Constants used for the trickle timer:
// ------------------------------------
/// This is 3 in the standard, but we follow the common 802.15.4 practice:
pub const DEFAULT_DIO_INTERVAL_MIN: u8 = 12;
/// This is 20 in the standard, but we follow the common 802.15.4 practice:
pub const DEFAULT_DIO_INTERVAL_DOUBLINGS: u8 = 8;
pub const DEFAULT_DIO_REDUNDANCY_CONSTANT: u8 = 10;

// ----------------------------------
// Constants of the DODAG configuration:
// ----------------------------------
pub const DEFAULT_MIN_HOP_RANK_INCREASE: u16 = 256;
pub const DEFAULT_MAX_RANK_INCREASE: u16 = 7 * DEFAULT_MIN_HOP_RANK_INCREASE;
pub const DEFAULT_LIFETIME: u8 = 30;
pub const DEFAULT_LIFETIME_UNIT: u16 = 60;
pub const DEFAULT_PREFERENCE: u8 = 0;
/// A lifetime of 0xff units never expires.
pub const INFINITE_LIFETIME: u8 = 0xff;

/// A DODAG that is not joined is forgotten after this many maximum DIO
/// intervals without news.
pub const DAG_LIFETIME_INTERVALS: u32 = 3;

// --------------------------
// Constants used for timers:
// --------------------------
pub const PERIODIC_INTERVAL: Duration = Duration::from_secs(1);
pub const DIS_INTERVAL: Duration = Duration::from_secs(60);
pub const DIS_START_DELAY: Duration = Duration::from_secs(5);
pub const DAO_LATENCY: Duration = Duration::from_secs(4);
pub const DAO_ACK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DAO_MAX_RETRANSMISSIONS: u8 = 5;
/// Lifetime given to a route withdrawn by a No-Path DAO.
pub const DAO_EXPIRATION_TIMEOUT: Duration = Duration::from_secs(60);
/// Delay before answering a detected loop with a unicast DIO.
pub const UNICAST_DIO_DELAY: Duration = Duration::from_millis(0);

/// Hop limit of every RPL control message.
pub const HOP_LIMIT: u8 = 64;
