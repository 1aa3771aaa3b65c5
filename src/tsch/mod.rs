/*! Time-Slotted Channel Hopping scheduling.

The [schedule] holds the slotframes and links of an IEEE 802.15.4 TSCH
MAC. The MAC itself, with its slot timing and channel hopping, lives
outside this crate: it asks [orchestra::Orchestra] where each outgoing
frame goes and reports transmission outcomes back.
*/

pub mod orchestra;
pub mod schedule;

pub use self::orchestra::{Orchestra, OrchestraConfig};
pub use self::schedule::{Link, LinkOptions, LinkType, Schedule, Slotframe};
