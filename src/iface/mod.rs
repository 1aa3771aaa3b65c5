/*! Routing state of a node.

The `iface` module holds the tables an IPv6 interface of a low-power
node keeps about its surroundings: the neighbor table with its link
statistics, the route table, and the RPL engine maintaining both.
*/

pub mod neighbor;
pub mod route;
pub mod rpl;

pub use self::neighbor::{LinkStats, Neighbor, NeighborState, NeighborTable, TxStatus};
pub use self::route::{Route, Routes};
