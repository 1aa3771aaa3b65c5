//! Compile-time capacities.
//!
//! Every table in the crate is a fixed-size `heapless` collection sized by
//! one of these constants.

/// Number of RPL instances a node can take part in.
pub const RPL_MAX_INSTANCES: usize = 1;
/// Number of DODAGs kept per instance.
pub const RPL_MAX_DAG_PER_INSTANCE: usize = 2;
/// Number of candidate parents kept per DODAG.
pub const RPL_MAX_PARENTS: usize = 8;
/// Number of non-padding options a single control message may carry.
pub const RPL_MAX_OPTIONS: usize = 4;
/// Size of the shared parent pool.
pub const RPL_PARENT_POOL_SIZE: usize =
    RPL_MAX_PARENTS * RPL_MAX_DAG_PER_INSTANCE * RPL_MAX_INSTANCES;
/// Number of nodes the root of a non-storing DODAG keeps track of.
pub const RPL_NS_NODE_TABLE_SIZE: usize = 32;
/// Longest source route the non-storing root builds.
pub const RPL_NS_MAX_PATH_LEN: usize = 16;
/// Entries in the IPv6 route table, default routes included.
pub const ROUTE_TABLE_SIZE: usize = 16;
/// Entries in the IPv6 neighbor table.
pub const NEIGHBOR_TABLE_SIZE: usize = 16;
/// Pending events in the dispatcher queue.
pub const EVENT_QUEUE_SIZE: usize = 16;
/// Outgoing messages waiting to be collected.
pub const OUTBOX_SIZE: usize = 8;
/// Pending topology notifications for the scheduler.
pub const NOTIFICATION_QUEUE_SIZE: usize = 16;
/// Largest RPL control message the engine sends or accepts.
pub const RPL_MAX_PACKET_LEN: usize = 256;
/// Slotframes in the TSCH schedule.
pub const TSCH_MAX_SLOTFRAMES: usize = 4;
/// Links in the TSCH schedule, over all slotframes.
pub const TSCH_MAX_LINKS: usize = 32;
/// Children tracked by Orchestra.
pub const ORCHESTRA_MAX_CHILDREN: usize = ROUTE_TABLE_SIZE;
