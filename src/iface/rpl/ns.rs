//! Child to parent relations kept by the root of a non-storing DODAG.
//!
//! Nodes of a non-storing DODAG advertise their parent to the root in the
//! Transit Information of their DAOs. The root keeps one entry per node and
//! walks the entries upwards to build source routes.

use heapless::Vec;

use crate::config::{RPL_NS_MAX_PATH_LEN, RPL_NS_NODE_TABLE_SIZE};
use crate::time::Instant;
use crate::wire::Ipv6Address;

use super::{DagRef, Rpl};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeTableFull;

impl core::fmt::Display for NodeTableFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Node table full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for NodeTableFull {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NsNode {
    pub address: Ipv6Address,
    pub parent: Ipv6Address,
    pub dag: DagRef,
    /// `None` means "forever".
    pub expires_at: Option<Instant>,
}

impl NsNode {
    pub fn has_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }
}

impl core::fmt::Display for NsNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} child of {}", self.address, self.parent)?;
        if let Some(expires_at) = self.expires_at {
            write!(f, " (expires at {})", expires_at)?;
        }
        Ok(())
    }
}

/// The hops from the root to a node, the root excluded and the node
/// included.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SourceRoute {
    hops: Vec<Ipv6Address, RPL_NS_MAX_PATH_LEN>,
}

impl SourceRoute {
    pub fn hops(&self) -> &[Ipv6Address] {
        &self.hops
    }

    /// The neighbor of the root the packet is handed to.
    pub fn first_hop(&self) -> Option<Ipv6Address> {
        self.hops.first().copied()
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct NsNodeTable {
    nodes: Vec<NsNode, RPL_NS_NODE_TABLE_SIZE>,
}

impl NsNodeTable {
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn iter(&self) -> impl Iterator<Item = &NsNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, address: &Ipv6Address) -> Option<&NsNode> {
        self.nodes.iter().find(|n| n.address == *address)
    }

    /// Record that `child` reaches the root through `parent`.
    pub(crate) fn update(
        &mut self,
        child: Ipv6Address,
        parent: Ipv6Address,
        dag: DagRef,
        expires_at: Option<Instant>,
    ) -> Result<(), NodeTableFull> {
        let node = NsNode {
            address: child,
            parent,
            dag,
            expires_at,
        };
        match self.nodes.iter_mut().find(|n| n.address == child) {
            Some(n) => *n = node,
            None => self.nodes.push(node).map_err(|_| NodeTableFull)?,
        }
        Ok(())
    }

    /// A No-Path DAO: the relation ends now if it still names `parent`.
    pub(crate) fn expire_parent(&mut self, child: &Ipv6Address, parent: &Ipv6Address, now: Instant) {
        if let Some(n) = self
            .nodes
            .iter_mut()
            .find(|n| n.address == *child && n.parent == *parent)
        {
            n.expires_at = Some(now);
        }
    }

    /// Drop expired relations, returning how many went away.
    pub(crate) fn purge(&mut self, now: Instant) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|n| {
            let expired = n.has_expired(now);
            if expired {
                net_trace!("rpl: relation {} expired", n);
            }
            !expired
        });
        before - self.nodes.len()
    }

    pub(crate) fn remove_by_dag(&mut self, dag: DagRef) {
        self.nodes.retain(|n| n.dag != dag);
    }

    /// Build the path from `root` down to `target`.
    ///
    /// Returns `None` when a relation is missing on the way up, or when the
    /// relations loop or form a path longer than [`RPL_NS_MAX_PATH_LEN`].
    pub fn source_route(&self, root: &Ipv6Address, target: &Ipv6Address) -> Option<SourceRoute> {
        let mut hops = Vec::<Ipv6Address, RPL_NS_MAX_PATH_LEN>::new();
        let mut current = *target;
        while current != *root {
            if hops.contains(&current) {
                net_debug!("rpl: loop in the relations towards {}", target);
                return None;
            }
            hops.push(current).ok()?;
            current = self.get(&current)?.parent;
        }
        hops.reverse();
        Some(SourceRoute { hops })
    }
}

impl Rpl {
    /// The source route to `dst`, on the root of a non-storing DODAG.
    pub fn source_route(&self, dst: &Ipv6Address) -> Option<SourceRoute> {
        let inst = self.default_instance()?;
        if !inst.is_root() || inst.is_storing() {
            return None;
        }
        let root = self.global_address()?;
        self.ns_nodes.source_route(&root, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Duration;

    fn addr(n: u16) -> Ipv6Address {
        Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, n)
    }

    const DAG: DagRef = DagRef {
        instance: 0,
        dag: 0,
    };

    fn table() -> NsNodeTable {
        //   1
        //  / \
        // 2   3
        //     |
        //     4
        let mut t = NsNodeTable::new();
        t.update(addr(2), addr(1), DAG, None).unwrap();
        t.update(addr(3), addr(1), DAG, None).unwrap();
        t.update(addr(4), addr(3), DAG, Some(Instant::from_secs(60)))
            .unwrap();
        t
    }

    #[test]
    fn path_from_the_root() {
        let t = table();
        let route = t.source_route(&addr(1), &addr(4)).unwrap();
        assert_eq!(route.hops(), &[addr(3), addr(4)]);
        assert_eq!(route.first_hop(), Some(addr(3)));

        let route = t.source_route(&addr(1), &addr(2)).unwrap();
        assert_eq!(route.hops(), &[addr(2)]);
        assert!(t.source_route(&addr(1), &addr(1)).unwrap().is_empty());
    }

    #[test]
    fn unknown_or_looping_path() {
        let mut t = table();
        assert!(t.source_route(&addr(1), &addr(9)).is_none());

        t.update(addr(3), addr(4), DAG, None).unwrap();
        assert!(t.source_route(&addr(1), &addr(4)).is_none());
    }

    #[test]
    fn no_path_and_purge() {
        let mut t = table();
        let now = Instant::ZERO + Duration::from_secs(10);

        // Another parent than the recorded one: ignored.
        t.expire_parent(&addr(4), &addr(2), now);
        assert_eq!(t.purge(now), 0);

        t.expire_parent(&addr(4), &addr(3), now);
        assert_eq!(t.purge(now), 1);
        assert!(t.get(&addr(4)).is_none());
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn full_table() {
        let mut t = NsNodeTable::new();
        for n in 0..RPL_NS_NODE_TABLE_SIZE as u16 {
            t.update(addr(n + 2), addr(1), DAG, None).unwrap();
        }
        assert_eq!(t.update(addr(1000), addr(1), DAG, None), Err(NodeTableFull));
        // Refreshing a known node still works.
        assert!(t.update(addr(2), addr(3), DAG, None).is_ok());
    }
}
