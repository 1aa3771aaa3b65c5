use heapless::Vec;

use crate::config::ROUTE_TABLE_SIZE;
use crate::iface::rpl::DagRef;
use crate::time::Instant;
use crate::wire::{Ipv6Address, Ipv6Cidr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouteTableFull;

impl core::fmt::Display for RouteTableFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Route table full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RouteTableFull {}

/// A prefix of addresses that should be routed via a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Route {
    pub cidr: Ipv6Cidr,
    pub via_router: Ipv6Address,
    /// `None` means "forever".
    pub expires_at: Option<Instant>,
    /// The DODAG the route was learnt in, if any.
    pub dag: Option<DagRef>,
    /// A No-Path DAO was received for this route and it is waiting to
    /// expire.
    pub no_path_received: bool,
}

impl Route {
    /// Returns a route to `::/0` via the `gateway`.
    pub fn new_default(gateway: Ipv6Address, expires_at: Option<Instant>, dag: DagRef) -> Route {
        Route {
            cidr: Ipv6Cidr::DEFAULT,
            via_router: gateway,
            expires_at,
            dag: Some(dag),
            no_path_received: false,
        }
    }

    pub fn is_default(&self) -> bool {
        self.cidr == Ipv6Cidr::DEFAULT
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }
}

impl core::fmt::Display for Route {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} via {}", self.cidr, self.via_router)?;
        if let Some(expires_at) = self.expires_at {
            write!(f, " (expires at {expires_at})")?;
        }
        if self.no_path_received {
            write!(f, " (no-path)")?;
        }
        Ok(())
    }
}

/// Routes removed from the table in one operation.
pub type RemovedRoutes = Vec<Route, ROUTE_TABLE_SIZE>;

/// A routing table.
///
/// Default routes are kept per RPL instance, next to the downward routes
/// learnt from DAOs.
#[derive(Debug, Default)]
pub struct Routes {
    storage: Vec<Route, ROUTE_TABLE_SIZE>,
}

impl Routes {
    /// Creates a new empty routing table.
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.storage.iter()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Add or replace the route for `route.cidr`.
    ///
    /// On success, returns the route it replaced, if any.
    pub fn add(&mut self, route: Route) -> Result<Option<Route>, RouteTableFull> {
        if let Some(existing) = self
            .storage
            .iter_mut()
            .find(|r| !r.is_default() && r.cidr.same_prefix(&route.cidr))
        {
            let old = *existing;
            *existing = route;
            return Ok(Some(old));
        }

        self.storage.push(route).map_err(|_| RouteTableFull)?;
        Ok(None)
    }

    /// Return the route for exactly this prefix.
    pub fn get(&self, cidr: &Ipv6Cidr) -> Option<&Route> {
        self.storage
            .iter()
            .find(|r| !r.is_default() && r.cidr.same_prefix(cidr))
    }

    pub fn get_mut(&mut self, cidr: &Ipv6Cidr) -> Option<&mut Route> {
        self.storage
            .iter_mut()
            .find(|r| !r.is_default() && r.cidr.same_prefix(cidr))
    }

    /// Remove the route for exactly this prefix.
    pub fn remove(&mut self, cidr: &Ipv6Cidr) -> Option<Route> {
        let i = self
            .storage
            .iter()
            .position(|r| !r.is_default() && r.cidr.same_prefix(cidr))?;
        Some(self.storage.swap_remove(i))
    }

    /// Remove every route for which `f` returns true.
    pub fn remove_if<F: FnMut(&Route) -> bool>(&mut self, mut f: F) -> RemovedRoutes {
        let mut removed = RemovedRoutes::new();
        let mut i = 0;
        while i < self.storage.len() {
            if f(&self.storage[i]) {
                // Both vectors have the same capacity.
                let _ = removed.push(self.storage.swap_remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Remove the downward routes through `next_hop`.
    pub fn remove_by_next_hop(&mut self, next_hop: &Ipv6Address) -> RemovedRoutes {
        self.remove_if(|r| !r.is_default() && r.via_router == *next_hop)
    }

    /// Remove the downward routes learnt in `dag`.
    pub fn remove_by_dag(&mut self, dag: DagRef) -> RemovedRoutes {
        self.remove_if(|r| !r.is_default() && r.dag == Some(dag))
    }

    /// Remove every expired route.
    pub fn purge(&mut self, now: Instant) -> RemovedRoutes {
        self.remove_if(|r| r.has_expired(now))
    }

    /// Whether any downward route goes through `next_hop`.
    pub fn has_next_hop(&self, next_hop: &Ipv6Address) -> bool {
        self.storage
            .iter()
            .any(|r| !r.is_default() && r.via_router == *next_hop)
    }

    /// Add the default route of the instance of `dag` (ie. "ip -6 route add
    /// ::/0 via `gateway`").
    ///
    /// On success, returns the previous default route of that instance.
    pub fn add_default_route(
        &mut self,
        gateway: Ipv6Address,
        expires_at: Option<Instant>,
        dag: DagRef,
    ) -> Result<Option<Route>, RouteTableFull> {
        let old = self.remove_default_route(dag.instance);
        self.storage
            .push(Route::new_default(gateway, expires_at, dag))
            .map_err(|_| RouteTableFull)?;
        Ok(old)
    }

    /// Remove the default route of an instance.
    pub fn remove_default_route(&mut self, instance: usize) -> Option<Route> {
        let i = self
            .storage
            .iter()
            .position(|r| r.is_default() && r.dag.map(|d| d.instance) == Some(instance))?;
        Some(self.storage.swap_remove(i))
    }

    pub fn default_route(&self, instance: usize) -> Option<&Route> {
        self.storage
            .iter()
            .find(|r| r.is_default() && r.dag.map(|d| d.instance) == Some(instance))
    }

    /// Longest prefix match, ignoring expired routes.
    pub fn lookup(&self, addr: &Ipv6Address, timestamp: Instant) -> Option<&Route> {
        self.storage
            .iter()
            .filter(|route| !route.has_expired(timestamp) && route.cidr.contains_addr(addr))
            .max_by_key(|route| route.cidr.prefix_len())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ADDR_1A: Ipv6Address = Ipv6Address::new(0xfd00, 0, 0, 2, 0, 0, 0, 1);
    const ADDR_1B: Ipv6Address = Ipv6Address::new(0xfd00, 0, 0, 2, 0, 0, 0, 13);
    const ADDR_2A: Ipv6Address = Ipv6Address::new(0xfd00, 0, 0, 0x3364, 0, 0, 0, 1);
    const HOP_1: Ipv6Address = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
    const HOP_2: Ipv6Address = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);
    const DAG: DagRef = DagRef {
        instance: 0,
        dag: 0,
    };

    fn route(cidr: Ipv6Cidr, via: Ipv6Address, expires_at: Option<Instant>) -> Route {
        Route {
            cidr,
            via_router: via,
            expires_at,
            dag: Some(DAG),
            no_path_received: false,
        }
    }

    fn cidr_1() -> Ipv6Cidr {
        Ipv6Cidr::new(Ipv6Address::new(0xfd00, 0, 0, 2, 0, 0, 0, 0), 64)
    }

    #[test]
    fn longest_prefix_wins() {
        let mut routes = Routes::new();
        assert!(routes.lookup(&ADDR_1A, Instant::ZERO).is_none());

        routes.add(route(cidr_1(), HOP_1, None)).unwrap();
        routes
            .add(route(Ipv6Cidr::host(ADDR_1B), HOP_2, None))
            .unwrap();
        routes.add_default_route(HOP_2, None, DAG).unwrap();

        assert_eq!(routes.lookup(&ADDR_1A, Instant::ZERO).unwrap().via_router, HOP_1);
        assert_eq!(routes.lookup(&ADDR_1B, Instant::ZERO).unwrap().via_router, HOP_2);
        assert!(routes.lookup(&ADDR_2A, Instant::ZERO).unwrap().is_default());
    }

    #[test]
    fn expired_routes_are_ignored_and_purged() {
        let mut routes = Routes::new();
        routes
            .add(route(cidr_1(), HOP_1, Some(Instant::from_millis(10))))
            .unwrap();

        assert!(routes.lookup(&ADDR_1A, Instant::from_millis(5)).is_some());
        assert!(routes.lookup(&ADDR_1A, Instant::from_millis(10)).is_none());

        let removed = routes.purge(Instant::from_millis(10));
        assert_eq!(removed.len(), 1);
        assert!(routes.is_empty());
    }

    #[test]
    fn replace_and_remove_by_next_hop() {
        let mut routes = Routes::new();
        routes.add(route(Ipv6Cidr::host(ADDR_1A), HOP_1, None)).unwrap();
        let old = routes
            .add(route(Ipv6Cidr::host(ADDR_1A), HOP_2, None))
            .unwrap();
        assert_eq!(old.unwrap().via_router, HOP_1);
        assert_eq!(routes.len(), 1);

        routes.add(route(Ipv6Cidr::host(ADDR_2A), HOP_2, None)).unwrap();
        routes.add_default_route(HOP_2, None, DAG).unwrap();
        assert!(routes.has_next_hop(&HOP_2));

        let removed = routes.remove_by_next_hop(&HOP_2);
        assert_eq!(removed.len(), 2);
        assert!(!routes.has_next_hop(&HOP_2));
        // The default route is managed separately.
        assert!(routes.default_route(0).is_some());
    }

    #[test]
    fn one_default_route_per_instance() {
        let mut routes = Routes::new();
        assert!(routes.add_default_route(HOP_1, None, DAG).unwrap().is_none());
        let old = routes.add_default_route(HOP_2, None, DAG).unwrap();
        assert_eq!(old.unwrap().via_router, HOP_1);
        assert_eq!(routes.default_route(0).unwrap().via_router, HOP_2);
        assert!(routes.remove_default_route(0).is_some());
        assert!(routes.default_route(0).is_none());
    }

    #[test]
    fn table_full() {
        let mut routes = Routes::new();
        for i in 0..ROUTE_TABLE_SIZE {
            let addr = Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, i as u16 + 1);
            routes.add(route(Ipv6Cidr::host(addr), HOP_1, None)).unwrap();
        }
        assert_eq!(
            routes.add(route(Ipv6Cidr::host(ADDR_2A), HOP_1, None)),
            Err(RouteTableFull)
        );
    }
}
