//! The RPL option carried in the IPv6 Hop-by-Hop header of data packets
//! (RFC 6553), used to detect loops and broken downward paths
//! (RFC 6550 § 11.2).

use crate::iface::route::Route;
use crate::wire::{Ipv6Address, Ipv6AddressExt, RplHopByHopRepr};

use super::{Error, Rpl};

impl Rpl {
    /// The downward route towards `dst`, if any. The default route leads
    /// upwards and does not count.
    fn downward_route(&self, dst: &Ipv6Address) -> Option<&Route> {
        self.routes
            .lookup(dst, self.now)
            .filter(|route| !route.is_default())
    }

    /// Check the RPL option of a packet for `dst` received from `sender`.
    ///
    /// A packet travelling in the wrong direction is tolerated once: the
    /// returned option has its Rank-Error flag set. A second inconsistency,
    /// or a Forwarding-Error, drops the packet and resets the DIO timer.
    pub fn verify_header(
        &mut self,
        sender: Ipv6Address,
        dst: Ipv6Address,
        mut hbh: RplHopByHopRepr,
    ) -> Result<RplHopByHopRepr, Error> {
        let Some(i) = self.instance_index(hbh.instance_id) else {
            net_debug!("rpl: unknown instance {} in a Hop-by-Hop option", hbh.instance_id);
            return Err(Error::UnknownInstance);
        };

        if hbh.forwarding_error {
            net_debug!("rpl: forwarding error for {}", dst);
            // The route through the sender is broken.
            if self.instances[i].is_storing() {
                if let Some(cidr) = self.downward_route(&dst).map(|r| r.cidr) {
                    self.remove_route(&cidr);
                }
            }
            rpl_stat!(self.stats, forward_errors);
            self.reset_dio_timer(i);
            return Err(Error::ForwardingError);
        }

        let inst = &self.instances[i];
        let Some(dag) = inst.current_dag().filter(|dag| dag.joined) else {
            return Err(Error::NotJoined);
        };
        let our_rank = dag.rank.value();
        let sender_rank = inst.rank(hbh.sender_rank);
        let storing = inst.is_storing();

        let sender_parent = self.parents.find_in_instance(i, &sender);
        if let (Some(h), true) = (sender_parent, hbh.rank_error) {
            if let Some(p) = self.parents.get_mut(h) {
                p.rank = sender_rank;
            }
            // In storing mode a parent switch would send a No-Path DAO
            // before this packet is forwarded.
            if !storing {
                self.select_dag(i, h);
            }
        }

        let sender_closer = hbh.sender_rank < our_rank;
        if hbh.down != sender_closer {
            net_debug!(
                "rpl: loop detected, going {} with sender rank {} and ours {}",
                if hbh.down { "down" } else { "up" },
                hbh.sender_rank,
                our_rank
            );
            if sender_parent.is_some() {
                self.instances[i].unicast_dio = Some((sender, self.now));
            }
            if hbh.rank_error {
                rpl_stat!(self.stats, loop_errors);
                self.reset_dio_timer(i);
                return Err(Error::RankError);
            }
            rpl_stat!(self.stats, loop_warnings);
            hbh.rank_error = true;
        }

        Ok(hbh)
    }

    /// The RPL option of a packet we originate for `dst`.
    ///
    /// Link-local and multicast traffic carries none, and neither does
    /// traffic leaving the root of a non-storing DODAG, which is source
    /// routed instead.
    pub fn build_header(&self, dst: &Ipv6Address) -> Option<RplHopByHopRepr> {
        if dst.is_link_local() || dst.is_multicast() {
            return None;
        }
        let inst = self.default_instance()?;
        let dag = inst.current_dag()?;
        if inst.is_root() && !inst.is_storing() {
            return None;
        }

        Some(RplHopByHopRepr {
            down: inst.is_storing() && self.downward_route(dst).is_some(),
            rank_error: false,
            forwarding_error: false,
            instance_id: inst.id,
            sender_rank: dag.rank.value(),
        })
    }

    /// Refresh the RPL option of a packet we forward to `dst` on behalf of
    /// `sender`.
    ///
    /// In storing mode, a packet going down for which we have no route is
    /// dropped with [`Error::ForwardingError`]; the sender, if it is one of
    /// our parents, is told with a No-Path DAO.
    pub fn update_header(
        &mut self,
        sender: Ipv6Address,
        dst: Ipv6Address,
        mut hbh: RplHopByHopRepr,
    ) -> Result<RplHopByHopRepr, Error> {
        let Some(i) = self.instance_index(hbh.instance_id) else {
            return Err(Error::UnknownInstance);
        };
        let inst = &self.instances[i];
        let Some(dag) = inst.current_dag().filter(|dag| dag.joined) else {
            return Err(Error::NotJoined);
        };

        hbh.sender_rank = dag.rank.value();
        if !inst.is_storing() {
            return Ok(hbh);
        }

        let has_route = self.downward_route(&dst).is_some();
        if hbh.down && !has_route {
            net_debug!("rpl: no downward route to {}, forwarding error", dst);
            let parent = self
                .parents
                .find_in_instance(i, &sender)
                .and_then(|h| self.parents.get(h))
                .map(|p| p.address);
            if let Some(parent) = parent {
                self.dao_output_target(i, parent, dst, 0);
            }
            return Err(Error::ForwardingError);
        }
        hbh.down = has_route;

        Ok(hbh)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::super::{consts, DagRef};
    use super::*;
    use crate::wire::{Ipv6Cidr, RplInstanceId, RplModeOfOperation, RplRepr};
    use rstest::rstest;

    /// A node of rank 512 under ll(1), with a route to global(5) via ll(5).
    fn joined() -> Rpl {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        let r = DagRef {
            instance: 0,
            dag: rpl.instances[0].current_dag.unwrap(),
        };
        assert!(rpl.add_route(r, Ipv6Cidr::host(global(5)), ll(5), None));
        rpl.drain_outbox().for_each(drop);
        rpl
    }

    fn hbh(down: bool, rank_error: bool, sender_rank: u16) -> RplHopByHopRepr {
        RplHopByHopRepr {
            down,
            rank_error,
            forwarding_error: false,
            instance_id: RplInstanceId::from(consts::RPL_DEFAULT_INSTANCE),
            sender_rank,
        }
    }

    #[rstest]
    #[case::up_from_child(ll(5), global(1), false, 768)]
    #[case::down_from_parent(ll(1), global(5), true, 256)]
    fn consistent_direction(
        #[case] sender: Ipv6Address,
        #[case] dst: Ipv6Address,
        #[case] down: bool,
        #[case] rank: u16,
    ) {
        let mut rpl = joined();
        let out = rpl.verify_header(sender, dst, hbh(down, false, rank)).unwrap();
        assert!(!out.rank_error);
        assert_eq!(rpl.stats().loop_warnings, 0);
    }

    #[test]
    fn single_inconsistency_is_tolerated() {
        let mut rpl = joined();

        // Going up, but from a node closer to the root.
        let out = rpl
            .verify_header(ll(1), global(9), hbh(false, false, 256))
            .unwrap();
        assert!(out.rank_error);
        assert_eq!(rpl.stats().loop_warnings, 1);
        assert_eq!(rpl.instances[0].unicast_dio.map(|(a, _)| a), Some(ll(1)));

        let resets = rpl.stats().resets;
        assert_eq!(
            rpl.verify_header(ll(1), global(9), out),
            Err(Error::RankError)
        );
        assert_eq!(rpl.stats().loop_errors, 1);
        assert_eq!(rpl.stats().resets, resets + 1);
    }

    #[test]
    fn rank_error_refreshes_parent_rank() {
        let mut rpl = joined();
        rpl.verify_header(ll(1), global(5), hbh(true, true, 384))
            .unwrap();
        let (_, p) = rpl
            .parents()
            .iter()
            .find(|(_, p)| p.address == ll(1))
            .unwrap();
        assert_eq!(p.rank.value(), 384);
    }

    #[test]
    fn forwarding_error_drops_the_route() {
        let mut rpl = joined();
        let mut header = hbh(true, false, 256);
        header.forwarding_error = true;

        assert_eq!(
            rpl.verify_header(ll(5), global(5), header),
            Err(Error::ForwardingError)
        );
        assert!(rpl.routes().get(&Ipv6Cidr::host(global(5))).is_none());
        assert_eq!(rpl.stats().forward_errors, 1);
    }

    #[test]
    fn unknown_instance() {
        let mut rpl = joined();
        let mut header = hbh(false, false, 768);
        header.instance_id = RplInstanceId::from(0x05);
        assert_eq!(
            rpl.verify_header(ll(5), global(1), header),
            Err(Error::UnknownInstance)
        );
    }

    #[test]
    fn originated_header() {
        let rpl = joined();
        assert!(rpl.build_header(&ll(5)).is_none());

        let down = rpl.build_header(&global(5)).unwrap();
        assert!(down.down);
        assert_eq!(down.sender_rank, 512);

        let up = rpl.build_header(&global(9)).unwrap();
        assert!(!up.down);

        let root = root(RplModeOfOperation::NonStoringMode);
        assert!(root.build_header(&global(5)).is_none());
    }

    #[test]
    fn broken_downward_path() {
        let mut rpl = joined();

        // A route is known: the packet now goes down.
        let out = rpl
            .update_header(ll(1), global(5), hbh(false, false, 256))
            .unwrap();
        assert!(out.down);
        assert_eq!(out.sender_rank, 512);

        assert_eq!(
            rpl.update_header(ll(1), global(9), hbh(true, false, 256)),
            Err(Error::ForwardingError)
        );
        let no_path = rpl.drain_outbox().next().unwrap();
        assert_eq!(no_path.dst, ll(1));
        let RplRepr::DestinationAdvertisementObject(dao) = no_path.repr().unwrap() else {
            panic!("expected a DAO");
        };
        assert!(dao.options.iter().any(|o| matches!(
            o,
            crate::wire::RplOptionRepr::RplTarget(t) if t.prefix == global(9)
        )));
    }
}
