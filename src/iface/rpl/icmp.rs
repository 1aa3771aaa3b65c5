//! Inbound and outbound RPL control messages.

use crate::wire::rpl::{DAO_ACK_STATUS_ACCEPT, DAO_ACK_STATUS_REJECT};
use crate::wire::{
    ipv6, Ipv6Address, Ipv6AddressExt, Ipv6Cidr, RplDao, RplDaoAck, RplDio, RplDis,
    RplDodagConfiguration, RplInstanceId, RplMetricContainer, RplModeOfOperation,
    RplOptionRepr, RplPacket, RplPrefixInformation, RplRepr, RplSequenceCounter,
    RplTargetRepr, RplTransitInformation,
};

use super::consts;
use super::dag::PendingDaoAck;
use super::{DagRef, Error, Rpl};

/// The content of a DIO the DODAG logic works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DioInfo {
    pub(crate) instance_id: RplInstanceId,
    pub(crate) version: RplSequenceCounter,
    pub(crate) rank: u16,
    pub(crate) grounded: bool,
    pub(crate) mode_of_operation: RplModeOfOperation,
    pub(crate) preference: u8,
    pub(crate) dtsn: RplSequenceCounter,
    pub(crate) dag_id: Ipv6Address,
    /// The DODAG Configuration, or our own defaults when the DIO has none.
    pub(crate) conf: RplDodagConfiguration,
    pub(crate) prefix: Option<RplPrefixInformation>,
    pub(crate) mc: Option<RplMetricContainer>,
}

impl DioInfo {
    fn new(dio: &RplDio, default_conf: RplDodagConfiguration) -> Self {
        let mut info = Self {
            instance_id: dio.rpl_instance_id,
            version: dio.version_number,
            rank: dio.rank,
            grounded: dio.grounded,
            mode_of_operation: dio.mode_of_operation,
            preference: dio.dodag_preference,
            dtsn: dio.dtsn,
            dag_id: dio.dodag_id,
            conf: default_conf,
            prefix: None,
            mc: None,
        };

        for opt in &dio.options {
            match opt {
                RplOptionRepr::DodagConfiguration(conf) => info.conf = *conf,
                RplOptionRepr::PrefixInformation(prefix) => info.prefix = Some(*prefix),
                RplOptionRepr::DagMetricContainer(mc) => info.mc = Some(*mc),
                opt => net_trace!("rpl: ignoring DIO option {}", opt),
            }
        }

        info
    }
}

/// The Target and Transit Information of a DAO.
#[derive(Debug, Clone, Copy)]
struct DaoTarget {
    target: RplTargetRepr,
    transit: RplTransitInformation,
}

impl DaoTarget {
    fn find(dao: &RplDao) -> Option<Self> {
        let mut target = None;
        let mut transit = None;
        for opt in &dao.options {
            match opt {
                RplOptionRepr::RplTarget(t) if target.is_none() => target = Some(*t),
                RplOptionRepr::TransitInformation(t) if transit.is_none() => transit = Some(*t),
                opt => net_trace!("rpl: ignoring DAO option {}", opt),
            }
        }

        Some(Self {
            target: target?,
            transit: transit?,
        })
    }

    fn cidr(&self) -> Ipv6Cidr {
        Ipv6Cidr::new(self.target.prefix, self.target.prefix_length)
    }
}

impl Rpl {
    /// Process an RPL control message received from `src` and addressed to
    /// `dst`. `payload` is the ICMPv6 message, header included.
    pub(crate) fn process_packet(
        &mut self,
        src: Ipv6Address,
        dst: Ipv6Address,
        payload: &[u8],
    ) -> Result<(), Error> {
        let repr = match RplPacket::new_checked(payload) {
            Ok(packet) if packet.verify_checksum(&src, &dst) => RplRepr::parse(&packet),
            Ok(_) => {
                net_debug!("rpl: invalid checksum in a message from {}", src);
                Err(crate::wire::Error)
            }
            Err(e) => Err(e),
        };
        let repr = match repr {
            Ok(repr) => repr,
            Err(_) => {
                rpl_stat!(self.stats, malformed_msgs);
                net_debug!("rpl: dropping a malformed message from {}", src);
                return Err(Error::Malformed);
            }
        };

        net_trace!("rpl: received {} from {}", repr, src);
        match repr {
            RplRepr::DodagInformationSolicitation(dis) => self.dis_input(src, dst, &dis),
            RplRepr::DodagInformationObject(dio) => self.dio_input(src, &dio),
            RplRepr::DestinationAdvertisementObject(dao) => self.dao_input(src, dst, &dao),
            RplRepr::DestinationAdvertisementObjectAck(ack) => self.dao_ack_input(src, &ack),
        }
        Ok(())
    }

    /// A multicast DIS resets the Trickle timers, a unicast one is answered
    /// with a unicast DIO.
    fn dis_input(&mut self, src: Ipv6Address, dst: Ipv6Address, dis: &RplDis) {
        for i in 0..self.instances.len() {
            let inst = &self.instances[i];
            let Some(dag) = inst.current_dag() else {
                continue;
            };

            let solicited = dis.options.iter().all(|opt| match opt {
                RplOptionRepr::SolicitedInformation(info) => {
                    !((info.instance_id_predicate && info.rpl_instance_id != inst.id)
                        || (info.dodag_id_predicate && info.dodag_id != dag.dag_id)
                        || (info.version_predicate && info.version_number != dag.version))
                }
                _ => true,
            });
            if !solicited {
                net_trace!("rpl: DIS predicates do not match instance {}", inst.id);
                continue;
            }

            if dst.is_multicast() {
                if !dag.rank.is_infinite() {
                    net_trace!("rpl: multicast DIS, resetting the DIO timer");
                    self.reset_dio_timer(i);
                }
            } else {
                net_trace!("rpl: unicast DIS, answering {}", src);
                self.dio_output(i, Some(src));
            }
        }
    }

    fn dio_input(&mut self, src: Ipv6Address, dio: &RplDio) {
        if !src.is_link_local() {
            net_debug!("rpl: ignoring a DIO from the non link-local {}", src);
            return;
        }
        let info = DioInfo::new(dio, self.config.dodag_configuration());
        self.process_dio(src, &info);
    }

    /// Send a DIO for the current DODAG of an instance, multicast unless
    /// `dst` is given.
    pub(crate) fn dio_output(&mut self, i: usize, dst: Option<Ipv6Address>) {
        let inst = &self.instances[i];
        let Some(dag) = inst.current_dag() else {
            return;
        };

        let mut options = crate::wire::rpl::Options::new();
        let conf = RplOptionRepr::DodagConfiguration(inst.dodag_configuration());
        let mc = inst.mc.map(RplOptionRepr::DagMetricContainer);
        let prefix = dag.prefix.map(RplOptionRepr::PrefixInformation);
        for opt in mc.into_iter().chain(Some(conf)).chain(prefix) {
            if options.push(opt).is_err() {
                net_debug!("rpl: too many DIO options, dropping {}", opt);
            }
        }

        let repr = RplRepr::DodagInformationObject(RplDio {
            rpl_instance_id: inst.id,
            version_number: dag.version,
            rank: dag.rank.value(),
            grounded: dag.grounded,
            mode_of_operation: inst.mode_of_operation,
            dodag_preference: dag.preference,
            dtsn: inst.dtsn_out,
            dodag_id: dag.dag_id,
            options,
        });

        let dst = dst.unwrap_or(ipv6::LINK_LOCAL_ALL_RPL_NODES);
        net_trace!("rpl: sending a DIO with rank {} to {}", dag.rank.value(), dst);
        self.dispatch(self.link_local, dst, &repr);
    }

    /// Solicit DIOs, from every neighbor unless `dst` is given.
    pub(crate) fn dis_output(&mut self, dst: Option<Ipv6Address>) {
        let dst = dst.unwrap_or(ipv6::LINK_LOCAL_ALL_RPL_NODES);
        let repr = RplRepr::DodagInformationSolicitation(RplDis::default());
        net_trace!("rpl: sending a DIS to {}", dst);
        self.dispatch(self.link_local, dst, &repr);
    }

    /// Advertise our global address to `parent` with the given lifetime.
    /// A zero lifetime makes it a No-Path DAO.
    pub(crate) fn dao_output(&mut self, i: usize, parent: Ipv6Address, lifetime: u8) {
        let Some(target) = self.global_address() else {
            net_debug!("rpl: no global address, not sending a DAO");
            return;
        };
        self.dao_output_target(i, parent, target, lifetime);
    }

    /// Advertise `target` to `parent`. Forwarders use it to send a No-Path
    /// DAO for a destination they cannot reach anymore.
    pub(crate) fn dao_output_target(
        &mut self,
        i: usize,
        parent: Ipv6Address,
        target: Ipv6Address,
        lifetime: u8,
    ) {
        let inst = &mut self.instances[i];
        if !inst.has_downward_routes() {
            return;
        }
        inst.dao.sequence.increment();
        let sequence = inst.dao.sequence;
        self.send_dao(i, parent, target, lifetime, sequence);
    }

    /// Send a DAO with a given sequence number; retransmissions reuse the
    /// sequence of the original DAO.
    pub(crate) fn send_dao(
        &mut self,
        i: usize,
        parent: Ipv6Address,
        target: Ipv6Address,
        lifetime: u8,
        sequence: RplSequenceCounter,
    ) {
        let inst = &self.instances[i];
        let Some(dag) = inst.current_dag() else {
            net_debug!("rpl: no DODAG, not sending a DAO");
            return;
        };

        // In non-storing mode the DAO goes straight to the root and names
        // our parent by its global address.
        let (dst, parent_address) = if inst.is_storing() {
            (parent, None)
        } else {
            let parent_global = match dag.prefix {
                Some(prefix) => prefix.destination_prefix.with_iid_of(64, &parent),
                None => parent,
            };
            (dag.dag_id, Some(parent_global))
        };

        let expect_ack =
            self.config.dao_ack && lifetime != 0 && Some(target) == self.global_address();
        let mut options = crate::wire::rpl::Options::new();
        let target_opt = RplOptionRepr::RplTarget(RplTargetRepr {
            prefix_length: 128,
            prefix: target,
        });
        let transit_opt = RplOptionRepr::TransitInformation(RplTransitInformation {
            external: false,
            path_control: 0,
            path_sequence: sequence.value(),
            path_lifetime: lifetime,
            parent_address,
        });
        if options.push(target_opt).is_err() || options.push(transit_opt).is_err() {
            return;
        }

        let repr = RplRepr::DestinationAdvertisementObject(RplDao {
            rpl_instance_id: inst.id,
            expect_ack,
            sequence,
            dodag_id: Some(dag.dag_id),
            options,
        });

        if lifetime == 0 {
            net_debug!("rpl: sending a No-Path DAO to {}", dst);
        } else {
            net_debug!("rpl: sending a DAO for {} to {}", target, dst);
        }

        if expect_ack {
            let retransmissions = match self.instances[i].dao.pending_ack {
                Some(pending) if pending.sequence == sequence => pending.retransmissions,
                _ => 0,
            };
            self.instances[i].dao.pending_ack = Some(PendingDaoAck {
                sequence,
                retransmissions,
                deadline: self.now + consts::DAO_ACK_TIMEOUT,
                parent,
            });
        }

        let src = self.source_for(&dst);
        self.dispatch(src, dst, &repr);
    }

    fn dao_input(&mut self, src: Ipv6Address, dst: Ipv6Address, dao: &RplDao) {
        let Some(i) = self.instance_index(dao.rpl_instance_id) else {
            net_debug!("rpl: ignoring a DAO for the unknown instance {}", dao.rpl_instance_id);
            return;
        };
        let inst = &self.instances[i];
        let Some(d) = inst.current_dag else {
            return;
        };
        let dag = &inst.dags[d];
        if dao.dodag_id.is_some_and(|id| id != dag.dag_id) {
            net_debug!("rpl: ignoring a DAO for another DODAG");
            return;
        }
        if !inst.has_downward_routes() {
            net_debug!("rpl: ignoring a DAO, downward routes are disabled");
            return;
        }

        let Some(info) = DaoTarget::find(dao) else {
            rpl_stat!(self.stats, malformed_msgs);
            net_debug!("rpl: DAO without Target or Transit Information");
            return;
        };

        let r = DagRef { instance: i, dag: d };
        if inst.is_storing() {
            self.storing_dao_input(r, src, dst, dao, &info);
        } else {
            self.non_storing_dao_input(r, src, dao, &info);
        }
    }

    fn storing_dao_input(
        &mut self,
        r: DagRef,
        src: Ipv6Address,
        dst: Ipv6Address,
        dao: &RplDao,
        info: &DaoTarget,
    ) {
        let inst = &self.instances[r.instance];
        let dag = &inst.dags[r.dag];
        let our_rank = dag.rank;

        // A DAO from a node closer to the root, or from our own preferred
        // parent, travels down: there is a loop.
        if let Some(h) = self.parents.find(r, &src) {
            let closer = self
                .parents
                .get(h)
                .is_some_and(|p| p.rank.dag_rank() < our_rank.dag_rank());
            if closer || dag.preferred_parent == Some(h) {
                net_debug!("rpl: loop detected, DAO from parent {}", src);
                let infinite = inst.infinite_rank();
                if let Some(p) = self.parents.get_mut(h) {
                    p.rank = infinite;
                    p.updated = true;
                }
                self.instances[r.instance].unicast_dio =
                    Some((src, self.now + consts::UNICAST_DIO_DELAY));
                return;
            }
        }

        let cidr = info.cidr();
        let lifetime = info.transit.path_lifetime;
        let mut accepted = true;

        if lifetime == 0 {
            match self.routes.get_mut(&cidr) {
                Some(route) if route.via_router == src && !route.no_path_received => {
                    net_debug!("rpl: No-Path DAO for {}, route expires soon", cidr);
                    route.no_path_received = true;
                    route.expires_at = Some(self.now + consts::DAO_EXPIRATION_TIMEOUT);
                }
                _ => {
                    net_trace!("rpl: No-Path DAO for {} ignored", cidr);
                    return;
                }
            }
        } else {
            let expires_at = inst.expiration(self.now, lifetime);
            self.add_neighbor(&src);
            accepted = self.add_route(r, cidr, src, expires_at);
            if accepted {
                net_debug!("rpl: route to {} via {}", cidr, src);
            }
        }

        if dao.expect_ack && !dst.is_multicast() {
            let status = if accepted {
                DAO_ACK_STATUS_ACCEPT
            } else {
                DAO_ACK_STATUS_REJECT
            };
            self.dao_ack_output(r.instance, src, dao.sequence, status);
        }

        if !accepted || dst.is_multicast() {
            return;
        }

        // Forward upwards. Acknowledgements are hop by hop, we already
        // answered the child.
        let parent = self.instances[r.instance].dags[r.dag]
            .preferred_parent
            .and_then(|h| self.parents.get(h))
            .map(|p| p.address);
        if let Some(parent) = parent {
            let mut forwarded = dao.clone();
            forwarded.expect_ack = false;
            net_trace!("rpl: forwarding the DAO for {} to {}", cidr, parent);
            let repr = RplRepr::DestinationAdvertisementObject(forwarded);
            self.dispatch(self.link_local, parent, &repr);
        }
    }

    fn non_storing_dao_input(
        &mut self,
        r: DagRef,
        src: Ipv6Address,
        dao: &RplDao,
        info: &DaoTarget,
    ) {
        let inst = &self.instances[r.instance];
        if !inst.is_root() {
            net_debug!("rpl: non-storing DAO received by a node that is not the root");
            return;
        }
        let Some(parent) = info.transit.parent_address else {
            rpl_stat!(self.stats, malformed_msgs);
            net_debug!("rpl: non-storing DAO without a parent address");
            return;
        };

        let child = info.target.prefix;
        let lifetime = info.transit.path_lifetime;
        let mut accepted = true;
        if lifetime == 0 {
            net_debug!("rpl: No-Path DAO, {} is no longer a child of {}", child, parent);
            self.ns_nodes.expire_parent(&child, &parent, self.now);
        } else {
            let expires_at = inst.expiration(self.now, lifetime);
            match self.ns_nodes.update(child, parent, r, expires_at) {
                Ok(()) => net_debug!("rpl: {} is a child of {}", child, parent),
                Err(_) => {
                    rpl_stat!(self.stats, mem_overflows);
                    net_debug!("rpl: node table full, dropping {}", child);
                    accepted = false;
                }
            }
        }

        if dao.expect_ack {
            let status = if accepted {
                DAO_ACK_STATUS_ACCEPT
            } else {
                DAO_ACK_STATUS_REJECT
            };
            self.dao_ack_output(r.instance, src, dao.sequence, status);
        }
    }

    pub(crate) fn dao_ack_output(
        &mut self,
        i: usize,
        dst: Ipv6Address,
        sequence: RplSequenceCounter,
        status: u8,
    ) {
        let inst = &self.instances[i];
        let repr = RplRepr::DestinationAdvertisementObjectAck(RplDaoAck {
            rpl_instance_id: inst.id,
            sequence,
            status,
            dodag_id: inst.current_dag().map(|d| d.dag_id),
        });
        net_trace!("rpl: sending a DAO-ACK to {} with status {}", dst, status);
        let src = self.source_for(&dst);
        self.dispatch(src, dst, &repr);
    }

    fn dao_ack_input(&mut self, src: Ipv6Address, ack: &RplDaoAck) {
        let Some(i) = self.instance_index(ack.rpl_instance_id) else {
            return;
        };
        let inst = &mut self.instances[i];
        let Some(pending) = inst.dao.pending_ack else {
            net_trace!("rpl: unexpected DAO-ACK from {}", src);
            return;
        };
        if pending.sequence != ack.sequence {
            net_trace!(
                "rpl: DAO-ACK for sequence {}, expected {}",
                ack.sequence,
                pending.sequence
            );
            return;
        }

        inst.dao.pending_ack = None;
        if ack.status < DAO_ACK_STATUS_REJECT {
            net_debug!("rpl: DAO {} acknowledged by {}", ack.sequence, src);
            inst.has_downward_route = true;
            return;
        }

        // The parent cannot store our route: stop using it.
        net_debug!("rpl: DAO {} rejected by {}", ack.sequence, src);
        inst.has_downward_route = false;
        let infinite = inst.infinite_rank();
        if let Some(h) = self.parents.find_in_instance(i, &pending.parent) {
            if let Some(p) = self.parents.get_mut(h) {
                p.rank = infinite;
                p.updated = true;
            }
        }
    }
}
