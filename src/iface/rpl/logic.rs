//! DODAG maintenance: joining, parent and DODAG selection, repairs.

use crate::config::RPL_MAX_DAG_PER_INSTANCE;
use crate::iface::neighbor::NeighborState;
use crate::iface::route::{RemovedRoutes, Route};
use crate::time::{Duration, Instant};
use crate::wire::{
    Ipv6Address, Ipv6AddressExt, Ipv6Cidr, RplInstanceId, RplPrefixInformation,
    RplSequenceCounter,
};

use super::consts;
use super::icmp::DioInfo;
use super::of::{Choice, ObjectiveFunction, Of};
use super::{Dag, DagRef, Error, Instance, Notification, Parent, ParentHandle, Rank, RootConfig, Rpl};

impl Rpl {
    /// Make this node the root of a DODAG.
    ///
    /// Every DODAG of the instance is dropped, together with the routes
    /// learnt in it. Re-rooting a DODAG we already knew bumps its version.
    pub fn set_root(&mut self, root: RootConfig) -> Result<(), Error> {
        let prefix = match root.prefix {
            Some(prefix) if prefix.prefix_len() != 64 => {
                net_debug!("rpl: only /64 prefixes are supported, ignoring {}", prefix);
                None
            }
            prefix => prefix,
        };
        let global = prefix.map(|p| p.address().with_iid_of(64, &self.link_local));
        let dag_id = root.dodag_id.or(global).unwrap_or(self.link_local);

        let mut version = RplSequenceCounter::default();
        let i = match self.instance_index(root.instance_id) {
            Some(i) => {
                for d in 0..RPL_MAX_DAG_PER_INSTANCE {
                    let dag = &self.instances[i].dags[d];
                    if !dag.used {
                        continue;
                    }
                    if dag.dag_id == dag_id {
                        version = dag.version;
                        version.increment();
                    }
                    net_debug!("rpl: dropping DODAG {} to become root", dag.dag_id);
                    self.free_dag(i, d);
                }
                self.set_default_route(i, None);
                i
            }
            None => self.alloc_instance(root.instance_id)?,
        };

        let of = Of::new(self.config.objective_function, &self.config.fuzzy);
        let conf = self.config.dodag_configuration();
        let inst = &mut self.instances[i];
        inst.of = of;
        inst.mode_of_operation = self.config.mode_of_operation;
        inst.apply_configuration(&conf);
        inst.dao = Default::default();

        let Some(d) = inst.alloc_dag(dag_id) else {
            rpl_stat!(self.stats, mem_overflows);
            return Err(Error::OutOfMemory);
        };
        let root_rank = inst.root_rank();
        inst.current_dag = Some(d);
        inst.dtsn_out.increment();
        inst.mc = inst.of.metric_container(true, None);

        let dag = &mut inst.dags[d];
        dag.version = version;
        dag.joined = true;
        dag.grounded = self.config.grounded;
        dag.preference = self.config.preference;
        dag.rank = root_rank;
        dag.min_rank = root_rank;

        if let Some(prefix) = prefix {
            let info = RplPrefixInformation {
                prefix_length: 64,
                on_link: false,
                autonomous_address_configuration: true,
                router_address: false,
                valid_lifetime: u32::MAX,
                preferred_lifetime: u32::MAX,
                destination_prefix: prefix.address(),
            };
            self.set_prefix(DagRef { instance: i, dag: d }, &info);
        }

        net_debug!(
            "rpl: created DODAG {} of instance {}, version {}",
            dag_id,
            root.instance_id,
            version
        );
        self.next_dis = None;
        self.update_time_source();
        self.reset_dio_timer(i);
        Ok(())
    }

    /// Trigger a global repair from the root: a new DODAG version makes
    /// every node rebuild its parent set.
    pub fn repair_root(&mut self, id: RplInstanceId) -> Result<(), Error> {
        let i = self.instance_index(id).ok_or(Error::UnknownInstance)?;
        let inst = &mut self.instances[i];
        if !inst.is_root() {
            return Err(Error::NotRoot);
        }

        inst.dtsn_out.increment();
        if let Some(dag) = inst.current_dag_mut() {
            dag.version.increment();
            net_debug!("rpl: root repair of {}, version {}", dag.dag_id, dag.version);
        }
        rpl_stat!(self.stats, root_repairs);
        self.reset_dio_timer(i);
        Ok(())
    }

    /// Give up every parent of the instance and ask the neighbors for news.
    pub fn local_repair(&mut self, id: RplInstanceId) -> Result<(), Error> {
        let i = self.instance_index(id).ok_or(Error::UnknownInstance)?;
        if !self.instances[i].is_joined() {
            return Err(Error::NotJoined);
        }
        self.start_local_repair(i);
        Ok(())
    }

    /// Leave an instance: forget its DODAGs, parents and routes.
    pub fn leave(&mut self, id: RplInstanceId) -> Result<(), Error> {
        let i = self.instance_index(id).ok_or(Error::UnknownInstance)?;
        net_debug!("rpl: leaving instance {}", id);

        for d in 0..RPL_MAX_DAG_PER_INSTANCE {
            if self.instances[i].dags[d].used {
                self.free_dag(i, d);
            }
        }
        self.set_default_route(i, None);
        self.instances[i] = Instance::default();
        self.update_time_source();
        Ok(())
    }

    fn alloc_instance(&mut self, id: RplInstanceId) -> Result<usize, Error> {
        match self.instances.iter().position(|inst| !inst.used) {
            Some(i) => {
                self.instances[i] = Instance::new(id);
                Ok(i)
            }
            None => {
                rpl_stat!(self.stats, mem_overflows);
                net_debug!("rpl: no room for instance {}", id);
                Err(Error::OutOfMemory)
            }
        }
    }

    pub(crate) fn free_dag(&mut self, i: usize, d: usize) {
        let r = DagRef { instance: i, dag: d };
        let inst = &mut self.instances[i];
        let storing = inst.is_storing();
        let dag = &mut inst.dags[d];

        if dag.joined {
            net_debug!("rpl: leaving DODAG {}", dag.dag_id);
            dag.joined = false;
            let prefix = dag.prefix;
            if storing {
                self.remove_dag_routes(r);
            }
            if let Some(prefix) = prefix {
                self.check_prefix(Some(&prefix), None);
            }
        }

        for h in self.parents.handles_in(r) {
            self.remove_parent(h);
        }
        self.ns_nodes.remove_by_dag(r);

        let inst = &mut self.instances[i];
        inst.dags[d] = Dag::default();
        if inst.current_dag == Some(d) {
            inst.current_dag = None;
        }
    }

    /// Whether link-layer feedback lets us use this neighbor. Neighbors we
    /// know nothing about yet are given the benefit of the doubt.
    pub(crate) fn neighbor_reachable(&self, addr: &Ipv6Address) -> bool {
        self.neighbors
            .lookup(addr)
            .map(|n| n.is_reachable())
            .unwrap_or(true)
    }

    /// Make sure the sender of a DIO is in the neighbor table.
    pub(crate) fn add_neighbor(&mut self, addr: &Ipv6Address) -> bool {
        if self.neighbors.lookup(addr).is_some() {
            return true;
        }

        let hw = self.hardware_addr_of(addr);
        match self
            .neighbors
            .fill(*addr, hw, NeighborState::Reachable, self.now)
        {
            Ok(_) => true,
            Err(_) => {
                rpl_stat!(self.stats, mem_overflows);
                net_debug!("rpl: neighbor table full, ignoring {}", addr);
                false
            }
        }
    }

    /// Add the sender of a DIO to the parent set of `r`.
    ///
    /// When the parent set is full, the worst parent other than the
    /// preferred one makes room for a better candidate.
    pub(crate) fn add_parent(
        &mut self,
        r: DagRef,
        dio: &DioInfo,
        from: Ipv6Address,
    ) -> Option<ParentHandle> {
        let inst = &self.instances[r.instance];
        let mut parent = Parent::new(
            from,
            r,
            inst.rank(dio.rank),
            dio.dtsn,
            inst.of.initial_link_metric(),
            self.now,
        );
        parent.mc = dio.mc;

        if let Some(h) = self.parents.alloc(parent) {
            net_trace!("rpl: added parent {} with rank {}", from, dio.rank);
            return Some(h);
        }

        let preferred = inst.dags[r.dag].preferred_parent;
        let worst = self
            .parents
            .worst(r, preferred)
            .filter(|&h| matches!(self.parents.get(h), Some(p) if p.rank.value() > dio.rank));
        if let Some(worst) = worst {
            net_trace!("rpl: parent set full, evicting the worst parent");
            self.remove_parent(worst);
            if let Some(h) = self.parents.alloc(parent) {
                return Some(h);
            }
        }

        rpl_stat!(self.stats, mem_overflows);
        net_debug!("rpl: no room for parent {}", from);
        None
    }

    pub(crate) fn remove_parent(&mut self, h: ParentHandle) {
        self.nullify_parent(h);
        if let Some(p) = self.parents.remove(h) {
            net_trace!("rpl: removed parent {}", p.address);
        }
    }

    /// Stop routing through a parent without forgetting it.
    ///
    /// Losing the preferred parent (or having none) makes our rank infinite
    /// and withdraws the default route. The parent is told with a No-Path
    /// DAO in storing mode.
    pub(crate) fn nullify_parent(&mut self, h: ParentHandle) {
        let Some(p) = self.parents.get(h).copied() else {
            return;
        };
        let r = p.dag;
        let inst = &mut self.instances[r.instance];
        let infinite = inst.infinite_rank();
        let storing = inst.is_storing();
        let dag = &mut inst.dags[r.dag];

        let is_preferred = dag.preferred_parent == Some(h);
        if !is_preferred && dag.preferred_parent.is_some() {
            return;
        }

        net_trace!("rpl: nullifying parent {}", p.address);
        dag.rank = infinite;
        let joined = dag.joined;
        if joined {
            self.set_default_route(r.instance, None);
        }
        if is_preferred {
            if joined && storing {
                self.dao_output(r.instance, p.address, 0);
            }
            self.set_preferred_parent(r, None);
        }
    }

    /// Move a parent heard in another DODAG of the same instance to `to`.
    pub(crate) fn move_parent(&mut self, h: ParentHandle, to: DagRef) {
        let Some(p) = self.parents.get(h).copied() else {
            return;
        };
        let from = p.dag;
        let inst = &mut self.instances[from.instance];
        let infinite = inst.infinite_rank();
        let storing = inst.is_storing();
        let src = &mut inst.dags[from.dag];

        if src.preferred_parent == Some(h) {
            src.rank = infinite;
            let joined = src.joined;
            self.set_preferred_parent(from, None);
            if joined {
                self.set_default_route(from.instance, None);
            }
        } else if src.joined && storing {
            self.remove_routes_by_next_hop(&p.address);
        }

        net_trace!("rpl: moving parent {} to another DODAG", p.address);
        if let Some(p) = self.parents.get_mut(h) {
            p.dag = to;
        }
    }

    pub(crate) fn set_preferred_parent(&mut self, r: DagRef, h: Option<ParentHandle>) {
        let dag = &mut self.instances[r.instance].dags[r.dag];
        if dag.preferred_parent == h {
            return;
        }
        let old = core::mem::replace(&mut dag.preferred_parent, h);

        net_debug!(
            "rpl: preferred parent changed from {:?} to {:?}",
            old.and_then(|h| self.parents.get(h)).map(|p| p.address),
            h.and_then(|h| self.parents.get(h)).map(|p| p.address)
        );
        self.update_time_source();
    }

    /// Tell the scheduler when the preferred parent of the current DODAG of
    /// the default instance changed.
    pub(crate) fn update_time_source(&mut self) {
        let parent = self.preferred_parent().map(|p| p.address);
        let new = parent.map(|addr| self.hardware_addr_of(&addr));
        if new != self.time_source {
            let old = core::mem::replace(&mut self.time_source, new);
            self.notify(Notification::NewTimeSource { old, new });
        }
    }

    /// Our rank through a parent.
    pub(crate) fn rank_via_parent(&self, h: ParentHandle) -> Rank {
        match self.parents.get(h) {
            Some(p) => self.instances[p.dag.instance]
                .of
                .calculate_rank(Some(p), 0),
            None => Rank::INFINITE,
        }
    }

    /// Elect the best reachable parent of `r` with a finite rank.
    fn select_parent(&mut self, r: DagRef) -> Option<ParentHandle> {
        let inst = &self.instances[r.instance];
        let preferred = inst.dags[r.dag]
            .preferred_parent
            .and_then(|h| self.parents.get(h));

        let mut best: Option<(ParentHandle, &Parent)> = None;
        for (h, p) in self.parents.iter() {
            if p.dag != r || p.rank.is_infinite() || !self.neighbor_reachable(&p.address) {
                continue;
            }
            best = match best {
                None => Some((h, p)),
                Some((bh, bp)) => match inst.of.best_parent(bp, p, preferred) {
                    Choice::First => Some((bh, bp)),
                    Choice::Second => Some((h, p)),
                },
            };
        }

        let best = best.map(|(h, _)| h);
        if best.is_some() {
            self.set_preferred_parent(r, best);
        }
        best
    }

    /// Re-elect the preferred parent and the best DODAG of an instance,
    /// then update our rank. Returns `None` when no DODAG is usable.
    pub(crate) fn select_dag(&mut self, i: usize, h: ParentHandle) -> Option<usize> {
        let p_dag = self.parents.get(h)?.dag;
        let inst = &self.instances[i];
        let current = inst.current_dag?;
        let old_rank = inst.dags[current].rank;
        let last_parent = inst.dags[current].preferred_parent;
        let last_addr = last_parent
            .and_then(|h| self.parents.get(h))
            .map(|p| p.address);
        let storing = inst.is_storing();

        if !inst.is_root() {
            self.select_parent(p_dag);
        }

        let inst = &self.instances[i];
        let mut best: Option<usize> = None;
        for (d, dag) in inst.dags.iter().enumerate() {
            let usable = dag.used
                && matches!(
                    dag.preferred_parent.and_then(|h| self.parents.get(h)),
                    Some(p) if !p.rank.is_infinite()
                );
            if !usable {
                continue;
            }
            best = match best {
                None => Some(d),
                Some(b) => match inst.of.best_dag(&inst.dags[b], dag) {
                    Choice::First => Some(b),
                    Choice::Second => Some(d),
                },
            };
        }
        let best = best?;

        if best != current {
            let old_prefix = inst.dags[current].prefix;
            let new_prefix = inst.dags[best]
                .prefix
                .filter(|p| p.autonomous_address_configuration);
            net_debug!("rpl: new preferred DODAG {}", inst.dags[best].dag_id);

            if storing {
                self.remove_dag_routes(DagRef {
                    instance: i,
                    dag: current,
                });
            }
            if new_prefix.is_some() || old_prefix.is_some() {
                self.check_prefix(old_prefix.as_ref(), new_prefix.as_ref());
            }

            let inst = &mut self.instances[i];
            inst.dags[best].joined = true;
            inst.dags[current].joined = false;
            inst.current_dag = Some(best);
        }

        let r = DagRef {
            instance: i,
            dag: best,
        };
        let preferred = self.instances[i].dags[best].preferred_parent;
        let parent = preferred.and_then(|h| self.parents.get(h)).copied();

        let inst = &mut self.instances[i];
        inst.mc = inst.of.metric_container(false, parent.as_ref());
        let rank = match &parent {
            Some(p) => inst.of.calculate_rank(Some(p), 0),
            None => inst.infinite_rank(),
        };
        let dag = &mut inst.dags[best];
        dag.rank = rank;
        // Without a previous parent, min_rank restarts from the new rank.
        if last_parent.is_none() || rank.value() < dag.min_rank.value() {
            dag.min_rank = rank;
        }

        if !inst.acceptable_rank(&inst.dags[best], rank) {
            net_debug!("rpl: new rank {} is not acceptable", rank.value());
            self.set_preferred_parent(r, None);
            if let (true, Some(last)) = (storing, last_addr) {
                self.dao_output(i, last, 0);
            }
            return None;
        }

        self.update_time_source();

        if preferred != last_parent {
            self.set_default_route(i, parent.map(|p| p.address));
            net_debug!(
                "rpl: changed preferred parent, rank changed from {} to {}",
                old_rank.value(),
                rank.value()
            );
            rpl_stat!(self.stats, parent_switch);
            if storing {
                if let Some(last) = last_addr {
                    self.dao_output(i, last, 0);
                }
                self.instances[i].dtsn_out.increment();
            }
            self.schedule_dao(i, consts::DAO_LATENCY);
            self.reset_dio_timer(i);
        } else if rank.value() != old_rank.value() {
            net_trace!(
                "rpl: preferred parent update, rank changed from {} to {}",
                old_rank.value(),
                rank.value()
            );
        }

        Some(best)
    }

    /// Re-evaluate the parent set after news about one parent. Returns
    /// `false` when that parent was rejected.
    pub(crate) fn process_parent_event(&mut self, i: usize, h: ParentHandle) -> bool {
        let Some(p) = self.parents.get(h).copied() else {
            return false;
        };
        let inst = &self.instances[i];
        let last_parent = inst.current_dag().and_then(|d| d.preferred_parent);

        if inst.is_storing()
            && self.routes.has_next_hop(&p.address)
            && !self.neighbor_reachable(&p.address)
        {
            net_debug!("rpl: {} is unreachable, removing the routes through it", p.address);
            self.remove_routes_by_next_hop(&p.address);
        }

        let mut accepted = true;
        let inst = &self.instances[i];
        if !inst.acceptable_rank(&inst.dags[p.dag.dag], p.rank) {
            net_debug!("rpl: unacceptable rank {} from {}", p.rank.value(), p.address);
            let was_preferred = last_parent == Some(h);
            self.nullify_parent(h);
            if !was_preferred {
                return false;
            }
            accepted = false;
        }

        if self.select_dag(i, h).is_none() && last_parent.is_some() {
            net_debug!("rpl: no usable parent in any DODAG");
            self.start_local_repair(i);
            return false;
        }

        accepted
    }

    /// Process the parents whose link metric or rank changed since the last
    /// periodic tick.
    pub(crate) fn recalculate_ranks(&mut self) {
        for h in self.parents.handles() {
            let Some(p) = self.parents.get_mut(h) else {
                continue;
            };
            if !p.updated {
                continue;
            }
            p.updated = false;
            let i = p.dag.instance;
            if !self.process_parent_event(i, h) {
                net_trace!("rpl: a parent was dropped");
            }
        }
    }

    pub(crate) fn start_local_repair(&mut self, i: usize) {
        net_debug!("rpl: local repair of instance {}", self.instances[i].id);

        let infinite = self.instances[i].infinite_rank();
        for d in 0..RPL_MAX_DAG_PER_INSTANCE {
            let dag = &mut self.instances[i].dags[d];
            if !dag.used {
                continue;
            }
            dag.rank = infinite;
            for h in self.parents.handles_in(DagRef { instance: i, dag: d }) {
                self.nullify_parent(h);
            }
        }

        let inst = &mut self.instances[i];
        inst.has_downward_route = false;
        inst.dtsn_out.increment();
        rpl_stat!(self.stats, local_repairs);
        self.reset_dio_timer(i);
    }

    /// A newer DODAG version was heard: start over from the sender.
    fn global_repair(&mut self, r: DagRef, dio: &DioInfo, from: Ipv6Address) {
        for h in self.parents.handles_in(r) {
            self.remove_parent(h);
        }

        let inst = &mut self.instances[r.instance];
        if inst.dodag_configuration() != dio.conf {
            inst.apply_configuration(&dio.conf);
        }
        inst.of.reset();
        inst.dtsn_out.increment();
        let infinite = inst.infinite_rank();
        let dag = &mut inst.dags[r.dag];
        dag.version = dio.version;
        dag.min_rank = infinite;

        match self.add_parent(r, dio, from) {
            Some(h) => {
                let rank = self.rank_via_parent(h);
                let dag = &mut self.instances[r.instance].dags[r.dag];
                dag.rank = rank;
                dag.min_rank = rank;
                self.process_parent_event(r.instance, h);
            }
            None => {
                net_debug!("rpl: no parent left after the global repair");
                self.instances[r.instance].dags[r.dag].rank = infinite;
            }
        }

        rpl_stat!(self.stats, global_repairs);
        self.reset_dio_timer(r.instance);
    }

    /// Install, refresh or withdraw the default route of an instance.
    pub(crate) fn set_default_route(&mut self, i: usize, via: Option<Ipv6Address>) {
        match via {
            Some(gateway) => {
                let inst = &self.instances[i];
                let Some(d) = inst.current_dag else {
                    return;
                };
                let expires_at = inst.expiration(self.now, inst.default_lifetime);
                let dag = DagRef { instance: i, dag: d };
                match self.routes.add_default_route(gateway, expires_at, dag) {
                    Ok(_) => net_trace!("rpl: default route via {}", gateway),
                    Err(_) => {
                        rpl_stat!(self.stats, mem_overflows);
                        net_debug!("rpl: no room for the default route via {}", gateway);
                    }
                }
            }
            None => {
                if let Some(old) = self.routes.remove_default_route(i) {
                    net_trace!("rpl: removed the default route via {}", old.via_router);
                }
            }
        }
    }

    /// Record the prefix of a DODAG. Only /64 prefixes are used for address
    /// autoconfiguration.
    pub(crate) fn set_prefix(&mut self, r: DagRef, prefix: &RplPrefixInformation) -> bool {
        if prefix.prefix_length != 64 {
            net_debug!("rpl: ignoring a /{} prefix", prefix.prefix_length);
            return false;
        }

        let mut prefix = *prefix;
        prefix.autonomous_address_configuration = true;
        let dag = &mut self.instances[r.instance].dags[r.dag];
        let old = dag.prefix.replace(prefix);
        if dag.joined {
            self.check_prefix(old.as_ref(), Some(&prefix));
        }
        true
    }

    fn address_from_prefix(&self, prefix: &RplPrefixInformation) -> Ipv6Cidr {
        Ipv6Cidr::new(
            prefix
                .destination_prefix
                .with_iid_of(64, &self.link_local),
            64,
        )
    }

    /// Swap the autoconfigured address when the prefix of the DODAG changes.
    pub(crate) fn check_prefix(
        &mut self,
        old: Option<&RplPrefixInformation>,
        new: Option<&RplPrefixInformation>,
    ) {
        if let (Some(old), Some(new)) = (old, new) {
            let same = old.prefix_length == new.prefix_length
                && Ipv6Cidr::new(old.destination_prefix, old.prefix_length)
                    .contains_addr(&new.destination_prefix)
                && old.autonomous_address_configuration == new.autonomous_address_configuration;
            if same && self.global_addr.is_some() {
                return;
            }
        }

        if let Some(old) = old {
            let addr = self.address_from_prefix(old);
            if self.global_addr == Some(addr) {
                net_debug!("rpl: removing address {}", addr);
                self.global_addr = None;
            }
        }

        if let Some(new) = new.filter(|p| p.autonomous_address_configuration && p.prefix_length == 64)
        {
            let addr = self.address_from_prefix(new);
            net_debug!("rpl: autoconfigured address {}", addr);
            self.global_addr = Some(addr);
        }
    }

    /// Join the instance of a DIO we heard for the first time.
    fn join_instance(&mut self, from: Ipv6Address, dio: &DioInfo) -> Result<(), Error> {
        if dio.mode_of_operation != self.config.mode_of_operation {
            return Err(Error::UnsupportedModeOfOperation);
        }
        let of = Of::from_ocp(dio.conf.objective_code_point, &self.config.fuzzy)
            .ok_or(Error::UnsupportedObjectiveFunction)?;

        let i = self.alloc_instance(dio.instance_id)?;
        let inst = &mut self.instances[i];
        inst.of = of;
        inst.mode_of_operation = dio.mode_of_operation;
        inst.apply_configuration(&dio.conf);

        let Some(d) = inst.alloc_dag(dio.dag_id) else {
            self.instances[i] = Instance::default();
            rpl_stat!(self.stats, mem_overflows);
            return Err(Error::OutOfMemory);
        };
        let r = DagRef { instance: i, dag: d };

        let Some(h) = self.add_parent(r, dio, from) else {
            self.instances[i] = Instance::default();
            return Err(Error::OutOfMemory);
        };

        let inst = &mut self.instances[i];
        inst.current_dag = Some(d);
        inst.dtsn_out = RplSequenceCounter::default();
        let dag = &mut inst.dags[d];
        dag.joined = true;
        dag.preference = dio.preference;
        dag.grounded = dio.grounded;
        dag.version = dio.version;

        if let Some(prefix) = dio
            .prefix
            .filter(|p| p.autonomous_address_configuration)
        {
            self.set_prefix(r, &prefix);
        }

        self.set_preferred_parent(r, Some(h));
        let rank = self.rank_via_parent(h);
        let parent = self.parents.get(h).copied();
        let inst = &mut self.instances[i];
        inst.mc = inst.of.metric_container(false, parent.as_ref());
        let dag = &mut inst.dags[d];
        dag.rank = rank;
        dag.min_rank = rank;

        net_debug!(
            "rpl: joined DODAG {} of instance {} with rank {}",
            dio.dag_id,
            dio.instance_id,
            rank.value()
        );

        self.set_default_route(i, Some(from));
        self.process_parent_event(i, h);
        if let Some(p) = self.parents.get_mut(h) {
            p.dtsn = dio.dtsn;
        }

        if self.instances[i].has_downward_routes() {
            self.instances[i].dtsn_out.increment();
            self.schedule_dao(i, consts::DAO_LATENCY);
        }
        self.next_dis = None;
        self.reset_dio_timer(i);
        Ok(())
    }

    /// Add the DODAG of a DIO to an instance we already take part in.
    fn add_dag(&mut self, i: usize, from: Ipv6Address, dio: &DioInfo) -> Option<usize> {
        let Some(d) = self.instances[i].alloc_dag(dio.dag_id) else {
            rpl_stat!(self.stats, mem_overflows);
            net_debug!("rpl: no room for DODAG {}", dio.dag_id);
            return None;
        };
        let r = DagRef { instance: i, dag: d };

        let h = match self.parents.find_in_instance(i, &from) {
            Some(h) => {
                self.move_parent(h, r);
                h
            }
            None => match self.add_parent(r, dio, from) {
                Some(h) => h,
                None => {
                    self.instances[i].dags[d] = Dag::default();
                    return None;
                }
            },
        };
        let rank = self.instances[i].rank(dio.rank);
        if let Some(p) = self.parents.get_mut(h) {
            p.rank = rank;
        }

        let inst = &self.instances[i];
        if !inst.is_compatible(&dio.conf, dio.mode_of_operation) {
            net_debug!(
                "rpl: DIO of DODAG {} is incompatible with instance {}",
                dio.dag_id,
                dio.instance_id
            );
            self.remove_parent(h);
            self.instances[i].dags[d] = Dag::default();
            return None;
        }

        let dag = &mut self.instances[i].dags[d];
        dag.grounded = dio.grounded;
        dag.preference = dio.preference;
        dag.version = dio.version;
        dag.prefix = dio.prefix;

        self.set_preferred_parent(r, Some(h));
        let rank = self.rank_via_parent(h);
        let dag = &mut self.instances[i].dags[d];
        dag.rank = rank;
        dag.min_rank = rank;
        net_debug!("rpl: added DODAG {} with rank {}", dio.dag_id, rank.value());

        self.process_parent_event(i, h);
        if let Some(p) = self.parents.get_mut(h) {
            p.dtsn = dio.dtsn;
        }
        Some(d)
    }

    /// Handle a DIO once decoded.
    pub(crate) fn process_dio(&mut self, from: Ipv6Address, dio: &DioInfo) {
        if dio.conf.lifetime_unit == 0 || dio.conf.default_lifetime == 0 {
            rpl_stat!(self.stats, malformed_msgs);
            net_debug!("rpl: DIO from {} carries a zero route lifetime", from);
            return;
        }
        if dio.mode_of_operation != self.config.mode_of_operation {
            net_debug!(
                "rpl: ignoring DIO with mode of operation {:?}",
                dio.mode_of_operation
            );
            return;
        }

        let instance = self.instance_index(dio.instance_id);
        let dag = instance.and_then(|i| self.instances[i].find_dag(&dio.dag_id));

        if let (Some(i), Some(d)) = (instance, dag) {
            let inst = &mut self.instances[i];
            let root_rank = inst.root_rank();
            let current = &mut inst.dags[d];
            let version = current.version;

            if dio.version.greater_than(&version) {
                if current.rank.value() == root_rank.value() {
                    net_debug!("rpl: root heard a newer version {}", dio.version);
                    current.version = dio.version;
                    current.version.increment();
                    self.reset_dio_timer(i);
                } else {
                    net_debug!(
                        "rpl: global repair of DODAG {}, version {}",
                        dio.dag_id,
                        dio.version
                    );
                    let r = DagRef { instance: i, dag: d };
                    if let Some(prefix) = dio
                        .prefix
                        .filter(|p| p.autonomous_address_configuration)
                    {
                        self.set_prefix(r, &prefix);
                    }
                    self.global_repair(r, dio, from);
                }
                return;
            }

            if version.greater_than(&dio.version) && current.joined {
                net_trace!("rpl: {} advertises the old version {}", from, dio.version);
                self.reset_dio_timer(i);
                return;
            }
        }

        let Some(i) = instance else {
            if dio.rank == consts::INFINITE_RANK {
                net_trace!("rpl: not joining through {}, its rank is infinite", from);
                return;
            }
            net_debug!("rpl: new instance {}, joining", dio.instance_id);
            if !self.add_neighbor(&from) {
                return;
            }
            if let Err(e) = self.join_instance(from, dio) {
                net_debug!("rpl: could not join instance {}: {}", dio.instance_id, e);
            }
            return;
        };

        if self.instances[i].is_root() && self.instances[i].current_dag != dag {
            net_trace!("rpl: root ignored a DIO of DODAG {}", dio.dag_id);
            return;
        }

        if !self.add_neighbor(&from) {
            return;
        }
        let Some(d) = dag.or_else(|| self.add_dag(i, from, dio)) else {
            return;
        };
        let r = DagRef { instance: i, dag: d };

        let root_rank = self.instances[i].root_rank();
        if dio.rank < root_rank.value() {
            net_trace!("rpl: ignoring DIO with rank {} below the root rank", dio.rank);
            return;
        }
        if let Some(prefix) = dio
            .prefix
            .filter(|p| p.autonomous_address_configuration)
        {
            self.set_prefix(r, &prefix);
        }

        let inst = &mut self.instances[i];
        if inst.dags[d].rank.value() == root_rank.value() {
            if dio.rank != consts::INFINITE_RANK {
                inst.dio_timer.hear_consistent();
            }
            return;
        }

        let lifetime = inst.dag_lifetime();
        inst.dags[d].lifetime = lifetime;
        let joined = inst.dags[d].joined;
        let rank = inst.rank(dio.rank);

        let (h, known) = match self.parents.find(r, &from) {
            Some(h) => (h, true),
            None => match self.parents.find_in_instance(i, &from) {
                Some(h) => {
                    self.move_parent(h, r);
                    (h, false)
                }
                None => match self.add_parent(r, dio, from) {
                    Some(h) => {
                        net_debug!("rpl: new candidate parent {} with rank {}", from, dio.rank);
                        (h, false)
                    }
                    None => return,
                },
            },
        };

        let Some(p) = self.parents.get_mut(h) else {
            return;
        };
        let same_rank = known && p.rank.value() == dio.rank;
        let unchanged = same_rank && p.mc == dio.mc;
        if same_rank {
            net_trace!("rpl: consistent DIO from {}", from);
            if joined {
                self.instances[i].dio_timer.hear_consistent();
            }
        } else {
            p.rank = rank;
        }
        p.mc = dio.mc;
        p.last_heard = self.now;

        let dag = &self.instances[i].dags[d];
        if dio.rank == consts::INFINITE_RANK && dag.joined && dag.preferred_parent == Some(h) {
            self.reset_dio_timer(i);
        }

        if !unchanged && !self.process_parent_event(i, h) {
            net_trace!("rpl: candidate parent {} rejected", from);
            return;
        }

        let inst = &self.instances[i];
        let dag = &inst.dags[d];
        if dag.joined && dag.preferred_parent == Some(h) {
            let new_dtsn = self
                .parents
                .get(h)
                .map(|p| dio.dtsn.greater_than(&p.dtsn))
                .unwrap_or(false);
            if inst.has_downward_routes() && new_dtsn {
                self.instances[i].dtsn_out.increment();
                self.schedule_dao(i, consts::DAO_LATENCY);
            }
            self.set_default_route(i, Some(from));
        }
        if let Some(p) = self.parents.get_mut(h) {
            p.dtsn = dio.dtsn;
        }
    }

    /// Schedule a DAO to the preferred parent, unless one is pending. A zero
    /// latency sends it on the next poll.
    pub(crate) fn schedule_dao(&mut self, i: usize, latency: Duration) {
        let inst = &mut self.instances[i];
        if !inst.has_downward_routes() {
            return;
        }
        if inst.dao.timer.is_some() {
            net_trace!("rpl: DAO already scheduled");
            return;
        }

        let delay = if latency == Duration::ZERO {
            Duration::ZERO
        } else {
            let latency = latency.total_millis();
            Duration::from_millis(latency / 2 + self.rand.rand_range(0, latency))
        };
        net_trace!("rpl: scheduling a DAO in {}", delay);
        inst.dao.timer = Some(self.now + delay);
    }

    /// Hear an inconsistency: the DIO interval restarts from its minimum.
    pub(crate) fn reset_dio_timer(&mut self, i: usize) {
        let inst = &mut self.instances[i];
        if inst.dio_timer.hear_inconsistent(self.now, &mut self.rand) {
            net_trace!("rpl: DIO timer reset");
        }
        rpl_stat!(self.stats, resets);
    }

    /// Install a downward route learnt from a DAO.
    pub(crate) fn add_route(
        &mut self,
        r: DagRef,
        target: Ipv6Cidr,
        next_hop: Ipv6Address,
        expires_at: Option<Instant>,
    ) -> bool {
        let new_child = !self.routes.has_next_hop(&next_hop);
        let route = Route {
            cidr: target,
            via_router: next_hop,
            expires_at,
            dag: Some(r),
            no_path_received: false,
        };

        match self.routes.add(route) {
            Ok(old) => {
                net_trace!("rpl: added route {}", route);
                if new_child {
                    let hw = self.hardware_addr_of(&next_hop);
                    self.notify(Notification::ChildAdded(hw));
                }
                if let Some(old) = old.filter(|old| old.via_router != next_hop) {
                    self.check_child(&old.via_router);
                }
                true
            }
            Err(_) => {
                rpl_stat!(self.stats, mem_overflows);
                net_debug!("rpl: route table full, dropping {}", route);
                false
            }
        }
    }

    /// Announce a child that no route goes through anymore.
    fn check_child(&mut self, next_hop: &Ipv6Address) {
        if !self.routes.has_next_hop(next_hop) {
            let hw = self.hardware_addr_of(next_hop);
            self.notify(Notification::ChildRemoved(hw));
        }
    }

    fn routes_removed(&mut self, removed: RemovedRoutes) {
        for (n, route) in removed.iter().enumerate() {
            if route.is_default() {
                continue;
            }
            net_trace!("rpl: removed route {}", route);
            let seen = removed[..n]
                .iter()
                .any(|r| !r.is_default() && r.via_router == route.via_router);
            if !seen {
                self.check_child(&route.via_router);
            }
        }
    }

    pub(crate) fn remove_route(&mut self, cidr: &Ipv6Cidr) -> Option<Route> {
        let route = self.routes.remove(cidr)?;
        net_trace!("rpl: removed route {}", route);
        self.check_child(&route.via_router);
        Some(route)
    }

    pub(crate) fn remove_routes_by_next_hop(&mut self, next_hop: &Ipv6Address) {
        let removed = self.routes.remove_by_next_hop(next_hop);
        self.routes_removed(removed);
    }

    pub(crate) fn remove_dag_routes(&mut self, r: DagRef) {
        let removed = self.routes.remove_by_dag(r);
        self.routes_removed(removed);
    }

    pub(crate) fn purge_routes(&mut self) {
        let removed = self.routes.purge(self.now);
        self.routes_removed(removed);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::*;
    use crate::wire::RplModeOfOperation;
    use rstest::rstest;

    #[test]
    fn join_from_first_dio() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        let from = ll(1);
        rpl.process_dio(from, &dio(240, 256));

        assert!(rpl.is_joined());
        assert_eq!(rpl.rank().unwrap().value(), 512);
        assert_eq!(rpl.preferred_parent().unwrap().address, from);
        let default = rpl.routes().default_route(0).unwrap();
        assert_eq!(default.via_router, from);
        assert_eq!(rpl.global_address(), Some(global(ADDR)));
        assert!(rpl.instances[0].dao.timer.is_some());
        assert_eq!(
            rpl.drain_notifications().next(),
            Some(Notification::NewTimeSource {
                old: None,
                new: Some(hw(1))
            })
        );
    }

    #[test]
    fn no_join_through_infinite_rank() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, consts::INFINITE_RANK));
        assert!(!rpl.is_joined());
        assert_eq!(rpl.instances().count(), 0);
    }

    #[test]
    fn unsupported_objective_function() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        let mut info = dio(240, 256);
        info.conf.objective_code_point = 0x4242;
        rpl.process_dio(ll(1), &info);

        assert!(!rpl.is_joined());
        assert_eq!(rpl.instances().count(), 0);
        assert_eq!(rpl.parents().iter().count(), 0);
    }

    #[rstest]
    #[case::storing(RplModeOfOperation::StoringModeWithoutMulticast)]
    #[case::non_storing(RplModeOfOperation::NonStoringMode)]
    fn identical_dio_is_idempotent(#[case] mop: RplModeOfOperation) {
        let mut rpl = node(mop);
        let mut info = dio(240, 256);
        info.mode_of_operation = mop;
        rpl.process_dio(ll(1), &info);

        let rank = rpl.rank().unwrap().value();
        let parent = *rpl.preferred_parent().unwrap();
        let stats = *rpl.stats();
        let counter = rpl.instances[0].dio_timer.counter();

        rpl.process_dio(ll(1), &info);

        assert_eq!(rpl.rank().unwrap().value(), rank);
        assert_eq!(*rpl.preferred_parent().unwrap(), parent);
        assert_eq!(*rpl.stats(), stats);
        assert_eq!(rpl.instances[0].dio_timer.counter(), counter + 1);
    }

    #[test]
    fn infinite_rank_from_sole_parent_starts_local_repair() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        assert!(rpl.rank().unwrap().value() < consts::INFINITE_RANK);

        rpl.process_dio(ll(1), &dio(240, consts::INFINITE_RANK));

        assert!(rpl.rank().unwrap().is_infinite());
        assert!(rpl.preferred_parent().is_none());
        assert!(rpl.routes().default_route(0).is_none());
        assert_eq!(rpl.stats().local_repairs, 1);
        // The parent is nullified, not forgotten.
        assert_eq!(rpl.parents().iter().count(), 1);
        let timer = &rpl.instances[0].dio_timer;
        assert_eq!(timer.interval(), timer.min_expiration());
    }

    #[rstest]
    #[case::lifetime_unit(0, consts::DEFAULT_LIFETIME)]
    #[case::default_lifetime(consts::DEFAULT_LIFETIME_UNIT, 0)]
    fn zero_route_lifetime_is_rejected(#[case] unit: u16, #[case] lifetime: u8) {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        let mut d = dio(240, 256);
        d.conf.lifetime_unit = unit;
        d.conf.default_lifetime = lifetime;

        rpl.process_dio(ll(1), &d);

        assert!(!rpl.is_joined());
        assert_eq!(rpl.stats().malformed_msgs, 1);
        assert!(rpl.neighbors().lookup(&ll(1)).is_none());
    }

    #[test]
    fn infinite_rank_from_backup_parent_keeps_trickle() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        rpl.process_dio(ll(2), &dio(240, 512));
        assert_eq!(rpl.preferred_parent().unwrap().address, ll(1));
        for _ in 0..5 {
            rpl.instances[0]
                .dio_timer
                .expire(Instant::ZERO, &mut rpl.rand);
        }
        let interval = rpl.instances[0].dio_timer.interval();
        assert!(interval > rpl.instances[0].dio_timer.min_expiration());

        rpl.process_dio(ll(2), &dio(240, consts::INFINITE_RANK));

        assert_eq!(rpl.preferred_parent().unwrap().address, ll(1));
        assert_eq!(rpl.instances[0].dio_timer.interval(), interval);
    }

    #[test]
    fn infinite_rank_from_preferred_parent_resets_trickle() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        rpl.process_dio(ll(2), &dio(240, 512));
        for _ in 0..5 {
            rpl.instances[0]
                .dio_timer
                .expire(Instant::ZERO, &mut rpl.rand);
        }

        rpl.process_dio(ll(1), &dio(240, consts::INFINITE_RANK));

        assert_ne!(rpl.preferred_parent().map(|p| p.address), Some(ll(1)));
        let timer = &rpl.instances[0].dio_timer;
        assert_eq!(timer.interval(), timer.min_expiration());
    }

    #[test]
    fn every_candidate_parent_is_a_neighbor() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        rpl.process_dio(ll(2), &dio(240, 512));

        assert_eq!(rpl.parents().iter().count(), 2);
        for n in [1, 2] {
            let neighbor = rpl.neighbors().lookup(&ll(n)).unwrap();
            assert_eq!(neighbor.hardware_addr, hw(n));
        }
    }

    #[test]
    fn switch_to_better_parent() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 1024));
        assert_eq!(rpl.preferred_parent().unwrap().address, ll(1));
        let _ = rpl.drain_outbox().count();

        rpl.process_dio(ll(2), &dio(240, 256));

        assert_eq!(rpl.preferred_parent().unwrap().address, ll(2));
        assert_eq!(rpl.rank().unwrap().value(), 512);
        assert_eq!(rpl.stats().parent_switch, 1);
        assert_eq!(rpl.routes().default_route(0).unwrap().via_router, ll(2));

        // The old parent is told to forget our routes.
        let no_path = rpl.drain_outbox().find(|out| out.dst == ll(1)).unwrap();
        match no_path.repr().unwrap() {
            crate::wire::RplRepr::DestinationAdvertisementObject(dao) => {
                assert!(dao.options.iter().any(|opt| matches!(
                    opt,
                    crate::wire::RplOptionRepr::TransitInformation(t) if t.path_lifetime == 0
                )));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn parent_with_unacceptable_rank_is_rejected() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        // min_rank is 2, the limit 2 + 7 hops.
        rpl.process_dio(ll(2), &dio(240, 10 * 256));

        assert_eq!(rpl.preferred_parent().unwrap().address, ll(1));
        let min_rank = rpl.dag().unwrap().min_rank;
        let inst = rpl.default_instance().unwrap();
        for (_, p) in rpl.parents().iter() {
            if p.address == ll(2) {
                assert!(!inst.acceptable_rank(rpl.dag().unwrap(), p.rank));
            }
        }
        assert!(inst.acceptable_rank(rpl.dag().unwrap(), rpl.rank().unwrap()));
        assert!(rpl.rank().unwrap().dag_rank() <= min_rank.dag_rank() + 7);
    }

    #[test]
    fn global_repair_keeps_a_single_parent() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        rpl.process_dio(ll(2), &dio(240, 512));
        assert_eq!(rpl.parents().iter().count(), 2);

        rpl.process_dio(ll(2), &dio(241, 512));

        assert_eq!(rpl.stats().global_repairs, 1);
        assert_eq!(rpl.parents().iter().count(), 1);
        assert_eq!(rpl.preferred_parent().unwrap().address, ll(2));
        assert_eq!(rpl.dag().unwrap().version.value(), 241);
        assert_eq!(rpl.rank().unwrap().value(), 768);
        assert_eq!(rpl.dag().unwrap().min_rank.value(), 768);
    }

    #[test]
    fn old_version_resets_the_timer() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(241, 256));
        let resets = rpl.stats().resets;

        rpl.process_dio(ll(2), &dio(240, 256));

        assert_eq!(rpl.stats().resets, resets + 1);
        assert_eq!(rpl.parents().iter().count(), 1);
    }

    #[test]
    fn root_repair() {
        let mut rpl = root(RplModeOfOperation::StoringModeWithoutMulticast);
        let id = RplInstanceId::from(consts::RPL_DEFAULT_INSTANCE);
        let version = rpl.dag().unwrap().version;
        let dtsn = rpl.default_instance().unwrap().dtsn_out;

        rpl.repair_root(id).unwrap();

        let mut expected = version;
        expected.increment();
        assert_eq!(rpl.dag().unwrap().version, expected);
        assert!(rpl.default_instance().unwrap().dtsn_out.greater_than(&dtsn));
        assert_eq!(rpl.stats().root_repairs, 1);

        let mut leaf = node(RplModeOfOperation::StoringModeWithoutMulticast);
        assert_eq!(leaf.repair_root(id), Err(Error::UnknownInstance));
        leaf.process_dio(ll(1), &dio(240, 256));
        assert_eq!(leaf.repair_root(id), Err(Error::NotRoot));
    }

    #[test]
    fn root_ignores_foreign_dodag() {
        let mut rpl = root(RplModeOfOperation::StoringModeWithoutMulticast);
        let mut info = dio(240, 256);
        info.dag_id = Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 0x99);
        rpl.process_dio(ll(1), &info);

        assert!(rpl.is_root());
        assert_eq!(rpl.parents().iter().count(), 0);
    }

    #[test]
    fn leave_forgets_everything() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        let id = RplInstanceId::from(consts::RPL_DEFAULT_INSTANCE);

        rpl.leave(id).unwrap();

        assert!(!rpl.is_joined());
        assert_eq!(rpl.parents().iter().count(), 0);
        assert!(rpl.routes().is_empty());
        assert_eq!(rpl.global_address(), None);
        assert_eq!(rpl.leave(id), Err(Error::UnknownInstance));
    }

    #[test]
    fn children_follow_downward_routes() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        let _ = rpl.drain_notifications().count();
        let r = DagRef {
            instance: 0,
            dag: 0,
        };
        let a = Ipv6Cidr::host(Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 0xa));
        let b = Ipv6Cidr::host(Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 0xb));

        assert!(rpl.add_route(r, a, ll(5), None));
        assert!(rpl.add_route(r, b, ll(5), None));
        let notifications: heapless::Vec<_, 4> = rpl.drain_notifications().collect();
        assert_eq!(notifications[..], [Notification::ChildAdded(hw(5))]);

        rpl.remove_route(&a);
        assert_eq!(rpl.drain_notifications().count(), 0);
        rpl.remove_route(&b);
        assert_eq!(
            rpl.drain_notifications().next(),
            Some(Notification::ChildRemoved(hw(5)))
        );
    }
}
