//! Timer handling.
//!
//! Every timer is a deadline stored next to the state it belongs to. The
//! dispatcher repeatedly fires the earliest expired one, each kind at most
//! once per poll; each handler moves or clears its own deadline.

use crate::time::{Duration, Instant};

use super::consts;
use super::dag::PendingDaoAck;
use super::{Rpl, TimerKind};

/// Shortest delay before refreshing a DAO.
const MIN_DAO_REFRESH: Duration = Duration::from_secs(1);

impl Rpl {
    /// Every armed timer and its deadline.
    pub(crate) fn timer_deadlines(&self) -> impl Iterator<Item = (TimerKind, Instant)> + '_ {
        let global = [
            (TimerKind::Periodic, Some(self.next_periodic)),
            (TimerKind::Dis, self.next_dis),
        ];
        let per_instance = self
            .instances
            .iter()
            .filter(|inst| inst.used)
            .flat_map(|inst| {
                [
                    (TimerKind::Dio, inst.dio_timer.poll_at()),
                    (TimerKind::Dao, inst.dao.timer),
                    (TimerKind::DaoLifetime, inst.dao.lifetime_timer),
                    (TimerKind::DaoAck, inst.dao.pending_ack.map(|p| p.deadline)),
                    (TimerKind::UnicastDio, inst.unicast_dio.map(|(_, at)| at)),
                ]
            });

        global
            .into_iter()
            .chain(per_instance)
            .filter_map(|(kind, at)| Some((kind, at?)))
    }

    /// The earliest timer due at `now`, skipping the kinds in `fired`.
    pub(crate) fn next_due_timer(&self, fired: &[TimerKind]) -> Option<TimerKind> {
        self.timer_deadlines()
            .filter(|(kind, at)| *at <= self.now && !fired.contains(kind))
            .min_by_key(|(_, at)| *at)
            .map(|(kind, _)| kind)
    }

    /// Run a timer handler for every instance whose deadline passed, or
    /// for all of them when the timer is `forced`.
    pub(crate) fn fire_timer(&mut self, kind: TimerKind, forced: bool) {
        net_trace!("rpl: {:?} timer", kind);
        let now = self.now;
        let due = |deadline: Option<Instant>| forced || deadline.is_some_and(|at| at <= now);
        match kind {
            TimerKind::Periodic => self.handle_periodic_timer(),
            TimerKind::Dis => self.handle_dis_timer(),
            TimerKind::Dio => {
                for i in self.instance_indexes() {
                    let deadline = self.instances[i].dio_timer.poll_at();
                    if due(deadline) {
                        self.handle_dio_timer(i);
                    }
                }
            }
            TimerKind::Dao | TimerKind::DaoLifetime => {
                for i in self.instance_indexes() {
                    let inst = &self.instances[i];
                    let deadline = match kind {
                        TimerKind::Dao => inst.dao.timer,
                        _ => inst.dao.lifetime_timer,
                    };
                    if due(deadline) {
                        self.handle_dao_timer(i);
                    }
                }
            }
            TimerKind::DaoAck => {
                for i in self.instance_indexes() {
                    let deadline = self.instances[i].dao.pending_ack.map(|p| p.deadline);
                    if deadline.is_some() && due(deadline) {
                        self.handle_dao_ack_timer(i);
                    }
                }
            }
            TimerKind::UnicastDio => {
                for i in self.instance_indexes() {
                    if let Some((dst, at)) = self.instances[i].unicast_dio {
                        if due(Some(at)) {
                            self.instances[i].unicast_dio = None;
                            self.dio_output(i, Some(dst));
                        }
                    }
                }
            }
        }
    }

    fn instance_indexes(&self) -> heapless::Vec<usize, { crate::config::RPL_MAX_INSTANCES }> {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.used)
            .map(|(i, _)| i)
            .collect()
    }

    fn handle_periodic_timer(&mut self) {
        self.next_periodic = self.now + consts::PERIODIC_INTERVAL;

        self.purge_routes();
        if self.ns_nodes.purge(self.now) > 0 {
            net_debug!("rpl: {} nodes left in the node table", self.ns_nodes.len());
        }
        self.purge_dags();
        self.recalculate_ranks();

        if !self.is_joined() && self.next_dis.is_none() {
            self.next_dis = Some(self.now + consts::DIS_INTERVAL);
        }
    }

    /// Forget the DODAGs we do not belong to once they stop sending DIOs.
    fn purge_dags(&mut self) {
        for i in self.instance_indexes() {
            for d in 0..self.instances[i].dags.len() {
                let dag = &mut self.instances[i].dags[d];
                if !dag.used || dag.joined {
                    continue;
                }
                if dag.lifetime <= 1 {
                    net_debug!("rpl: DODAG {} timed out", dag.dag_id);
                    self.free_dag(i, d);
                } else {
                    dag.lifetime -= 1;
                }
            }
        }
    }

    fn handle_dis_timer(&mut self) {
        if self.is_joined() {
            self.next_dis = None;
            return;
        }
        self.dis_output(None);
        self.next_dis = Some(self.now + consts::DIS_INTERVAL);
    }

    fn handle_dio_timer(&mut self, i: usize) {
        let inst = &mut self.instances[i];
        let expired = inst.dio_timer.poll_at().is_some_and(|at| at <= self.now);
        let transmit = if expired {
            inst.dio_timer.poll(self.now, &mut self.rand)
        } else {
            // Forced before its time.
            true
        };
        if transmit && inst.current_dag.is_some() {
            self.dio_output(i, None);
        }
    }

    /// Send the DAO to the preferred parent, then arm its refresh.
    fn handle_dao_timer(&mut self, i: usize) {
        let inst = &mut self.instances[i];
        inst.dao.timer = None;
        inst.dao.lifetime_timer = None;
        if inst.is_root() || !inst.has_downward_routes() {
            return;
        }

        let Some(parent) = self.preferred_parent_of(i) else {
            net_debug!("rpl: no preferred parent, not sending a DAO");
            return;
        };
        let lifetime = self.instances[i].default_lifetime;
        self.dao_output(i, parent, lifetime);

        if lifetime != consts::INFINITE_LIFETIME {
            let half = (self.instances[i].lifetime(lifetime) / 2).max(MIN_DAO_REFRESH);
            let jitter = self.rand.rand_range(0, (half.total_millis() / 2).max(1));
            let refresh = half + Duration::from_millis(jitter);
            net_trace!("rpl: refreshing the DAO in {}", refresh);
            self.instances[i].dao.lifetime_timer = Some(self.now + refresh);
        }
    }

    fn handle_dao_ack_timer(&mut self, i: usize) {
        let inst = &mut self.instances[i];
        let Some(pending) = inst.dao.pending_ack else {
            return;
        };

        if pending.retransmissions >= consts::DAO_MAX_RETRANSMISSIONS {
            net_debug!(
                "rpl: no DAO-ACK from {} after {} retransmissions, giving up",
                pending.parent,
                pending.retransmissions
            );
            inst.dao.pending_ack = None;
            return;
        }

        let Some(target) = self.global_address() else {
            self.instances[i].dao.pending_ack = None;
            return;
        };
        let lifetime = self.instances[i].default_lifetime;
        self.instances[i].dao.pending_ack = Some(PendingDaoAck {
            retransmissions: pending.retransmissions + 1,
            ..pending
        });
        net_debug!(
            "rpl: retransmitting DAO {} to {}",
            pending.sequence,
            pending.parent
        );
        self.send_dao(i, pending.parent, target, lifetime, pending.sequence);
    }

    fn preferred_parent_of(&self, i: usize) -> Option<crate::wire::Ipv6Address> {
        let h = self.instances[i].current_dag()?.preferred_parent?;
        self.parents.get(h).map(|p| p.address)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::super::{Event, Outgoing, TimerKind};
    use super::*;
    use crate::wire::{ipv6, RplModeOfOperation, RplRepr};

    /// Poll at every deadline up to `end`, collecting what is sent.
    fn run_until(rpl: &mut Rpl, end: Instant) -> std::vec::Vec<Outgoing> {
        let mut sent = std::vec::Vec::new();
        while let Some(at) = rpl.poll_at() {
            if at > end {
                break;
            }
            rpl.poll(at);
            sent.extend(rpl.drain_outbox());
        }
        sent
    }

    fn count(sent: &[Outgoing], f: impl Fn(&RplRepr) -> bool) -> usize {
        sent.iter()
            .filter(|out| out.repr().as_ref().is_ok_and(&f))
            .count()
    }

    #[test]
    fn dis_while_not_joined() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        assert!(run_until(&mut rpl, Instant::from_millis(4999)).is_empty());

        let sent = run_until(&mut rpl, Instant::from_secs(5));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dst, ipv6::LINK_LOCAL_ALL_RPL_NODES);
        assert!(matches!(
            sent[0].repr().unwrap(),
            RplRepr::DodagInformationSolicitation(_)
        ));

        assert!(run_until(&mut rpl, Instant::from_secs(64)).is_empty());
        assert_eq!(run_until(&mut rpl, Instant::from_secs(66)).len(), 1);
    }

    #[test]
    fn root_sends_dios() {
        let mut rpl = root(RplModeOfOperation::StoringModeWithoutMulticast);
        let sent = run_until(&mut rpl, Instant::from_secs(10));

        let dios = count(&sent, |repr| {
            matches!(repr, RplRepr::DodagInformationObject(_))
        });
        assert!(dios >= 1);
        assert_eq!(rpl.stats().malformed_msgs, 0);
    }

    #[test]
    fn dao_after_joining() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        rpl.drain_outbox().for_each(drop);

        // Within DAO_LATENCY / 2 + DAO_LATENCY.
        let sent = run_until(&mut rpl, Instant::from_secs(6));
        let dao = sent
            .iter()
            .find(|out| matches!(out.repr(), Ok(RplRepr::DestinationAdvertisementObject(_))))
            .unwrap();
        assert_eq!(dao.dst, ll(1));
        assert_eq!(dao.src, ll(ADDR));
        assert!(rpl.instances[0].dao.lifetime_timer.is_some());
        assert!(rpl.instances[0].dao.pending_ack.is_some());
    }

    #[test]
    fn dao_refresh_with_zero_lifetime_unit() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        rpl.drain_outbox().for_each(drop);

        let at = Instant::from_secs(1);
        rpl.instances[0].lifetime_unit = 0;
        rpl.instances[0].dao.timer = None;
        rpl.instances[0].dao.lifetime_timer = Some(at);
        rpl.poll(at);

        let sent: std::vec::Vec<_> = rpl.drain_outbox().collect();
        let daos = count(&sent, |repr| {
            matches!(repr, RplRepr::DestinationAdvertisementObject(_))
        });
        assert_eq!(daos, 1);
        let refresh = rpl.instances[0].dao.lifetime_timer.unwrap();
        assert!(refresh >= at + Duration::from_secs(1));
    }

    #[test]
    fn dao_retransmissions_give_up() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        rpl.push_event(Event::Timer(TimerKind::Dao)).unwrap();
        rpl.poll(Instant::ZERO);
        let sequence = rpl.instances[0].dao.pending_ack.unwrap().sequence;
        rpl.drain_outbox().for_each(drop);

        // Five retransmissions, five seconds apart, then nothing.
        let sent = run_until(&mut rpl, Instant::from_secs(31));
        let retransmitted: std::vec::Vec<_> = sent
            .iter()
            .filter_map(|out| match out.repr() {
                Ok(RplRepr::DestinationAdvertisementObject(dao)) => Some(dao.sequence),
                _ => None,
            })
            .collect();
        assert_eq!(
            retransmitted.len(),
            consts::DAO_MAX_RETRANSMISSIONS as usize
        );
        assert!(retransmitted.iter().all(|s| *s == sequence));
        assert!(rpl.instances[0].dao.pending_ack.is_none());
    }

    #[test]
    fn unjoined_dag_times_out() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));

        let mut other = dio(240, 256);
        other.dag_id = global(7);
        rpl.process_dio(ll(7), &other);
        assert_eq!(rpl.instances[0].dags().count(), 2);

        let lifetime = rpl.instances[0].dag_lifetime() as i64;
        rpl.push_event(Event::Timer(TimerKind::Periodic)).unwrap();
        let mut now = Instant::ZERO;
        for _ in 0..=lifetime {
            now += consts::PERIODIC_INTERVAL;
            rpl.poll(now);
        }
        assert_eq!(rpl.instances[0].dags().count(), 1);
        assert!(rpl.is_joined());
    }

    #[test]
    fn expired_routes_are_purged() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        let r = super::super::DagRef {
            instance: 0,
            dag: rpl.instances[0].current_dag.unwrap(),
        };
        let cidr = crate::wire::Ipv6Cidr::host(global(5));
        rpl.add_route(r, cidr, ll(5), Some(Instant::from_secs(3)));

        run_until(&mut rpl, Instant::from_secs(4));
        assert!(rpl.routes().get(&cidr).is_none());
        assert_eq!(
            rpl.drain_notifications().last(),
            Some(super::super::Notification::ChildRemoved(hw(5)))
        );
    }
}
