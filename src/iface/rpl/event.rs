use heapless::Vec;

use crate::config::RPL_MAX_PACKET_LEN;
use crate::iface::neighbor::{NeighborState, TxStatus};
use crate::time::{Duration, Instant};
use crate::wire::{Ieee802154Address, Ipv6Address};

use super::of::ObjectiveFunction;
use super::{Error, Rpl};

/// The timers of the engine. They fire on their own from [`Rpl::poll`];
/// pushing one as an [`Event`] fires it right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    /// Route and DODAG housekeeping, every second.
    Periodic,
    /// DIO solicitation while not joined.
    Dis,
    /// The Trickle timer of the DIOs.
    Dio,
    /// The delayed DAO after a parent change.
    Dao,
    /// The DAO refresh before our downward route expires.
    DaoLifetime,
    /// A DAO-ACK that did not come.
    DaoAck,
    /// A DIO to a single neighbor.
    UnicastDio,
}

impl TimerKind {
    pub(crate) const COUNT: usize = 7;
}

/// Something the engine has to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// An RPL control message, as the ICMPv6 payload of an IPv6 packet.
    Packet {
        src: Ipv6Address,
        dst: Ipv6Address,
        payload: Vec<u8, RPL_MAX_PACKET_LEN>,
    },
    /// The outcome of a unicast transmission to a neighbor.
    LinkTx {
        neighbor: Ieee802154Address,
        status: TxStatus,
        numtx: u8,
    },
    /// Neighbor discovery changed the reachability of a neighbor.
    NeighborState {
        addr: Ipv6Address,
        state: NeighborState,
    },
    Timer(TimerKind),
}

impl Event {
    /// A received control message. Fails if it does not fit in an event.
    pub fn packet(src: Ipv6Address, dst: Ipv6Address, payload: &[u8]) -> Result<Self, Error> {
        let payload = Vec::from_slice(payload).map_err(|_| Error::Malformed)?;
        Ok(Event::Packet { src, dst, payload })
    }
}

impl Rpl {
    /// Queue an event for the next [`Rpl::poll`].
    pub fn push_event(&mut self, event: Event) -> Result<(), Error> {
        self.events.push_back(event).map_err(|event| {
            rpl_stat!(self.stats, mem_overflows);
            net_debug!("rpl: event queue full, dropping {:?}", event);
            Error::OutOfMemory
        })
    }

    /// Process the queued events, oldest first, then the timers that are
    /// due at `now`. Returns whether anything was done.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.now = now;
        let mut processed = false;

        while let Some(event) = self.events.pop_front() {
            self.process_event(event);
            processed = true;
        }

        // A timer re-armed at `now` waits for the next call.
        let mut fired: Vec<TimerKind, { TimerKind::COUNT }> = Vec::new();
        while let Some(kind) = self.next_due_timer(&fired) {
            self.fire_timer(kind, false);
            let _ = fired.push(kind);
            processed = true;
        }

        processed
    }

    /// The next instant [`Rpl::poll`] has something to do. Queued events
    /// are due immediately.
    pub fn poll_at(&self) -> Option<Instant> {
        if !self.events.is_empty() {
            return Some(self.now);
        }
        self.timer_deadlines().map(|(_, at)| at).min()
    }

    /// How long to wait before calling [`Rpl::poll`].
    pub fn poll_delay(&self, now: Instant) -> Option<Duration> {
        match self.poll_at() {
            Some(poll_at) if now < poll_at => Some(poll_at - now),
            Some(_) => Some(Duration::ZERO),
            None => None,
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::Packet { src, dst, payload } => {
                if let Err(e) = self.process_packet(src, dst, &payload) {
                    net_debug!("rpl: message from {} dropped: {}", src, e);
                }
            }
            Event::LinkTx {
                neighbor,
                status,
                numtx,
            } => self.link_tx(neighbor, status, numtx),
            Event::NeighborState { addr, state } => self.neighbor_state(addr, state),
            Event::Timer(kind) => self.fire_timer(kind, true),
        }
    }

    /// Feed the outcome of a transmission to the link statistics and to
    /// the objective function of the parents behind that neighbor.
    fn link_tx(&mut self, neighbor: Ieee802154Address, status: TxStatus, numtx: u8) {
        let addr = match self.neighbors.lookup_hardware(&neighbor) {
            Some(n) => n.ip_addr,
            None => match neighbor.as_link_local_address() {
                Some(addr) => addr,
                None => return,
            },
        };

        if let Some(n) = self.neighbors.lookup_mut(&addr) {
            n.stats.packet_sent(status, numtx, self.now);
        }

        for h in self.parents.handles() {
            let Some(p) = self.parents.get_mut(h) else {
                continue;
            };
            if p.address != addr {
                continue;
            }
            let of = &self.instances[p.dag.instance].of;
            of.neighbor_link_callback(p, status, numtx);
            p.updated = true;
        }
    }

    /// A neighbor that became unreachable cannot be a parent anymore.
    fn neighbor_state(&mut self, addr: Ipv6Address, state: NeighborState) {
        if self.neighbors.set_state(&addr, state, self.now).is_none() {
            net_trace!("rpl: state change of the unknown neighbor {}", addr);
        }
        if state != NeighborState::Incomplete {
            return;
        }

        for h in self.parents.handles() {
            let Some(p) = self.parents.get_mut(h) else {
                continue;
            };
            if p.address != addr {
                continue;
            }
            net_debug!("rpl: parent {} is unreachable", addr);
            let i = p.dag.instance;
            p.rank = self.instances[i].infinite_rank();
            p.updated = false;
            self.process_parent_event(i, h);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::*;
    use super::*;
    use crate::wire::{ipv6, RplModeOfOperation, RplRepr};

    #[test]
    fn packets_are_processed_in_order() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        let dst = ipv6::LINK_LOCAL_ALL_RPL_NODES;
        for (from, rank) in [(1, 256), (2, 512)] {
            let payload = encode(&dio_repr(240, rank), ll(from), dst);
            rpl.push_event(Event::packet(ll(from), dst, &payload).unwrap())
                .unwrap();
        }
        assert_eq!(rpl.poll_at(), Some(Instant::ZERO));

        assert!(rpl.poll(Instant::from_millis(10)));
        assert!(rpl.is_joined());
        assert_eq!(rpl.preferred_parent().unwrap().address, ll(1));
        assert_eq!(rpl.parents().iter().count(), 2);
    }

    #[test]
    fn malformed_packet_event() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.push_event(Event::packet(ll(1), ll(ADDR), &[155, 1, 0]).unwrap())
            .unwrap();
        rpl.poll(Instant::ZERO);
        assert_eq!(rpl.stats().malformed_msgs, 1);
    }

    #[test]
    fn full_queue() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        for _ in 0..crate::config::EVENT_QUEUE_SIZE {
            rpl.push_event(Event::Timer(TimerKind::Periodic)).unwrap();
        }
        assert_eq!(
            rpl.push_event(Event::Timer(TimerKind::Periodic)),
            Err(Error::OutOfMemory)
        );
        assert_eq!(rpl.stats().mem_overflows, 1);
    }

    #[test]
    fn transmissions_update_the_parent_metric() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        let before = rpl.preferred_parent().unwrap().link_metric;

        for _ in 0..4 {
            rpl.push_event(Event::LinkTx {
                neighbor: hw(1),
                status: TxStatus::NoAck,
                numtx: 3,
            })
            .unwrap();
        }
        rpl.poll(Instant::from_millis(100));

        let parent = rpl.preferred_parent().unwrap();
        assert!(parent.link_metric > before);
        assert!(parent.link_metric_valid);
    }

    #[test]
    fn unreachable_parent_is_dropped() {
        let mut rpl = node(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.process_dio(ll(1), &dio(240, 256));
        rpl.process_dio(ll(2), &dio(240, 512));
        assert_eq!(rpl.preferred_parent().unwrap().address, ll(1));

        rpl.push_event(Event::NeighborState {
            addr: ll(1),
            state: NeighborState::Incomplete,
        })
        .unwrap();
        rpl.poll(Instant::from_millis(100));

        assert_eq!(rpl.preferred_parent().unwrap().address, ll(2));
        assert_eq!(rpl.rank().unwrap().value(), 768);
    }

    #[test]
    fn explicit_timer_event() {
        let mut rpl = root(RplModeOfOperation::StoringModeWithoutMulticast);
        rpl.drain_outbox().for_each(drop);

        rpl.push_event(Event::Timer(TimerKind::Dio)).unwrap();
        rpl.poll(Instant::ZERO);

        let out = rpl.drain_outbox().next().unwrap();
        assert_eq!(out.dst, ipv6::LINK_LOCAL_ALL_RPL_NODES);
        assert!(matches!(
            out.repr().unwrap(),
            RplRepr::DodagInformationObject(_)
        ));
    }
}
