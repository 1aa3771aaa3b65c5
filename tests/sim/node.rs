use rpl_orchestra::iface::rpl::{Event, Rpl, RplConfig};
use rpl_orchestra::iface::TxStatus;
use rpl_orchestra::time::*;
use rpl_orchestra::tsch::orchestra::{FrameKind, Packet};
use rpl_orchestra::tsch::{Orchestra, OrchestraConfig};
use rpl_orchestra::wire::*;

use super::{Message, Position, RANGE};

/// Frames dropped after this many hops.
const MAX_HOPS: u8 = 64;

#[derive(Debug)]
pub struct Node {
    pub id: usize,
    pub range: f32,
    pub position: Position,
    pub enabled: bool,
    pub ieee_address: Ieee802154Address,
    pub ip_address: Ipv6Address,
    pub rpl: Rpl,
    pub orchestra: Orchestra,
    /// Frames the node could not queue or route.
    pub dropped: usize,
    now: Instant,
}

impl Node {
    pub fn new(id: usize, rpl: RplConfig, now: Instant) -> Self {
        let ieee_address = Ieee802154Address::Extended((id as u64 + 1).to_be_bytes());
        let ip_address = ieee_address.as_link_local_address().unwrap();
        let rpl = Rpl::new(rpl.with_seed(id as u64 + 1), ieee_address, now);
        let orchestra = Orchestra::new(ieee_address, OrchestraConfig::default()).unwrap();

        Self {
            id,
            range: RANGE,
            position: Position::default(),
            enabled: true,
            ieee_address,
            ip_address,
            rpl,
            orchestra,
            dropped: 0,
            now,
        }
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn in_range(&self, other: &Position) -> bool {
        self.position.distance(other) < self.range
    }

    pub fn poll(&mut self, now: Instant) {
        self.now = now;
        self.rpl.poll(now);
        self.orchestra.process_notifications(&mut self.rpl);
    }

    /// Frame every message the engine emitted.
    pub fn transmit(&mut self, now: Instant) -> Vec<Message> {
        let outgoing: Vec<_> = self.rpl.drain_outbox().collect();
        let mut frames = vec![];
        for out in outgoing {
            let Some(to) = self.next_hop(&out.dst) else {
                self.dropped += 1;
                continue;
            };
            frames.push(self.frame(now, to, out.src, out.dst, out.payload.to_vec(), 0));
        }
        frames
    }

    pub fn receive(&mut self, msg: &Message) {
        let pushed = Event::packet(msg.src, msg.dst, &msg.data)
            .and_then(|event| self.rpl.push_event(event));
        if pushed.is_err() {
            self.dropped += 1;
        }
    }

    /// Route a frame that is not for us one hop further.
    pub fn forward(&mut self, msg: &Message) -> Option<Message> {
        if msg.hops >= MAX_HOPS {
            self.dropped += 1;
            return None;
        }
        let Some(to) = self.next_hop(&msg.dst) else {
            self.dropped += 1;
            return None;
        };
        let data = msg.data.clone();
        Some(self.frame(self.now, to, msg.src, msg.dst, data, msg.hops + 1))
    }

    /// The outcome of a unicast frame we sent.
    pub fn link_tx(&mut self, to: Ieee802154Address, status: TxStatus) {
        let numtx = if status == TxStatus::Ok { 1 } else { 3 };
        let event = Event::LinkTx {
            neighbor: to,
            status,
            numtx,
        };
        if self.rpl.push_event(event).is_err() {
            self.dropped += 1;
        }
        self.orchestra.packet_sent(&to, status);
    }

    fn frame(
        &self,
        at: Instant,
        to: Ieee802154Address,
        src: Ipv6Address,
        dst: Ipv6Address,
        data: Vec<u8>,
        hops: u8,
    ) -> Message {
        let cell = self.orchestra.packet_ready(&Packet {
            dst: to,
            kind: FrameKind::Data,
        });
        Message {
            at,
            to,
            from: (self.id, self.position),
            src,
            dst,
            data,
            hops,
            cell,
        }
    }

    fn next_hop(&self, dst: &Ipv6Address) -> Option<Ieee802154Address> {
        if dst.is_multicast() {
            return Some(Ieee802154Address::BROADCAST);
        }
        if dst.is_link_local() {
            return Some(Ieee802154Address::from_ipv6_iid(dst));
        }
        if let Some(route) = self.rpl.source_route(dst) {
            return route.first_hop().map(|hop| Ieee802154Address::from_ipv6_iid(&hop));
        }
        self.rpl
            .routes()
            .lookup(dst, self.now)
            .map(|route| Ieee802154Address::from_ipv6_iid(&route.via_router))
    }
}
