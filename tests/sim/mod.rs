//! A deterministic radio simulator: nodes on a plane, each running its own
//! RPL engine and Orchestra scheduler, exchanging the control messages
//! they emit with every node within range.

use std::collections::VecDeque;

use rpl_orchestra::iface::rpl::{RootConfig, RplConfig};
use rpl_orchestra::iface::TxStatus;
use rpl_orchestra::time::*;
use rpl_orchestra::wire::*;

mod message;
mod node;

pub use message::Message;
pub use node::Node;

/// Frames addressed to a node further away than this are lost.
pub const RANGE: f32 = 101.;

pub fn prefix() -> Ipv6Cidr {
    Ipv6Cidr::new(Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, 0), 64)
}

pub fn root_config(mop: RplModeOfOperation) -> RplConfig {
    RplConfig::new(mop).add_root_config(RootConfig::default().with_prefix(prefix()))
}

/// A root at the origin and `levels` rings of `nodes` nodes around it,
/// 100 units apart: every ring only reaches the next one.
pub fn topology(
    mut sim: NetworkSim,
    mop: RplModeOfOperation,
    nodes: usize,
    levels: usize,
) -> NetworkSim {
    let pos = Position((0., 0.));
    let root = sim.create_node(root_config(mop));
    root.set_position(pos);

    let interval = (2. * std::f64::consts::PI / nodes as f64) as f32;
    for level in 0..levels {
        for node in 0..nodes {
            let node_p = (
                pos.x() + 100. * f32::cos(interval * node as f32) * (level + 1) as f32,
                pos.y() + 100. * f32::sin(interval * node as f32) * (level + 1) as f32,
            );
            let node = sim.create_node(RplConfig::new(mop));
            node.set_position(node_p.into());
        }
    }

    sim
}

#[derive(Debug)]
pub struct NetworkSim {
    pub nodes: Vec<Node>,
    pub messages: Vec<Message>,
    pub now: Instant,
}

impl Default for NetworkSim {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSim {
    pub fn new() -> Self {
        Self {
            nodes: vec![],
            messages: vec![],
            now: Instant::ZERO,
        }
    }

    pub fn create_node(&mut self, rpl: RplConfig) -> &mut Node {
        let id = self.nodes.len();
        self.nodes.push(Node::new(id, rpl, self.now));
        &mut self.nodes[id]
    }

    /// Every message sent so far, forwarded copies included.
    pub fn msgs(&self) -> &[Message] {
        &self.messages
    }

    pub fn get_node_from_ip_address(&self, address: Ipv6Address) -> Option<&Node> {
        self.nodes.iter().find(|node| node.rpl.has_address(&address))
    }

    pub fn get_node_from_ieee(&self, destination: Ieee802154Address) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|node| node.ieee_address == destination)
    }

    fn get_node_from_ieee_mut(&mut self, destination: Ieee802154Address) -> Option<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|node| node.ieee_address == destination)
    }

    /// Run for `duration`, polling at least every `step`.
    pub fn run(&mut self, step: Duration, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            let next = self.on_tick(self.now);
            let step = next
                .map_or(step, |next| next.min(step))
                .max(Duration::from_millis(1));
            self.now += step;
        }
    }

    /// Poll every node, then deliver what they sent. Returns how long the
    /// nodes can wait before the next tick.
    pub fn on_tick(&mut self, now: Instant) -> Option<Duration> {
        let mut in_flight = VecDeque::new();
        for node in self.nodes.iter_mut().filter(|n| n.enabled) {
            node.poll(now);
            in_flight.extend(node.transmit(now));
        }

        while let Some(msg) = in_flight.pop_front() {
            self.messages.push(msg.clone());
            if let Some(forwarded) = self.deliver(msg) {
                in_flight.push_back(forwarded);
            }
        }

        self.nodes
            .iter()
            .filter(|n| n.enabled)
            .filter_map(|n| n.rpl.poll_delay(now))
            .min()
    }

    /// Hand a frame to the nodes that hear it. A unicast frame for another
    /// node is forwarded, and the forwarded copy returned.
    fn deliver(&mut self, msg: Message) -> Option<Message> {
        if msg.is_broadcast() {
            for node in self.nodes.iter_mut() {
                if node.enabled && node.id != msg.from.0 && node.in_range(&msg.from.1) {
                    node.receive(&msg);
                }
            }
            return None;
        }

        let received = match self.get_node_from_ieee_mut(msg.to) {
            Some(node) if node.enabled && node.in_range(&msg.from.1) => {
                if node.rpl.has_address(&msg.dst) {
                    node.receive(&msg);
                    Some(None)
                } else {
                    Some(node.forward(&msg))
                }
            }
            _ => None,
        };

        let status = if received.is_some() {
            TxStatus::Ok
        } else {
            TxStatus::NoAck
        };
        self.nodes[msg.from.0].link_tx(msg.to, status);

        received.flatten()
    }
}

#[derive(Debug, PartialEq, PartialOrd, Copy, Clone, Default)]
pub struct Position(pub (f32, f32));

impl Position {
    pub fn distance(&self, other: &Self) -> f32 {
        ((other.0 .0 - self.0 .0).powf(2.0) + (other.0 .1 - self.0 .1).powf(2.0)).sqrt()
    }

    pub fn x(&self) -> f32 {
        self.0 .0
    }

    pub fn y(&self) -> f32 {
        self.0 .1
    }
}

impl From<(f32, f32)> for Position {
    fn from(pos: (f32, f32)) -> Self {
        Position(pos)
    }
}
