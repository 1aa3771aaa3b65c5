// The IPv6 neighbor table shared with the RPL engine. Reachability states
// follow RFC 4861 § 7.3.2, link statistics follow the usual EWMA ETX
// estimator of 802.15.4 stacks.

use heapless::Vec;

use crate::config::NEIGHBOR_TABLE_SIZE;
use crate::time::{Duration, Instant};
use crate::wire::{Ieee802154Address, Ipv6Address};

/// Fixed point divisor of ETX values.
pub const ETX_DIVISOR: u16 = 128;

/// Reachability state of a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NeighborState {
    Incomplete,
    Reachable,
    Stale,
    Delay,
    Probe,
}

/// Outcome of a link-layer transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxStatus {
    Ok,
    NoAck,
    Collision,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NeighborTableFull;

impl core::fmt::Display for NeighborTableFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Neighbor table full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for NeighborTableFull {}

/// Per-neighbor link statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    /// ETX estimate, fixed point with divisor [`ETX_DIVISOR`].
    pub etx: u16,
    /// Smoothed received signal strength, in dBm.
    pub rssi: i16,
    /// Number of transmissions the estimate is based on, saturating.
    pub freshness: u8,
    pub last_tx: Option<Instant>,
    pub tx_count: u16,
    pub ack_count: u16,
}

impl LinkStats {
    const INIT_ETX: u16 = 2 * ETX_DIVISOR;
    const NOACK_PENALTY: u16 = 12;
    const EWMA_SCALE: u32 = 100;
    const EWMA_ALPHA: u32 = 15;
    const EWMA_BOOTSTRAP_ALPHA: u32 = 30;
    const FRESHNESS_MAX: u8 = 16;
    const FRESHNESS_TARGET: u8 = 4;
    const FRESHNESS_EXPIRATION: Duration = Duration::from_secs(10 * 60);
    const RSSI_UNKNOWN: i16 = 0x7fff;

    /// Update the statistics after a unicast transmission to the neighbor.
    pub fn packet_sent(&mut self, status: TxStatus, numtx: u8, now: Instant) {
        if !matches!(status, TxStatus::Ok | TxStatus::NoAck) {
            // Collisions and errors say nothing about the link.
            return;
        }

        self.tx_count = self.tx_count.saturating_add(numtx as u16);
        if status == TxStatus::Ok {
            self.ack_count = self.ack_count.saturating_add(1);
        }
        self.last_tx = Some(now);

        let packet_etx = if status == TxStatus::NoAck {
            Self::NOACK_PENALTY * ETX_DIVISOR
        } else {
            numtx.max(1) as u16 * ETX_DIVISOR
        };

        let alpha = if self.freshness < Self::FRESHNESS_TARGET {
            Self::EWMA_BOOTSTRAP_ALPHA
        } else {
            Self::EWMA_ALPHA
        };
        let etx = (self.etx as u32 * (Self::EWMA_SCALE - alpha) + packet_etx as u32 * alpha)
            / Self::EWMA_SCALE;
        self.etx = etx.min(u16::MAX as u32) as u16;

        self.freshness = self
            .freshness
            .saturating_add(numtx)
            .min(Self::FRESHNESS_MAX);
    }

    /// Update the statistics for a frame received from the neighbor.
    pub fn packet_received(&mut self, rssi: i16) {
        if self.rssi == Self::RSSI_UNKNOWN {
            self.rssi = rssi;
        } else {
            let scale = Self::EWMA_SCALE as i32;
            let alpha = Self::EWMA_ALPHA as i32;
            self.rssi = ((self.rssi as i32 * (scale - alpha) + rssi as i32 * alpha) / scale) as i16;
        }
    }

    pub fn has_rssi(&self) -> bool {
        self.rssi != Self::RSSI_UNKNOWN
    }

    /// Whether the estimate is based on enough recent transmissions.
    pub fn is_fresh(&self, now: Instant) -> bool {
        match self.last_tx {
            Some(last_tx) => {
                self.freshness >= Self::FRESHNESS_TARGET
                    && now.saturating_duration_since(last_tx) < Self::FRESHNESS_EXPIRATION
            }
            None => false,
        }
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self {
            etx: Self::INIT_ETX,
            rssi: Self::RSSI_UNKNOWN,
            freshness: 0,
            last_tx: None,
            tx_count: 0,
            ack_count: 0,
        }
    }
}

/// A neighbor entry: protocol address, hardware address and state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Neighbor {
    pub ip_addr: Ipv6Address,
    pub hardware_addr: Ieee802154Address,
    pub state: NeighborState,
    pub stats: LinkStats,
    pub updated_at: Instant,
}

impl Neighbor {
    pub fn is_reachable(&self) -> bool {
        self.state != NeighborState::Incomplete
    }
}

/// The neighbor table.
#[derive(Debug, Default)]
pub struct NeighborTable {
    storage: Vec<Neighbor, NEIGHBOR_TABLE_SIZE>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.storage.iter()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn lookup(&self, ip_addr: &Ipv6Address) -> Option<&Neighbor> {
        self.storage.iter().find(|n| n.ip_addr == *ip_addr)
    }

    pub fn lookup_mut(&mut self, ip_addr: &Ipv6Address) -> Option<&mut Neighbor> {
        self.storage.iter_mut().find(|n| n.ip_addr == *ip_addr)
    }

    pub fn lookup_hardware(&self, hardware_addr: &Ieee802154Address) -> Option<&Neighbor> {
        self.storage
            .iter()
            .find(|n| n.hardware_addr == *hardware_addr)
    }

    /// Insert or refresh a neighbor.
    ///
    /// When the table is full, the least recently updated neighbor that is
    /// not reachable is evicted.
    pub fn fill(
        &mut self,
        ip_addr: Ipv6Address,
        hardware_addr: Ieee802154Address,
        state: NeighborState,
        now: Instant,
    ) -> Result<&mut Neighbor, NeighborTableFull> {
        if let Some(i) = self.storage.iter().position(|n| n.ip_addr == ip_addr) {
            let neighbor = &mut self.storage[i];
            if neighbor.hardware_addr != hardware_addr {
                net_trace!(
                    "neighbor: replaced {} => {} (was {})",
                    ip_addr,
                    hardware_addr,
                    neighbor.hardware_addr
                );
                neighbor.hardware_addr = hardware_addr;
            }
            neighbor.state = state;
            neighbor.updated_at = now;
            return Ok(neighbor);
        }

        let neighbor = Neighbor {
            ip_addr,
            hardware_addr,
            state,
            stats: LinkStats::default(),
            updated_at: now,
        };

        if self.storage.is_full() {
            let victim = self
                .storage
                .iter()
                .enumerate()
                .filter(|(_, n)| n.state != NeighborState::Reachable)
                .min_by_key(|(_, n)| n.updated_at)
                .map(|(i, _)| i)
                .ok_or(NeighborTableFull)?;
            net_trace!("neighbor: evicted {}", self.storage[victim].ip_addr);
            self.storage.swap_remove(victim);
        }

        net_trace!("neighbor: filled {} => {}", ip_addr, hardware_addr);
        self.storage.push(neighbor).map_err(|_| NeighborTableFull)?;
        let last = self.storage.len() - 1;
        Ok(&mut self.storage[last])
    }

    /// Change the reachability state, returning the previous one.
    pub fn set_state(
        &mut self,
        ip_addr: &Ipv6Address,
        state: NeighborState,
        now: Instant,
    ) -> Option<NeighborState> {
        let neighbor = self.lookup_mut(ip_addr)?;
        let old = neighbor.state;
        neighbor.state = state;
        neighbor.updated_at = now;
        Some(old)
    }

    pub fn remove(&mut self, ip_addr: &Ipv6Address) -> Option<Neighbor> {
        let i = self.storage.iter().position(|n| n.ip_addr == *ip_addr)?;
        Some(self.storage.swap_remove(i))
    }

    /// Whether the neighbor is known and not marked unreachable.
    pub fn is_reachable(&self, ip_addr: &Ipv6Address) -> bool {
        self.lookup(ip_addr).is_some_and(Neighbor::is_reachable)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr(i: u16) -> Ipv6Address {
        Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, i)
    }

    fn ll(i: u8) -> Ieee802154Address {
        Ieee802154Address::Short([0, i])
    }

    #[test]
    fn fill_and_lookup() {
        let mut table = NeighborTable::new();
        table
            .fill(addr(1), ll(1), NeighborState::Reachable, Instant::ZERO)
            .unwrap();
        assert_eq!(table.lookup(&addr(1)).unwrap().hardware_addr, ll(1));
        assert_eq!(table.lookup_hardware(&ll(1)).unwrap().ip_addr, addr(1));
        assert!(table.is_reachable(&addr(1)));

        table
            .fill(addr(1), ll(9), NeighborState::Stale, Instant::from_secs(1))
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(&addr(1)).unwrap().hardware_addr, ll(9));
    }

    #[test]
    fn full_table_evicts_oldest_unreachable() {
        let mut table = NeighborTable::new();
        for i in 0..NEIGHBOR_TABLE_SIZE as u16 {
            let state = if i == 3 || i == 5 {
                NeighborState::Stale
            } else {
                NeighborState::Reachable
            };
            table
                .fill(addr(i), ll(i as u8), state, Instant::from_secs(i as i64))
                .unwrap();
        }

        table
            .fill(addr(100), ll(100), NeighborState::Reachable, Instant::from_secs(100))
            .unwrap();
        assert!(table.lookup(&addr(3)).is_none());
        assert!(table.lookup(&addr(5)).is_some());
    }

    #[test]
    fn full_table_of_reachable_neighbors() {
        let mut table = NeighborTable::new();
        for i in 0..NEIGHBOR_TABLE_SIZE as u16 {
            table
                .fill(addr(i), ll(i as u8), NeighborState::Reachable, Instant::ZERO)
                .unwrap();
        }
        assert_eq!(
            table
                .fill(addr(100), ll(100), NeighborState::Reachable, Instant::ZERO)
                .err(),
            Some(NeighborTableFull)
        );
    }

    #[test]
    fn etx_follows_transmissions() {
        let mut stats = LinkStats::default();
        assert_eq!(stats.etx, 2 * ETX_DIVISOR);

        for i in 0..20 {
            stats.packet_sent(TxStatus::Ok, 1, Instant::from_secs(i));
        }
        assert!(stats.etx < 2 * ETX_DIVISOR);
        assert!(stats.etx >= ETX_DIVISOR);
        assert!(stats.is_fresh(Instant::from_secs(20)));
        assert!(!stats.is_fresh(Instant::from_secs(20 + 11 * 60)));

        let before = stats.etx;
        stats.packet_sent(TxStatus::NoAck, 3, Instant::from_secs(21));
        assert!(stats.etx > before);

        let before = stats;
        stats.packet_sent(TxStatus::Collision, 1, Instant::from_secs(22));
        assert_eq!(stats, before);
    }

    #[test]
    fn rssi_smoothing() {
        let mut stats = LinkStats::default();
        assert!(!stats.has_rssi());
        stats.packet_received(-60);
        assert_eq!(stats.rssi, -60);
        stats.packet_received(-80);
        assert_eq!(stats.rssi, -63);
    }
}
