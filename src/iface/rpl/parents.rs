use heapless::Vec;

use crate::config::{RPL_MAX_PARENTS, RPL_PARENT_POOL_SIZE};
use crate::time::Instant;
use crate::wire::{Ipv6Address, RplMetricContainer, RplSequenceCounter};

use super::{rank::Rank, DagRef};

/// A candidate parent: a neighbor that advertised a DIO for one of our
/// DODAGs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Parent {
    /// Link-local address of the neighbor.
    pub address: Ipv6Address,
    pub dag: DagRef,
    /// Rank advertised by the neighbor.
    pub rank: Rank,
    pub dtsn: RplSequenceCounter,
    /// Link cost as maintained by the objective function.
    pub link_metric: u16,
    pub(crate) link_metric_valid: bool,
    /// Metric container of the last DIO.
    pub mc: Option<RplMetricContainer>,
    /// The rank must be recalculated on the next periodic tick.
    pub(crate) updated: bool,
    pub last_heard: Instant,
}

impl Parent {
    pub(crate) fn new(
        address: Ipv6Address,
        dag: DagRef,
        rank: Rank,
        dtsn: RplSequenceCounter,
        link_metric: u16,
        now: Instant,
    ) -> Self {
        Self {
            address,
            dag,
            rank,
            dtsn,
            link_metric,
            link_metric_valid: false,
            mc: None,
            updated: false,
            last_heard: now,
        }
    }
}

/// A generation-checked index into the [`ParentTable`].
///
/// A handle outlives the parent it points to: once the slot is reused, the
/// generation differs and the handle resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParentHandle {
    index: u16,
    generation: u16,
}

pub(crate) type ParentHandles = Vec<ParentHandle, RPL_PARENT_POOL_SIZE>;

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u16,
    parent: Option<Parent>,
}

impl Slot {
    const EMPTY: Self = Self {
        generation: 0,
        parent: None,
    };
}

/// The parent pool, shared by every DODAG of every instance.
///
/// At most [`RPL_MAX_PARENTS`] parents belong to the same DODAG.
#[derive(Debug)]
pub struct ParentTable {
    slots: [Slot; RPL_PARENT_POOL_SIZE],
}

impl Default for ParentTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ParentTable {
    pub const fn new() -> Self {
        Self {
            slots: [Slot::EMPTY; RPL_PARENT_POOL_SIZE],
        }
    }

    /// Store a new parent. Fails when the pool or the parent set of its
    /// DODAG is full.
    pub(crate) fn alloc(&mut self, parent: Parent) -> Option<ParentHandle> {
        if self.count(parent.dag) >= RPL_MAX_PARENTS {
            return None;
        }

        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.parent.is_none())?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.parent = Some(parent);

        Some(ParentHandle {
            index: index as u16,
            generation: slot.generation,
        })
    }

    pub fn get(&self, handle: ParentHandle) -> Option<&Parent> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.parent.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: ParentHandle) -> Option<&mut Parent> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.parent.as_mut()
    }

    pub(crate) fn remove(&mut self, handle: ParentHandle) -> Option<Parent> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.parent.take()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParentHandle, &Parent)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.parent.as_ref().map(|p| {
                (
                    ParentHandle {
                        index: index as u16,
                        generation: slot.generation,
                    },
                    p,
                )
            })
        })
    }

    /// The parent with this address in `dag`.
    pub fn find(&self, dag: DagRef, address: &Ipv6Address) -> Option<ParentHandle> {
        self.iter()
            .find(|(_, p)| p.dag == dag && p.address == *address)
            .map(|(h, _)| h)
    }

    /// The parent with this address in any DODAG of `instance`.
    pub fn find_in_instance(&self, instance: usize, address: &Ipv6Address) -> Option<ParentHandle> {
        self.iter()
            .find(|(_, p)| p.dag.instance == instance && p.address == *address)
            .map(|(h, _)| h)
    }

    /// The parent with this address in any DODAG of any instance.
    pub fn find_any(&self, address: &Ipv6Address) -> Option<ParentHandle> {
        self.iter()
            .find(|(_, p)| p.address == *address)
            .map(|(h, _)| h)
    }

    /// Handles of the parents of `dag`, collected so that the caller may
    /// mutate the table while walking them.
    pub(crate) fn handles_in(&self, dag: DagRef) -> ParentHandles {
        self.iter()
            .filter(|(_, p)| p.dag == dag)
            .map(|(h, _)| h)
            .collect()
    }

    pub(crate) fn handles(&self) -> ParentHandles {
        self.iter().map(|(h, _)| h).collect()
    }

    pub fn count(&self, dag: DagRef) -> usize {
        self.iter().filter(|(_, p)| p.dag == dag).count()
    }

    /// The parent of `dag` with the highest rank, other than `except`.
    pub(crate) fn worst(&self, dag: DagRef, except: Option<ParentHandle>) -> Option<ParentHandle> {
        self.iter()
            .filter(|(h, p)| p.dag == dag && Some(*h) != except)
            .max_by_key(|(_, p)| p.rank.value())
            .map(|(h, _)| h)
    }
}
