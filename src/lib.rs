#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

//! The RPL control plane (RFC 6550) for low-power and lossy networks,
//! together with the Orchestra autonomous TSCH scheduler.
//!
//! The crate is organised like a small network stack:
//!
//!  * [wire] parses and emits RPL control messages, their options and the
//!    RPL Hop-by-Hop option.
//!  * [iface] holds the routing and neighbor tables and the RPL engine
//!    itself ([iface::rpl::Rpl]), driven by an explicit event queue.
//!  * [tsch] holds the TSCH schedule and the Orchestra rules that derive
//!    it from the RPL topology.
//!
//! Everything runs single-threaded: events are pushed into the engine and
//! processed to completion by [iface::rpl::Rpl::poll]. All storage is
//! statically sized through the constants in [config].

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("You must enable at most one of the following features: defmt, log");

#[cfg(not(any(
    feature = "proto-rpl-of0",
    feature = "proto-rpl-mrhof",
    feature = "proto-rpl-fuzzy"
)))]
compile_error!(
    "You must enable at least one objective function: proto-rpl-of0, proto-rpl-mrhof, proto-rpl-fuzzy"
);

#[macro_use]
mod macros;

pub mod config;
pub mod iface;
pub mod rand;
pub mod time;
#[cfg(feature = "orchestra")]
pub mod tsch;
pub mod wire;
