//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Interfaces and the interface state machine (spec.md §3 "MDR interface
//! sub-record", §4.D).

use std::net::Ipv6Addr;

use ospf6_mdr_utils::task::{IntervalTask, TimeoutTask};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collections::{AreaIndex, InterfaceId, NeighborIndex};
use crate::error::Error;
use crate::neighbor::MdrLevel;
use crate::privdata::PrivateDataList;
use ism::{Event, State};

/// Interface-level wire/physical type, unchanged from RFC 2328's
/// classification with `Mdr` added as the adjacency-reduced broadcast mode
/// (spec.md §4.D "InterfaceUp on an MDR-typed interface goes directly to
/// PointToPoint").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum InterfaceType {
    Broadcast,
    PointToPoint,
    Mdr,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AdjConnectivity {
    Fully,
    Uni,
    Bi,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaFullness {
    Min,
    MinCost,
    MinCost2Paths,
    MdrFull,
    Full,
}

/// Tunable knobs plus election outputs/transient state for an MDR-capable
/// interface (spec.md §3 "MDR interface sub-record").
#[derive(Debug)]
pub struct InterfaceMdr {
    // Tunables.
    pub adj_connectivity: AdjConnectivity,
    pub lsa_fullness: LsaFullness,
    pub mdr_constraint: u8,
    pub two_hop_refresh: u8,
    pub hello_repeat_count: u8,
    pub backup_wait_interval: u16,
    pub ack_interval: u16,
    pub consec_hello_threshold: u8,

    // Election outputs.
    pub mdr_level: MdrLevel,
    pub nonflooding_mdr: bool,
    pub parent: Option<u32>,
    pub bparent: Option<u32>,

    // Per-hello counters.
    pub hsn: u32,
    pub full_hello_count: u32,

    // Whether a just-completed SPF run's routable-neighbor set should be
    // re-derived immediately rather than waiting for the next Hello
    // (spec.md §4.E "update_routable_neighbors_immediately flag").
    pub update_routable_neighbors_immediately: bool,

    /// Router-ids recently dropped from the neighbor table, each paired
    /// with the hsn at which the drop happened, so a stale report of the
    /// same neighbor can be distinguished from a fresh reappearance
    /// (spec.md §3 "lost neighbor list").
    pub lost_neighbor_list: Vec<(u32, u32)>,
}

impl Default for InterfaceMdr {
    fn default() -> InterfaceMdr {
        InterfaceMdr {
            adj_connectivity: AdjConnectivity::Bi,
            lsa_fullness: LsaFullness::MinCost,
            mdr_constraint: 3,
            two_hop_refresh: 1,
            hello_repeat_count: 3,
            backup_wait_interval: 0,
            ack_interval: 1,
            consec_hello_threshold: 2,
            mdr_level: MdrLevel::Other,
            nonflooding_mdr: false,
            parent: None,
            bparent: None,
            hsn: 0,
            full_hello_count: 0,
            update_routable_neighbors_immediately: false,
            lost_neighbor_list: Vec::new(),
        }
    }
}

/// System-derived attributes (ifindex, MTU, addresses) kept separate from
/// protocol configuration, mirroring the teacher's split between
/// configured and system state.
#[derive(Clone, Debug, Default)]
pub struct InterfaceSystem {
    pub ifindex: Option<u32>,
    pub mtu: Option<u16>,
    pub linklocal_addr: Option<Ipv6Addr>,
    pub passive: bool,
}

#[derive(Debug, Default)]
pub struct InterfaceTasks {
    pub hello_interval: Option<IntervalTask>,
    pub wait_timer: Option<TimeoutTask>,
}

#[derive(Debug)]
pub struct Interface {
    pub id: InterfaceId,
    pub name: String,
    pub area: Option<AreaIndex>,
    pub ifindex_config: Option<u32>,
    pub iface_type: InterfaceType,
    pub state: State,
    pub cost: u32,
    pub priority: u8,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub retransmit_interval: u16,
    pub relax_neighbor_inactivity: bool,
    pub dr: Option<u32>,
    pub bdr: Option<u32>,
    pub neighbors: Vec<NeighborIndex>,
    pub system: InterfaceSystem,
    pub mdr: InterfaceMdr,
    pub privdata: PrivateDataList,
    pub tasks: InterfaceTasks,
}

// Interface state machine (RFC 2328 §9.3, spec.md §4.D).
pub mod ism {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Loopback,
        Waiting,
        PointToPoint,
        DrOther,
        Backup,
        Dr,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        InterfaceUp,
        WaitTimer,
        BackupSeen,
        NeighborChange,
        InterfaceDown,
        AdjConnectivityChange,
        LoopAdminSet,
    }
}

impl Interface {
    pub(crate) fn new(id: InterfaceId, name: String) -> Interface {
        debug!(%name, "interface created");

        Interface {
            id,
            name,
            area: None,
            ifindex_config: None,
            iface_type: InterfaceType::Broadcast,
            state: State::Down,
            cost: 10,
            priority: 1,
            hello_interval: 2,
            dead_interval: 6,
            retransmit_interval: 5,
            relax_neighbor_inactivity: false,
            dr: None,
            bdr: None,
            neighbors: Vec::new(),
            system: InterfaceSystem::default(),
            mdr: InterfaceMdr::default(),
            privdata: PrivateDataList::default(),
            tasks: InterfaceTasks::default(),
        }
    }

    pub(crate) fn add_neighbor(&mut self, nbr_idx: NeighborIndex) {
        if !self.neighbors.contains(&nbr_idx) {
            self.neighbors.push(nbr_idx);
        }
    }

    pub(crate) fn remove_neighbor(&mut self, nbr_idx: NeighborIndex) {
        self.neighbors.retain(|idx| *idx != nbr_idx);
    }

    /// Validates `event` against the current ISM state (spec.md §4.D).
    /// `PASSIVE` forces `Loopback` regardless of the interface's physical
    /// type ("c" in §4.D).
    pub(crate) fn fsm(&self, event: Event) -> Option<State> {
        if self.system.passive {
            return match event {
                Event::InterfaceUp | Event::LoopAdminSet => {
                    Some(State::Loopback)
                }
                Event::InterfaceDown => Some(State::Down),
                _ => None,
            };
        }

        match (self.state, event) {
            (State::Down, Event::InterfaceUp) => {
                match self.iface_type {
                    InterfaceType::PointToPoint | InterfaceType::Mdr => {
                        Some(State::PointToPoint)
                    }
                    InterfaceType::Broadcast => Some(State::Waiting),
                }
            }
            (State::Waiting, Event::WaitTimer | Event::BackupSeen) => {
                None
            }
            (
                State::Waiting | State::DrOther | State::Backup | State::Dr,
                Event::NeighborChange,
            ) => None,
            (_, Event::AdjConnectivityChange) => None,
            (_, Event::InterfaceDown) => Some(State::Down),
            _ => None,
        }
    }

    /// Error::log()-compatible helper invoked when `fsm` above returns
    /// `None` for an event that the caller did not expect to be a no-op.
    pub(crate) fn unexpected_event(&self, event: Event) -> Error {
        Error::IsmUnexpectedEvent(self.id, self.state, event)
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        if !self.neighbors.is_empty() {
            warn!(name = %self.name, "interface dropped with neighbors still attached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface() -> Interface {
        Interface::new(1, "eth0".to_string())
    }

    #[test]
    fn mdr_interface_skips_waiting_state() {
        let mut i = iface();
        i.iface_type = InterfaceType::Mdr;
        assert_eq!(i.fsm(Event::InterfaceUp), Some(State::PointToPoint));
    }

    #[test]
    fn broadcast_interface_waits_for_election() {
        let i = iface();
        assert_eq!(i.fsm(Event::InterfaceUp), Some(State::Waiting));
    }

    #[test]
    fn passive_flag_forces_loopback_regardless_of_type() {
        let mut i = iface();
        i.iface_type = InterfaceType::Mdr;
        i.system.passive = true;
        assert_eq!(i.fsm(Event::InterfaceUp), Some(State::Loopback));
    }

    #[test]
    fn interface_down_resets_from_any_state() {
        let mut i = iface();
        i.state = State::Dr;
        assert_eq!(i.fsm(Event::InterfaceDown), Some(State::Down));
    }
}
