//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The neighbor table and its state machine (spec.md §3 "Neighbor", §4.A).

use std::collections::BTreeSet;
use std::net::Ipv6Addr;

use chrono::{DateTime, Utc};
use ospf6_mdr_utils::task::{IntervalTask, TimeoutTask};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collections::NeighborId;
use crate::lsa::LsaKey;
use crate::privdata::PrivateDataList;
use nsm::{Event, State};

/// A neighbor is identified on the wire by its link-local source address
/// before its router-id has even been confirmed; `net_id_tree` in
/// [`crate::collections::Neighbors`] looks neighbors up by this key so an
/// incoming Hello can be matched before state is known.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NeighborNetId(pub Ipv6Addr);

/// MDR-specific bookkeeping for a neighbor (spec.md §3 "Neighbor" MDR
/// sub-record, §4.B).
#[derive(Clone, Debug, Default)]
pub struct NeighborMdr {
    pub hops: u8,
    pub hops2: u8,
    pub dependent: bool,
    pub sel_adv: bool,
    pub routable: bool,
    pub reverse_2way: bool,
    pub report_2hop: bool,
    pub abit: bool,
    pub dependent_selector: bool,
    pub child: bool,
    pub mdr_level: MdrLevel,
    /// Index into the election engine's transient cost/adjacency matrices
    /// for the current run; `None` between runs.
    pub cost_matrix_index: Option<usize>,
    pub consec_hellos: u8,
    pub hsn: u32,
    pub list_type: NeighborListType,
    pub changed_hsn: u32,
    pub rnl: Vec<u32>,
    pub dnl: Vec<u32>,
    pub sanl: Vec<u32>,
}

/// Which of the three neighbor-selection lists (if any) this neighbor is
/// reported in on the last Hello/DD sent (spec.md §4.B, §4.C).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NeighborListType {
    #[default]
    None,
    Rnl,
    Dnl,
    Sanl,
}

/// A router's self-reported MDR election level (spec.md §3 "MDR interface
/// sub-record"): also used to record a neighbor's last-reported level.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MdrLevel {
    #[default]
    Other,
    Bmdr,
    Mdr,
}

/// Snapshot of the last Database Description packet received from this
/// neighbor, used to detect retransmissions during ExStart/Exchange.
#[derive(Clone, Copy, Debug)]
pub struct LastDbDesc {
    pub options: u32,
    pub flags: u8,
    pub seq_no: u32,
}

#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub inactivity_timer: Option<TimeoutTask>,
    pub dbdesc_free_timer: Option<TimeoutTask>,
    /// Retransmits the last sent Database Description packet until this
    /// neighbor acknowledges it by advancing the sequence number; armed on
    /// entering `ExStart` and dropped (cancelling it) once the exchange
    /// moves past `Exchange`.
    pub rxmt_interval: Option<IntervalTask>,
}

#[derive(Debug)]
pub struct Neighbor {
    pub id: NeighborId,
    pub router_id: u32,
    pub src: Ipv6Addr,
    pub priority: u8,
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    pub state: State,
    pub options: u32,
    pub dd_flags: u8,
    pub dd_seq_no: u32,
    pub last_rcvd_dbdesc: Option<LastDbDesc>,

    // Retransmission/summary/request lists. LSA content lives in the
    // external LSDB collaborator; this crate tracks only the keys it must
    // retransmit, summarize or request.
    pub ls_retransmit: BTreeSet<LsaKey>,
    pub ls_summary: BTreeSet<LsaKey>,
    pub ls_request: BTreeSet<LsaKey>,

    pub mdr: NeighborMdr,
    pub privdata: PrivateDataList,

    pub discontinuity_time: DateTime<Utc>,
    pub tasks: NeighborTasks,
}

// Neighbor state machine, unchanged from RFC 2328 §10.3/RFC 5340 with the
// MDR additions noted inline (spec.md §4.A "Key behaviors").
pub mod nsm {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Attempt,
        Init,
        TwoWay,
        ExStart,
        Exchange,
        Loading,
        Full,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        HelloRcvd,
        Start,
        TwoWayRcvd,
        NegotiationDone,
        ExchangeDone,
        BadLsReq,
        LoadingDone,
        AdjOk,
        SeqNoMismatch,
        OneWayRcvd,
        Kill,
        InactivityTimer,
        LinkDown,
    }
}

impl Neighbor {
    pub(crate) fn new(
        id: NeighborId,
        router_id: u32,
        net_id: NeighborNetId,
    ) -> Neighbor {
        debug!(%router_id, "neighbor created");

        Neighbor {
            id,
            router_id,
            src: net_id.0,
            priority: 0,
            dr: None,
            bdr: None,
            state: State::Down,
            options: 0,
            dd_flags: 0,
            dd_seq_no: 0,
            last_rcvd_dbdesc: None,
            ls_retransmit: BTreeSet::new(),
            ls_summary: BTreeSet::new(),
            ls_request: BTreeSet::new(),
            mdr: NeighborMdr::default(),
            privdata: PrivateDataList::default(),
            discontinuity_time: Utc::now(),
            tasks: NeighborTasks::default(),
        }
    }

    /// Validates `event` against the current state and returns the next
    /// state, or `None` if the event is a no-op in this state. Unlike a
    /// plain RFC 2328 DFA, `TwoWay` may be held across adjacency-reduction
    /// transitions: MDR neighbors that are not selected as adjacency
    /// targets stay at `TwoWay` forever and this is not an error (spec.md
    /// §4.A "a": "every transition above TwoWay requires either an MDR
    /// dependency ... or DR/BDR adjacency").
    pub(crate) fn fsm(&self, event: Event) -> Option<State> {
        let state = self.state;

        match (state, event) {
            (State::Down, Event::Start) => Some(State::Attempt),

            (State::Attempt | State::Down, Event::HelloRcvd) => {
                Some(State::Init)
            }

            (
                State::Init
                | State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::HelloRcvd,
            ) => None,

            (State::Init, Event::TwoWayRcvd)
            | (State::TwoWay, Event::AdjOk) => {
                if self.should_become_adjacent() {
                    Some(State::ExStart)
                } else {
                    Some(State::TwoWay)
                }
            }

            (State::ExStart, Event::NegotiationDone) => {
                Some(State::Exchange)
            }

            (State::Exchange, Event::ExchangeDone) => {
                if self.ls_request.is_empty() {
                    Some(State::Full)
                } else {
                    Some(State::Loading)
                }
            }

            (State::Loading, Event::LoadingDone) => Some(State::Full),

            (
                State::ExStart | State::Exchange | State::Loading | State::Full,
                Event::AdjOk,
            ) => {
                if !self.should_become_adjacent() {
                    Some(State::TwoWay)
                } else {
                    None
                }
            }

            (
                State::Exchange | State::Loading | State::Full,
                Event::SeqNoMismatch | Event::BadLsReq,
            ) => Some(State::ExStart),

            (_, Event::Kill | Event::LinkDown | Event::InactivityTimer) => {
                Some(State::Down)
            }

            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::OneWayRcvd,
            ) => Some(State::Init),

            (State::Init, Event::OneWayRcvd) => None,

            _ => None,
        }
    }

    /// Whether MDR dependency or DR/BDR adjacency currently justifies
    /// forming a full adjacency with this neighbor (spec.md §4.B
    /// "dependent"/"sel_adv" flags drive this in place of RFC 2328's
    /// "is this neighbor the DR/BDR or am I").
    fn should_become_adjacent(&self) -> bool {
        self.mdr.dependent || self.mdr.sel_adv
    }

    /// Clears the three LSA lists and any pending retransmission counts,
    /// per spec.md §4.A "b": "on any->=TwoWay, all three lists are
    /// emptied".
    pub(crate) fn clear_lsa_lists(&mut self) {
        self.ls_retransmit.clear();
        self.ls_summary.clear();
        self.ls_request.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(state: State) -> Neighbor {
        let mut nbr = Neighbor::new(
            1,
            1,
            NeighborNetId("fe80::1".parse().unwrap()),
        );
        nbr.state = state;
        nbr
    }

    #[test]
    fn two_way_neighbor_without_mdr_dependency_stays_two_way() {
        let nbr = neighbor(State::Init);
        assert_eq!(nbr.fsm(Event::TwoWayRcvd), Some(State::TwoWay));
    }

    #[test]
    fn two_way_neighbor_with_mdr_dependency_starts_adjacency() {
        let mut nbr = neighbor(State::Init);
        nbr.mdr.dependent = true;
        assert_eq!(nbr.fsm(Event::TwoWayRcvd), Some(State::ExStart));
    }

    #[test]
    fn loading_falls_back_to_exstart_on_seqno_mismatch() {
        let nbr = neighbor(State::Loading);
        assert_eq!(nbr.fsm(Event::SeqNoMismatch), Some(State::ExStart));
    }

    #[test]
    fn any_state_drops_to_down_on_inactivity_timer() {
        let nbr = neighbor(State::Full);
        assert_eq!(nbr.fsm(Event::InactivityTimer), Some(State::Down));
    }

    #[test]
    fn full_adjacency_requires_empty_request_list() {
        let mut nbr = neighbor(State::Exchange);
        nbr.ls_request.insert(LsaKey {
            lsa_type: crate::lsa::LsaType::Router,
            lsa_id: 0,
            adv_router: 2,
        });
        assert_eq!(nbr.fsm(Event::ExchangeDone), Some(State::Loading));
        nbr.ls_request.clear();
        assert_eq!(nbr.fsm(Event::ExchangeDone), Some(State::Full));
    }
}
