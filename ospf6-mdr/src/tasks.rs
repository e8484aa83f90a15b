//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Timer task constructors and the message types they post back to the
//! instance event loop (spec.md §5 "Concurrency & Resource Model").
//!
//! The core is single-threaded cooperative: every timer below is a
//! [`TimeoutTask`]/[`IntervalTask`] owned by the neighbor/interface/area it
//! belongs to, dropped (hence cancelled) when that owner is torn down.
//! Firing posts one [`messages::TimerMsg`] onto the instance's single timer
//! channel rather than touching any shared state directly, so all mutation
//! still happens from within `instance::Daemon`'s own `tokio::select!` turn.
//
// Tasks diagram (reduced from the teacher's, which also threads in
// northbound and LSDB-owned LSA-lifecycle timers out of scope here — the
// LSDB is an external collaborator, spec.md §1/§9):
//
//                                    +--------------+
//              ism_wait_timer (Nx) -> |              |
//               hello_interval (Nx) -> |              |
//            delayed_ack_timer (Nx) -> |              |
//                                    |              |
//       nsm_inactivity_timer (Nx) -> |   instance   |
//          dbdesc_free_timer (Nx) -> |              |
//         packet_rxmt_interval (Nx) -> |              |
//                                    |              |
//            spf_delay_timer (Nx) -> |              |
//                                    +--------------+
//

use std::time::Duration;

use ospf6_mdr_utils::task::{IntervalTask, TimeoutTask};
use tokio::sync::mpsc::UnboundedSender;

use crate::collections::{AreaId, InterfaceId, NeighborId};
use crate::interface::{Interface, ism};
use crate::neighbor::{Neighbor, nsm};
use crate::spf;

pub mod messages {
    use super::*;

    /// Everything a timer can post back to the instance event loop. One
    /// channel carries all of them, matching spec.md §5's "one mpsc channel
    /// per task-producing source" (timer firings are a single source).
    #[derive(Clone, Debug)]
    pub enum TimerMsg {
        IsmEvent(IsmEventMsg),
        NsmEvent(NsmEventMsg),
        SendHello(SendHelloMsg),
        DelayedAck(DelayedAckMsg),
        RxmtInterval(RxmtIntervalMsg),
        DbDescFree(DbDescFreeMsg),
        SpfDelayEvent(SpfDelayEventMsg),
    }

    #[derive(Clone, Debug)]
    pub struct IsmEventMsg {
        pub area_id: AreaId,
        pub iface_id: InterfaceId,
        pub event: ism::Event,
    }

    #[derive(Clone, Debug)]
    pub struct NsmEventMsg {
        pub area_id: AreaId,
        pub iface_id: InterfaceId,
        pub nbr_id: NeighborId,
        pub event: nsm::Event,
    }

    #[derive(Clone, Debug)]
    pub struct SendHelloMsg {
        pub area_id: AreaId,
        pub iface_id: InterfaceId,
    }

    #[derive(Clone, Debug)]
    pub struct DelayedAckMsg {
        pub area_id: AreaId,
        pub iface_id: InterfaceId,
    }

    #[derive(Clone, Debug)]
    pub struct RxmtIntervalMsg {
        pub area_id: AreaId,
        pub iface_id: InterfaceId,
        pub nbr_id: NeighborId,
    }

    #[derive(Clone, Debug)]
    pub struct DbDescFreeMsg {
        pub area_id: AreaId,
        pub iface_id: InterfaceId,
        pub nbr_id: NeighborId,
    }

    #[derive(Clone, Debug)]
    pub struct SpfDelayEventMsg {
        pub area_id: AreaId,
    }
}

use messages::TimerMsg;

// ===== interface tasks =====

/// Interface wait timer (spec.md §4.D `WaitTimer`): fires once, `DeadInterval`
/// after `InterfaceUp`, if no Backup has been seen by then.
pub(crate) fn ism_wait_timer(
    iface: &Interface,
    area_id: AreaId,
    timerp: &UnboundedSender<TimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_secs(iface.dead_interval.into());
        let iface_id = iface.id;
        let timerp = timerp.clone();

        TimeoutTask::new(timeout, move || async move {
            let _ = timerp.send(TimerMsg::IsmEvent(messages::IsmEventMsg {
                area_id,
                iface_id,
                event: ism::Event::WaitTimer,
            }));
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (iface, area_id, timerp);
        TimeoutTask {}
    }
}

/// Periodic Hello send (spec.md §4.C). The packet itself is generated by
/// the caller at fire time (via `SendHelloMsg`) rather than captured once at
/// task-creation time, since a Hello's contents (dependent selector, MDR
/// level, neighbor lists) can change between ticks.
pub(crate) fn hello_interval(
    iface: &Interface,
    area_id: AreaId,
    timerp: &UnboundedSender<TimerMsg>,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        let interval = Duration::from_secs(iface.hello_interval.into());
        let iface_id = iface.id;
        let timerp = timerp.clone();

        IntervalTask::new(interval, true, move || {
            let timerp = timerp.clone();
            async move {
                let _ = timerp.send(TimerMsg::SendHello(
                    messages::SendHelloMsg { area_id, iface_id },
                ));
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (iface, area_id, timerp);
        IntervalTask {}
    }
}

/// Interface delayed-Ack timer (spec.md §3 "ackinterval"). RFC 2328 §13.5's
/// guidance (shorter than RxmtInterval) is honored by the interface's
/// configured `ackinterval`, not a hardcoded constant.
pub(crate) fn delayed_ack_timer(
    iface: &Interface,
    area_id: AreaId,
    timerp: &UnboundedSender<TimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_secs(iface.mdr.ack_interval.into());
        let iface_id = iface.id;
        let timerp = timerp.clone();

        TimeoutTask::new(timeout, move || async move {
            let _ = timerp.send(TimerMsg::DelayedAck(
                messages::DelayedAckMsg { area_id, iface_id },
            ));
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (iface, area_id, timerp);
        TimeoutTask {}
    }
}

// ===== neighbor tasks =====

/// Neighbor inactivity timer (spec.md §4.A): reset on every Hello heard
/// from this neighbor, fires `DeadInterval` after the last one.
pub(crate) fn nsm_inactivity_timer(
    nbr: &Neighbor,
    iface_id: InterfaceId,
    area_id: AreaId,
    dead_interval: u16,
    timerp: &UnboundedSender<TimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_secs(dead_interval.into());
        let nbr_id = nbr.id;
        let timerp = timerp.clone();

        TimeoutTask::new(timeout, move || async move {
            let _ = timerp.send(TimerMsg::NsmEvent(messages::NsmEventMsg {
                area_id,
                iface_id,
                nbr_id,
                event: nsm::Event::InactivityTimer,
            }));
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (nbr, iface_id, area_id, dead_interval, timerp);
        TimeoutTask {}
    }
}

/// Retransmission interval for this neighbor's `ls_retransmit` list
/// (spec.md §5 "retransmission" cancellable task).
pub(crate) fn packet_rxmt_interval(
    nbr: &Neighbor,
    iface_id: InterfaceId,
    area_id: AreaId,
    retransmit_interval: u16,
    timerp: &UnboundedSender<TimerMsg>,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        let interval = Duration::from_secs(retransmit_interval.into());
        let nbr_id = nbr.id;
        let timerp = timerp.clone();

        IntervalTask::new(interval, false, move || {
            let timerp = timerp.clone();
            async move {
                let _ = timerp.send(TimerMsg::RxmtInterval(
                    messages::RxmtIntervalMsg {
                        area_id,
                        iface_id,
                        nbr_id,
                    },
                ));
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (nbr, iface_id, area_id, retransmit_interval, timerp);
        IntervalTask {}
    }
}

/// Frees a neighbor's last sent/received Database Description packets once
/// they can no longer be usefully retransmitted or compared against
/// (spec.md §5 "db-description" cancellable task).
pub(crate) fn dbdesc_free_timer(
    nbr: &Neighbor,
    iface_id: InterfaceId,
    area_id: AreaId,
    dead_interval: u16,
    timerp: &UnboundedSender<TimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_secs(dead_interval.into());
        let nbr_id = nbr.id;
        let timerp = timerp.clone();

        TimeoutTask::new(timeout, move || async move {
            let _ = timerp.send(TimerMsg::DbDescFree(
                messages::DbDescFreeMsg {
                    area_id,
                    iface_id,
                    nbr_id,
                },
            ));
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (nbr, iface_id, area_id, dead_interval, timerp);
        TimeoutTask {}
    }
}

// ===== area tasks =====

/// Arms the area's SPF-run delay/holdtime timer (spec.md §4.E "Entry
/// point"), per [`spf::SpfScheduler::next_delay`].
pub(crate) fn spf_delay_timer(
    area_id: AreaId,
    delay: Duration,
    timerp: &UnboundedSender<TimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let timerp = timerp.clone();

        TimeoutTask::new(delay, move || async move {
            let _ = timerp.send(TimerMsg::SpfDelayEvent(
                messages::SpfDelayEventMsg { area_id },
            ));
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (area_id, delay, timerp);
        TimeoutTask {}
    }
}

/// Tracks the last immediate Hello sent per interface so a flapping link
/// cannot induce a Hello storm (spec.md §5 "Immediate-Hello rate limit",
/// default `initial_immediate_hello_delay` of 2 seconds).
#[derive(Debug, Default)]
pub struct ImmediateHelloLimiter {
    last_sent: std::collections::HashMap<InterfaceId, tokio::time::Instant>,
}

pub const INITIAL_IMMEDIATE_HELLO_DELAY: Duration = Duration::from_secs(2);

impl ImmediateHelloLimiter {
    /// Returns whether an immediate Hello may be sent now on `iface_id`,
    /// recording the attempt if so.
    pub fn try_acquire(&mut self, iface_id: InterfaceId) -> bool {
        let now = tokio::time::Instant::now();
        match self.last_sent.get(&iface_id) {
            Some(last) if now.duration_since(*last) < INITIAL_IMMEDIATE_HELLO_DELAY => {
                false
            }
            _ => {
                self.last_sent.insert(iface_id, now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_hello_limiter_rejects_second_attempt_within_window() {
        let mut limiter = ImmediateHelloLimiter::default();
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
    }

    #[test]
    fn immediate_hello_limiter_tracks_interfaces_independently() {
        let mut limiter = ImmediateHelloLimiter::default();
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(2));
    }
}
