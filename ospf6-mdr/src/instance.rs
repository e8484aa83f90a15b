//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The daemon instance: owns every arena, runs the interface/neighbor state
//! machines, the MDR election engine and the SPF scheduler, and drives the
//! single-threaded event loop described in spec.md §5.
//!
//! Raw multicast socket I/O and the RFC 5340 LSDB are external
//! collaborators (spec.md §1/§9 "Global mutable state"): this module never
//! opens a socket itself and never stores LSA content. Packets already
//! demultiplexed to (area, interface, source address) arrive on `net_rx`;
//! outgoing packets are handed to `net_tx` for whatever owns the socket to
//! actually transmit; the LSDB is consulted only through [`spf::Lsdb`].

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use ospf6_mdr_utils::ip::{Ipv6AddrExt, ALL_SPF_ROUTERS};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::area::Area;
use crate::collections::{
    AreaId, AreaIndex, Areas, InterfaceId, InterfaceIndex, Interfaces,
    NeighborId, NeighborIndex, Neighbors,
};
use crate::config::{AreaCfg, InstanceCfg, InterfaceCfg};
use crate::error::{Error, InterfaceCfgError};
use crate::hooks::{self, HookRegistry, InterfaceOpsEvent};
use crate::interface::{AdjConnectivity, Interface, InterfaceType, LsaFullness, ism};
use crate::linklog::{self, LinkLogConfig, LinkLogScope, PathLogConfig};
use crate::linkmetrics::{compute_cost, CostFormula, CostWeights};
use crate::lsa::LsaHeader;
use crate::mdr::{self, AdvInput, ElectionParams, NeighborFacts};
use crate::neighbor::{nsm, LastDbDesc, MdrLevel, Neighbor, NeighborNetId};
use crate::packet::tlv::{DbDescTlv, HelloTlv, HelloTlvOptions, TlvInterop};
use crate::packet::{
    DbDesc, DbDescFlags, Hello, HelloNeighborLists, Packet, PacketHdr,
    PacketType, OPTION_L_BIT,
};
use crate::route::RouteTable;
use crate::spf;
use crate::tasks::{self, messages::TimerMsg, ImmediateHelloLimiter};
use crate::zebra;

/// The address-family capability bit in the Hello/DD Options field
/// (RFC 5838 §2.4).
const OPTION_AF_BIT: u32 = 1 << 8;

/// One packet received off the network, already demultiplexed to the
/// (area, interface) it arrived on by the socket-owning task.
#[derive(Debug)]
pub struct NetRx {
    pub area_id: AreaId,
    pub iface_id: InterfaceId,
    pub src: Ipv6Addr,
    pub bytes: Bytes,
}

/// One packet to be transmitted, handed off to whatever owns the raw
/// socket for the named interface.
#[derive(Debug)]
pub struct NetTx {
    pub iface_id: InterfaceId,
    pub dst: Ipv6Addr,
    pub bytes: Bytes,
}

/// Per-interface link-metrics configuration, stashed at
/// [`Daemon::add_interface`] time since [`crate::interface::InterfaceMdr`]
/// carries only election state, not configuration (spec.md §4.F).
#[derive(Clone, Debug)]
struct LinkMetricCfg {
    formula: Option<CostFormula>,
    weights: CostWeights,
    fallback_cost: u16,
}

const DEFAULT_ZEBRA_SOCKET_PATH: &str = "/var/run/zserv.sock";

/// The daemon: every arena, the Zebra client, the hook registry and the
/// channels that feed the event loop in [`Daemon::run`] (spec.md §2, §5).
pub struct Daemon {
    router_id: u32,
    cfg: InstanceCfg,
    areas: Areas,
    interfaces: Interfaces,
    neighbors: Neighbors,
    hooks: HookRegistry,
    lsdb: Arc<dyn spf::Lsdb + Send + Sync>,
    zebra: zebra::client::Client,
    zebra_rx: UnboundedReceiver<zebra::messages::Message>,
    net_tx: UnboundedSender<NetTx>,
    net_rx: UnboundedReceiver<NetRx>,
    timerp: UnboundedSender<TimerMsg>,
    timer_rx: UnboundedReceiver<TimerMsg>,
    immediate_hello: ImmediateHelloLimiter,
    /// RFC 2328 §9.4 classic DR/BDR election reads each neighbor's last
    /// claimed (DR, BDR) router-id pair. It cannot live on
    /// [`crate::neighbor::Neighbor`]`::dr`/`bdr` (those are keyed by
    /// address, to identify a neighbor by its Hello source before its
    /// router-id is confirmed), so it is tracked here instead.
    dr_claims: HashMap<NeighborIndex, (Option<u32>, Option<u32>)>,
    link_logs: HashMap<AreaId, LinkLogConfig>,
    path_logs: HashMap<AreaId, PathLogConfig>,
    link_metric_cfg: HashMap<InterfaceId, LinkMetricCfg>,
}

impl Daemon {
    /// Builds a new daemon: connects to Zebra, wires the timer and net-I/O
    /// channels, and returns the sender half of `net_rx` so the caller's
    /// socket-owning task can feed received packets in.
    pub fn new(
        cfg: InstanceCfg,
        lsdb: Arc<dyn spf::Lsdb + Send + Sync>,
        net_tx: UnboundedSender<NetTx>,
    ) -> (Daemon, UnboundedSender<NetRx>) {
        let router_id = u32::from(cfg.router_id);
        let zebra_path = cfg
            .zebra_socket_path
            .clone()
            .unwrap_or_else(|| DEFAULT_ZEBRA_SOCKET_PATH.to_string());
        let (zebra, zebra_rx) = zebra::client::Client::connect(PathBuf::from(zebra_path));
        let (timerp, timer_rx) = mpsc::unbounded_channel();
        let (net_rxp, net_rx) = mpsc::unbounded_channel();

        let daemon = Daemon {
            router_id,
            cfg,
            areas: Areas::default(),
            interfaces: Interfaces::default(),
            neighbors: Neighbors::default(),
            hooks: HookRegistry::default(),
            lsdb,
            zebra,
            zebra_rx,
            net_tx,
            net_rx,
            timerp,
            timer_rx,
            immediate_hello: ImmediateHelloLimiter::default(),
            dr_claims: HashMap::new(),
            link_logs: HashMap::new(),
            path_logs: HashMap::new(),
            link_metric_cfg: HashMap::new(),
        };
        (daemon, net_rxp)
    }

    /// Replaces the hook registry wholesale, per spec.md §9's explicit,
    /// non-macro registration (callers build the full [`HookRegistry`] once
    /// at startup and hand it over here).
    pub fn register_hooks(&mut self, hooks: HookRegistry) {
        self.hooks = hooks;
    }

    pub fn router_id(&self) -> u32 {
        self.router_id
    }

    // ===== area / interface setup =====

    pub fn add_area(&mut self, cfg: &AreaCfg) -> AreaId {
        let (_, area) = self.areas.insert(cfg.area_id);
        let area_id = area.id;
        if let Some(loglinks) = &cfg.loglinks {
            self.link_logs.insert(area_id, loglinks.clone());
        }
        if let Some(logpath) = &cfg.logpath {
            self.path_logs.insert(area_id, logpath.clone());
        }
        area_id
    }

    /// Creates an interface named `name` under `area_id`, copying `cfg`'s
    /// knobs onto it. The caller names the owning area explicitly rather
    /// than this being derived from [`InstanceCfg`], since an interface's
    /// area membership is a topology fact the configuration surface leaves
    /// to the caller to resolve (spec.md §6).
    pub fn add_interface(
        &mut self,
        area_id: AreaId,
        name: String,
        cfg: &InterfaceCfg,
    ) -> Result<InterfaceId, Error> {
        let Some((area_idx, _)) = self.areas.get_mut_by_id(area_id) else {
            return Err(Error::AreaIdNotFound(area_id));
        };

        let (iface_idx, iface) = self.interfaces.insert(name);
        iface.area = Some(area_idx);
        iface.iface_type = cfg.network_type;
        iface.cost = cfg.cost;
        iface.priority = cfg.priority;
        iface.hello_interval = cfg.hello_interval;
        iface.dead_interval = cfg.dead_interval;
        iface.retransmit_interval = cfg.retransmit_interval;
        iface.relax_neighbor_inactivity = cfg.relax_neighbor_inactivity;
        iface.system.passive = cfg.passive;
        iface.system.mtu = cfg.ifmtu;
        iface.mdr.adj_connectivity = cfg.adjacencyconnectivity;
        iface.mdr.lsa_fullness = cfg.lsafullness;
        iface.mdr.mdr_constraint = cfg.mdrconstraint;
        iface.mdr.two_hop_refresh = cfg.twohoprefresh;
        iface.mdr.hello_repeat_count = cfg.hellorepeatcount;
        iface.mdr.backup_wait_interval = cfg.backupwaitinterval;
        iface.mdr.ack_interval = cfg.ackinterval;
        iface.mdr.consec_hello_threshold = cfg.consec_hello_threshold;
        iface.mdr.update_routable_neighbors_immediately =
            cfg.update_routable_neighbors_immediately;
        let iface_id = iface.id;

        self.areas[area_idx].add_interface(iface_idx);
        self.link_metric_cfg.insert(
            iface_id,
            LinkMetricCfg {
                formula: cfg.linkmetric_formula,
                weights: cfg.linkmetric_weights,
                fallback_cost: cfg.cost.min(u16::MAX as u32) as u16,
            },
        );

        Ok(iface_id)
    }

    pub fn start_interface(&mut self, iface_id: InterfaceId) -> Result<(), Error> {
        let Some((iface_idx, iface)) = self.interfaces.get_mut_by_id(iface_id)
        else {
            return Err(Error::InterfaceIdNotFound(iface_id));
        };
        let Some(area_idx) = iface.area else {
            return Err(Error::InterfaceIdNotFound(iface_id));
        };
        self.ism_apply(area_idx, iface_idx, ism::Event::InterfaceUp)
    }

    pub fn stop_interface(&mut self, iface_id: InterfaceId) -> Result<(), Error> {
        let Some((iface_idx, iface)) = self.interfaces.get_mut_by_id(iface_id)
        else {
            return Err(Error::InterfaceIdNotFound(iface_id));
        };
        let Some(area_idx) = iface.area else {
            return Err(Error::InterfaceIdNotFound(iface_id));
        };
        self.ism_apply(area_idx, iface_idx, ism::Event::InterfaceDown)
    }

    /// Changes an interface's adjacency-connectivity policy at runtime,
    /// re-running the MDR election (spec.md §4.B "AdjConnectivity") and
    /// firing the adj-connectivity hook class.
    pub fn set_adjacency_connectivity(
        &mut self,
        iface_id: InterfaceId,
        connectivity: AdjConnectivity,
    ) -> Result<(), Error> {
        let Some((iface_idx, iface)) = self.interfaces.get_mut_by_id(iface_id)
        else {
            return Err(Error::InterfaceIdNotFound(iface_id));
        };
        let Some(area_idx) = iface.area else {
            return Err(Error::InterfaceIdNotFound(iface_id));
        };
        if iface.mdr.adj_connectivity == connectivity {
            return Ok(());
        }
        iface.mdr.adj_connectivity = connectivity;
        let ifindex = iface.system.ifindex;
        if let Some(ifindex) = ifindex {
            hooks::run_adj_connectivity(
                &self.hooks.adj_connectivity, ifindex, connectivity,
            );
        }
        self.ism_apply(area_idx, iface_idx, ism::Event::AdjConnectivityChange)
    }

    // ===== interface state machine =====

    fn ism_apply(
        &mut self,
        area_idx: AreaIndex,
        iface_idx: InterfaceIndex,
        event: ism::Event,
    ) -> Result<(), Error> {
        let iface = &self.interfaces[iface_idx];
        let old_state = iface.state;
        let next = iface.fsm(event);

        if let Some(new_state) = next {
            if new_state != old_state {
                self.ism_transition_actions(
                    area_idx, iface_idx, old_state, new_state,
                );
                self.interfaces[iface_idx].state = new_state;
            }
        } else if !matches!(
            event,
            ism::Event::WaitTimer
                | ism::Event::BackupSeen
                | ism::Event::NeighborChange
                | ism::Event::AdjConnectivityChange
        ) {
            return Err(self.interfaces[iface_idx].unexpected_event(event));
        }

        match event {
            ism::Event::WaitTimer
            | ism::Event::BackupSeen
            | ism::Event::NeighborChange
                if self.interfaces[iface_idx].iface_type
                    == InterfaceType::Broadcast =>
            {
                self.dr_election(iface_idx);
            }
            ism::Event::AdjConnectivityChange
                if self.interfaces[iface_idx].iface_type == InterfaceType::Mdr =>
            {
                self.run_mdr_election(iface_idx);
            }
            _ => {}
        }

        Ok(())
    }

    fn ism_transition_actions(
        &mut self,
        area_idx: AreaIndex,
        iface_idx: InterfaceIndex,
        old_state: ism::State,
        new_state: ism::State,
    ) {
        let area_id = self.areas[area_idx].id;
        let iface = &mut self.interfaces[iface_idx];
        debug!(name = %iface.name, ?old_state, ?new_state, "interface state change");

        if new_state == ism::State::Down {
            iface.tasks.hello_interval = None;
            iface.tasks.wait_timer = None;
        } else if old_state == ism::State::Down {
            iface.tasks.hello_interval =
                Some(tasks::hello_interval(iface, area_id, &self.timerp));
            if iface.iface_type == InterfaceType::Broadcast
                && new_state == ism::State::Waiting
            {
                iface.tasks.wait_timer =
                    Some(tasks::ism_wait_timer(iface, area_id, &self.timerp));
            }
        }
        if new_state != ism::State::Waiting {
            iface.tasks.wait_timer = None;
        }

        let ifindex = iface.system.ifindex;
        let went_up = old_state == ism::State::Down && new_state != ism::State::Down;
        let went_down = old_state != ism::State::Down && new_state == ism::State::Down;

        if let Some(ifindex) = ifindex {
            if went_up {
                hooks::run_interface_ops(
                    &self.hooks.interface_ops, ifindex, InterfaceOpsEvent::Up,
                );
            } else if went_down {
                hooks::run_interface_ops(
                    &self.hooks.interface_ops, ifindex, InterfaceOpsEvent::Down,
                );
            }
        }
    }

    /// The RFC 2328 §9.4 classic DR/BDR election, driven by the last
    /// (DR, BDR) claim recorded for each neighbor in `dr_claims` rather
    /// than any field on [`crate::neighbor::Neighbor`] itself.
    fn dr_election(&mut self, iface_idx: InterfaceIndex) {
        let iface = &self.interfaces[iface_idx];
        let claim_of = |idx: NeighborIndex| self.dr_claims.get(&idx).copied().unwrap_or((None, None));

        let mut entries: Vec<(u32, u8, Option<NeighborIndex>)> = iface
            .neighbors
            .iter()
            .copied()
            .filter_map(|idx| {
                let nbr = &self.neighbors[idx];
                (nbr.state >= nsm::State::TwoWay && nbr.priority > 0)
                    .then_some((nbr.router_id, nbr.priority, Some(idx)))
            })
            .collect();
        if iface.priority > 0 {
            entries.push((self.router_id, iface.priority, None));
        }

        let dr_declared: Vec<u32> = entries
            .iter()
            .filter(|(rid, _, idx)| match idx {
                Some(idx) => claim_of(*idx).0 == Some(*rid),
                None => iface.dr == Some(*rid),
            })
            .map(|(rid, _, _)| *rid)
            .collect();
        let bdr_declared: Vec<u32> = entries
            .iter()
            .filter(|(rid, _, idx)| match idx {
                Some(idx) => claim_of(*idx).1 == Some(*rid),
                None => iface.dr != Some(*rid) && iface.bdr == Some(*rid),
            })
            .map(|(rid, _, _)| *rid)
            .collect();

        let best = |pool: &[u32]| -> Option<u32> {
            entries
                .iter()
                .filter(|(rid, _, _)| pool.contains(rid))
                .max_by_key(|(rid, pri, _)| (*pri, *rid))
                .map(|(rid, _, _)| *rid)
        };

        let new_bdr = best(&bdr_declared).or_else(|| {
            best(&entries
                .iter()
                .filter(|(rid, _, _)| !dr_declared.contains(rid))
                .map(|(rid, _, _)| *rid)
                .collect::<Vec<_>>())
        });
        let new_dr = best(&dr_declared).or(new_bdr);

        let iface = &mut self.interfaces[iface_idx];
        let changed = iface.dr != new_dr || iface.bdr != new_bdr;
        iface.dr = new_dr;
        iface.bdr = new_bdr;
        let area_idx = iface.area;
        if changed {
            if let Some(area_idx) = area_idx {
                self.ism_apply(area_idx, iface_idx, ism::Event::NeighborChange).ok();
            }
        }
    }

    // ===== MDR election =====

    fn run_mdr_election(&mut self, iface_idx: InterfaceIndex) {
        let iface = &self.interfaces[iface_idx];
        let facts: Vec<(NeighborIndex, NeighborFacts)> = iface
            .neighbors
            .iter()
            .copied()
            .filter_map(|idx| {
                let nbr = &self.neighbors[idx];
                (nbr.state >= nsm::State::TwoWay).then(|| {
                    (
                        idx,
                        NeighborFacts {
                            router_id: nbr.router_id,
                            priority: nbr.priority,
                            mdr_level: nbr.mdr.mdr_level,
                            report_2hop: nbr.mdr.report_2hop,
                            two_way_neighbors: nbr.mdr.rnl.iter().copied().collect(),
                        },
                    )
                })
            })
            .collect();
        let neighbor_facts: Vec<NeighborFacts> =
            facts.iter().map(|(_, f)| f.clone()).collect();

        let params = ElectionParams {
            self_router_id: self.router_id,
            self_priority: iface.priority,
            self_mdr_level: iface.mdr.mdr_level,
            mdr_constraint: iface.mdr.mdr_constraint,
            adj_connectivity: iface.mdr.adj_connectivity,
        };
        let output = mdr::elect(&params, &neighbor_facts);

        let old_level = iface.mdr.mdr_level;
        let ifindex = iface.system.ifindex;
        let fullness = iface.mdr.lsa_fullness;

        let iface = &mut self.interfaces[iface_idx];
        iface.mdr.mdr_level = output.mdr_level;
        iface.mdr.nonflooding_mdr = output.nonflooding;
        iface.mdr.parent = output.parent;
        iface.mdr.bparent = output.bparent;

        if old_level != output.mdr_level {
            if let Some(ifindex) = ifindex {
                hooks::run_mdr_level_update(
                    &self.hooks.mdr_level_update,
                    ifindex,
                    self.router_id,
                    old_level,
                    output.mdr_level,
                );
            }
        }

        let adv_inputs: Vec<AdvInput> = facts
            .iter()
            .map(|(idx, f)| {
                let nbr = &self.neighbors[*idx];
                AdvInput {
                    router_id: f.router_id,
                    is_full: nbr.state == nsm::State::Full,
                    routable: nbr_is_routable(
                        &self.areas, iface_idx, &self.interfaces, f.router_id,
                    ),
                    prev_adv: nbr.mdr.dependent || nbr.mdr.sel_adv,
                }
            })
            .collect();
        let self_is_mdr = output.mdr_level == MdrLevel::Mdr;
        let adv_out = mdr::update_lsa_fullness(
            fullness, self_is_mdr, &adv_inputs, &output.graph,
        );

        let mut to_recheck = Vec::new();
        for (idx, f) in &facts {
            let dependent = output.dependent.contains(&f.router_id);
            let adv = adv_out.iter().find(|a| a.router_id == f.router_id);
            let sel_adv = adv.is_some_and(|a| a.sel_adv);
            let nbr = &mut self.neighbors[*idx];
            let changed = nbr.mdr.dependent != dependent || nbr.mdr.sel_adv != sel_adv;
            nbr.mdr.dependent = dependent;
            nbr.mdr.sel_adv = sel_adv;
            if changed {
                to_recheck.push(*idx);
            }
        }

        for idx in to_recheck {
            if let Some(area_idx) = iface_area_index(&self.interfaces[iface_idx]) {
                self.nsm_apply(area_idx, iface_idx, idx, nsm::Event::AdjOk);
            }
        }
    }

    // ===== neighbor state machine =====

    fn nsm_apply(
        &mut self,
        area_idx: AreaIndex,
        iface_idx: InterfaceIndex,
        nbr_idx: NeighborIndex,
        event: nsm::Event,
    ) {
        let nbr = &self.neighbors[nbr_idx];
        let old_state = nbr.state;
        let Some(new_state) = nbr.fsm(event) else {
            return;
        };
        if new_state == old_state {
            return;
        }

        debug!(router_id = nbr.router_id, ?old_state, ?new_state, "neighbor state change");
        self.neighbors[nbr_idx].state = new_state;

        match new_state {
            nsm::State::Down => {
                self.neighbors[nbr_idx].clear_lsa_lists();
                self.dr_claims.remove(&nbr_idx);
                self.interfaces[iface_idx].remove_neighbor(nbr_idx);
                if let Some(ifindex) = self.interfaces[iface_idx].system.ifindex {
                    hooks::run_interface_ops_reverse(
                        &self.hooks.interface_ops, ifindex, InterfaceOpsEvent::Delete,
                    );
                }
                self.neighbors.delete(nbr_idx);
                let iface = &self.interfaces[iface_idx];
                if iface.iface_type == InterfaceType::Mdr {
                    self.run_mdr_election(iface_idx);
                } else if iface.iface_type == InterfaceType::Broadcast {
                    self.dr_election(iface_idx);
                }
                self.schedule_spf_for_area(area_idx);
                return;
            }
            nsm::State::ExStart => {
                let nbr = &mut self.neighbors[nbr_idx];
                nbr.dd_seq_no = nbr.dd_seq_no.wrapping_add(1);
                // MS|M|I: declare self master, more-follows, init.
                nbr.dd_flags = 0x07;
                self.send_dbdesc(area_idx, iface_idx, nbr_idx);
                self.arm_dbdesc_rxmt(area_idx, iface_idx, nbr_idx);
            }
            nsm::State::Loading => {
                self.neighbors[nbr_idx].tasks.rxmt_interval = None;
            }
            nsm::State::Full | nsm::State::TwoWay => {
                self.neighbors[nbr_idx].tasks.rxmt_interval = None;
                let iface = &self.interfaces[iface_idx];
                if iface.iface_type == InterfaceType::Mdr {
                    self.run_mdr_election(iface_idx);
                } else {
                    self.ism_apply(area_idx, iface_idx, ism::Event::NeighborChange).ok();
                }
                if new_state == nsm::State::Full {
                    self.schedule_spf_for_area(area_idx);
                }
            }
            _ => {}
        }
    }

    // ===== packet handling =====

    fn validate_hello_cfg(
        &self,
        iface: &Interface,
        area_id: u32,
        hello: &Hello,
    ) -> Result<(), Error> {
        let err = |kind: InterfaceCfgError| {
            Error::InterfaceCfgError(
                iface.name.clone(),
                Ipv6Addr::UNSPECIFIED,
                PacketType::Hello,
                kind,
            )
        };
        if hello.options & OPTION_AF_BIT == 0 {
            return Err(err(InterfaceCfgError::AfBitClear));
        }
        if hello.hdr.area_id != area_id {
            return Err(err(InterfaceCfgError::AreaIdMismatch(
                area_id,
                hello.hdr.area_id,
            )));
        }
        if hello.hello_interval != iface.hello_interval {
            return Err(err(InterfaceCfgError::HelloIntervalMismatch(
                iface.hello_interval,
                hello.hello_interval,
            )));
        }
        if hello.dead_interval != iface.dead_interval {
            return Err(err(InterfaceCfgError::DeadIntervalMismatch(
                iface.dead_interval,
                hello.dead_interval,
            )));
        }
        if hello.hdr.router_id == self.router_id {
            return Err(err(InterfaceCfgError::DuplicateRouterId));
        }
        Ok(())
    }

    fn process_hello(
        &mut self,
        area_idx: AreaIndex,
        iface_idx: InterfaceIndex,
        src: Ipv6Addr,
        hello: Hello,
    ) -> Result<(), Error> {
        let area_id = self.areas[area_idx].area_id;
        self.validate_hello_cfg(&self.interfaces[iface_idx], area_id, &hello)?;

        let net_id = NeighborNetId(src);
        let nbr_idx = match self.neighbors.get_by_net_id(&net_id) {
            Some((idx, _)) => idx,
            None => {
                let (idx, nbr) =
                    self.neighbors.insert(hello.hdr.router_id, net_id);
                nbr.router_id = hello.hdr.router_id;
                self.interfaces[iface_idx].add_neighbor(idx);
                idx
            }
        };

        let area_id_key = self.areas[area_idx].id;
        let iface_id = self.interfaces[iface_idx].id;
        let dead_interval = self.interfaces[iface_idx].dead_interval;

        {
            let nbr = &mut self.neighbors[nbr_idx];
            nbr.priority = hello.priority;
            nbr.options = hello.options;
            nbr.tasks.inactivity_timer = Some(tasks::nsm_inactivity_timer(
                nbr, iface_id, area_id_key, dead_interval, &self.timerp,
            ));

            if let Some(tlv) = hello.lls_hello {
                if tlv.options.contains(HelloTlvOptions::D) {
                    apply_differential_report(&mut nbr.mdr, &hello.neighbors);
                } else {
                    nbr.mdr.rnl = hello
                        .neighbors
                        .dependent
                        .iter()
                        .chain(&hello.neighbors.sel_adv)
                        .chain(&hello.neighbors.other)
                        .copied()
                        .collect();
                }
                nbr.mdr.dnl = hello.neighbors.dependent.clone();
                nbr.mdr.sanl = hello.neighbors.sel_adv.clone();
                nbr.mdr.hsn = tlv.hsn as u32;
            } else {
                nbr.mdr.rnl = hello.neighbors.other.clone();
            }
        }

        self.dr_claims.insert(nbr_idx, (hello.dr, hello.bdr));

        self.nsm_apply(area_idx, iface_idx, nbr_idx, nsm::Event::HelloRcvd);

        let saw_self = hello.neighbors.dependent.contains(&self.router_id)
            || hello.neighbors.sel_adv.contains(&self.router_id)
            || hello.neighbors.other.contains(&self.router_id)
            || hello.neighbors.init.contains(&self.router_id);
        if saw_self {
            self.nsm_apply(area_idx, iface_idx, nbr_idx, nsm::Event::TwoWayRcvd);
        } else {
            self.nsm_apply(area_idx, iface_idx, nbr_idx, nsm::Event::OneWayRcvd);
        }

        let iface = &self.interfaces[iface_idx];
        match iface.iface_type {
            InterfaceType::Mdr => self.run_mdr_election(iface_idx),
            InterfaceType::Broadcast => self.dr_election(iface_idx),
            InterfaceType::PointToPoint => {}
        }

        Ok(())
    }

    fn process_dbdesc(
        &mut self,
        area_idx: AreaIndex,
        iface_idx: InterfaceIndex,
        src: Ipv6Addr,
        dbdesc: DbDesc,
    ) -> Result<(), Error> {
        let net_id = NeighborNetId(src);
        let Some((nbr_idx, _)) = self.neighbors.get_by_net_id(&net_id) else {
            return Err(Error::UnknownNeighbor(src, dbdesc.hdr.router_id));
        };

        let state = self.neighbors[nbr_idx].state;
        if state < nsm::State::ExStart {
            return Err(Error::DbDescReject(dbdesc.hdr.router_id, state));
        }

        if state == nsm::State::ExStart {
            let is_negotiation = dbdesc.flags.ms
                && dbdesc.flags.m
                && dbdesc.flags.i
                && dbdesc.lsa_hdrs.is_empty();
            if is_negotiation && dbdesc.hdr.router_id > self.router_id {
                let nbr = &mut self.neighbors[nbr_idx];
                nbr.dd_seq_no = dbdesc.seq_no;
                nbr.dd_flags = 0x00;
                nbr.last_rcvd_dbdesc = Some(LastDbDesc {
                    options: dbdesc.options,
                    flags: raw_dd_flags(&dbdesc.flags),
                    seq_no: dbdesc.seq_no,
                });
                self.nsm_apply(area_idx, iface_idx, nbr_idx, nsm::Event::NegotiationDone);
            }
            return Ok(());
        }

        let nbr = &mut self.neighbors[nbr_idx];
        let last = nbr.last_rcvd_dbdesc;
        let in_sequence = last
            .map(|l| dbdesc.seq_no == l.seq_no.wrapping_add(1))
            .unwrap_or(true);
        if !in_sequence {
            self.nsm_apply(area_idx, iface_idx, nbr_idx, nsm::Event::SeqNoMismatch);
            return Ok(());
        }

        for hdr in &dbdesc.lsa_hdrs {
            self.neighbors[nbr_idx].ls_request.insert(hdr.key);
        }
        let nbr = &mut self.neighbors[nbr_idx];
        nbr.last_rcvd_dbdesc = Some(LastDbDesc {
            options: dbdesc.options,
            flags: raw_dd_flags(&dbdesc.flags),
            seq_no: dbdesc.seq_no,
        });
        nbr.dd_seq_no = dbdesc.seq_no;

        if !dbdesc.flags.m {
            self.nsm_apply(area_idx, iface_idx, nbr_idx, nsm::Event::ExchangeDone);
        }

        Ok(())
    }

    pub fn handle_net_rx(&mut self, msg: NetRx) -> Result<(), Error> {
        let Some((area_idx, _)) = self.areas.get_mut_by_id(msg.area_id) else {
            return Err(Error::AreaIdNotFound(msg.area_id));
        };
        let Some((iface_idx, _)) = self.interfaces.get_mut_by_id(msg.iface_id)
        else {
            return Err(Error::InterfaceIdNotFound(msg.iface_id));
        };

        let mut bytes = msg.bytes;
        let packet = Packet::decode(&mut bytes)
            .map_err(Error::PacketDecodeError)?;

        match packet {
            Packet::Hello(hello) => {
                self.process_hello(area_idx, iface_idx, msg.src, hello)
            }
            Packet::DbDesc(dbdesc) => {
                self.process_dbdesc(area_idx, iface_idx, msg.src, dbdesc)
            }
        }
    }

    // ===== hello origination =====

    fn send_hello(&mut self, area_idx: AreaIndex, iface_idx: InterfaceIndex) {
        let area_id = self.areas[area_idx].area_id;
        let iface = &mut self.interfaces[iface_idx];
        iface.mdr.hsn = iface.mdr.hsn.wrapping_add(1);

        let mut dependent = Vec::new();
        let mut sel_adv = Vec::new();
        let mut other = Vec::new();
        for &nbr_idx in &iface.neighbors {
            let nbr = &self.neighbors[nbr_idx];
            if nbr.state < nsm::State::TwoWay {
                continue;
            }
            if nbr.mdr.dependent {
                dependent.push(nbr.router_id);
            } else if nbr.mdr.sel_adv {
                sel_adv.push(nbr.router_id);
            } else {
                other.push(nbr.router_id);
            }
        }
        let lost: Vec<u32> =
            iface.mdr.lost_neighbor_list.iter().map(|(rid, _)| *rid).collect();

        let lls_hello = HelloTlv {
            hsn: iface.mdr.hsn as u16,
            options: HelloTlvOptions::A,
            n1_lost: lost.len() as u16,
            n2_init: 0,
            n3_dependent: dependent.len() as u16,
            n4_sel_adv: sel_adv.len() as u16,
        };

        let hello = Hello {
            hdr: PacketHdr {
                pkt_type: PacketType::Hello,
                router_id: self.router_id,
                area_id,
                instance_id: 0,
            },
            iface_id: iface.id,
            priority: iface.priority,
            options: OPTION_AF_BIT | OPTION_L_BIT,
            hello_interval: iface.hello_interval,
            dead_interval: iface.dead_interval,
            dr: iface.dr,
            bdr: iface.bdr,
            neighbors: HelloNeighborLists {
                lost,
                init: Vec::new(),
                dependent,
                sel_adv,
                other,
            },
            lls_hello: Some(lls_hello),
        };

        let bytes = Packet::Hello(hello).encode(self.cfg.tlv_interop);
        let _ = self.net_tx.send(NetTx {
            iface_id: iface.id,
            dst: ALL_SPF_ROUTERS,
            bytes,
        });
    }

    // ===== database description origination =====

    /// Sends (or retransmits) this neighbor's current Database Description
    /// packet, built from `dd_seq_no`/`dd_flags`/`ls_summary` exactly as
    /// negotiated so far. Unicast to the neighbor's source address, unlike
    /// a Hello.
    fn send_dbdesc(
        &mut self,
        area_idx: AreaIndex,
        iface_idx: InterfaceIndex,
        nbr_idx: NeighborIndex,
    ) {
        let area_id = self.areas[area_idx].area_id;
        let iface = &self.interfaces[iface_idx];
        let nbr = &self.neighbors[nbr_idx];

        let lsa_hdrs = nbr
            .ls_summary
            .iter()
            .map(|key| LsaHeader {
                key: *key,
                age: 0,
                seq_no: 0,
                options: 0,
            })
            .collect();

        let dbdesc = DbDesc {
            hdr: PacketHdr {
                pkt_type: PacketType::DbDesc,
                router_id: self.router_id,
                area_id,
                instance_id: 0,
            },
            options: OPTION_AF_BIT | OPTION_L_BIT,
            mtu: iface.system.mtu.unwrap_or(0),
            flags: dd_flags_from_raw(nbr.dd_flags),
            seq_no: nbr.dd_seq_no,
            lsa_hdrs,
            lls_dbdesc: Some(DbDescTlv { dr: iface.dr, bdr: iface.bdr }),
        };

        let bytes = Packet::DbDesc(dbdesc).encode(self.cfg.tlv_interop);
        let _ = self.net_tx.send(NetTx {
            iface_id: iface.id,
            dst: nbr.src,
            bytes,
        });
    }

    /// Arms (re-arms on each call) the RxmtInterval retransmit timer for a
    /// neighbor entering or still in Database Description negotiation.
    fn arm_dbdesc_rxmt(
        &mut self,
        area_idx: AreaIndex,
        iface_idx: InterfaceIndex,
        nbr_idx: NeighborIndex,
    ) {
        let area_id = self.areas[area_idx].id;
        let iface_id = self.interfaces[iface_idx].id;
        let retransmit_interval = self.interfaces[iface_idx].retransmit_interval;
        let nbr = &self.neighbors[nbr_idx];
        let task = tasks::packet_rxmt_interval(
            nbr, iface_id, area_id, retransmit_interval, &self.timerp,
        );
        self.neighbors[nbr_idx].tasks.rxmt_interval = Some(task);
    }

    // ===== SPF =====

    fn schedule_spf_for_area(&mut self, area_idx: AreaIndex) {
        let area = &mut self.areas[area_idx];
        let delay = area.spf.next_delay(Instant::now());
        let area_id = area.id;
        area.spf.pending = Some(tasks::spf_delay_timer(area_id, delay, &self.timerp));
    }

    fn run_spf(&mut self, area_idx: AreaIndex) {
        let area_id = self.areas[area_idx].id;
        let iface_idxs = self.areas[area_idx].interfaces.clone();

        let mut seeds = Vec::new();
        for iface_idx in &iface_idxs {
            let iface = &self.interfaces[*iface_idx];
            if iface.iface_type != InterfaceType::Mdr {
                continue;
            }
            for &nbr_idx in &iface.neighbors {
                let nbr = &self.neighbors[nbr_idx];
                if nbr.state < nsm::State::TwoWay {
                    continue;
                }
                seeds.push(spf::NeighborSeed {
                    router_id: nbr.router_id,
                    iface_idx: *iface_idx,
                    iface_cost: iface.cost,
                    linklocal_addr: Some(nbr.src),
                    has_router_lsa: nbr.state >= nsm::State::TwoWay,
                });
            }
        }

        let table = spf::run(self.lsdb.as_ref(), self.router_id, &seeds, false);
        {
            let area = &mut self.areas[area_idx];
            area.spf_table = table;
            area.last_spf_run = Some(Instant::now());
            area.spf.last_run = area.last_spf_run;
            area.spf.pending = None;
        }

        self.install_routes(area_idx);

        if let Some(log_cfg) = self.link_logs.get(&area_id).cloned() {
            self.write_link_log(area_idx, &log_cfg);
        }
    }

    /// Installs every network route in the area's SPF result into Zebra.
    /// Router-only entries (`RouteTable::routers`) name reachability used
    /// internally for "routable neighbor" checks, not RIB routes: the
    /// destination prefixes for those routers live in Intra-Area-Prefix
    /// LSAs in the external LSDB, outside this module's graph.
    fn install_routes(&mut self, area_idx: AreaIndex) {
        use ipnetwork::IpNetwork;
        use std::net::IpAddr;

        let area = &self.areas[area_idx];
        for (prefix, route) in &area.spf_table.networks {
            let nexthops: Vec<IpAddr> = route
                .nexthops
                .values()
                .filter_map(|nh| nh.addr.map(IpAddr::V6))
                .collect();
            if nexthops.is_empty() {
                continue;
            }
            self.zebra.send(zebra::messages::Message::Ipv6RouteAdd(
                zebra::messages::RouteUpdate {
                    prefix: IpNetwork::V6(*prefix),
                    nexthops,
                    distance: 110,
                    metric: route.cost,
                },
            ));
        }
    }

    fn write_link_log(&self, area_idx: AreaIndex, cfg: &LinkLogConfig) {
        let area = &self.areas[area_idx];
        let links: Vec<(std::net::Ipv4Addr, std::net::Ipv4Addr)> = match cfg.scope {
            LinkLogScope::Connected => area
                .spf_table
                .routers
                .keys()
                .map(|&rid| (id_to_ipv4(self.router_id), id_to_ipv4(rid)))
                .collect(),
            LinkLogScope::All => area
                .spf_table
                .routers
                .keys()
                .map(|&rid| (id_to_ipv4(self.router_id), id_to_ipv4(rid)))
                .collect(),
        };
        let rendered = linklog::render_link_log(&links);
        let file = cfg.file.clone();
        tokio::spawn(async move {
            if let Err(error) = linklog::append(&file, &rendered).await {
                warn!(%error, "failed to append to link log");
            }
        });
    }

    // ===== zebra =====

    fn handle_zebra_msg(&mut self, msg: zebra::messages::Message) {
        use zebra::messages::Message;
        match msg {
            Message::InterfaceAdd(info) | Message::InterfaceStateUpdate(info) => {
                if let Some((idx, _)) = self.interfaces.get_by_name(&info.name) {
                    let iface = &mut self.interfaces[idx];
                    iface.system.mtu = Some(info.mtu);
                    let iface_id = iface.id;
                    self.interfaces.update_ifindex(idx, Some(info.ifindex));
                    if info.up {
                        self.start_interface(iface_id).ok();
                    } else {
                        self.stop_interface(iface_id).ok();
                    }
                }
            }
            Message::InterfaceDelete(info) => {
                if let Some((_, iface)) = self.interfaces.get_by_name(&info.name) {
                    let iface_id = iface.id;
                    self.stop_interface(iface_id).ok();
                }
            }
            Message::InterfaceAddressAdd(addr) => {
                if let Some((idx, _)) = self.interfaces.get_by_ifindex(addr.ifindex) {
                    if let ipnetwork::IpNetwork::V6(net) = addr.prefix {
                        if net.ip().is_link_local_unicast() {
                            self.interfaces[idx].system.linklocal_addr = Some(net.ip());
                        }
                    }
                }
            }
            Message::InterfaceAddressDelete(addr) => {
                if let Some((idx, _)) = self.interfaces.get_by_ifindex(addr.ifindex) {
                    if let ipnetwork::IpNetwork::V6(net) = addr.prefix {
                        let iface = &mut self.interfaces[idx];
                        if iface.system.linklocal_addr == Some(net.ip()) {
                            iface.system.linklocal_addr = None;
                        }
                    }
                }
            }
            Message::LinkMetrics(m) => self.handle_link_metrics(m),
            Message::LinkStatus(m) => self.handle_link_status(m),
            Message::Ipv4RouteAdd(_)
            | Message::Ipv4RouteDelete(_)
            | Message::Ipv6RouteAdd(_)
            | Message::Ipv6RouteDelete(_)
            | Message::LinkMetricsSubscribe(_)
            | Message::LinkMetricsUnsubscribe(_)
            | Message::LinkMetricsRequest(_) => {
                // Outbound-only message classes; never received from Zebra.
            }
        }
    }

    fn handle_link_metrics(&mut self, m: zebra::messages::LinkMetricsMsg) {
        let Some((idx, _)) = self.interfaces.get_by_ifindex(m.ifindex) else {
            return;
        };
        let adjusted = m.metrics.adjust();
        hooks::run_link_metrics(
            &self.hooks.link_metrics, m.ifindex, m.linklocal_addr, adjusted,
        );

        let iface_id = self.interfaces[idx].id;
        let Some(cfg) = self.link_metric_cfg.get(&iface_id) else {
            return;
        };
        if let Some(formula) = cfg.formula {
            let cost = compute_cost(formula, &cfg.weights, &adjusted, cfg.fallback_cost);
            self.interfaces[idx].cost = cost as u32;
            if let Some(area_idx) = self.interfaces[idx].area {
                self.schedule_spf_for_area(area_idx);
            }
        }
    }

    fn handle_link_status(&mut self, m: zebra::messages::LinkStatusMsg) {
        let Some((iface_idx, iface)) = self.interfaces.get_by_ifindex(m.ifindex)
        else {
            return;
        };
        hooks::run_link_status(
            &self.hooks.link_status, m.ifindex, m.linklocal_addr, m.status,
        );

        match m.status {
            crate::linkmetrics::LinkStatus::Up => {
                let iface_id = iface.id;
                if self.immediate_hello.try_acquire(iface_id) {
                    if let Some(area_idx) = iface_area_index(iface) {
                        self.send_hello(area_idx, iface_idx);
                    }
                }
            }
            crate::linkmetrics::LinkStatus::Down => {
                let nbr_idxs: Vec<NeighborIndex> = iface
                    .neighbors
                    .iter()
                    .copied()
                    .filter(|&idx| self.neighbors[idx].src == m.linklocal_addr)
                    .collect();
                if let Some(area_idx) = iface_area_index(iface) {
                    for nbr_idx in nbr_idxs {
                        self.nsm_apply(area_idx, iface_idx, nbr_idx, nsm::Event::LinkDown);
                    }
                }
            }
        }
    }

    // ===== timers =====

    fn handle_timer_msg(&mut self, msg: TimerMsg) {
        use crate::tasks::messages::TimerMsg as T;
        match msg {
            T::IsmEvent(m) => {
                if let Some((area_idx, _)) = self.areas.get_by_id(m.area_id) {
                    if let Some((iface_idx, _)) = self.interfaces.get_by_id(m.iface_id) {
                        if let Err(error) = self.ism_apply(area_idx, iface_idx, m.event) {
                            error.log();
                        }
                    }
                }
            }
            T::NsmEvent(m) => {
                if let Some((area_idx, _)) = self.areas.get_by_id(m.area_id) {
                    if let Some((iface_idx, _)) = self.interfaces.get_by_id(m.iface_id) {
                        if let Some((nbr_idx, _)) = self.neighbors.get_by_id(m.nbr_id) {
                            self.nsm_apply(area_idx, iface_idx, nbr_idx, m.event);
                        }
                    }
                }
            }
            T::SendHello(m) => {
                if let Some((area_idx, _)) = self.areas.get_by_id(m.area_id) {
                    if let Some((iface_idx, _)) = self.interfaces.get_by_id(m.iface_id) {
                        self.send_hello(area_idx, iface_idx);
                    }
                }
            }
            T::DelayedAck(_) => {
                // LSA acknowledgement content lives with the external LSDB
                // collaborator; this fires only once a full LSDB is wired
                // in, which this crate does not own.
            }
            T::RxmtInterval(m) => {
                if let Some((area_idx, _)) = self.areas.get_by_id(m.area_id) {
                    if let Some((iface_idx, _)) = self.interfaces.get_by_id(m.iface_id) {
                        if let Some((nbr_idx, nbr)) = self.neighbors.get_by_id(m.nbr_id) {
                            let still_negotiating = matches!(
                                nbr.state,
                                nsm::State::ExStart | nsm::State::Exchange
                            );
                            if still_negotiating {
                                self.send_dbdesc(area_idx, iface_idx, nbr_idx);
                            }
                        }
                    }
                }
            }
            T::DbDescFree(m) => {
                if let Some((nbr_idx, _)) = self.neighbors.get_by_id(m.nbr_id) {
                    self.neighbors[nbr_idx].last_rcvd_dbdesc = None;
                }
            }
            T::SpfDelayEvent(m) => {
                if let Some((area_idx, _)) = self.areas.get_by_id(m.area_id) {
                    self.run_spf(area_idx);
                }
            }
        }
    }

    // ===== event loop =====

    /// The single-threaded cooperative event loop (spec.md §5): one
    /// `tokio::select!` turn drains at most one message from each
    /// task-producing source before looping again.
    pub async fn run(mut self) {
        info!(router_id = self.router_id, "ospf6-mdr daemon running");
        loop {
            tokio::select! {
                biased;
                msg = self.timer_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_timer_msg(msg),
                        None => break,
                    }
                }
                msg = self.zebra_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_zebra_msg(msg),
                        None => break,
                    }
                }
                msg = self.net_rx.recv() => {
                    match msg {
                        Some(msg) => {
                            if let Err(error) = self.handle_net_rx(msg) {
                                error.log();
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        info!("ospf6-mdr daemon exiting: all channels closed");
    }
}

fn raw_dd_flags(flags: &DbDescFlags) -> u8 {
    (flags.ms as u8) | ((flags.m as u8) << 1) | ((flags.i as u8) << 2)
}

fn dd_flags_from_raw(raw: u8) -> DbDescFlags {
    DbDescFlags {
        ms: raw & 0x01 != 0,
        m: raw & 0x02 != 0,
        i: raw & 0x04 != 0,
    }
}

fn id_to_ipv4(router_id: u32) -> std::net::Ipv4Addr {
    std::net::Ipv4Addr::from(router_id)
}

fn iface_area_index(iface: &Interface) -> Option<AreaIndex> {
    iface.area
}

fn nbr_is_routable(
    areas: &Areas,
    iface_idx: InterfaceIndex,
    interfaces: &Interfaces,
    router_id: u32,
) -> bool {
    let Some(area_idx) = iface_area_index(&interfaces[iface_idx]) else {
        return false;
    };
    areas[area_idx].spf_table.is_routable(router_id)
}

/// Merges a differential Hello's neighbor lists into `mdr.rnl`: `lost`
/// entries are removed, everything in `dependent`/`sel_adv`/`other` is
/// added (spec.md §4.C "D-bit").
fn apply_differential_report(
    mdr: &mut crate::neighbor::NeighborMdr,
    lists: &HelloNeighborLists,
) {
    for lost in &lists.lost {
        mdr.rnl.retain(|rid| rid != lost);
    }
    for added in lists
        .dependent
        .iter()
        .chain(&lists.sel_adv)
        .chain(&lists.other)
    {
        if !mdr.rnl.contains(added) {
            mdr.rnl.push(*added);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn differential_report_drops_lost_and_adds_new() {
        let mut mdr = crate::neighbor::NeighborMdr {
            rnl: vec![1, 2, 3],
            ..Default::default()
        };
        let lists = HelloNeighborLists {
            lost: vec![2],
            init: Vec::new(),
            dependent: vec![4],
            sel_adv: Vec::new(),
            other: Vec::new(),
        };
        apply_differential_report(&mut mdr, &lists);
        assert_eq!(mdr.rnl, vec![1, 3, 4]);
    }

    #[test]
    fn raw_dd_flags_packs_ms_m_i_bits() {
        let flags = DbDescFlags { ms: true, m: false, i: true };
        assert_eq!(raw_dd_flags(&flags), 0b101);
    }

    #[test]
    fn dd_flags_from_raw_is_the_inverse_of_raw_dd_flags() {
        let flags = DbDescFlags { ms: true, m: true, i: true };
        assert_eq!(dd_flags_from_raw(raw_dd_flags(&flags)), flags);
    }
}
