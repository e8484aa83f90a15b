//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Per-interface and per-area configuration (spec.md §6 "Configuration
//! surface"). Each knob has the documented default baked into its
//! `Default` impl, matching [`crate::interface::Interface::new`] and
//! [`crate::interface::InterfaceMdr::default`].

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::interface::{AdjConnectivity, InterfaceType, LsaFullness};
use crate::linklog::{LinkLogConfig, PathLogConfig};
use crate::linkmetrics::{CostFormula, CostWeights};

/// Per-interface knobs (spec.md §6, `ipv6 ospf6 ...` CLI mode).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InterfaceCfg {
    pub network_type: InterfaceType,
    pub priority: u8,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub retransmit_interval: u16,
    pub cost: u32,
    pub ifmtu: Option<u16>,
    pub passive: bool,
    pub mtu_ignore: bool,
    pub link_lsa_suppression: bool,
    pub flood_delay: u16,
    pub adjacency_formation_limit: Option<u16>,
    pub allow_immediate_hello: bool,
    pub relax_neighbor_inactivity: bool,
    pub advertise_prefix_list: Option<String>,

    // Link-metrics knobs (spec.md §4.F).
    pub linkmetric_formula: Option<CostFormula>,
    pub linkmetric_weights: CostWeights,
    pub linkmetric_update_filter_adjust_values: bool,
    pub link_status: bool,

    // MDR knobs (spec.md §3 "MDR interface sub-record").
    pub ackinterval: u16,
    pub backupwaitinterval: u16,
    pub twohoprefresh: u8,
    pub mdrconstraint: u8,
    pub hellorepeatcount: u8,
    pub adjacencyconnectivity: AdjConnectivity,
    pub lsafullness: LsaFullness,
    pub consec_hello_threshold: u8,
    pub update_routable_neighbors_immediately: bool,
}

impl Default for InterfaceCfg {
    fn default() -> InterfaceCfg {
        InterfaceCfg {
            network_type: InterfaceType::Broadcast,
            priority: 1,
            hello_interval: 2,
            dead_interval: 6,
            retransmit_interval: 5,
            cost: 10,
            ifmtu: None,
            passive: false,
            mtu_ignore: false,
            link_lsa_suppression: false,
            flood_delay: 0,
            adjacency_formation_limit: None,
            allow_immediate_hello: false,
            relax_neighbor_inactivity: false,
            advertise_prefix_list: None,
            linkmetric_formula: None,
            linkmetric_weights: CostWeights::default(),
            linkmetric_update_filter_adjust_values: true,
            link_status: false,
            ackinterval: 1,
            backupwaitinterval: 0,
            twohoprefresh: 1,
            mdrconstraint: 3,
            hellorepeatcount: 3,
            adjacencyconnectivity: AdjConnectivity::Bi,
            lsafullness: LsaFullness::MinCost,
            consec_hello_threshold: 2,
            update_routable_neighbors_immediately: false,
        }
    }
}

/// Per-area knobs: the area-id plus the optional SDT logs (spec.md §6,
/// §4.J).
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AreaCfg {
    pub area_id: u32,
    #[serde(skip)]
    pub loglinks: Option<LinkLogConfig>,
    #[serde(skip)]
    pub logpath: Option<PathLogConfig>,
}

/// Top-level, process-wide configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InstanceCfg {
    pub router_id: Ipv4Addr,
    pub zebra_socket_path: Option<String>,
    pub tlv_interop: crate::packet::tlv::TlvInterop,
    pub areas: Vec<AreaCfg>,
    #[serde(skip)]
    pub interfaces: Vec<(String, InterfaceCfg)>,
}

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            router_id: Ipv4Addr::UNSPECIFIED,
            zebra_socket_path: None,
            tlv_interop: crate::packet::tlv::TlvInterop::default(),
            areas: Vec::new(),
            interfaces: Vec::new(),
        }
    }
}

impl InstanceCfg {
    pub fn interface(&self, name: &str) -> InterfaceCfg {
        self.interfaces
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cfg)| cfg.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_interface_new() {
        let cfg = InterfaceCfg::default();
        assert_eq!(cfg.priority, 1);
        assert_eq!(cfg.hello_interval, 2);
        assert_eq!(cfg.dead_interval, 6);
        assert_eq!(cfg.cost, 10);
    }

    #[test]
    fn unconfigured_interface_returns_defaults() {
        let instance = InstanceCfg::default();
        let cfg = instance.interface("eth0");
        assert_eq!(cfg.mdrconstraint, 3);
    }
}
