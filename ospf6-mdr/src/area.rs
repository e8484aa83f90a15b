//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Instant;

use crate::collections::{AreaId, InterfaceIndex, Interfaces};
use crate::privdata::PrivateDataList;
use crate::route::RouteTable;
use crate::spf::SpfScheduler;

/// An OSPFv3 area. The LSDB itself (LSA storage, aging and flooding) is an
/// external collaborator per spec.md §1/§9 "Global mutable state" — this
/// struct owns only the locally-computed SPF result table and scheduling
/// state, plus the interfaces that belong to the area.
#[derive(Debug)]
pub struct Area {
    pub id: AreaId,
    pub area_id: u32,
    pub interfaces: Vec<InterfaceIndex>,
    pub spf_table: RouteTable,
    pub spf: SpfScheduler,
    pub last_spf_run: Option<Instant>,
    pub privdata: PrivateDataList,
}

impl Area {
    pub fn new(id: AreaId, area_id: u32) -> Area {
        Area {
            id,
            area_id,
            interfaces: Vec::new(),
            spf_table: RouteTable::default(),
            spf: SpfScheduler::default(),
            last_spf_run: None,
            privdata: PrivateDataList::default(),
        }
    }

    pub fn add_interface(&mut self, iface_idx: InterfaceIndex) {
        if !self.interfaces.contains(&iface_idx) {
            self.interfaces.push(iface_idx);
        }
    }

    pub fn remove_interface(&mut self, iface_idx: InterfaceIndex) {
        self.interfaces.retain(|idx| *idx != iface_idx);
    }

    pub(crate) fn all_interfaces<'a>(
        &'a self,
        interfaces: &'a Interfaces,
    ) -> impl Iterator<Item = &'a crate::interface::Interface> {
        self.interfaces.iter().map(move |idx| &interfaces[*idx])
    }
}
