//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Arena-based owning collections for areas, interfaces and neighbors.
//!
//! Back-references (neighbor -> interface -> area) are never raw pointers:
//! each owning collection stores its elements in a [`generational_arena`]
//! and hands out a stable [`ObjectId`] (dense, process-lifetime, used in
//! inter-task messages) plus an [`generational_arena::Index`] (valid only
//! within the owning arena's lifetime, used for in-process lookups).

use std::collections::{BTreeMap, HashMap};
use std::ops::{Index as _, IndexMut as _};

use generational_arena::Index;
use serde::{Deserialize, Serialize};

use crate::area::Area;
use crate::interface::Interface;
use crate::neighbor::{Neighbor, NeighborNetId};

pub type ObjectId = u32;

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum ObjectKey<T> {
    Id(ObjectId),
    Value(T),
}

pub type AreaId = ObjectId;
pub type AreaIndex = Index;
pub type AreaKey = ObjectKey<u32>;
pub type InterfaceId = ObjectId;
pub type InterfaceIndex = Index;
pub type InterfaceKey = ObjectKey<String>;
pub type NeighborId = ObjectId;
pub type NeighborIndex = Index;
pub type NeighborKey = ObjectKey<u32>;

/// Thin wrapper around a generational arena giving `iter`/`iter_mut` without
/// leaking index-liveness concerns to callers.
#[derive(Debug)]
pub struct Arena<T>(generational_arena::Arena<T>);

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena(generational_arena::Arena::new())
    }
}

impl<T> Arena<T> {
    pub fn insert(&mut self, value: T) -> Index {
        self.0.insert(value)
    }

    pub fn remove(&mut self, index: Index) -> Option<T> {
        self.0.remove(index)
    }

    pub fn get(&self, index: Index) -> Option<&T> {
        self.0.get(index)
    }

    pub fn get_mut(&mut self, index: Index) -> Option<&mut T> {
        self.0.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> std::ops::Index<Index> for Arena<T> {
    type Output = T;

    fn index(&self, index: Index) -> &T {
        self.0.index(index)
    }
}

impl<T> std::ops::IndexMut<Index> for Arena<T> {
    fn index_mut(&mut self, index: Index) -> &mut T {
        self.0.index_mut(index)
    }
}

#[derive(Debug, Default)]
pub struct Areas {
    arena: Arena<Area>,
    id_tree: HashMap<AreaId, AreaIndex>,
    area_id_tree: BTreeMap<u32, AreaIndex>,
    next_id: AreaId,
}

impl Areas {
    pub fn insert(&mut self, area_id: u32) -> (AreaIndex, &mut Area) {
        let id = self.next_id;
        self.next_id += 1;

        let area = Area::new(id, area_id);
        let area_idx = self.arena.insert(area);

        self.id_tree.insert(id, area_idx);
        self.area_id_tree.insert(area_id, area_idx);

        (area_idx, &mut self.arena[area_idx])
    }

    pub fn delete(&mut self, area_idx: AreaIndex) {
        let area = &self.arena[area_idx];
        self.id_tree.remove(&area.id);
        self.area_id_tree.remove(&area.area_id);
        self.arena.remove(area_idx);
    }

    pub fn get_by_id(&self, id: AreaId) -> Option<(AreaIndex, &Area)> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|idx| (idx, &self.arena[idx]))
    }

    pub fn get_mut_by_id(
        &mut self,
        id: AreaId,
    ) -> Option<(AreaIndex, &mut Area)> {
        match self.id_tree.get(&id).copied() {
            Some(idx) => Some((idx, &mut self.arena[idx])),
            None => None,
        }
    }

    pub fn get_by_area_id(
        &self,
        area_id: u32,
    ) -> Option<(AreaIndex, &Area)> {
        self.area_id_tree
            .get(&area_id)
            .copied()
            .map(|idx| (idx, &self.arena[idx]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Area> {
        self.arena.iter().map(|(_, area)| area)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Area> {
        self.arena.iter_mut().map(|(_, area)| area)
    }
}

impl std::ops::Index<AreaIndex> for Areas {
    type Output = Area;

    fn index(&self, index: AreaIndex) -> &Area {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<AreaIndex> for Areas {
    fn index_mut(&mut self, index: AreaIndex) -> &mut Area {
        &mut self.arena[index]
    }
}

#[derive(Debug, Default)]
pub struct Interfaces {
    arena: Arena<Interface>,
    id_tree: HashMap<InterfaceId, InterfaceIndex>,
    name_tree: BTreeMap<String, InterfaceIndex>,
    ifindex_tree: HashMap<u32, InterfaceIndex>,
    next_id: InterfaceId,
}

impl Interfaces {
    pub fn insert(
        &mut self,
        name: String,
    ) -> (InterfaceIndex, &mut Interface) {
        let id = self.next_id;
        self.next_id += 1;

        let iface = Interface::new(id, name.clone());
        let iface_idx = self.arena.insert(iface);

        self.id_tree.insert(id, iface_idx);
        self.name_tree.insert(name, iface_idx);

        (iface_idx, &mut self.arena[iface_idx])
    }

    pub fn delete(&mut self, iface_idx: InterfaceIndex) {
        let iface = &self.arena[iface_idx];
        self.id_tree.remove(&iface.id);
        self.name_tree.remove(&iface.name);
        if let Some(ifindex) = iface.system.ifindex {
            self.ifindex_tree.remove(&ifindex);
        }
        self.arena.remove(iface_idx);
    }

    pub fn update_ifindex(
        &mut self,
        iface_idx: InterfaceIndex,
        ifindex: Option<u32>,
    ) {
        let iface = &self.arena[iface_idx];
        if let Some(old) = iface.system.ifindex {
            self.ifindex_tree.remove(&old);
        }
        if let Some(new) = ifindex {
            self.ifindex_tree.insert(new, iface_idx);
        }
    }

    pub fn get_by_id(&self, id: InterfaceId) -> Option<(InterfaceIndex, &Interface)> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|idx| (idx, &self.arena[idx]))
    }

    pub fn get_mut_by_id(
        &mut self,
        id: InterfaceId,
    ) -> Option<(InterfaceIndex, &mut Interface)> {
        match self.id_tree.get(&id).copied() {
            Some(idx) => Some((idx, &mut self.arena[idx])),
            None => None,
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<(InterfaceIndex, &Interface)> {
        self.name_tree
            .get(name)
            .copied()
            .map(|idx| (idx, &self.arena[idx]))
    }

    pub fn get_by_ifindex(
        &self,
        ifindex: u32,
    ) -> Option<(InterfaceIndex, &Interface)> {
        self.ifindex_tree
            .get(&ifindex)
            .copied()
            .map(|idx| (idx, &self.arena[idx]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.arena.iter().map(|(_, iface)| iface)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Interface> {
        self.arena.iter_mut().map(|(_, iface)| iface)
    }
}

impl std::ops::Index<InterfaceIndex> for Interfaces {
    type Output = Interface;

    fn index(&self, index: InterfaceIndex) -> &Interface {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<InterfaceIndex> for Interfaces {
    fn index_mut(&mut self, index: InterfaceIndex) -> &mut Interface {
        &mut self.arena[index]
    }
}

#[derive(Debug, Default)]
pub struct Neighbors {
    arena: Arena<Neighbor>,
    id_tree: HashMap<NeighborId, NeighborIndex>,
    router_id_tree: BTreeMap<u32, NeighborIndex>,
    net_id_tree: BTreeMap<NeighborNetId, NeighborIndex>,
    next_id: NeighborId,
}

impl Neighbors {
    pub fn insert(
        &mut self,
        router_id: u32,
        net_id: NeighborNetId,
    ) -> (NeighborIndex, &mut Neighbor) {
        let id = self.next_id;
        self.next_id += 1;

        let nbr = Neighbor::new(id, router_id, net_id);
        let nbr_idx = self.arena.insert(nbr);

        self.id_tree.insert(id, nbr_idx);
        self.router_id_tree.insert(router_id, nbr_idx);
        self.net_id_tree.insert(net_id, nbr_idx);

        (nbr_idx, &mut self.arena[nbr_idx])
    }

    pub fn delete(&mut self, nbr_idx: NeighborIndex) {
        let nbr = &self.arena[nbr_idx];
        self.id_tree.remove(&nbr.id);
        self.router_id_tree.remove(&nbr.router_id);
        self.net_id_tree.remove(&NeighborNetId(nbr.src));
        self.arena.remove(nbr_idx);
    }

    pub fn get_by_id(&self, id: NeighborId) -> Option<(NeighborIndex, &Neighbor)> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|idx| (idx, &self.arena[idx]))
    }

    pub fn get_mut_by_id(
        &mut self,
        id: NeighborId,
    ) -> Option<(NeighborIndex, &mut Neighbor)> {
        match self.id_tree.get(&id).copied() {
            Some(idx) => Some((idx, &mut self.arena[idx])),
            None => None,
        }
    }

    pub fn get_by_router_id(
        &self,
        router_id: u32,
    ) -> Option<(NeighborIndex, &Neighbor)> {
        self.router_id_tree
            .get(&router_id)
            .copied()
            .map(|idx| (idx, &self.arena[idx]))
    }

    pub fn get_by_net_id(
        &self,
        net_id: &NeighborNetId,
    ) -> Option<(NeighborIndex, &Neighbor)> {
        self.net_id_tree
            .get(net_id)
            .copied()
            .map(|idx| (idx, &self.arena[idx]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.arena.iter().map(|(_, nbr)| nbr)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Neighbor> {
        self.arena.iter_mut().map(|(_, nbr)| nbr)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }
}

impl std::ops::Index<NeighborIndex> for Neighbors {
    type Output = Neighbor;

    fn index(&self, index: NeighborIndex) -> &Neighbor {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<NeighborIndex> for Neighbors {
    fn index_mut(&mut self, index: NeighborIndex) -> &mut Neighbor {
        &mut self.arena[index]
    }
}
