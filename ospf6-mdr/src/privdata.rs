//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Per-object private-data registry (spec.md §4.I).
//!
//! The original source associates arbitrary per-object data with
//! interfaces, neighbors and areas via `void *` arrays indexed by an
//! auto-allocated dense id (`examples/original_source/ospf6d/
//! ospf6_private_data.c`). The idiomatic replacement is a `HashMap<u32,
//! Box<dyn Any + Send>>` keyed by the same dense id, with ids allocated
//! from a single global counter shared by every object of a given class so
//! that module code can cache an id after the first registration and
//! reuse it against any instance of that class (spec.md §4.I invariant).

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::Error;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Allocates the smallest strictly-positive id not yet handed out to any
/// object of any class. IDs are never reused once allocated: the registry
/// favors predictability (a module's cached id always means the same
/// thing) over density.
pub fn alloc_id() -> u32 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A single host object's private-data list (spec.md §4.I).
#[derive(Debug, Default)]
pub struct PrivateDataList {
    entries: HashMap<u32, Box<dyn Any + Send>>,
}

impl PrivateDataList {
    /// Adds `data` under `id`. If `*id == 0`, allocates a fresh id and
    /// writes it back; otherwise uses the given id and rejects it if
    /// already present in this list.
    pub fn add(
        &mut self,
        id: &mut u32,
        data: Box<dyn Any + Send>,
    ) -> Result<(), Error> {
        if *id == 0 {
            *id = alloc_id();
        } else if self.entries.contains_key(id) {
            return Err(Error::PrivateDataIdInUse(*id));
        }
        self.entries.insert(*id, data);
        Ok(())
    }

    /// Returns the stored data for `id`, if any.
    pub fn get(&self, id: u32) -> Option<&(dyn Any + Send)> {
        self.entries.get(&id).map(|data| data.as_ref())
    }

    /// Returns the stored data for `id`, if any, mutably.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut (dyn Any + Send)> {
        self.entries.get_mut(&id).map(|data| data.as_mut())
    }

    /// Removes and returns the stored data for `id`, if any.
    pub fn del(&mut self, id: u32) -> Option<Box<dyn Any + Send>> {
        self.entries.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_allocated_ids_are_stable_across_objects() {
        let mut iface_list = PrivateDataList::default();
        let mut nbr_list = PrivateDataList::default();

        let mut id = 0;
        iface_list.add(&mut id, Box::new(42u32)).unwrap();
        assert_ne!(id, 0);

        // The same id, cached by module code after the first registration,
        // can be reused to store data on a different object of the same
        // class.
        nbr_list.add(&mut { id }, Box::new(7u32)).unwrap();
        assert_eq!(
            *nbr_list.get(id).unwrap().downcast_ref::<u32>().unwrap(),
            7
        );
        assert_eq!(
            *iface_list.get(id).unwrap().downcast_ref::<u32>().unwrap(),
            42
        );
    }

    #[test]
    fn explicit_id_collision_is_rejected() {
        let mut list = PrivateDataList::default();
        let mut id = 5;
        list.add(&mut id, Box::new(1u32)).unwrap();
        let mut id2 = 5;
        assert!(list.add(&mut id2, Box::new(2u32)).is_err());
    }

    #[test]
    fn del_returns_and_removes() {
        let mut list = PrivateDataList::default();
        let mut id = 0;
        list.add(&mut id, Box::new(9u32)).unwrap();
        let removed = list.del(id).unwrap();
        assert_eq!(*removed.downcast_ref::<u32>().unwrap(), 9);
        assert!(list.get(id).is_none());
    }
}
