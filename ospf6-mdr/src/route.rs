//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Route table types: nexthops and the per-area SPF result table
//! (spec.md §3 "Vertex", §4.E "Install rule").

use std::collections::BTreeMap;
use std::net::Ipv6Addr;

use derive_new::new;
use ipnetwork::Ipv6Network;

use crate::collections::InterfaceIndex;

/// Maximum number of equal-cost nexthops kept per route (spec.md §3
/// "Vertex": "up to K nexthops (K=MULTI_PATH_LIMIT, typically 8)").
pub const MULTI_PATH_LIMIT: usize = 8;

/// Uniquely identifies a nexthop by (ifindex, address), as required by the
/// SPF "Install rule" merge-unique-by-(ifindex,address) invariant.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(new)]
pub struct NexthopKey {
    pub iface_idx: InterfaceIndex,
    pub addr: Option<Ipv6Addr>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(new)]
pub struct Nexthop {
    pub iface_idx: InterfaceIndex,
    pub addr: Option<Ipv6Addr>,
    pub nbr_router_id: Option<u32>,
}

/// Sorted, deduplicated nexthop set. A `BTreeMap` keyed by [`NexthopKey`]
/// gives both properties for free: inserting an existing key overwrites in
/// place and iteration order is the deterministic sort order spec.md §3
/// requires ("nexthops are sorted deterministically").
pub type Nexthops = BTreeMap<NexthopKey, Nexthop>;

/// Merges `new` into `existing`, capping the result at
/// [`MULTI_PATH_LIMIT`]. Mirrors the teacher's `Nexthops::extend` idiom
/// (`holo-ospf/src/spf.rs`), adding the explicit cap spec.md §4.E calls for
/// and that the teacher's code does not need (it has no such limit).
pub fn merge_nexthops(existing: &mut Nexthops, new: Nexthops) {
    existing.extend(new);
    while existing.len() > MULTI_PATH_LIMIT {
        let last_key = *existing.keys().next_back().unwrap();
        existing.remove(&last_key);
    }
}

/// A single intra-area route computed by the SPF engine, keyed by
/// destination prefix in the owning area's `spf_table`.
#[derive(Clone, Debug)]
pub struct RouteNet {
    pub cost: u32,
    pub nexthops: Nexthops,
}

impl RouteNet {
    pub fn new(cost: u32) -> RouteNet {
        RouteNet {
            cost,
            nexthops: Nexthops::new(),
        }
    }
}

/// A route to another router's router-LSA (used to track "routable
/// neighbor" membership — spec.md §4.E, GLOSSARY "Routable neighbor").
#[derive(Clone, Debug)]
pub struct RouteRtr {
    pub cost: u32,
    pub nexthops: Nexthops,
}

/// The result of the most recently completed SPF run for one area.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    pub networks: BTreeMap<Ipv6Network, RouteNet>,
    pub routers: BTreeMap<u32, RouteRtr>,
}

impl RouteTable {
    /// Returns `true` if `router_id` has an installed route, i.e. it is a
    /// "routable neighbor" per the GLOSSARY definition.
    pub fn is_routable(&self, router_id: u32) -> bool {
        self.routers.contains_key(&router_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(idx: InterfaceIndex, addr: &str) -> NexthopKey {
        NexthopKey::new(idx, Some(addr.parse().unwrap()))
    }

    #[test]
    fn merge_dedupes_by_ifindex_and_address() {
        let mut arena = generational_arena::Arena::<()>::new();
        let idx = arena.insert(());

        let mut existing = Nexthops::new();
        existing.insert(
            key(idx, "fe80::1"),
            Nexthop::new(idx, Some("fe80::1".parse().unwrap()), None),
        );

        let mut new = Nexthops::new();
        new.insert(
            key(idx, "fe80::2"),
            Nexthop::new(idx, Some("fe80::2".parse().unwrap()), None),
        );
        // Re-adding the same key must be a no-op (idempotence, scenario 5).
        new.insert(
            key(idx, "fe80::1"),
            Nexthop::new(idx, Some("fe80::1".parse().unwrap()), None),
        );

        merge_nexthops(&mut existing, new);
        assert_eq!(existing.len(), 2);
    }

    #[test]
    fn merge_caps_at_multi_path_limit() {
        let mut arena = generational_arena::Arena::<()>::new();
        let mut existing = Nexthops::new();
        for i in 0..(MULTI_PATH_LIMIT + 3) {
            let idx = arena.insert(());
            let addr: Ipv6Addr =
                format!("fe80::{:x}", i + 1).parse().unwrap();
            existing.insert(
                NexthopKey::new(idx, Some(addr)),
                Nexthop::new(idx, Some(addr), None),
            );
        }
        merge_nexthops(&mut existing, Nexthops::new());
        assert_eq!(existing.len(), MULTI_PATH_LIMIT);
    }
}
