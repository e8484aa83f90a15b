//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! A four-router topology where two equal-cost paths from the root converge
//! on a common downstream router, exercising the SPF "Install rule"'s
//! nexthop-merge branch end to end (spec.md §4.E, §8 scenario 5) rather than
//! just `route::merge_nexthops` in isolation.
//!
//! Root (1) has two MDR-seeded neighbors, 2 and 3, each one hop away at
//! cost 10. Both 2 and 3 have a router-LSA link to router 4 at cost 5, so
//! router 4 is reachable at cost 15 via either neighbor. The SPF run must
//! install a single route to router 4 carrying both nexthops.

use const_addrs::ip6;
use generational_arena::Arena;
use ospf6_mdr::spf::{
    self, Lsdb, NeighborSeed, NetworkLsaView, RouterLsaView, SpfLink,
};

struct FourRouterLsdb;

impl Lsdb for FourRouterLsdb {
    fn router_lsa(&self, router_id: u32) -> Option<RouterLsaView> {
        let links = match router_id {
            2 => vec![SpfLink::ToRouter {
                nbr_router_id: 4,
                nbr_iface_id: 40,
                iface_id: 20,
                cost: 5,
            }],
            3 => vec![SpfLink::ToRouter {
                nbr_router_id: 4,
                nbr_iface_id: 41,
                iface_id: 30,
                cost: 5,
            }],
            4 => vec![
                SpfLink::ToRouter {
                    nbr_router_id: 2,
                    nbr_iface_id: 20,
                    iface_id: 40,
                    cost: 5,
                },
                SpfLink::ToRouter {
                    nbr_router_id: 3,
                    nbr_iface_id: 30,
                    iface_id: 41,
                    cost: 5,
                },
            ],
            _ => return None,
        };
        Some(RouterLsaView { options: 0, links })
    }

    fn network_lsa(&self, _dr_router_id: u32, _dr_iface_id: u32) -> Option<NetworkLsaView> {
        None
    }
}

fn seeds(arena: &mut Arena<()>) -> Vec<NeighborSeed> {
    let idx2 = arena.insert(());
    let idx3 = arena.insert(());
    vec![
        NeighborSeed {
            router_id: 2,
            iface_idx: idx2,
            iface_cost: 10,
            linklocal_addr: Some(ip6!("fe80::2")),
            has_router_lsa: true,
        },
        NeighborSeed {
            router_id: 3,
            iface_idx: idx3,
            iface_cost: 10,
            linklocal_addr: Some(ip6!("fe80::3")),
            has_router_lsa: true,
        },
    ]
}

#[test]
fn equal_cost_paths_merge_nexthops_at_the_converging_router() {
    let mut arena = Arena::<()>::new();
    let table = spf::run(&FourRouterLsdb, 1, &seeds(&mut arena), false);

    assert!(table.is_routable(4));
    let route = &table.routers[&4];
    assert_eq!(route.cost, 15);
    assert_eq!(route.nexthops.len(), 2);
    let addrs: Vec<_> = route.nexthops.values().filter_map(|nh| nh.addr).collect();
    assert!(addrs.contains(&ip6!("fe80::2")));
    assert!(addrs.contains(&ip6!("fe80::3")));
}

#[test]
fn rerunning_spf_on_the_same_topology_is_idempotent() {
    let mut arena = Arena::<()>::new();
    let first = spf::run(&FourRouterLsdb, 1, &seeds(&mut arena), false);
    let second = spf::run(&FourRouterLsdb, 1, &seeds(&mut arena), false);

    assert_eq!(first.routers[&4].cost, second.routers[&4].cost);
    assert_eq!(
        first.routers[&4].nexthops.keys().collect::<Vec<_>>(),
        second.routers[&4].nexthops.keys().collect::<Vec<_>>(),
    );
    assert_eq!(first.routers[&2].cost, second.routers[&2].cost);
    assert_eq!(first.routers[&3].cost, second.routers[&3].cost);
}
