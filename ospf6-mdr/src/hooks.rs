//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The callback/hook registry: ordered, identity-keyed lists of extension
//! points for interface operations, MDR-level changes and link-metrics
//! events (spec.md §4.H).
//!
//! A hook list is keyed by identity (function-pointer equality, which is
//! why hook signatures here are plain `fn` items rather than closures).
//! `add_hook` rejects duplicates, `remove_hook` is a no-op on an absent
//! entry, and `run_hooks` invokes every callback in registration order,
//! ignoring return values. Because dispatch only ever borrows the list
//! immutably, a hook cannot re-enter `add_hook`/`remove_hook` on the same
//! list during its own call (the borrow checker forbids it).

use std::net::Ipv6Addr;

use crate::interface::AdjConnectivity;
use crate::linkmetrics::{LinkStatus, RawLinkMetrics};
use crate::neighbor::MdrLevel;

/// An ordered, duplicate-free list of function-pointer callbacks.
#[derive(Debug)]
pub struct HookList<F> {
    hooks: Vec<F>,
}

impl<F> Default for HookList<F> {
    fn default() -> HookList<F> {
        HookList { hooks: Vec::new() }
    }
}

impl<F: Copy + PartialEq> HookList<F> {
    /// Registers `hook`, returning `false` if it was already present.
    pub fn add_hook(&mut self, hook: F) -> bool {
        if self.hooks.contains(&hook) {
            return false;
        }
        self.hooks.push(hook);
        true
    }

    /// Removes `hook` if present; a no-op otherwise.
    pub fn remove_hook(&mut self, hook: F) {
        self.hooks.retain(|h| h != &hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterfaceOpsEvent {
    Up,
    Down,
    /// A neighbor on this interface was torn down and removed from the
    /// neighbor table.
    Delete,
}

pub type InterfaceOpsHook = fn(ifindex: u32, InterfaceOpsEvent);
pub type MdrLevelUpdateHook =
    fn(ifindex: u32, router_id: u32, old: MdrLevel, new: MdrLevel);
pub type LinkMetricsHook =
    fn(ifindex: u32, linklocal_addr: Ipv6Addr, metrics: RawLinkMetrics);
pub type LinkStatusHook =
    fn(ifindex: u32, linklocal_addr: Ipv6Addr, status: LinkStatus);
pub type AdjConnectivityHook = fn(ifindex: u32, AdjConnectivity);

/// The four hook classes registered by this crate (spec.md §4.H).
#[derive(Debug, Default)]
pub struct HookRegistry {
    pub interface_ops: HookList<InterfaceOpsHook>,
    pub mdr_level_update: HookList<MdrLevelUpdateHook>,
    pub link_metrics: HookList<LinkMetricsHook>,
    pub link_status: HookList<LinkStatusHook>,
    pub adj_connectivity: HookList<AdjConnectivityHook>,
}

pub fn run_interface_ops(
    list: &HookList<InterfaceOpsHook>,
    ifindex: u32,
    event: InterfaceOpsEvent,
) {
    for hook in &list.hooks {
        hook(ifindex, event);
    }
}

/// Same as [`run_interface_ops`], but in reverse registration order. Used
/// for `delete` notifications, which must unwind in the opposite order
/// extensions registered themselves in.
pub fn run_interface_ops_reverse(
    list: &HookList<InterfaceOpsHook>,
    ifindex: u32,
    event: InterfaceOpsEvent,
) {
    for hook in list.hooks.iter().rev() {
        hook(ifindex, event);
    }
}

pub fn run_mdr_level_update(
    list: &HookList<MdrLevelUpdateHook>,
    ifindex: u32,
    router_id: u32,
    old: MdrLevel,
    new: MdrLevel,
) {
    for hook in &list.hooks {
        hook(ifindex, router_id, old, new);
    }
}

pub fn run_link_metrics(
    list: &HookList<LinkMetricsHook>,
    ifindex: u32,
    linklocal_addr: Ipv6Addr,
    metrics: RawLinkMetrics,
) {
    for hook in &list.hooks {
        hook(ifindex, linklocal_addr, metrics);
    }
}

pub fn run_link_status(
    list: &HookList<LinkStatusHook>,
    ifindex: u32,
    linklocal_addr: Ipv6Addr,
    status: LinkStatus,
) {
    for hook in &list.hooks {
        hook(ifindex, linklocal_addr, status);
    }
}

pub fn run_adj_connectivity(
    list: &HookList<AdjConnectivityHook>,
    ifindex: u32,
    connectivity: AdjConnectivity,
) {
    for hook in &list.hooks {
        hook(ifindex, connectivity);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    static CALLS: AtomicU32 = AtomicU32::new(0);

    fn sample_hook(_ifindex: u32, _event: InterfaceOpsEvent) {
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn other_hook(_ifindex: u32, _event: InterfaceOpsEvent) {
        CALLS.fetch_add(10, Ordering::SeqCst);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut list = HookList::default();
        assert!(list.add_hook(sample_hook as InterfaceOpsHook));
        assert!(!list.add_hook(sample_hook as InterfaceOpsHook));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn removing_absent_hook_is_a_no_op() {
        let mut list: HookList<InterfaceOpsHook> = HookList::default();
        list.remove_hook(sample_hook);
        assert!(list.is_empty());
    }

    #[test]
    fn run_hooks_invokes_all_in_registration_order() {
        CALLS.store(0, Ordering::SeqCst);
        let mut list = HookList::default();
        list.add_hook(sample_hook as InterfaceOpsHook);
        list.add_hook(other_hook as InterfaceOpsHook);
        run_interface_ops(&list, 1, InterfaceOpsEvent::Up);
        assert_eq!(CALLS.load(Ordering::SeqCst), 11);
    }

    static ORDER: std::sync::Mutex<Vec<u32>> = std::sync::Mutex::new(Vec::new());

    fn record_first(_ifindex: u32, _event: InterfaceOpsEvent) {
        ORDER.lock().unwrap().push(1);
    }

    fn record_second(_ifindex: u32, _event: InterfaceOpsEvent) {
        ORDER.lock().unwrap().push(2);
    }

    #[test]
    fn run_hooks_reverse_invokes_in_reverse_registration_order() {
        ORDER.lock().unwrap().clear();
        let mut list = HookList::default();
        list.add_hook(record_first as InterfaceOpsHook);
        list.add_hook(record_second as InterfaceOpsHook);
        run_interface_ops_reverse(&list, 1, InterfaceOpsEvent::Delete);
        assert_eq!(*ORDER.lock().unwrap(), vec![2, 1]);
    }
}
