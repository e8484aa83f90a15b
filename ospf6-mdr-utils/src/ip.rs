//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;

use ipnetwork::Ipv6Network;

/// Extension methods for `Ipv6Addr` used throughout the OSPFv3 MDR stack.
pub trait Ipv6AddrExt {
    /// Returns `true` if the address is a link-local unicast address
    /// (`fe80::/10`).
    fn is_link_local_unicast(&self) -> bool;

    /// Returns `true` if the address is a link-scoped multicast group.
    fn is_multicast_link_scope(&self) -> bool;
}

impl Ipv6AddrExt for Ipv6Addr {
    fn is_link_local_unicast(&self) -> bool {
        let segments = self.segments();
        (segments[0] & 0xffc0) == 0xfe80
    }

    fn is_multicast_link_scope(&self) -> bool {
        self.is_multicast() && (self.segments()[0] & 0x000f) == 0x0002
    }
}

/// Extension methods for `Ipv6Network`.
pub trait Ipv6NetworkExt {
    /// Returns the number of octets the prefix occupies on the wire, as
    /// used by OSPFv3 prefix LSA encoding (no trailing zero octets).
    fn wire_octets(&self) -> usize;
}

impl Ipv6NetworkExt for Ipv6Network {
    fn wire_octets(&self) -> usize {
        self.prefix().div_ceil(8) as usize
    }
}

/// AllSPFRouters (`ff02::5`).
pub const ALL_SPF_ROUTERS: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 5);

/// AllDRouters (`ff02::6`).
pub const ALL_D_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 6);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_local_detection() {
        let addr: Ipv6Addr = "fe80::1".parse().unwrap();
        assert!(addr.is_link_local_unicast());
        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert!(!addr.is_link_local_unicast());
    }

    #[test]
    fn well_known_groups() {
        assert_eq!(ALL_SPF_ROUTERS.to_string(), "ff02::5");
        assert_eq!(ALL_D_ROUTERS.to_string(), "ff02::6");
    }
}
