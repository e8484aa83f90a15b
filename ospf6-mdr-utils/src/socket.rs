//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;
use std::os::raw::{c_int, c_void};
use std::os::unix::io::AsRawFd;

type Result<T> = std::io::Result<T>;

#[cfg(not(feature = "testing"))]
pub use socket2::Socket;

/// Socket options OSPFv3 needs on its raw (`IPPROTO_OSPFIGP`) IPv6 socket.
pub trait SocketExt: Sized + AsRawFd {
    // Sets the value of the IPV6_UNICAST_HOPS option for this socket.
    fn set_ipv6_unicast_hops(&self, hops: u8) -> Result<()> {
        let optval = hops as c_int;
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_UNICAST_HOPS,
            &optval as *const _ as *const c_void,
            std::mem::size_of::<c_int>() as libc::socklen_t,
        )
    }

    // Sets the value of the IPV6_MULTICAST_HOPS option for this socket.
    fn set_ipv6_multicast_hops(&self, hops: u8) -> Result<()> {
        let optval = hops as c_int;
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_MULTICAST_HOPS,
            &optval as *const _ as *const c_void,
            std::mem::size_of::<c_int>() as libc::socklen_t,
        )
    }

    // Sets the value of the IPV6_MULTICAST_IF option for this socket.
    fn set_multicast_ifindex_v6(&self, ifindex: u32) -> Result<()> {
        let optval = ifindex as c_int;
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_MULTICAST_IF,
            &optval as *const _ as *const c_void,
            std::mem::size_of::<c_int>() as libc::socklen_t,
        )
    }

    // Sets the value of the IPV6_RECVPKTINFO option for this socket, needed
    // to learn the receiving interface and destination address of inbound
    // Hello/DD/LSUpdate/LSAck packets.
    fn set_ipv6_pktinfo(&self, enable: bool) -> Result<()> {
        let optval = enable as c_int;
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_RECVPKTINFO,
            &optval as *const _ as *const c_void,
            std::mem::size_of::<c_int>() as libc::socklen_t,
        )
    }

    // Joins the given IPv6 multicast group (AllSPFRouters/AllDRouters) on
    // the given interface. Idempotent: re-joining an already-joined group
    // is tolerated by the kernel as `EADDRINUSE`, which callers should
    // treat as success.
    fn join_multicast_ifindex_v6(
        &self,
        group: &Ipv6Addr,
        ifindex: u32,
    ) -> Result<()> {
        let mreq = libc::ipv6_mreq {
            ipv6mr_multiaddr: libc::in6_addr {
                s6_addr: group.octets(),
            },
            ipv6mr_interface: ifindex,
        };
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_ADD_MEMBERSHIP,
            &mreq as *const _ as *const c_void,
            std::mem::size_of::<libc::ipv6_mreq>() as libc::socklen_t,
        )
    }

    // Leaves the given IPv6 multicast group on the given interface.
    fn leave_multicast_ifindex_v6(
        &self,
        group: &Ipv6Addr,
        ifindex: u32,
    ) -> Result<()> {
        let mreq = libc::ipv6_mreq {
            ipv6mr_multiaddr: libc::in6_addr {
                s6_addr: group.octets(),
            },
            ipv6mr_interface: ifindex,
        };
        setsockopt(
            self,
            libc::IPPROTO_IPV6,
            libc::IPV6_DROP_MEMBERSHIP,
            &mreq as *const _ as *const c_void,
            std::mem::size_of::<libc::ipv6_mreq>() as libc::socklen_t,
        )
    }
}

#[cfg(not(feature = "testing"))]
impl SocketExt for Socket {}

fn setsockopt<F: AsRawFd>(
    sock: &F,
    level: c_int,
    optname: c_int,
    optval: *const c_void,
    optlen: libc::socklen_t,
) -> Result<()> {
    let ret = unsafe {
        libc::setsockopt(sock.as_raw_fd(), level, optname, optval, optlen)
    };
    if ret == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
