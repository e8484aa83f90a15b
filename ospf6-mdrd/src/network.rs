//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Per-interface raw IPv6 socket tasks: the one piece of the system that is
//! genuinely this binary's own I/O rather than an external collaborator.
//! spec.md §1 lists the LSDB, Zebra and kernel interface discovery as
//! out-of-scope, but moving OSPFv3 packets on and off the wire and joining
//! its multicast groups (spec.md §4.B "Group-membership side effects") is
//! core daemon behavior, so it lives here rather than in `ospf6-mdr`.
//!
//! `ospf6_mdr::instance::Daemon` never touches a socket directly (see its
//! module doc comment); this module is the other half, feeding decoded
//! frames onto its `net_rx` channel and draining its `net_tx` channel to
//! actually transmit. Since configuration is loaded once at startup with no
//! live-reconfiguration surface (SPEC_FULL.md §3.2), every configured
//! interface's socket is opened eagerly at bootstrap rather than gated on a
//! later notification; `AllSpfRouters` and `AllDRouters` are both joined
//! unconditionally at open time rather than only after a DR/BDR threshold
//! crossing, a simplification noted in DESIGN.md.

use std::os::fd::AsRawFd;
use std::sync::Arc;

use bytes::Bytes;
use nix::sys::socket::{self, SockaddrIn6};
use ospf6_mdr::collections::{AreaId, InterfaceId};
use ospf6_mdr::instance::{NetRx, NetTx};
use ospf6_mdr_utils::capabilities;
use ospf6_mdr_utils::ip::{ALL_D_ROUTERS, ALL_SPF_ROUTERS};
use ospf6_mdr_utils::socket::SocketExt;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, warn};

/// The OSPF IP protocol number (IANA `IPPROTO_OSPFIGP`).
pub const OSPF_IP_PROTO: i32 = 89;

/// Opens and configures a raw IPv6/89 socket bound to `ifname`: non-blocking,
/// `IPV6_RECVPKTINFO` enabled, multicast loopback disabled, joined to both
/// OSPFv3 multicast groups. Requires `CAP_NET_RAW`, re-raised briefly via
/// [`capabilities::raise`] since the daemon otherwise runs unprivileged
/// after [`crate::privdrop`].
pub fn open_socket(ifname: &str, ifindex: u32) -> std::io::Result<Socket> {
    let socket = capabilities::raise(|| {
        Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::from(OSPF_IP_PROTO)))
    })?;

    socket.set_nonblocking(true)?;
    socket.bind_device(Some(ifname.as_bytes()))?;
    socket.set_multicast_loop_v6(false)?;
    socket.set_ipv6_pktinfo(true)?;

    capabilities::raise(|| -> std::io::Result<()> {
        socket.join_multicast_ifindex_v6(&ALL_SPF_ROUTERS, ifindex)?;
        socket.join_multicast_ifindex_v6(&ALL_D_ROUTERS, ifindex)?;
        Ok(())
    })?;

    Ok(socket)
}

/// Spawns the read and write tasks for one interface's socket, returning the
/// sender half callers should register in their `iface_id -> NetTx` routing
/// table.
pub fn spawn(
    area_id: AreaId,
    iface_id: InterfaceId,
    ifindex: u32,
    socket: Socket,
    net_rxp: UnboundedSender<NetRx>,
) -> UnboundedSender<NetTx> {
    let (net_tx_tx, net_tx_rx) = mpsc::unbounded_channel();

    let socket = match AsyncFd::new(socket) {
        Ok(socket) => Arc::new(socket),
        Err(error) => {
            error!(%error, ifindex, "failed to register raw socket with tokio");
            return net_tx_tx;
        }
    };

    tokio::spawn(read_loop(socket.clone(), area_id, iface_id, net_rxp));
    tokio::spawn(write_loop(socket, ifindex, net_tx_rx));

    net_tx_tx
}

async fn read_loop(
    socket: Arc<AsyncFd<Socket>>,
    area_id: AreaId,
    iface_id: InterfaceId,
    net_rxp: UnboundedSender<NetRx>,
) {
    let mut buf = [0u8; 16384];

    loop {
        let received = socket
            .async_io(tokio::io::Interest::READABLE, |socket| {
                let mut iov = [std::io::IoSliceMut::new(&mut buf)];
                let mut cmsgspace = nix::cmsg_space!(libc::in6_pktinfo);
                socket::recvmsg::<SockaddrIn6>(
                    socket.as_raw_fd(),
                    &mut iov,
                    Some(&mut cmsgspace),
                    socket::MsgFlags::empty(),
                )
                .map(|msg| (msg.address.as_ref().map(SockaddrIn6::ip), msg.bytes))
                .map_err(std::io::Error::from)
            })
            .await;

        match received {
            Ok((Some(src), n)) => {
                let bytes = Bytes::copy_from_slice(&buf[..n]);
                if net_rxp.send(NetRx { area_id, iface_id, src, bytes }).is_err() {
                    return;
                }
            }
            Ok((None, _)) => {
                warn!("received OSPFv3 packet with no source address, dropping");
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
            Err(error) => {
                warn!(%error, "raw socket read failed");
            }
        }
    }
}

async fn write_loop(
    socket: Arc<AsyncFd<Socket>>,
    ifindex: u32,
    mut net_tx_rx: UnboundedReceiver<NetTx>,
) {
    while let Some(NetTx { dst, bytes, .. }) = net_tx_rx.recv().await {
        let sockaddr: SockaddrIn6 =
            std::net::SocketAddrV6::new(dst, 0, 0, ifindex).into();
        let result = socket
            .async_io(tokio::io::Interest::WRITABLE, |socket| {
                let iov = [std::io::IoSlice::new(&bytes)];
                socket::sendmsg(
                    socket.as_raw_fd(),
                    &iov,
                    &[],
                    socket::MsgFlags::empty(),
                    Some(&sockaddr),
                )
                .map_err(std::io::Error::from)
            })
            .await;
        if let Err(error) = result {
            warn!(%error, ifindex, "raw socket write failed");
        }
    }
}
