//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The Zebra client wire protocol: a length-prefixed binary frame carrying
//! interface, route and link-metrics messages (spec.md §4.G "Zebra
//! client").

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipnetwork::IpNetwork;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use crate::linkmetrics::{LinkStatus, RawLinkMetrics};

pub const HEADER_MARKER: u8 = 0xfe;
pub const ZSERV_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 6;

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq, ToPrimitive)]
pub enum Command {
    InterfaceAdd = 1,
    InterfaceDelete = 2,
    InterfaceStateUpdate = 3,
    InterfaceAddressAdd = 4,
    InterfaceAddressDelete = 5,
    Ipv4RouteAdd = 6,
    Ipv4RouteDelete = 7,
    Ipv6RouteAdd = 8,
    Ipv6RouteDelete = 9,
    LinkMetricsSubscribe = 10,
    LinkMetricsUnsubscribe = 11,
    LinkMetrics = 12,
    LinkStatus = 13,
    LinkMetricsRequest = 14,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InterfaceInfo {
    pub ifindex: u32,
    pub name: String,
    pub mtu: u16,
    pub up: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InterfaceAddress {
    pub ifindex: u32,
    pub prefix: IpNetwork,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteUpdate {
    pub prefix: IpNetwork,
    pub nexthops: Vec<IpAddr>,
    pub distance: u8,
    pub metric: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkMetricsMsg {
    pub ifindex: u32,
    pub linklocal_addr: Ipv6Addr,
    pub metrics: RawLinkMetrics,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinkStatusMsg {
    pub ifindex: u32,
    pub linklocal_addr: Ipv6Addr,
    pub status: LinkStatus,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinkMetricsRequestMsg {
    pub ifindex: u32,
    pub linklocal_addr: Ipv6Addr,
}

/// One decoded Zebra protocol message, either incoming (the daemon reads
/// these) or outgoing (the daemon writes these).
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    InterfaceAdd(InterfaceInfo),
    InterfaceDelete(InterfaceInfo),
    InterfaceStateUpdate(InterfaceInfo),
    InterfaceAddressAdd(InterfaceAddress),
    InterfaceAddressDelete(InterfaceAddress),
    Ipv4RouteAdd(RouteUpdate),
    Ipv4RouteDelete(RouteUpdate),
    Ipv6RouteAdd(RouteUpdate),
    Ipv6RouteDelete(RouteUpdate),
    LinkMetricsSubscribe(u32),
    LinkMetricsUnsubscribe(u32),
    LinkMetrics(LinkMetricsMsg),
    LinkStatus(LinkStatusMsg),
    LinkMetricsRequest(LinkMetricsRequestMsg),
}

#[derive(Clone, Debug)]
pub enum DecodeError {
    Truncated,
    BadMarker(u8),
    UnsupportedVersion(u8),
    UnknownCommand(u16),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "truncated zebra message"),
            DecodeError::BadMarker(m) => write!(f, "bad header marker: {m:#x}"),
            DecodeError::UnsupportedVersion(v) => {
                write!(f, "unsupported zebra protocol version: {v}")
            }
            DecodeError::UnknownCommand(c) => write!(f, "unknown command: {c}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl Message {
    fn command(&self) -> Command {
        match self {
            Message::InterfaceAdd(_) => Command::InterfaceAdd,
            Message::InterfaceDelete(_) => Command::InterfaceDelete,
            Message::InterfaceStateUpdate(_) => Command::InterfaceStateUpdate,
            Message::InterfaceAddressAdd(_) => Command::InterfaceAddressAdd,
            Message::InterfaceAddressDelete(_) => {
                Command::InterfaceAddressDelete
            }
            Message::Ipv4RouteAdd(_) => Command::Ipv4RouteAdd,
            Message::Ipv4RouteDelete(_) => Command::Ipv4RouteDelete,
            Message::Ipv6RouteAdd(_) => Command::Ipv6RouteAdd,
            Message::Ipv6RouteDelete(_) => Command::Ipv6RouteDelete,
            Message::LinkMetricsSubscribe(_) => Command::LinkMetricsSubscribe,
            Message::LinkMetricsUnsubscribe(_) => {
                Command::LinkMetricsUnsubscribe
            }
            Message::LinkMetrics(_) => Command::LinkMetrics,
            Message::LinkStatus(_) => Command::LinkStatus,
            Message::LinkMetricsRequest(_) => Command::LinkMetricsRequest,
        }
    }

    /// Encodes a full frame (header + body) ready to be written to the
    /// socket.
    pub fn encode(&self) -> Bytes {
        let mut body = BytesMut::new();
        match self {
            Message::InterfaceAdd(info)
            | Message::InterfaceDelete(info)
            | Message::InterfaceStateUpdate(info) => {
                encode_interface_info(&mut body, info)
            }
            Message::InterfaceAddressAdd(addr)
            | Message::InterfaceAddressDelete(addr) => {
                encode_interface_address(&mut body, addr)
            }
            Message::Ipv4RouteAdd(r)
            | Message::Ipv4RouteDelete(r)
            | Message::Ipv6RouteAdd(r)
            | Message::Ipv6RouteDelete(r) => encode_route(&mut body, r),
            Message::LinkMetricsSubscribe(ifindex)
            | Message::LinkMetricsUnsubscribe(ifindex) => {
                body.put_u32(*ifindex)
            }
            Message::LinkMetrics(m) => encode_link_metrics(&mut body, m),
            Message::LinkStatus(m) => encode_link_status(&mut body, m),
            Message::LinkMetricsRequest(m) => {
                body.put_u32(m.ifindex);
                body.put_slice(&m.linklocal_addr.octets());
            }
        }

        let mut frame = BytesMut::with_capacity(HEADER_SIZE + body.len());
        frame.put_u16((HEADER_SIZE + body.len()) as u16);
        frame.put_u8(HEADER_MARKER);
        frame.put_u8(ZSERV_VERSION);
        frame.put_u16(self.command().to_u16().unwrap());
        frame.put(body);
        frame.freeze()
    }

    /// Decodes one full frame. `buf` must contain at least `HEADER_SIZE`
    /// bytes; callers are expected to have already buffered `len` bytes
    /// off the stream (the length-prefixed framing is handled by
    /// [`super::client`]).
    pub fn decode(mut buf: Bytes) -> Result<Message, DecodeError> {
        if buf.remaining() < HEADER_SIZE {
            return Err(DecodeError::Truncated);
        }
        let _len = buf.get_u16();
        let marker = buf.get_u8();
        if marker != HEADER_MARKER {
            return Err(DecodeError::BadMarker(marker));
        }
        let version = buf.get_u8();
        if version != ZSERV_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let command = buf.get_u16();
        let command = Command::from_u16(command)
            .ok_or(DecodeError::UnknownCommand(command))?;

        Ok(match command {
            Command::InterfaceAdd => {
                Message::InterfaceAdd(decode_interface_info(&mut buf)?)
            }
            Command::InterfaceDelete => {
                Message::InterfaceDelete(decode_interface_info(&mut buf)?)
            }
            Command::InterfaceStateUpdate => Message::InterfaceStateUpdate(
                decode_interface_info(&mut buf)?,
            ),
            Command::InterfaceAddressAdd => Message::InterfaceAddressAdd(
                decode_interface_address(&mut buf)?,
            ),
            Command::InterfaceAddressDelete => {
                Message::InterfaceAddressDelete(decode_interface_address(
                    &mut buf,
                )?)
            }
            Command::Ipv4RouteAdd => {
                Message::Ipv4RouteAdd(decode_route(&mut buf, false)?)
            }
            Command::Ipv4RouteDelete => {
                Message::Ipv4RouteDelete(decode_route(&mut buf, false)?)
            }
            Command::Ipv6RouteAdd => {
                Message::Ipv6RouteAdd(decode_route(&mut buf, true)?)
            }
            Command::Ipv6RouteDelete => {
                Message::Ipv6RouteDelete(decode_route(&mut buf, true)?)
            }
            Command::LinkMetricsSubscribe => {
                require(&buf, 4)?;
                Message::LinkMetricsSubscribe(buf.get_u32())
            }
            Command::LinkMetricsUnsubscribe => {
                require(&buf, 4)?;
                Message::LinkMetricsUnsubscribe(buf.get_u32())
            }
            Command::LinkMetrics => {
                Message::LinkMetrics(decode_link_metrics(&mut buf)?)
            }
            Command::LinkStatus => {
                Message::LinkStatus(decode_link_status(&mut buf)?)
            }
            Command::LinkMetricsRequest => {
                require(&buf, 20)?;
                let ifindex = buf.get_u32();
                let linklocal_addr = read_ipv6(&mut buf);
                Message::LinkMetricsRequest(LinkMetricsRequestMsg {
                    ifindex,
                    linklocal_addr,
                })
            }
        })
    }
}

fn require(buf: &Bytes, n: usize) -> Result<(), DecodeError> {
    if buf.remaining() < n {
        Err(DecodeError::Truncated)
    } else {
        Ok(())
    }
}

fn read_ipv6(buf: &mut Bytes) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    buf.copy_to_slice(&mut octets);
    Ipv6Addr::from(octets)
}

fn encode_interface_info(buf: &mut BytesMut, info: &InterfaceInfo) {
    buf.put_u32(info.ifindex);
    buf.put_u16(info.mtu);
    buf.put_u8(info.up as u8);
    let name = info.name.as_bytes();
    buf.put_u8(name.len() as u8);
    buf.put_slice(name);
}

fn decode_interface_info(
    buf: &mut Bytes,
) -> Result<InterfaceInfo, DecodeError> {
    require(buf, 4 + 2 + 1 + 1)?;
    let ifindex = buf.get_u32();
    let mtu = buf.get_u16();
    let up = buf.get_u8() != 0;
    let name_len = buf.get_u8() as usize;
    require(buf, name_len)?;
    let name =
        String::from_utf8_lossy(&buf.copy_to_bytes(name_len)).into_owned();
    Ok(InterfaceInfo { ifindex, name, mtu, up })
}

fn encode_interface_address(buf: &mut BytesMut, addr: &InterfaceAddress) {
    buf.put_u32(addr.ifindex);
    encode_prefix(buf, &addr.prefix);
}

fn decode_interface_address(
    buf: &mut Bytes,
) -> Result<InterfaceAddress, DecodeError> {
    require(buf, 4)?;
    let ifindex = buf.get_u32();
    let prefix = decode_prefix(buf)?;
    Ok(InterfaceAddress { ifindex, prefix })
}

fn encode_prefix(buf: &mut BytesMut, prefix: &IpNetwork) {
    match prefix {
        IpNetwork::V4(n) => {
            buf.put_u8(4);
            buf.put_slice(&n.ip().octets());
            buf.put_u8(n.prefix());
        }
        IpNetwork::V6(n) => {
            buf.put_u8(6);
            buf.put_slice(&n.ip().octets());
            buf.put_u8(n.prefix());
        }
    }
}

fn decode_prefix(buf: &mut Bytes) -> Result<IpNetwork, DecodeError> {
    require(buf, 1)?;
    match buf.get_u8() {
        4 => {
            require(buf, 5)?;
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            let plen = buf.get_u8();
            Ok(IpNetwork::V4(
                ipnetwork::Ipv4Network::new(Ipv4Addr::from(octets), plen)
                    .unwrap_or_else(|_| {
                        ipnetwork::Ipv4Network::new(Ipv4Addr::from(octets), 32)
                            .unwrap()
                    }),
            ))
        }
        6 => {
            require(buf, 17)?;
            let addr = read_ipv6(buf);
            let plen = buf.get_u8();
            Ok(IpNetwork::V6(
                ipnetwork::Ipv6Network::new(addr, plen).unwrap_or_else(|_| {
                    ipnetwork::Ipv6Network::new(addr, 128).unwrap()
                }),
            ))
        }
        other => Err(DecodeError::UnknownCommand(other as u16)),
    }
}

fn encode_route(buf: &mut BytesMut, route: &RouteUpdate) {
    encode_prefix(buf, &route.prefix);
    buf.put_u8(route.distance);
    buf.put_u32(route.metric);
    buf.put_u8(route.nexthops.len() as u8);
    for nh in &route.nexthops {
        match nh {
            IpAddr::V4(a) => {
                buf.put_u8(4);
                buf.put_slice(&a.octets());
            }
            IpAddr::V6(a) => {
                buf.put_u8(6);
                buf.put_slice(&a.octets());
            }
        }
    }
}

fn decode_route(
    buf: &mut Bytes,
    _v6: bool,
) -> Result<RouteUpdate, DecodeError> {
    let prefix = decode_prefix(buf)?;
    require(buf, 1 + 4 + 1)?;
    let distance = buf.get_u8();
    let metric = buf.get_u32();
    let nh_count = buf.get_u8();
    let mut nexthops = Vec::with_capacity(nh_count as usize);
    for _ in 0..nh_count {
        require(buf, 1)?;
        match buf.get_u8() {
            4 => {
                require(buf, 4)?;
                let mut octets = [0u8; 4];
                buf.copy_to_slice(&mut octets);
                nexthops.push(IpAddr::V4(Ipv4Addr::from(octets)));
            }
            6 => {
                require(buf, 16)?;
                nexthops.push(IpAddr::V6(read_ipv6(buf)));
            }
            other => return Err(DecodeError::UnknownCommand(other as u16)),
        }
    }
    Ok(RouteUpdate { prefix, nexthops, distance, metric })
}

fn encode_link_metrics(buf: &mut BytesMut, m: &LinkMetricsMsg) {
    buf.put_u32(m.ifindex);
    buf.put_slice(&m.linklocal_addr.octets());
    buf.put_u8(m.metrics.rlq);
    buf.put_u8(m.metrics.resource);
    buf.put_u16(m.metrics.latency);
    buf.put_u16(m.metrics.current_datarate);
    buf.put_u16(m.metrics.max_datarate);
}

fn decode_link_metrics(buf: &mut Bytes) -> Result<LinkMetricsMsg, DecodeError> {
    require(buf, 4 + 16 + 1 + 1 + 2 + 2 + 2)?;
    let ifindex = buf.get_u32();
    let linklocal_addr = read_ipv6(buf);
    let rlq = buf.get_u8();
    let resource = buf.get_u8();
    let latency = buf.get_u16();
    let current_datarate = buf.get_u16();
    let max_datarate = buf.get_u16();
    Ok(LinkMetricsMsg {
        ifindex,
        linklocal_addr,
        metrics: RawLinkMetrics {
            rlq,
            resource,
            latency,
            current_datarate,
            max_datarate,
        },
    })
}

fn encode_link_status(buf: &mut BytesMut, m: &LinkStatusMsg) {
    buf.put_u32(m.ifindex);
    buf.put_slice(&m.linklocal_addr.octets());
    buf.put_u32(match m.status {
        LinkStatus::Up => 1,
        LinkStatus::Down => 0,
    });
}

fn decode_link_status(buf: &mut Bytes) -> Result<LinkStatusMsg, DecodeError> {
    require(buf, 4 + 16 + 4)?;
    let ifindex = buf.get_u32();
    let linklocal_addr = read_ipv6(buf);
    let status = if buf.get_u32() != 0 {
        LinkStatus::Up
    } else {
        LinkStatus::Down
    };
    Ok(LinkStatusMsg { ifindex, linklocal_addr, status })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_metrics_message_round_trips() {
        let msg = Message::LinkMetrics(LinkMetricsMsg {
            ifindex: 3,
            linklocal_addr: Ipv6Addr::LOCALHOST,
            metrics: RawLinkMetrics {
                rlq: 90,
                resource: 10,
                latency: 20,
                current_datarate: 1000,
                max_datarate: 2000,
            },
        });
        let encoded = msg.encode();
        let decoded = Message::decode(encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn interface_add_round_trips() {
        let msg = Message::InterfaceAdd(InterfaceInfo {
            ifindex: 7,
            name: "wlan0".to_string(),
            mtu: 1500,
            up: true,
        });
        let decoded = Message::decode(msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn bad_marker_is_rejected() {
        let msg = Message::LinkMetricsSubscribe(1);
        let mut encoded = BytesMut::from(&msg.encode()[..]);
        encoded[2] = 0x00;
        assert!(matches!(
            Message::decode(encoded.freeze()),
            Err(DecodeError::BadMarker(0x00))
        ));
    }
}
