//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;

use tracing::{error, warn, warn_span};

use crate::collections::{AreaId, InterfaceId, NeighborId};
use crate::interface::ism;
use crate::neighbor::nsm;
use crate::packet::PacketType;
use crate::packet::error::DecodeError;

/// The crate's flat error type, covering the five categories of the error
/// handling design: malformed packet, protocol violation, configuration
/// conflict, transient I/O failure and fatal. There is no generic `Version`
/// parameter since this crate targets OSPFv3/MDR exclusively.
#[derive(Debug)]
pub enum Error {
    // I/O errors.
    IoError(IoError),
    // Inter-task communication (a message referenced an object that no
    // longer exists in the arena by the time it was processed).
    AreaIdNotFound(AreaId),
    InterfaceIdNotFound(InterfaceId),
    NeighborIdNotFound(NeighborId),
    // Malformed packet.
    InvalidSrcAddr(Ipv6Addr),
    InvalidDstAddr(Ipv6Addr),
    PacketDecodeError(DecodeError),
    UnknownNeighbor(Ipv6Addr, u32),
    HelloTruncatedLls,
    // Protocol violation.
    InterfaceCfgError(String, Ipv6Addr, PacketType, InterfaceCfgError),
    DbDescReject(u32, nsm::State),
    DuplicateRouterId(u32),
    // Configuration conflict.
    LinkMetricsAlreadyConfigured(String),
    PrivateDataIdInUse(u32),
    InvalidWeight(&'static str, u8),
    // SPF.
    SpfRootNotFound(AreaId),
    SpfNexthopCalcError,
    // State machines.
    IsmUnexpectedEvent(InterfaceId, ism::State, ism::Event),
    NsmUnexpectedEvent(NeighborId, nsm::State, nsm::Event),
    InterfaceStartError(InterfaceId, Box<Error>),
}

// I/O errors.
#[derive(Debug)]
pub enum IoError {
    SocketError(std::io::Error),
    MulticastJoinError(Ipv6Addr, std::io::Error),
    MulticastLeaveError(Ipv6Addr, std::io::Error),
    RecvError(std::io::Error),
    RecvMissingSourceAddr,
    RecvMissingAncillaryData,
    SendError(std::io::Error),
    ZebraConnectError(std::io::Error),
    ZebraSendError(std::io::Error),
}

// Interface configuration mismatches detected against an incoming Hello,
// per RFC 2328 §10.5 plus the MDR-specific address-family bit check of
// RFC 5838.
#[derive(Debug)]
pub enum InterfaceCfgError {
    AfBitClear,
    AreaIdMismatch(u32, u32),
    HelloMaskMismatch,
    HelloIntervalMismatch(u16, u16),
    DeadIntervalMismatch(u16, u16),
    ExternalRoutingCapabilityMismatch,
    MtuMismatch(u16, u16),
    DuplicateRouterId,
}

// ===== impl Error =====

impl Error {
    // Logs the error using the `tracing` crate. This is the single place
    // where an `Error` is turned into a log line, so callers never format
    // the same error twice.
    pub fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::AreaIdNotFound(area_id) => {
                warn!(?area_id, "{}", self);
            }
            Error::InterfaceIdNotFound(iface_id) => {
                warn!(?iface_id, "{}", self);
            }
            Error::NeighborIdNotFound(nbr_id) => {
                warn!(?nbr_id, "{}", self);
            }
            Error::InvalidSrcAddr(addr) => {
                warn!(%addr, "{}", self);
            }
            Error::InvalidDstAddr(addr) => {
                warn!(%addr, "{}", self);
            }
            Error::PacketDecodeError(error) => {
                warn!(%error, "{}", self);
            }
            Error::UnknownNeighbor(addr, router_id) => {
                warn!(%addr, %router_id, "{}", self);
            }
            Error::HelloTruncatedLls => {
                warn!("{}", self);
            }
            Error::InterfaceCfgError(ifname, addr, pkt_type, error) => {
                warn_span!("interface", name = %ifname).in_scope(|| {
                    warn!(%addr, ?pkt_type, %error, "{}", self);
                });
            }
            Error::DbDescReject(router_id, state) => {
                warn!(%router_id, ?state, "{}", self);
            }
            Error::DuplicateRouterId(router_id) => {
                warn!(%router_id, "{}", self);
            }
            Error::LinkMetricsAlreadyConfigured(ifname) => {
                warn!(%ifname, "{}", self);
            }
            Error::PrivateDataIdInUse(id) => {
                warn!(%id, "{}", self);
            }
            Error::InvalidWeight(name, value) => {
                warn!(%name, %value, "{}", self);
            }
            Error::SpfRootNotFound(area_id) => {
                warn!(?area_id, "{}", self);
            }
            Error::SpfNexthopCalcError => {
                warn!("{}", self);
            }
            Error::IsmUnexpectedEvent(iface_id, state, event) => {
                warn!(?iface_id, ?state, ?event, "{}", self);
            }
            Error::NsmUnexpectedEvent(nbr_id, state, event) => {
                warn!(?nbr_id, ?state, ?event, "{}", self);
            }
            Error::InterfaceStartError(iface_id, error) => {
                error!(?iface_id, %error, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(..) => {
                write!(f, "I/O error")
            }
            Error::AreaIdNotFound(..) => {
                write!(f, "area ID not found")
            }
            Error::InterfaceIdNotFound(..) => {
                write!(f, "interface ID not found")
            }
            Error::NeighborIdNotFound(..) => {
                write!(f, "neighbor ID not found")
            }
            Error::InvalidSrcAddr(..) => {
                write!(f, "invalid source address")
            }
            Error::InvalidDstAddr(..) => {
                write!(f, "invalid destination address")
            }
            Error::PacketDecodeError(..) => {
                write!(f, "failed to decode packet")
            }
            Error::UnknownNeighbor(..) => {
                write!(f, "unknown neighbor")
            }
            Error::HelloTruncatedLls => {
                write!(f, "L-bit set but LLS block absent or truncated")
            }
            Error::InterfaceCfgError(..) => {
                write!(f, "interface configuration mismatch")
            }
            Error::DbDescReject(..) => {
                write!(f, "rejected Database Description packet")
            }
            Error::DuplicateRouterId(..) => {
                write!(f, "duplicate router ID detected")
            }
            Error::LinkMetricsAlreadyConfigured(..) => {
                write!(f, "link metrics already configured on interface")
            }
            Error::PrivateDataIdInUse(..) => {
                write!(f, "private data ID already in use")
            }
            Error::InvalidWeight(..) => {
                write!(f, "invalid link-metrics weight")
            }
            Error::SpfRootNotFound(..) => {
                write!(f, "SPF root vertex not found")
            }
            Error::SpfNexthopCalcError => {
                write!(f, "failed to calculate SPF nexthops")
            }
            Error::IsmUnexpectedEvent(..) => {
                write!(f, "unexpected ISM event")
            }
            Error::NsmUnexpectedEvent(..) => {
                write!(f, "unexpected NSM event")
            }
            Error::InterfaceStartError(..) => {
                write!(f, "failed to start interface")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::InterfaceStartError(_, error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    fn log(&self) {
        match self {
            IoError::SocketError(error) => {
                error!(%error, "failed to create or bind socket");
            }
            IoError::MulticastJoinError(addr, error) => {
                warn!(%addr, %error, "failed to join multicast group");
            }
            IoError::MulticastLeaveError(addr, error) => {
                warn!(%addr, %error, "failed to leave multicast group");
            }
            IoError::RecvError(error) => {
                warn!(%error, "failed to receive packet");
            }
            IoError::RecvMissingSourceAddr => {
                warn!("failed to retrieve source address from received packet");
            }
            IoError::RecvMissingAncillaryData => {
                warn!("failed to retrieve ancillary data from received packet");
            }
            IoError::SendError(error) => {
                warn!(%error, "failed to send packet");
            }
            IoError::ZebraConnectError(error) => {
                warn!(%error, "failed to connect to the Zebra daemon");
            }
            IoError::ZebraSendError(error) => {
                warn!(%error, "failed to send message to the Zebra daemon");
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "I/O error")
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::SocketError(error)
            | IoError::MulticastJoinError(_, error)
            | IoError::MulticastLeaveError(_, error)
            | IoError::RecvError(error)
            | IoError::SendError(error)
            | IoError::ZebraConnectError(error)
            | IoError::ZebraSendError(error) => Some(error),
            IoError::RecvMissingSourceAddr
            | IoError::RecvMissingAncillaryData => None,
        }
    }
}

impl std::fmt::Display for InterfaceCfgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceCfgError::AfBitClear => {
                write!(f, "address-family bit not set in Hello options")
            }
            InterfaceCfgError::AreaIdMismatch(expected, received) => {
                write!(
                    f,
                    "area ID mismatch (expected {expected}, received {received})"
                )
            }
            InterfaceCfgError::HelloMaskMismatch => {
                write!(f, "network mask mismatch")
            }
            InterfaceCfgError::HelloIntervalMismatch(expected, received) => {
                write!(
                    f,
                    "hello interval mismatch (expected {expected}, received {received})"
                )
            }
            InterfaceCfgError::DeadIntervalMismatch(expected, received) => {
                write!(
                    f,
                    "dead interval mismatch (expected {expected}, received {received})"
                )
            }
            InterfaceCfgError::ExternalRoutingCapabilityMismatch => {
                write!(f, "external routing capability mismatch")
            }
            InterfaceCfgError::MtuMismatch(expected, received) => {
                write!(
                    f,
                    "MTU mismatch (expected {expected}, received {received})"
                )
            }
            InterfaceCfgError::DuplicateRouterId => {
                write!(f, "duplicate router ID")
            }
        }
    }
}

// Recursively formats an error's causal chain, following `holo-ospf`'s
// `with_source` helper.
pub fn with_source<E: std::error::Error>(error: E) -> String {
    let mut output = error.to_string();
    let mut source = error.source();
    while let Some(error) = source {
        output += &format!(": {error}");
        source = error.source();
    }
    output
}
