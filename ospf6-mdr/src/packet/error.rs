//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors raised while decoding an OSPFv3 packet, its LLS block or a TLV
/// inside it (spec.md §4.C "On receive... rejects malformed blocks").
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum DecodeError {
    IncompletePacket,
    InvalidVersion(u8),
    UnknownPacketType(u8),
    InvalidLength(u16),
    InvalidChecksum,
    InvalidRouterId(u32),
    InvalidTlvLength(u16),
    MissingRequiredTlv(u16),
    LlsTruncated,
    LlsInvalidLength,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IncompletePacket => {
                write!(f, "incomplete packet")
            }
            DecodeError::InvalidVersion(version) => {
                write!(f, "invalid packet version: {version}")
            }
            DecodeError::UnknownPacketType(pkt_type) => {
                write!(f, "unknown packet type: {pkt_type}")
            }
            DecodeError::InvalidLength(len) => {
                write!(f, "invalid packet length: {len}")
            }
            DecodeError::InvalidChecksum => {
                write!(f, "invalid checksum")
            }
            DecodeError::InvalidRouterId(router_id) => {
                write!(f, "invalid router-id: {router_id}")
            }
            DecodeError::InvalidTlvLength(len) => {
                write!(f, "invalid TLV length: {len}")
            }
            DecodeError::MissingRequiredTlv(tlv_type) => {
                write!(f, "missing required TLV: {tlv_type}")
            }
            DecodeError::LlsTruncated => {
                write!(f, "LLS block absent or truncated")
            }
            DecodeError::LlsInvalidLength => {
                write!(f, "invalid LLS block length")
            }
        }
    }
}

impl std::error::Error for DecodeError {}
