//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! TLV framing helpers and the two MDR-specific TLVs carried in the LLS
//! block (spec.md §4.C).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive as _;
use serde::{Deserialize, Serialize};

use super::error::{DecodeError, DecodeResult};

pub const TLV_HDR_SIZE: u16 = 4;

/// How the MDR Hello/DD TLV codepoints are chosen on encode. Both
/// codepoints are always accepted on decode (spec.md §9 Open Question
/// resolution): interop only affects what this router emits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum TlvInterop {
    #[default]
    Rfc,
    Legacy,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq, ToPrimitive)]
pub enum LlsTlvType {
    HelloRfc = 14,
    DbDescRfc = 15,
    HelloLegacy = 0x11,
    DbDescLegacy = 0x12,
}

impl LlsTlvType {
    fn is_hello(raw: u16) -> bool {
        raw == LlsTlvType::HelloRfc as u16 || raw == LlsTlvType::HelloLegacy as u16
    }

    fn is_dbdesc(raw: u16) -> bool {
        raw == LlsTlvType::DbDescRfc as u16
            || raw == LlsTlvType::DbDescLegacy as u16
    }

    fn hello_codepoint(interop: TlvInterop) -> LlsTlvType {
        match interop {
            TlvInterop::Rfc => LlsTlvType::HelloRfc,
            TlvInterop::Legacy => LlsTlvType::HelloLegacy,
        }
    }

    fn dbdesc_codepoint(interop: TlvInterop) -> LlsTlvType {
        match interop {
            TlvInterop::Rfc => LlsTlvType::DbDescRfc,
            TlvInterop::Legacy => LlsTlvType::DbDescLegacy,
        }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct HelloTlvOptions: u8 {
        /// No-adjacency-reduction: sender wants full OSPFv3 adjacency
        /// behavior on this link (spec.md §4.C).
        const A = 0x01;
        /// Differential hello: lists carry only changes since the last
        /// full hello.
        const D = 0x02;
    }
}

/// The MDR Hello TLV (spec.md §4.C): hsn, option bits, and the lengths of
/// neighbor lists 1-4 (list 5, the "other bidirectional" list, is
/// whatever remains of the five concatenated lists in the Hello body).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HelloTlv {
    pub hsn: u16,
    pub options: HelloTlvOptions,
    pub n1_lost: u16,
    pub n2_init: u16,
    pub n3_dependent: u16,
    pub n4_sel_adv: u16,
}

impl HelloTlv {
    const LENGTH: u16 = 8;

    pub(crate) fn decode(tlv_len: u16, buf: &mut Bytes) -> DecodeResult<Self> {
        if tlv_len != Self::LENGTH {
            return Err(DecodeError::InvalidTlvLength(tlv_len));
        }
        let hsn = buf.get_u16();
        let options = HelloTlvOptions::from_bits_truncate(buf.get_u8());
        let _reserved = buf.get_u8();
        let n1_lost = buf.get_u16();
        let n2_init = buf.get_u16();
        let n3_dependent = buf.get_u16();
        let n4_sel_adv = buf.get_u16();
        Ok(HelloTlv {
            hsn,
            options,
            n1_lost,
            n2_init,
            n3_dependent,
            n4_sel_adv,
        })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut, interop: TlvInterop) {
        let start_pos =
            tlv_encode_start(buf, LlsTlvType::hello_codepoint(interop));
        buf.put_u16(self.hsn);
        buf.put_u8(self.options.bits());
        buf.put_u8(0);
        buf.put_u16(self.n1_lost);
        buf.put_u16(self.n2_init);
        buf.put_u16(self.n3_dependent);
        buf.put_u16(self.n4_sel_adv);
        tlv_encode_end(buf, start_pos);
    }
}

/// The MDR DD TLV (spec.md §4.C): the sender's current (DR, BDR), allowing
/// the receiver to track `mdr_level` during Exchange/Loading without a
/// fresh Hello.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DbDescTlv {
    pub dr: Option<u32>,
    pub bdr: Option<u32>,
}

impl DbDescTlv {
    const LENGTH: u16 = 8;

    pub(crate) fn decode(tlv_len: u16, buf: &mut Bytes) -> DecodeResult<Self> {
        if tlv_len != Self::LENGTH {
            return Err(DecodeError::InvalidTlvLength(tlv_len));
        }
        let dr = non_zero(buf.get_u32());
        let bdr = non_zero(buf.get_u32());
        Ok(DbDescTlv { dr, bdr })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut, interop: TlvInterop) {
        let start_pos =
            tlv_encode_start(buf, LlsTlvType::dbdesc_codepoint(interop));
        buf.put_u32(self.dr.unwrap_or(0));
        buf.put_u32(self.bdr.unwrap_or(0));
        tlv_encode_end(buf, start_pos);
    }
}

fn non_zero(v: u32) -> Option<u32> {
    if v == 0 {
        None
    } else {
        Some(v)
    }
}

/// The two TLVs this crate understands in an LLS block, keyed by which
/// wire codepoint (RFC or legacy) actually carried them.
#[derive(Clone, Copy, Debug)]
pub enum LlsTlv {
    Hello(HelloTlv),
    DbDesc(DbDescTlv),
}

pub(crate) fn decode_lls_tlvs(buf: &mut Bytes) -> DecodeResult<Vec<LlsTlv>> {
    let mut tlvs = Vec::new();
    while buf.remaining() >= TLV_HDR_SIZE as usize {
        let raw_type = buf.get_u16();
        let tlv_len = buf.get_u16();
        let wire_len = tlv_wire_len(tlv_len) as usize;
        if buf.remaining() < wire_len {
            return Err(DecodeError::InvalidTlvLength(tlv_len));
        }
        let mut tlv_buf = buf.copy_to_bytes(wire_len);
        let mut body = tlv_buf.split_to(tlv_len as usize);

        if LlsTlvType::is_hello(raw_type) {
            tlvs.push(LlsTlv::Hello(HelloTlv::decode(tlv_len, &mut body)?));
        } else if LlsTlvType::is_dbdesc(raw_type) {
            tlvs.push(LlsTlv::DbDesc(DbDescTlv::decode(tlv_len, &mut body)?));
        }
        // Unknown TLVs are silently skipped, per the usual TLV
        // forward-compatibility convention.
        let _ = tlv_buf;
    }
    Ok(tlvs)
}

// ===== global functions =====

/// The TLV length is padded to 4-byte alignment.
pub(crate) fn tlv_wire_len(tlv_len: u16) -> u16 {
    (tlv_len + 3) & !0x03
}

pub(crate) fn tlv_encode_start(
    buf: &mut BytesMut,
    tlv_type: impl num_traits::ToPrimitive,
) -> usize {
    let start_pos = buf.len();
    buf.put_u16(tlv_type.to_u16().unwrap());
    buf.put_u16(0);
    start_pos
}

pub(crate) fn tlv_encode_end(buf: &mut BytesMut, start_pos: usize) {
    let tlv_len = (buf.len() - start_pos) as u16 - TLV_HDR_SIZE;
    buf[start_pos + 2..start_pos + 4].copy_from_slice(&tlv_len.to_be_bytes());

    let tlv_wlen = tlv_wire_len(tlv_len);
    if tlv_wlen != tlv_len {
        buf.put_bytes(0, (tlv_wlen - tlv_len) as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_tlv_round_trips_through_rfc_codepoint() {
        let mut buf = BytesMut::new();
        let tlv = HelloTlv {
            hsn: 7,
            options: HelloTlvOptions::D,
            n1_lost: 1,
            n2_init: 2,
            n3_dependent: 3,
            n4_sel_adv: 4,
        };
        tlv.encode(&mut buf, TlvInterop::Rfc);

        let mut bytes = buf.freeze();
        let raw_type = bytes.get_u16();
        assert_eq!(raw_type, LlsTlvType::HelloRfc as u16);
        let tlv_len = bytes.get_u16();
        let decoded = HelloTlv::decode(tlv_len, &mut bytes).unwrap();
        assert_eq!(decoded, tlv);
    }

    #[test]
    fn legacy_codepoint_hello_tlv_is_still_accepted_on_decode() {
        let mut buf = BytesMut::new();
        let tlv = HelloTlv {
            hsn: 1,
            options: HelloTlvOptions::empty(),
            n1_lost: 0,
            n2_init: 0,
            n3_dependent: 0,
            n4_sel_adv: 0,
        };
        tlv.encode(&mut buf, TlvInterop::Legacy);

        let mut bytes = buf.freeze();
        let tlvs = decode_lls_tlvs(&mut bytes).unwrap();
        assert!(matches!(tlvs[0], LlsTlv::Hello(decoded) if decoded == tlv));
    }

    #[test]
    fn db_desc_tlv_round_trips_with_no_dr_bdr() {
        let mut buf = BytesMut::new();
        let tlv = DbDescTlv { dr: None, bdr: None };
        tlv.encode(&mut buf, TlvInterop::Rfc);
        let mut bytes = buf.freeze();
        let tlvs = decode_lls_tlvs(&mut bytes).unwrap();
        assert!(matches!(tlvs[0], LlsTlv::DbDesc(decoded) if decoded == tlv));
    }
}
