//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The Link-Local Signaling block: a 4-byte header (16-bit checksum,
//! 16-bit length in 32-bit words) followed by 4-byte-aligned TLVs
//! (spec.md §4.C).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use internet_checksum::Checksum;

use super::error::{DecodeError, DecodeResult};
use super::tlv::{decode_lls_tlvs, DbDescTlv, HelloTlv, LlsTlv, TlvInterop};

pub const LLS_HDR_SIZE: u16 = 4;

#[derive(Clone, Copy, Debug)]
pub enum LlsData {
    Hello(HelloTlv),
    DbDesc(DbDescTlv),
}

impl LlsData {
    pub(crate) fn encode(&self, buf: &mut BytesMut, interop: TlvInterop) {
        let start_pos = lls_encode_start(buf);
        match self {
            LlsData::Hello(tlv) => tlv.encode(buf, interop),
            LlsData::DbDesc(tlv) => tlv.encode(buf, interop),
        }
        lls_encode_end(buf, start_pos);
    }
}

/// Parses an LLS block starting at `buf`'s current position. Validates
/// the checksum and the block-length field before handing the remainder
/// to the TLV decoder (spec.md §4.C receive step 1).
pub(crate) fn decode_lls_block(buf: &mut Bytes) -> DecodeResult<Vec<LlsTlv>> {
    if buf.remaining() < LLS_HDR_SIZE as usize {
        return Err(DecodeError::LlsTruncated);
    }

    let all = buf.clone();
    let cksum_rcvd = [all[0], all[1]];
    let mut cksum = Checksum::new();
    cksum.add_bytes(&all[2..]);
    if cksum.checksum() != cksum_rcvd {
        return Err(DecodeError::InvalidChecksum);
    }

    let mut hdr = buf.copy_to_bytes(LLS_HDR_SIZE as usize);
    let _cksum = hdr.get_u16();
    let len_words = hdr.get_u16();
    let len_bytes = len_words as usize * 4;
    if len_bytes < LLS_HDR_SIZE as usize
        || len_bytes - LLS_HDR_SIZE as usize > buf.remaining()
    {
        return Err(DecodeError::LlsInvalidLength);
    }

    let mut body = buf.copy_to_bytes(len_bytes - LLS_HDR_SIZE as usize);
    decode_lls_tlvs(&mut body)
}

pub(crate) fn lls_encode_start(buf: &mut BytesMut) -> usize {
    let start_pos = buf.len();
    buf.put_u16(0);
    buf.put_u16(0);
    start_pos
}

pub(crate) fn lls_encode_end(buf: &mut BytesMut, start_pos: usize) {
    // RFC 5613: "The 16-bit LLS Data Length field contains the length (in
    // 32-bit words) of the LLS block including the header and payload."
    let lls_len = ((buf.len() - start_pos) / 4) as u16;
    buf[start_pos + 2..start_pos + 4].copy_from_slice(&lls_len.to_be_bytes());

    let mut cksum = Checksum::new();
    cksum.add_bytes(&buf[start_pos + 2..]);
    buf[start_pos..start_pos + 2].copy_from_slice(&cksum.checksum());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tlv::HelloTlvOptions;

    #[test]
    fn lls_block_round_trips_a_hello_tlv() {
        let mut buf = BytesMut::new();
        let data = LlsData::Hello(HelloTlv {
            hsn: 3,
            options: HelloTlvOptions::A,
            n1_lost: 0,
            n2_init: 1,
            n3_dependent: 0,
            n4_sel_adv: 2,
        });
        data.encode(&mut buf, TlvInterop::Rfc);

        let mut bytes = buf.freeze();
        let tlvs = decode_lls_block(&mut bytes).unwrap();
        assert_eq!(tlvs.len(), 1);
        assert!(matches!(tlvs[0], LlsTlv::Hello(_)));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut buf = BytesMut::new();
        let data = LlsData::DbDesc(DbDescTlv { dr: Some(1), bdr: None });
        data.encode(&mut buf, TlvInterop::Rfc);
        buf[0] ^= 0xff;

        let mut bytes = buf.freeze();
        assert!(matches!(
            decode_lls_block(&mut bytes),
            Err(DecodeError::InvalidChecksum)
        ));
    }
}
