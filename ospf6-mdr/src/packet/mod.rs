//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod error;
pub mod lls;
pub mod tlv;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use internet_checksum::Checksum;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use serde::{Deserialize, Serialize};

use crate::lsa::LsaHeader;
use error::{DecodeError, DecodeResult};
use lls::LlsData;
use tlv::{DbDescTlv, HelloTlv, LlsTlv, TlvInterop};

pub const OSPFV3_VERSION: u8 = 3;
pub const PACKET_HDR_SIZE: u16 = 16;

/// The LLS-data-present bit in the Hello/DD Options field (RFC 5613 §2.2).
/// A packet with this bit set but no decodable LLS block is malformed and
/// must be rejected rather than silently treated as having no LLS data.
pub const OPTION_L_BIT: u32 = 1 << 9;

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PacketType {
    Hello = 1,
    DbDesc = 2,
    LsRequest = 3,
    LsUpdate = 4,
    LsAck = 5,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PacketHdr {
    pub pkt_type: PacketType,
    pub router_id: u32,
    pub area_id: u32,
    pub instance_id: u8,
}

impl PacketHdr {
    fn decode(buf: &mut Bytes) -> DecodeResult<(Self, u16)> {
        if buf.remaining() < PACKET_HDR_SIZE as usize {
            return Err(DecodeError::IncompletePacket);
        }
        let version = buf.get_u8();
        if version != OSPFV3_VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }
        let raw_type = buf.get_u8();
        let pkt_type = PacketType::from_u8(raw_type)
            .ok_or(DecodeError::UnknownPacketType(raw_type))?;
        let pkt_len = buf.get_u16();
        let router_id = buf.get_u32();
        let area_id = buf.get_u32();
        let _cksum = buf.get_u16();
        let instance_id = buf.get_u8();
        let _reserved = buf.get_u8();

        Ok((
            PacketHdr {
                pkt_type,
                router_id,
                area_id,
                instance_id,
            },
            pkt_len,
        ))
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(OSPFV3_VERSION);
        buf.put_u8(self.pkt_type as u8);
        // Packet length rewritten in `packet_encode_end`.
        buf.put_u16(0);
        buf.put_u32(self.router_id);
        buf.put_u32(self.area_id);
        // Checksum rewritten in `packet_encode_end`.
        buf.put_u16(0);
        buf.put_u8(self.instance_id);
        buf.put_u8(0);
    }

    fn verify_cksum(data: &[u8]) -> DecodeResult<()> {
        let mut cksum = Checksum::new();
        cksum.add_bytes(&data[..12]);
        cksum.add_bytes(&data[14..]);
        if cksum.checksum() != data[12..14] {
            return Err(DecodeError::InvalidChecksum);
        }
        Ok(())
    }

    fn update_cksum(buf: &mut BytesMut) {
        let mut cksum = Checksum::new();
        cksum.add_bytes(&buf[..12]);
        cksum.add_bytes(&buf[14..]);
        buf[12..14].copy_from_slice(&cksum.checksum());
    }
}

/// The five router-id lists concatenated in the Hello body (spec.md §4.C),
/// in wire order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HelloNeighborLists {
    pub lost: Vec<u32>,
    pub init: Vec<u32>,
    pub dependent: Vec<u32>,
    pub sel_adv: Vec<u32>,
    pub other: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hello {
    pub hdr: PacketHdr,
    pub iface_id: u32,
    pub priority: u8,
    pub options: u32,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub dr: Option<u32>,
    pub bdr: Option<u32>,
    pub neighbors: HelloNeighborLists,
    pub lls_hello: Option<HelloTlv>,
}

impl Hello {
    const BASE_LENGTH: u16 = 20;

    fn decode(hdr: PacketHdr, buf: &mut Bytes, lls: Vec<LlsTlv>) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.remaining() as u16));
        }
        let iface_id = buf.get_u32();
        let priority = buf.get_u8();
        let opt_hi = buf.get_u8();
        let opt_lo = buf.get_u16();
        let options = ((opt_hi as u32) << 16) | opt_lo as u32;
        let hello_interval = buf.get_u16();
        let dead_interval = buf.get_u16();
        let dr = non_zero(buf.get_u32());
        let bdr = non_zero(buf.get_u32());

        let lls_hello = lls.iter().find_map(|tlv| match tlv {
            LlsTlv::Hello(hello) => Some(*hello),
            _ => None,
        });

        let (n1, n2, n3, n4) = match lls_hello {
            Some(tlv) => (
                tlv.n1_lost as usize,
                tlv.n2_init as usize,
                tlv.n3_dependent as usize,
                tlv.n4_sel_adv as usize,
            ),
            // Without LLS counts every router-id in the body belongs to
            // the "other bidirectional" list (a plain RFC 5340 Hello).
            None => (0, 0, 0, buf.remaining() / 4),
        };

        let lost = read_router_ids(buf, n1)?;
        let init = read_router_ids(buf, n2)?;
        let dependent = read_router_ids(buf, n3)?;
        let sel_adv = read_router_ids(buf, n4)?;
        let other_count = buf.remaining() / 4;
        let other = read_router_ids(buf, other_count)?;

        Ok(Hello {
            hdr,
            iface_id,
            priority,
            options,
            hello_interval,
            dead_interval,
            dr,
            bdr,
            neighbors: HelloNeighborLists {
                lost,
                init,
                dependent,
                sel_adv,
                other,
            },
            lls_hello,
        })
    }

    fn encode(&self, interop: TlvInterop) -> Bytes {
        let mut buf = BytesMut::new();
        self.hdr.encode(&mut buf);
        buf.put_u32(self.iface_id);
        buf.put_u8(self.priority);
        buf.put_u8(((self.options >> 16) & 0xff) as u8);
        buf.put_u16((self.options & 0xffff) as u16);
        buf.put_u16(self.hello_interval);
        buf.put_u16(self.dead_interval);
        buf.put_u32(self.dr.unwrap_or(0));
        buf.put_u32(self.bdr.unwrap_or(0));
        for router_id in self
            .neighbors
            .lost
            .iter()
            .chain(&self.neighbors.init)
            .chain(&self.neighbors.dependent)
            .chain(&self.neighbors.sel_adv)
            .chain(&self.neighbors.other)
        {
            buf.put_u32(*router_id);
        }

        if let Some(tlv) = self.lls_hello {
            LlsData::Hello(tlv).encode(&mut buf, interop);
        }
        packet_encode_finish(buf)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DbDescFlags {
    pub ms: bool,
    pub m: bool,
    pub i: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DbDesc {
    pub hdr: PacketHdr,
    pub options: u32,
    pub mtu: u16,
    pub flags: DbDescFlags,
    pub seq_no: u32,
    pub lsa_hdrs: Vec<LsaHeader>,
    pub lls_dbdesc: Option<DbDescTlv>,
}

impl DbDesc {
    const BASE_LENGTH: u16 = 12;
    const LSA_HDR_LENGTH: u16 = 20;

    fn decode(hdr: PacketHdr, buf: &mut Bytes, lls: Vec<LlsTlv>) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.remaining() as u16));
        }
        let opt_hi = buf.get_u8();
        let opt_lo = buf.get_u16();
        let options = ((opt_hi as u32) << 16) | opt_lo as u32;
        let mtu = buf.get_u16();
        let raw_flags = buf.get_u8();
        let flags = DbDescFlags {
            ms: raw_flags & 0x01 != 0,
            m: raw_flags & 0x02 != 0,
            i: raw_flags & 0x04 != 0,
        };
        let seq_no = buf.get_u32();

        let mut lsa_hdrs = Vec::new();
        while buf.remaining() >= Self::LSA_HDR_LENGTH as usize {
            let _age = buf.get_u16();
            let raw_lsa_type = buf.get_u16();
            let lsa_id = buf.get_u32();
            let adv_router = buf.get_u32();
            let seq = buf.get_u32();
            let _cksum = buf.get_u16();
            let _len = buf.get_u16();
            let Some(lsa_type) = lsa_type_from_wire(raw_lsa_type) else {
                continue;
            };
            lsa_hdrs.push(LsaHeader {
                key: crate::lsa::LsaKey {
                    lsa_type,
                    lsa_id,
                    adv_router,
                },
                age: _age,
                seq_no: seq,
                options: 0,
            });
        }

        let lls_dbdesc = lls.into_iter().find_map(|tlv| match tlv {
            LlsTlv::DbDesc(tlv) => Some(tlv),
            _ => None,
        });

        Ok(DbDesc {
            hdr,
            options,
            mtu,
            flags,
            seq_no,
            lsa_hdrs,
            lls_dbdesc,
        })
    }

    fn encode(&self, interop: TlvInterop) -> Bytes {
        let mut buf = BytesMut::new();
        self.hdr.encode(&mut buf);
        buf.put_u8(((self.options >> 16) & 0xff) as u8);
        buf.put_u16((self.options & 0xffff) as u16);
        buf.put_u16(self.mtu);
        let mut raw_flags = 0u8;
        if self.flags.ms {
            raw_flags |= 0x01;
        }
        if self.flags.m {
            raw_flags |= 0x02;
        }
        if self.flags.i {
            raw_flags |= 0x04;
        }
        buf.put_u8(raw_flags);
        buf.put_u32(self.seq_no);
        for hdr in &self.lsa_hdrs {
            buf.put_u16(hdr.age);
            buf.put_u16(lsa_type_to_wire(hdr.key.lsa_type));
            buf.put_u32(hdr.key.lsa_id);
            buf.put_u32(hdr.key.adv_router);
            buf.put_u32(hdr.seq_no);
            buf.put_u16(0);
            buf.put_u16(Self::LSA_HDR_LENGTH);
        }

        if let Some(tlv) = self.lls_dbdesc {
            LlsData::DbDesc(tlv).encode(&mut buf, interop);
        }
        packet_encode_finish(buf)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Hello(Hello),
    DbDesc(DbDesc),
}

impl Packet {
    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.len() < PACKET_HDR_SIZE as usize {
            return Err(DecodeError::IncompletePacket);
        }
        let buf_orig = buf.clone();
        let (hdr, pkt_len) = PacketHdr::decode(buf)?;
        if pkt_len as usize > buf_orig.len() {
            return Err(DecodeError::InvalidLength(pkt_len));
        }
        PacketHdr::verify_cksum(&buf_orig[..pkt_len as usize])?;

        let body_len = pkt_len as usize - PACKET_HDR_SIZE as usize;
        let mut body = buf.split_to(body_len);

        // The L-bit promises an LLS block follows; a packet that sets it
        // but carries no decodable block is rejected outright rather than
        // quietly treated as having no LLS data (spec.md §8 "On receive...
        // rejects malformed blocks").
        let l_bit_set = options_has_l_bit(hdr.pkt_type, &body);
        let lls = if buf.has_remaining() {
            match lls::decode_lls_block(buf) {
                Ok(tlvs) => tlvs,
                Err(error) => {
                    if l_bit_set {
                        return Err(error);
                    }
                    Vec::new()
                }
            }
        } else if l_bit_set {
            return Err(DecodeError::LlsTruncated);
        } else {
            Vec::new()
        };

        match hdr.pkt_type {
            PacketType::Hello => {
                Ok(Packet::Hello(Hello::decode(hdr, &mut body, lls)?))
            }
            PacketType::DbDesc => {
                Ok(Packet::DbDesc(DbDesc::decode(hdr, &mut body, lls)?))
            }
            PacketType::LsRequest
            | PacketType::LsUpdate
            | PacketType::LsAck => {
                Err(DecodeError::UnknownPacketType(hdr.pkt_type as u8))
            }
        }
    }

    pub fn encode(&self, interop: TlvInterop) -> Bytes {
        match self {
            Packet::Hello(pkt) => pkt.encode(interop),
            Packet::DbDesc(pkt) => pkt.encode(interop),
        }
    }

    pub fn hdr(&self) -> &PacketHdr {
        match self {
            Packet::Hello(pkt) => &pkt.hdr,
            Packet::DbDesc(pkt) => &pkt.hdr,
        }
    }
}

fn packet_encode_finish(mut buf: BytesMut) -> Bytes {
    let pkt_len = buf.len() as u16;
    buf[2..4].copy_from_slice(&pkt_len.to_be_bytes());
    PacketHdr::update_cksum(&mut buf);
    buf.freeze()
}

/// Peeks the Options field's L-bit out of an undecoded packet body. The
/// Options field sits at a different offset in each packet type (Hello
/// carries `iface_id`/`priority` ahead of it; DD opens with it directly),
/// so this reads the raw bytes rather than waiting for the full per-type
/// decode to run.
fn options_has_l_bit(pkt_type: PacketType, body: &[u8]) -> bool {
    let offset = match pkt_type {
        PacketType::Hello => 5,
        PacketType::DbDesc => 0,
        PacketType::LsRequest | PacketType::LsUpdate | PacketType::LsAck => {
            return false;
        }
    };
    let Some(opt_hi) = body.get(offset) else {
        return false;
    };
    let Some(opt_lo) = body.get(offset + 1..offset + 3) else {
        return false;
    };
    let options =
        ((*opt_hi as u32) << 16) | u16::from_be_bytes([opt_lo[0], opt_lo[1]]) as u32;
    options & OPTION_L_BIT != 0
}

fn non_zero(v: u32) -> Option<u32> {
    if v == 0 {
        None
    } else {
        Some(v)
    }
}

fn read_router_ids(buf: &mut Bytes, count: usize) -> DecodeResult<Vec<u32>> {
    if buf.remaining() < count * 4 {
        return Err(DecodeError::InvalidLength(buf.remaining() as u16));
    }
    Ok((0..count).map(|_| buf.get_u32()).collect())
}

fn lsa_type_from_wire(raw: u16) -> Option<crate::lsa::LsaType> {
    use crate::lsa::LsaType;
    match raw {
        0x2001 => Some(LsaType::Router),
        0x2002 => Some(LsaType::Network),
        0x2003 => Some(LsaType::InterAreaPrefix),
        0x2004 => Some(LsaType::InterAreaRouter),
        0x4005 => Some(LsaType::AsExternal),
        0x0008 => Some(LsaType::Link),
        0x2009 => Some(LsaType::IntraAreaPrefix),
        _ => None,
    }
}

fn lsa_type_to_wire(lsa_type: crate::lsa::LsaType) -> u16 {
    lsa_type as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdr() -> PacketHdr {
        PacketHdr {
            pkt_type: PacketType::Hello,
            router_id: 1,
            area_id: 0,
            instance_id: 0,
        }
    }

    #[test]
    fn hello_without_lls_puts_all_neighbors_in_other_list() {
        let pkt = Hello {
            hdr: hdr(),
            iface_id: 5,
            priority: 1,
            options: 0,
            hello_interval: 2,
            dead_interval: 6,
            dr: None,
            bdr: None,
            neighbors: HelloNeighborLists {
                other: vec![2, 3],
                ..Default::default()
            },
            lls_hello: None,
        };
        let bytes = pkt.encode(TlvInterop::Rfc);
        let mut bytes = bytes;
        let decoded = Packet::decode(&mut bytes).unwrap();
        let Packet::Hello(decoded) = decoded else {
            panic!("expected Hello");
        };
        assert_eq!(decoded.neighbors.other, vec![2, 3]);
    }

    #[test]
    fn hello_with_lls_splits_lists_by_tlv_counts() {
        let pkt = Hello {
            hdr: hdr(),
            iface_id: 5,
            priority: 1,
            options: 0,
            hello_interval: 2,
            dead_interval: 6,
            dr: Some(9),
            bdr: None,
            neighbors: HelloNeighborLists {
                lost: vec![10],
                init: vec![],
                dependent: vec![20],
                sel_adv: vec![],
                other: vec![30, 31],
            },
            lls_hello: Some(HelloTlv {
                hsn: 1,
                options: tlv::HelloTlvOptions::empty(),
                n1_lost: 1,
                n2_init: 0,
                n3_dependent: 1,
                n4_sel_adv: 0,
            }),
        };
        let mut bytes = pkt.encode(TlvInterop::Rfc);
        let decoded = Packet::decode(&mut bytes).unwrap();
        let Packet::Hello(decoded) = decoded else {
            panic!("expected Hello");
        };
        assert_eq!(decoded.neighbors.lost, vec![10]);
        assert_eq!(decoded.neighbors.dependent, vec![20]);
        assert_eq!(decoded.neighbors.other, vec![30, 31]);
    }

    #[test]
    fn l_bit_set_without_lls_block_is_rejected() {
        let pkt = Hello {
            hdr: hdr(),
            iface_id: 5,
            priority: 1,
            options: OPTION_L_BIT,
            hello_interval: 2,
            dead_interval: 6,
            dr: None,
            bdr: None,
            neighbors: HelloNeighborLists::default(),
            lls_hello: None,
        };
        let mut bytes = pkt.encode(TlvInterop::Rfc);
        assert!(matches!(
            Packet::decode(&mut bytes),
            Err(DecodeError::LlsTruncated)
        ));
    }

    #[test]
    fn l_bit_set_with_lls_block_present_decodes_normally() {
        let pkt = Hello {
            hdr: hdr(),
            iface_id: 5,
            priority: 1,
            options: OPTION_L_BIT,
            hello_interval: 2,
            dead_interval: 6,
            dr: None,
            bdr: None,
            neighbors: HelloNeighborLists::default(),
            lls_hello: Some(HelloTlv {
                hsn: 1,
                options: tlv::HelloTlvOptions::empty(),
                n1_lost: 0,
                n2_init: 0,
                n3_dependent: 0,
                n4_sel_adv: 0,
            }),
        };
        let mut bytes = pkt.encode(TlvInterop::Rfc);
        assert!(Packet::decode(&mut bytes).is_ok());
    }

    #[test]
    fn dbdesc_l_bit_set_without_lls_block_is_rejected() {
        let pkt = DbDesc {
            hdr: PacketHdr {
                pkt_type: PacketType::DbDesc,
                ..hdr()
            },
            options: OPTION_L_BIT,
            mtu: 1500,
            flags: DbDescFlags::default(),
            seq_no: 1,
            lsa_hdrs: Vec::new(),
            lls_dbdesc: None,
        };
        let mut bytes = pkt.encode(TlvInterop::Rfc);
        assert!(matches!(
            Packet::decode(&mut bytes),
            Err(DecodeError::LlsTruncated)
        ));
    }

    #[test]
    fn corrupt_packet_checksum_is_rejected() {
        let pkt = Hello {
            hdr: hdr(),
            iface_id: 5,
            priority: 1,
            options: 0,
            hello_interval: 2,
            dead_interval: 6,
            dr: None,
            bdr: None,
            neighbors: HelloNeighborLists::default(),
            lls_hello: None,
        };
        let mut bytes = pkt.encode(TlvInterop::Rfc).to_vec();
        bytes[12] ^= 0xff;
        let mut bytes = Bytes::from(bytes);
        assert!(matches!(
            Packet::decode(&mut bytes),
            Err(DecodeError::InvalidChecksum)
        ));
    }
}
