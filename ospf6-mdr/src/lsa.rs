//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! LSA identity types shared by the neighbor lists, the SPF engine and the
//! packet codec.
//!
//! The RFC 5340 LSDB itself (storage, aging, flooding, retransmission
//! bookkeeping) is an external collaborator per spec.md §1/§9 "Global
//! mutable state" — this crate never owns LSA content. What it does own is
//! the small set of identity/header types needed to name an LSA in a
//! neighbor's retransmission/summary/request lists and in an SPF vertex.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[derive(num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum LsaType {
    Router = 0x2001,
    Network = 0x2002,
    InterAreaPrefix = 0x2003,
    InterAreaRouter = 0x2004,
    AsExternal = 0x4005,
    Link = 0x0008,
    IntraAreaPrefix = 0x2009,
}

/// Uniquely identifies an LSA instance within an area (or AS, for
/// AS-external LSAs): (type, LSA-ID, advertising router).
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LsaKey {
    pub lsa_type: LsaType,
    pub lsa_id: u32,
    pub adv_router: u32,
}

/// Fields of an LSA header needed outside the LSDB: its key, sequence
/// number and age, used to decide whether a newer instance has been seen
/// and to copy the options/capability byte onto SPF vertices (spec.md §3
/// "Vertex").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LsaHeader {
    pub key: LsaKey,
    pub age: u16,
    pub seq_no: u32,
    pub options: u32,
}
