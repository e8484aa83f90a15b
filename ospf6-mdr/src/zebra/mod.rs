//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The southbound interface to Zebra: interface/address/route download and
//! upload, and the RFC 4938 link-metrics extension (spec.md §4.G).

pub mod client;
pub mod messages;

pub use client::Client;
pub use messages::Message;
