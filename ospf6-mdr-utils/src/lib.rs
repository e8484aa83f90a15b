//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod bytes;
pub mod capabilities;
pub mod ip;
pub mod num;
pub mod option;
pub mod socket;
pub mod task;
