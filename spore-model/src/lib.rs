// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

pub mod error;
pub mod instance;
pub mod package;
pub mod permission;
pub mod protocol;

pub use error::Error;
pub use instance::*;
pub use package::Package;
pub use permission::*;
pub use protocol::*;

pub use rkyv;
pub use serde;
