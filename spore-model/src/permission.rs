// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::instance::short_id_of;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authorization decision for one (agent, version, place) triple.
#[derive(
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
)]
#[archive(check_bytes)]
pub struct Permission {
    pub allowed: bool,
    #[serde(default)]
    pub auto_start: bool,
}

impl Permission {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            auto_start: false,
        }
    }

    pub fn deny() -> Self {
        Self::default()
    }

    pub fn with_auto_start(mut self) -> Self {
        self.auto_start = true;
        self
    }
}

/// Lookup key. The hash is always reduced to its short id so that the full
/// content hash and the short id address the same record.
#[derive(
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
)]
#[archive(check_bytes)]
pub struct PermissionIdentity {
    pub agent_name: String,
    pub short_id: String,
    pub place_name: String,
}

impl PermissionIdentity {
    pub fn new(agent_name: &str, hash: &str, place_name: &str) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            short_id: short_id_of(hash),
            place_name: place_name.to_string(),
        }
    }

    /// All three fields must be non-empty to be a valid query.
    pub fn is_complete(&self) -> bool {
        !self.agent_name.is_empty() && !self.short_id.is_empty() && !self.place_name.is_empty()
    }
}

impl fmt::Display for PermissionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.agent_name, self.short_id, self.place_name)
    }
}
