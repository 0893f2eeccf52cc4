// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::instance::{AgentIdentity, Instance, Status};
use crate::permission::{Permission, PermissionIdentity};
use serde::{Deserialize, Serialize};

// --- TRANSFER PROTOCOL ---

/// An inbound migration: descriptor, serialized agent and its package.
#[derive(Serialize, Deserialize, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone)]
#[archive(check_bytes)]
pub struct TransferRequest {
    pub instance: Instance,
    pub agent_bytes: Vec<u8>,
    pub package_name: String,
    pub place_name: String,
    pub package_data: Vec<u8>,
}

#[derive(Serialize, Deserialize, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[archive(check_bytes)]
pub enum ResidentPhase {
    /// Instantiated, waiting to be started.
    Dormant,
    /// A lifecycle hook is executing.
    Running,
}

#[derive(Serialize, Deserialize, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct ResidentInfo {
    pub id: u64,
    pub agent: AgentIdentity,
    pub place_name: String,
    pub status: Status,
    pub phase: ResidentPhase,
}

// --- STATION PROTOCOL ---

#[derive(Serialize, Deserialize, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone)]
#[archive(check_bytes)]
pub enum StationRequest {
    Ping,
    Transfer(TransferRequest),
    LookupPermission(PermissionIdentity),
    ListResidents,
    StartResident { id: u64 },
    StopResident { id: u64 },
}

impl StationRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            StationRequest::Ping => "ping",
            StationRequest::Transfer(_) => "transfer",
            StationRequest::LookupPermission(_) => "lookup_permission",
            StationRequest::ListResidents => "list_residents",
            StationRequest::StartResident { .. } => "start_resident",
            StationRequest::StopResident { .. } => "stop_resident",
        }
    }
}

#[derive(Serialize, Deserialize, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone)]
#[archive(check_bytes)]
pub enum StationResponse {
    Pong { station: String },
    /// The transfer was accepted. Authorization denial also answers this.
    Transferred { instance: Instance },
    /// `None` means no record exists, which callers treat as deny.
    Permission(Option<Permission>),
    Residents(Vec<ResidentInfo>),
    Ack,
    Failed { code: u16, message: String },
}
