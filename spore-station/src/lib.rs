// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

pub mod agent;
pub mod client;
pub mod config;
pub mod container;
pub mod courier;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod package;
pub mod permission;
pub mod residents;
pub mod station;

pub use agent::{AgentCatalog, Destination, MobileAgent, StaticAgent, StaticContext};
pub use client::StationClient;
pub use config::{PermissionRecord, StationConfig};
pub use container::{AgentHandle, ExecutionContainer, LocalContainer};
pub use courier::{Courier, SynapseCourier};
pub use endpoint::{StationHandler, TransferEndpoint};
pub use error::{ContainerError, MigrationError, RpcError, StoreError, TransferError};
pub use events::{wait_for, StationEvent};
pub use lifecycle::{Phase, StationContext, Voyage};
pub use package::{FilePackageStore, MemoryPackageStore, PackageStore, PackageWriter};
pub use permission::{MemoryPermissionStore, PermissionStore, RemotePermissionStore};
pub use station::{DispatchSpec, Station, StationBuilder, StationHandle};

pub use spore_core::BoxFuture;
pub use spore_model::{
    AgentIdentity, Endpoint, Instance, Package, Permission, PermissionIdentity, ResidentInfo,
    ResidentPhase, Status, TransferRequest,
};

use std::path::PathBuf;

pub fn resolve_data_dir() -> PathBuf {
    if let Ok(p) = std::env::var("SPORE_DATA_DIR") {
        return PathBuf::from(p);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".spore");
    }
    PathBuf::from("/tmp/spore")
}

/// Content fingerprint used as an agent's version hash.
pub fn fingerprint(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
