// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use spore_core::{ErrorCode, TransportError};
use spore_model::Status;
use thiserror::Error;

/// Failures of the package and permission stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid package key '{0}'")]
    InvalidKey(String),
    #[error("invalid permission query {0}")]
    InvalidQuery(String),
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("no agent named '{0}' is registered with this station")]
    UnknownAgent(String),
    #[error("agent '{agent}' could not be rebuilt: {reason}")]
    Rebuild { agent: String, reason: String },
    #[error("no resident with id {0:016x}")]
    UnknownResident(u64),
    #[error("resident {0:016x} is already running")]
    AlreadyRunning(u64),
    #[error("an instance with id {0:016x} is already hosted here")]
    Occupied(u64),
}

impl ContainerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ContainerError::UnknownResident(_) => ErrorCode::UnknownResident,
            ContainerError::AlreadyRunning(_) | ContainerError::Occupied(_) => ErrorCode::ResidentBusy,
            _ => ErrorCode::InstantiationFailure,
        }
    }

    /// The id is taken at this station. The agent itself is fine.
    pub fn is_busy(&self) -> bool {
        matches!(self, ContainerError::AlreadyRunning(_) | ContainerError::Occupied(_))
    }
}

/// Why an inbound transfer was answered with a failure.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Busy(ContainerError),
}

impl TransferError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TransferError::Store(_) => ErrorCode::StoreFailure,
            TransferError::Busy(e) => e.code(),
        }
    }
}

/// Failure of one request/response exchange with a remote station.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("station answered {code}: {message}")]
    Remote { code: ErrorCode, message: String },
    #[error("unexpected response to {0}")]
    Unexpected(&'static str),
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("cannot {action} while {status}")]
    WrongPhase { action: &'static str, status: Status },
    #[error("invalid destination parameters: {0}")]
    Parameters(String),
    #[error("package '{0}' is missing from the local store")]
    MissingPackage(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MigrationError {
    pub fn is_transport(&self) -> bool {
        matches!(self, MigrationError::Rpc(RpcError::Transport(_)))
    }

    /// Failure class recorded in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrationError::Rpc(RpcError::Transport(_)) => "TransportFailure",
            MigrationError::Rpc(_) => "RemoteFailure",
            MigrationError::WrongPhase { .. } | MigrationError::Parameters(_) => "UsageError",
            MigrationError::MissingPackage(_) | MigrationError::Store(_) => "StoreFailure",
        }
    }
}

impl From<TransportError> for MigrationError {
    fn from(e: TransportError) -> Self {
        MigrationError::Rpc(RpcError::Transport(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_classified() {
        let e = MigrationError::from(TransportError::Timeout);
        assert!(e.is_transport());
        assert_eq!(e.kind(), "TransportFailure");

        let e = MigrationError::from(RpcError::Remote {
            code: ErrorCode::StoreFailure,
            message: "disk full".into(),
        });
        assert!(!e.is_transport());
        assert_eq!(e.kind(), "RemoteFailure");
        assert!(e.to_string().contains("disk full"));
    }

    #[test]
    fn container_errors_map_to_wire_codes() {
        assert_eq!(ContainerError::UnknownResident(1).code(), ErrorCode::UnknownResident);
        assert_eq!(
            ContainerError::UnknownAgent("x".into()).code(),
            ErrorCode::InstantiationFailure
        );
        assert_eq!(ContainerError::Occupied(1).code(), ErrorCode::ResidentBusy);
        assert!(ContainerError::AlreadyRunning(1).is_busy());
        assert!(!ContainerError::UnknownAgent("x".into()).is_busy());
    }
}
