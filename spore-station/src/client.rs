// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::error::RpcError;
use spore_core::{ErrorCode, TransportError};
use spore_model::{
    Endpoint, Instance, Permission, PermissionIdentity, ResidentInfo, StationRequest,
    StationResponse, TransferRequest,
};
use spore_transport::{Deadline, RetryPolicy, Synapse};

/// Typed requests against one remote station.
pub struct StationClient {
    synapse: Synapse,
}

impl StationClient {
    pub async fn connect(
        endpoint: &Endpoint,
        retry: &RetryPolicy,
        deadline: Deadline,
    ) -> Result<Self, TransportError> {
        let synapse = Synapse::grow(&endpoint.to_string(), retry, deadline).await?;
        Ok(Self { synapse })
    }

    async fn request(&self, request: &StationRequest) -> Result<StationResponse, RpcError> {
        match self.synapse.fire::<_, StationResponse>(request).await? {
            StationResponse::Failed { code, message } => Err(RpcError::Remote {
                code: ErrorCode::from_u16(code),
                message,
            }),
            other => Ok(other),
        }
    }

    pub async fn ping(&self) -> Result<String, RpcError> {
        match self.request(&StationRequest::Ping).await? {
            StationResponse::Pong { station } => Ok(station),
            _ => Err(RpcError::Unexpected("ping")),
        }
    }

    /// Returns the destination's acknowledged copy of the instance.
    pub async fn transfer(&self, request: TransferRequest) -> Result<Instance, RpcError> {
        match self.request(&StationRequest::Transfer(request)).await? {
            StationResponse::Transferred { instance } => Ok(instance),
            _ => Err(RpcError::Unexpected("transfer")),
        }
    }

    pub async fn lookup_permission(
        &self,
        identity: &PermissionIdentity,
    ) -> Result<Option<Permission>, RpcError> {
        match self
            .request(&StationRequest::LookupPermission(identity.clone()))
            .await?
        {
            StationResponse::Permission(permission) => Ok(permission),
            _ => Err(RpcError::Unexpected("lookup_permission")),
        }
    }

    pub async fn residents(&self) -> Result<Vec<ResidentInfo>, RpcError> {
        match self.request(&StationRequest::ListResidents).await? {
            StationResponse::Residents(list) => Ok(list),
            _ => Err(RpcError::Unexpected("list_residents")),
        }
    }

    pub async fn start(&self, id: u64) -> Result<(), RpcError> {
        match self.request(&StationRequest::StartResident { id }).await? {
            StationResponse::Ack => Ok(()),
            _ => Err(RpcError::Unexpected("start_resident")),
        }
    }

    pub async fn stop(&self, id: u64) -> Result<(), RpcError> {
        match self.request(&StationRequest::StopResident { id }).await? {
            StationResponse::Ack => Ok(()),
            _ => Err(RpcError::Unexpected("stop_resident")),
        }
    }
}
