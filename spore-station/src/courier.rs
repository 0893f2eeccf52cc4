// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::client::StationClient;
use crate::error::RpcError;
use spore_core::BoxFuture;
use spore_model::{Endpoint, Instance, TransferRequest};
use spore_transport::{Deadline, RetryPolicy};

/// Outbound half of a migration: hands a transfer to another station's
/// transfer endpoint and returns the instance it acknowledged.
pub trait Courier: Send + Sync {
    fn transfer<'a>(
        &'a self,
        to: &'a Endpoint,
        request: TransferRequest,
    ) -> BoxFuture<'a, Result<Instance, RpcError>>;
}

pub struct SynapseCourier {
    retry: RetryPolicy,
    deadline: Deadline,
}

impl SynapseCourier {
    pub fn new(retry: RetryPolicy, deadline: Deadline) -> Self {
        Self { retry, deadline }
    }
}

impl Courier for SynapseCourier {
    fn transfer<'a>(
        &'a self,
        to: &'a Endpoint,
        request: TransferRequest,
    ) -> BoxFuture<'a, Result<Instance, RpcError>> {
        Box::pin(async move {
            let client = StationClient::connect(to, &self.retry, self.deadline).await?;
            client.transfer(request).await
        })
    }
}
