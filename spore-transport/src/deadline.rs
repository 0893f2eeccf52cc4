// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use spore_core::TransportError;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    timeout: Duration,
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn duration(&self) -> Duration {
        self.timeout
    }

    pub async fn execute<F, T>(&self, f: F) -> Result<T, TransportError>
    where
        F: std::future::Future<Output = Result<T, TransportError>>,
    {
        match timeout(self.timeout, f).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(deadline = ?self.timeout, "Request deadline exceeded");
                Err(TransportError::Timeout)
            }
        }
    }
}
