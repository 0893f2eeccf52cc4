// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use anyhow::{anyhow, Context, Result};
use spore_model::{AgentIdentity, Endpoint, Status};
use std::time::Duration;
use tokio::sync::broadcast::{error::RecvError, Receiver};

/// What happened to the instances a station hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationEvent {
    Dispatched { id: u64, agent: AgentIdentity },
    Admitted { id: u64, agent: AgentIdentity, place: String, started: bool },
    Denied { id: u64, agent: AgentIdentity, place: String },
    InstantiationFailed { id: u64, agent: AgentIdentity, reason: String },
    Departed { id: u64, to: Endpoint, status: Status },
    MigrationFailed { id: u64, to: Endpoint, status: Status, reason: String },
    HookFailed { id: u64, status: Status, reason: String },
    /// The round trip completed and `back_at_home_station` has run.
    Returned { id: u64 },
    Retired { id: u64 },
    Stopped { id: u64 },
}

impl StationEvent {
    pub fn id(&self) -> u64 {
        match self {
            StationEvent::Dispatched { id, .. }
            | StationEvent::Admitted { id, .. }
            | StationEvent::Denied { id, .. }
            | StationEvent::InstantiationFailed { id, .. }
            | StationEvent::Departed { id, .. }
            | StationEvent::MigrationFailed { id, .. }
            | StationEvent::HookFailed { id, .. }
            | StationEvent::Returned { id }
            | StationEvent::Retired { id }
            | StationEvent::Stopped { id } => *id,
        }
    }
}

/// Waits for the next event matching `pred`. Lagging receivers skip ahead.
pub async fn wait_for<F>(
    events: &mut Receiver<StationEvent>,
    timeout: Duration,
    mut pred: F,
) -> Result<StationEvent>
where
    F: FnMut(&StationEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => break Ok(event),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break Err(anyhow!("station event stream closed")),
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .context("timed out waiting for station event")?
}
