// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::agent::{Destination, MobileAgent};
use crate::courier::Courier;
use crate::error::MigrationError;
use crate::events::StationEvent;
use crate::package::PackageStore;
use spore_model::{Endpoint, Instance, Status, TransferRequest};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Station-wide handles a running hook may need.
pub struct StationContext {
    pub name: String,
    pub endpoint: Endpoint,
    pub place: String,
    pub courier: Arc<dyn Courier>,
    pub packages: Arc<dyn PackageStore>,
    pub events: broadcast::Sender<StationEvent>,
}

impl StationContext {
    pub fn emit(&self, event: StationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Which hook a voyage was opened for. Fixed for the lifetime of the hook,
/// independent of later status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Home,
    Remote,
    BackHome,
}

impl Phase {
    fn of(status: Status) -> Self {
        match status {
            Status::AtHome => Phase::Home,
            Status::AtRemote => Phase::Remote,
            Status::BackAtHome => Phase::BackHome,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Stay,
    Departed,
    Retired,
}

/// Context handed to every lifecycle hook. Owns this station's copy of the
/// instance descriptor while the hook runs.
pub struct Voyage {
    instance: Instance,
    phase: Phase,
    outcome: Outcome,
    station: Arc<StationContext>,
}

impl Voyage {
    pub(crate) fn new(instance: Instance, station: Arc<StationContext>) -> Self {
        Self {
            phase: Phase::of(instance.status),
            instance,
            outcome: Outcome::Stay,
            station,
        }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn station_name(&self) -> &str {
        &self.station.name
    }

    pub fn station(&self) -> &Endpoint {
        &self.station.endpoint
    }

    pub fn has_departed(&self) -> bool {
        self.outcome == Outcome::Departed
    }

    /// Ends the instance here once the hook returns.
    pub fn retire(&mut self) {
        if self.outcome == Outcome::Stay {
            self.outcome = Outcome::Retired;
        }
    }

    /// Migrates from home to `to`. On failure the descriptor is restored to
    /// what it was before the call and the agent stays here.
    pub async fn depart(&mut self, agent_bytes: Vec<u8>, to: Destination) -> Result<(), MigrationError> {
        self.ensure(Phase::Home, Status::AtHome, "depart")?;

        let previous = self.instance.clone();
        self.instance.status = Status::AtRemote;
        self.instance.last_remote = Some(to.endpoint.clone());

        self.migrate(agent_bytes, to.endpoint, to.place, previous).await
    }

    /// Migrates from the remote station back to the instance's home.
    pub async fn return_home(&mut self, agent_bytes: Vec<u8>) -> Result<(), MigrationError> {
        self.ensure(Phase::Remote, Status::AtRemote, "return home")?;

        let previous = self.instance.clone();
        self.instance.status = Status::BackAtHome;
        let home = self.instance.home.clone();
        let place = self.instance.home_place.clone();

        self.migrate(agent_bytes, home, place, previous).await
    }

    fn ensure(&self, phase: Phase, status: Status, action: &'static str) -> Result<(), MigrationError> {
        if self.phase != phase || self.instance.status != status || self.outcome != Outcome::Stay {
            return Err(MigrationError::WrongPhase {
                action,
                status: self.instance.status,
            });
        }
        Ok(())
    }

    async fn migrate(
        &mut self,
        agent_bytes: Vec<u8>,
        to: Endpoint,
        place: String,
        previous: Instance,
    ) -> Result<(), MigrationError> {
        match self.send(agent_bytes, &to, place).await {
            Ok(acknowledged) => {
                info!(
                    instance = %self.instance,
                    to = %to,
                    place = %acknowledged.place_name,
                    status = %acknowledged.status,
                    "Agent transferred"
                );
                self.instance = acknowledged;
                self.outcome = Outcome::Departed;
                self.station.emit(StationEvent::Departed {
                    id: self.instance.id,
                    to,
                    status: self.instance.status,
                });
                Ok(())
            }
            Err(e) => {
                let attempted = self.instance.status;
                self.instance = previous;
                error!(
                    instance = %self.instance,
                    to = %to,
                    failure = e.kind(),
                    error = %e,
                    "Transfer failed, status rolled back to {}",
                    self.instance.status
                );
                self.station.emit(StationEvent::MigrationFailed {
                    id: self.instance.id,
                    to,
                    status: attempted,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn send(&self, agent_bytes: Vec<u8>, to: &Endpoint, place: String) -> Result<Instance, MigrationError> {
        let package_name = self.instance.package_name.clone();
        let package_data = self
            .station
            .packages
            .read(&package_name)?
            .ok_or_else(|| MigrationError::MissingPackage(package_name.clone()))?;

        let request = TransferRequest {
            instance: self.instance.clone(),
            agent_bytes,
            package_name,
            place_name: place,
            package_data,
        };
        Ok(self.station.courier.transfer(to, request).await?)
    }

    pub(crate) fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub(crate) fn into_instance(self) -> Instance {
        self.instance
    }
}

/// Runs the hook matching the instance status.
pub(crate) async fn run_hook(agent: &mut dyn MobileAgent, voyage: &mut Voyage) -> anyhow::Result<()> {
    match voyage.phase {
        Phase::Home => agent.at_home_station(voyage).await,
        Phase::Remote => agent.at_remote_station(voyage).await,
        Phase::BackHome => {
            voyage.instance.status = Status::AtHome;
            agent.back_at_home_station(voyage).await
        }
    }
}
