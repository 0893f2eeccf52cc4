// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::agent::{AgentCatalog, MobileAgent};
use crate::error::ContainerError;
use crate::events::StationEvent;
use crate::lifecycle::{self, Outcome, Phase, StationContext, Voyage};
use crate::residents::{Resident, Residents, Slot};
use spore_core::BoxFuture;
use spore_model::{Instance, ResidentInfo, ResidentPhase};
use std::sync::Arc;
use tracing::{error, info};

/// Opaque reference to an instantiated, not yet started agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentHandle {
    id: u64,
}

impl AgentHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Hosts agents at a station. `start` returns once the lifecycle hook is
/// scheduled, not when it completes.
pub trait ExecutionContainer: Send + Sync {
    fn instantiate<'a>(
        &'a self,
        instance: Instance,
        agent_bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<AgentHandle, ContainerError>>;

    fn start(&self, handle: AgentHandle) -> BoxFuture<'_, Result<(), ContainerError>>;
}

struct Inner {
    catalog: AgentCatalog,
    residents: Residents,
    station: Arc<StationContext>,
}

/// In-process container: one tokio task per started resident.
#[derive(Clone)]
pub struct LocalContainer {
    inner: Arc<Inner>,
}

impl LocalContainer {
    pub fn new(catalog: AgentCatalog, station: Arc<StationContext>) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                residents: Residents::new(),
                station,
            }),
        }
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.inner.catalog
    }

    /// Admits an agent object directly, without going through its bytes.
    pub async fn admit(
        &self,
        instance: Instance,
        agent: Box<dyn MobileAgent>,
    ) -> Result<AgentHandle, ContainerError> {
        let handle = AgentHandle::new(instance.id);
        self.inner.residents.admit(Resident { instance, agent }).await?;
        Ok(handle)
    }

    pub async fn residents(&self) -> Vec<ResidentInfo> {
        self.inner.residents.list().await
    }

    /// Removes a resident. Waits for a running hook to finish first.
    pub async fn stop(&self, id: u64) -> Result<(), ContainerError> {
        let slot = self
            .inner
            .residents
            .get(id)
            .await
            .ok_or(ContainerError::UnknownResident(id))?;
        let mut body = slot.body.lock().await;
        if body.take().is_none() {
            return Err(ContainerError::UnknownResident(id));
        }
        self.inner.residents.evict(id, &slot).await;
        drop(body);

        info!(instance = %format!("{:016x}", id), "Resident stopped");
        self.inner.station.emit(StationEvent::Stopped { id });
        Ok(())
    }
}

impl ExecutionContainer for LocalContainer {
    fn instantiate<'a>(
        &'a self,
        instance: Instance,
        agent_bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<AgentHandle, ContainerError>> {
        Box::pin(async move {
            let agent = self.inner.catalog.rebuild(&instance.agent.name, agent_bytes)?;
            self.admit(instance, agent).await
        })
    }

    fn start(&self, handle: AgentHandle) -> BoxFuture<'_, Result<(), ContainerError>> {
        Box::pin(async move {
            let id = handle.id();
            let slot = self
                .inner
                .residents
                .get(id)
                .await
                .ok_or(ContainerError::UnknownResident(id))?;
            slot.mark_running(id)?;

            let inner = self.inner.clone();
            tokio::spawn(async move { inner.drive(id, slot).await });
            Ok(())
        })
    }
}

impl Inner {
    /// Runs one hook to completion and decides what becomes of the resident.
    async fn drive(&self, id: u64, slot: Arc<Slot>) {
        let mut body = slot.body.lock().await;
        let Some(Resident { instance, mut agent }) = body.take() else {
            // Stopped between start and now.
            return;
        };

        let mut voyage = Voyage::new(instance, self.station.clone());
        let phase = voyage.phase();
        info!(
            instance = %voyage.instance(),
            status = %voyage.instance().status,
            place = %voyage.instance().place_name,
            "Running lifecycle hook"
        );

        let failure = match lifecycle::run_hook(agent.as_mut(), &mut voyage).await {
            Ok(()) => None,
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(instance = %voyage.instance(), error = %reason, "Lifecycle hook failed");
                Some(StationEvent::HookFailed {
                    id,
                    status: voyage.instance().status,
                    reason,
                })
            }
        };

        let outcome = voyage.outcome();
        let instance = voyage.into_instance();

        match (outcome, phase) {
            (Outcome::Departed, _) => {
                // Ownership moved to the destination station.
                self.residents.evict(id, &slot).await;
            }
            (Outcome::Retired, _) => {
                self.residents.evict(id, &slot).await;
                info!(instance = %instance, "Resident retired");
                self.station.emit(StationEvent::Retired { id });
            }
            (Outcome::Stay, Phase::BackHome) => {
                self.residents.evict(id, &slot).await;
                info!(instance = %instance, "Round trip complete");
                self.station.emit(StationEvent::Returned { id });
            }
            (Outcome::Stay, _) => {
                info!(instance = %instance, status = %instance.status, "Resident stays dormant");
                slot.set_info(Some(&instance), ResidentPhase::Dormant);
                *body = Some(Resident { instance, agent });
            }
        }

        // Reported once the registry reflects the outcome.
        if let Some(event) = failure {
            self.station.emit(event);
        }
    }
}
