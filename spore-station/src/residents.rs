// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::agent::MobileAgent;
use crate::error::ContainerError;
use spore_model::{Instance, ResidentInfo, ResidentPhase};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// How long an arrival waits for a running hook on the same id. A departing
/// hook lets go of its slot as soon as the destination acknowledges.
pub const ADMIT_GRACE: Duration = Duration::from_millis(500);

/// An instance hosted by this station together with its agent.
pub struct Resident {
    pub instance: Instance,
    pub agent: Box<dyn MobileAgent>,
}

/// One registry entry. `body` is held for the whole duration of a hook;
/// `info` is readable without waiting on it.
#[derive(Default)]
pub struct Slot {
    info: StdMutex<Option<ResidentInfo>>,
    pub(crate) body: Mutex<Option<Resident>>,
}

impl Slot {
    pub fn info(&self) -> Option<ResidentInfo> {
        match self.info.lock() {
            Ok(info) => info.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn set_info(&self, instance: Option<&Instance>, phase: ResidentPhase) {
        let next = instance.map(|i| ResidentInfo {
            id: i.id,
            agent: i.agent.clone(),
            place_name: i.place_name.clone(),
            status: i.status,
            phase,
        });
        match self.info.lock() {
            Ok(mut info) => *info = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Flips a dormant resident to running. Fails if it is already running
    /// or gone, so two concurrent starts cannot both succeed.
    pub(crate) fn mark_running(&self, id: u64) -> Result<(), ContainerError> {
        let mut info = match self.info.lock() {
            Ok(info) => info,
            Err(poisoned) => poisoned.into_inner(),
        };
        match info.as_mut() {
            None => Err(ContainerError::UnknownResident(id)),
            Some(i) if i.phase == ResidentPhase::Running => Err(ContainerError::AlreadyRunning(id)),
            Some(i) => {
                i.phase = ResidentPhase::Running;
                Ok(())
            }
        }
    }
}

/// Instance id → slot. The outer map is locked only to insert or remove a
/// slot; everything else serializes on the slot.
#[derive(Default)]
pub struct Residents {
    slots: RwLock<HashMap<u64, Arc<Slot>>>,
}

impl Residents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dormant resident.
    ///
    /// An arrival for an id whose hook is running waits up to [`ADMIT_GRACE`]
    /// for it, then fails with `AlreadyRunning`. An id that is already hosted
    /// here is refused with `Occupied`. Neither overwrites the slot.
    pub async fn admit(&self, resident: Resident) -> Result<(), ContainerError> {
        let id = resident.instance.id;
        loop {
            let slot = {
                let mut slots = self.slots.write().await;
                slots.entry(id).or_default().clone()
            };
            let mut body = match slot.body.try_lock() {
                Ok(body) => body,
                Err(_) => tokio::time::timeout(ADMIT_GRACE, slot.body.lock())
                    .await
                    .map_err(|_| ContainerError::AlreadyRunning(id))?,
            };
            // The slot may have been evicted while we waited for it.
            if !self.is_current(id, &slot).await {
                continue;
            }
            if body.is_some() {
                return Err(ContainerError::Occupied(id));
            }
            slot.set_info(Some(&resident.instance), ResidentPhase::Dormant);
            *body = Some(resident);
            return Ok(());
        }
    }

    async fn is_current(&self, id: u64, slot: &Arc<Slot>) -> bool {
        self.slots
            .read()
            .await
            .get(&id)
            .map_or(false, |s| Arc::ptr_eq(s, slot))
    }

    pub async fn get(&self, id: u64) -> Option<Arc<Slot>> {
        self.slots.read().await.get(&id).cloned()
    }

    /// Removes `slot` if it is still the one registered under `id`. Callers
    /// hold the slot's body lock and have already emptied it.
    pub(crate) async fn evict(&self, id: u64, slot: &Arc<Slot>) {
        slot.set_info(None, ResidentPhase::Dormant);
        let mut slots = self.slots.write().await;
        if slots.get(&id).map_or(false, |s| Arc::ptr_eq(s, slot)) {
            slots.remove(&id);
        }
    }

    pub async fn list(&self) -> Vec<ResidentInfo> {
        let slots: Vec<Arc<Slot>> = self.slots.read().await.values().cloned().collect();
        let mut infos: Vec<ResidentInfo> = slots.iter().filter_map(|s| s.info()).collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
