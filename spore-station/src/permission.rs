// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::client::StationClient;
use crate::config::PermissionRecord;
use crate::error::StoreError;
use spore_core::BoxFuture;
use spore_model::{Endpoint, Permission, PermissionIdentity};
use spore_transport::{Deadline, RetryPolicy};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Authorization records keyed by (agent, short id, place).
///
/// `Ok(None)` means no record exists and callers treat it as deny.
/// `Err` is an operational failure and must never be read as absence.
pub trait PermissionStore: Send + Sync {
    fn lookup<'a>(
        &'a self,
        identity: &'a PermissionIdentity,
    ) -> BoxFuture<'a, Result<Option<Permission>, StoreError>>;
}

#[derive(Default)]
pub struct MemoryPermissionStore {
    records: RwLock<HashMap<PermissionIdentity, Permission>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[PermissionRecord]) -> Self {
        let store = Self::new();
        for r in records {
            store.insert(PermissionIdentity::new(&r.agent, &r.hash, &r.place), r.permission());
        }
        store
    }

    /// Accepts either the full hash or its short id.
    pub fn grant(&self, agent_name: &str, hash: &str, place_name: &str, permission: Permission) {
        self.insert(PermissionIdentity::new(agent_name, hash, place_name), permission);
    }

    fn insert(&self, identity: PermissionIdentity, permission: Permission) {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.insert(identity, permission);
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn lookup<'a>(
        &'a self,
        identity: &'a PermissionIdentity,
    ) -> BoxFuture<'a, Result<Option<Permission>, StoreError>> {
        Box::pin(async move {
            if !identity.is_complete() {
                return Err(StoreError::InvalidQuery(identity.to_string()));
            }
            let records = self
                .records
                .read()
                .map_err(|_| StoreError::Unavailable("permission table poisoned".into()))?;
            Ok(records.get(identity).copied())
        })
    }
}

/// Forwards lookups to another station's permission endpoint.
pub struct RemotePermissionStore {
    registry: Endpoint,
    retry: RetryPolicy,
    deadline: Deadline,
}

impl RemotePermissionStore {
    pub fn new(registry: Endpoint, retry: RetryPolicy, deadline: Deadline) -> Self {
        Self {
            registry,
            retry,
            deadline,
        }
    }

    pub fn registry(&self) -> &Endpoint {
        &self.registry
    }
}

impl PermissionStore for RemotePermissionStore {
    fn lookup<'a>(
        &'a self,
        identity: &'a PermissionIdentity,
    ) -> BoxFuture<'a, Result<Option<Permission>, StoreError>> {
        Box::pin(async move {
            if !identity.is_complete() {
                return Err(StoreError::InvalidQuery(identity.to_string()));
            }
            debug!(registry = %self.registry, %identity, "Remote permission lookup");
            let client = StationClient::connect(&self.registry, &self.retry, self.deadline)
                .await
                .map_err(|e| {
                    warn!(registry = %self.registry, error = %e, "Permission registry unreachable");
                    StoreError::Unavailable(format!("{}: {}", self.registry, e))
                })?;
            client
                .lookup_permission(identity)
                .await
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", self.registry, e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn absent_records_are_none_and_grants_are_found() {
        let store = MemoryPermissionStore::new();
        store.grant("greeter", "a3f9c2d1e8b7a6f5", "lab", Permission::allow());

        let hit = PermissionIdentity::new("greeter", "a3f9c2d1e8b7", "lab");
        assert_eq!(store.lookup(&hit).await.unwrap(), Some(Permission::allow()));

        let other_place = PermissionIdentity::new("greeter", "a3f9c2d1e8b7", "default");
        assert_eq!(store.lookup(&other_place).await.unwrap(), None);
    }

    #[tokio::test]
    async fn repeated_lookups_agree() {
        let store = MemoryPermissionStore::from_records(&[PermissionRecord {
            agent: "disk-report".into(),
            hash: "77aa00112233".into(),
            place: "default".into(),
            allowed: true,
            auto_start: true,
        }]);
        let id = PermissionIdentity::new("disk-report", "77aa00112233", "default");
        let first = store.lookup(&id).await.unwrap();
        let second = store.lookup(&id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Some(Permission::allow().with_auto_start()));
    }

    #[tokio::test]
    async fn incomplete_query_is_an_error_not_a_deny() {
        let store = MemoryPermissionStore::new();
        let res = store.lookup(&PermissionIdentity::new("greeter", "", "lab")).await;
        assert!(matches!(res, Err(StoreError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn unreachable_registry_is_unavailable() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let store = RemotePermissionStore::new(
            Endpoint::new("127.0.0.1", port),
            RetryPolicy::none(),
            Deadline::new(Duration::from_secs(1)),
        );
        let res = store
            .lookup(&PermissionIdentity::new("greeter", "a3f9c2d1e8b7", "lab"))
            .await;
        assert!(matches!(res, Err(StoreError::Unavailable(_))));
    }
}
