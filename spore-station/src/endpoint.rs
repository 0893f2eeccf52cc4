// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::container::{AgentHandle, ExecutionContainer, LocalContainer};
use crate::error::TransferError;
use crate::events::StationEvent;
use crate::package::PackageStore;
use crate::permission::PermissionStore;
use spore_core::{BoxFuture, ErrorCode};
use spore_model::{Instance, StationRequest, StationResponse, TransferRequest};
use spore_transport::membrane::Handler;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Receiving side of a migration.
pub struct TransferEndpoint {
    packages: Arc<dyn PackageStore>,
    permissions: Arc<dyn PermissionStore>,
    container: Arc<dyn ExecutionContainer>,
    events: broadcast::Sender<StationEvent>,
}

impl TransferEndpoint {
    pub fn new(
        packages: Arc<dyn PackageStore>,
        permissions: Arc<dyn PermissionStore>,
        container: Arc<dyn ExecutionContainer>,
        events: broadcast::Sender<StationEvent>,
    ) -> Self {
        Self {
            packages,
            permissions,
            container,
            events,
        }
    }

    /// Accepts an inbound agent.
    ///
    /// Store failures reach the caller, as does an id that is already taken
    /// here. A deny, an absent record and any other failure to instantiate
    /// or start the agent are local matters: the caller still gets the
    /// acknowledged instance back.
    pub async fn transfer_agent(&self, request: TransferRequest) -> Result<Instance, TransferError> {
        let TransferRequest {
            mut instance,
            agent_bytes,
            package_name,
            place_name,
            package_data,
        } = request;

        // Staged until the permission lookup has answered.
        let mut staged = self.packages.open(&package_name)?;
        staged.write_all(&package_data)?;

        instance.place_name = place_name;

        let identity = instance.permission_identity();
        let permission = self.permissions.lookup(&identity).await?;
        staged.commit()?;

        let acknowledged = instance.clone();
        let id = instance.id;
        let agent = instance.agent.clone();
        let place = instance.place_name.clone();

        let permission = match permission {
            Some(p) if p.allowed => p,
            found => {
                warn!(
                    instance = %instance,
                    %identity,
                    record = if found.is_some() { "deny" } else { "absent" },
                    "Transfer refused"
                );
                self.emit(StationEvent::Denied { id, agent, place });
                return Ok(acknowledged);
            }
        };

        let handle = match self.container.instantiate(instance, &agent_bytes).await {
            Ok(handle) => handle,
            Err(e) if e.is_busy() => {
                warn!(instance = %acknowledged, error = %e, "Transfer refused, id in use");
                return Err(TransferError::Busy(e));
            }
            Err(e) => {
                error!(instance = %acknowledged, failure = "InstantiationFailure", error = %e, "Agent not admitted");
                self.emit(StationEvent::InstantiationFailed {
                    id,
                    agent,
                    reason: e.to_string(),
                });
                return Ok(acknowledged);
            }
        };

        let mut started = false;
        if permission.auto_start {
            match self.container.start(handle).await {
                Ok(()) => started = true,
                Err(e) => error!(instance = %acknowledged, error = %e, "Agent admitted but not started"),
            }
        }

        info!(instance = %acknowledged, place = %place, started, "Agent admitted");
        self.emit(StationEvent::Admitted {
            id,
            agent,
            place,
            started,
        });
        Ok(acknowledged)
    }

    fn emit(&self, event: StationEvent) {
        let _ = self.events.send(event);
    }
}

/// Request dispatch for a station's membrane.
pub struct StationHandler {
    name: String,
    transfers: TransferEndpoint,
    permissions: Arc<dyn PermissionStore>,
    container: LocalContainer,
}

impl StationHandler {
    pub fn new(
        name: &str,
        transfers: TransferEndpoint,
        permissions: Arc<dyn PermissionStore>,
        container: LocalContainer,
    ) -> Self {
        Self {
            name: name.to_string(),
            transfers,
            permissions,
            container,
        }
    }

    async fn dispatch(&self, request: StationRequest) -> StationResponse {
        match request {
            StationRequest::Ping => StationResponse::Pong {
                station: self.name.clone(),
            },
            StationRequest::Transfer(transfer) => {
                match crate::log_operation!("transfer", self.transfers.transfer_agent(transfer).await) {
                    Ok(instance) => StationResponse::Transferred { instance },
                    Err(e) => failed(e.code(), e),
                }
            }
            StationRequest::LookupPermission(identity) => {
                match self.permissions.lookup(&identity).await {
                    Ok(permission) => StationResponse::Permission(permission),
                    Err(e) => failed(ErrorCode::StoreFailure, e),
                }
            }
            StationRequest::ListResidents => StationResponse::Residents(self.container.residents().await),
            StationRequest::StartResident { id } => {
                match self.container.start(AgentHandle::new(id)).await {
                    Ok(()) => StationResponse::Ack,
                    Err(e) => failed(e.code(), e),
                }
            }
            StationRequest::StopResident { id } => match self.container.stop(id).await {
                Ok(()) => StationResponse::Ack,
                Err(e) => failed(e.code(), e),
            },
        }
    }
}

fn failed(code: ErrorCode, e: impl std::fmt::Display) -> StationResponse {
    StationResponse::Failed {
        code: code.as_u16(),
        message: e.to_string(),
    }
}

impl Handler for StationHandler {
    fn handle(&self, request: StationRequest) -> BoxFuture<'_, StationResponse> {
        Box::pin(self.dispatch(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ContainerError, StoreError};
    use crate::package::MemoryPackageStore;
    use crate::permission::MemoryPermissionStore;
    use spore_model::{AgentIdentity, Endpoint, Permission, PermissionIdentity, Status};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        fail_instantiate: bool,
        occupied: bool,
        instantiated: Mutex<Vec<Instance>>,
        started: Mutex<Vec<u64>>,
    }

    impl ExecutionContainer for Recorder {
        fn instantiate<'a>(
            &'a self,
            instance: Instance,
            _agent_bytes: &'a [u8],
        ) -> BoxFuture<'a, Result<AgentHandle, ContainerError>> {
            Box::pin(async move {
                if self.fail_instantiate {
                    return Err(ContainerError::UnknownAgent(instance.agent.name));
                }
                if self.occupied {
                    return Err(ContainerError::Occupied(instance.id));
                }
                let handle = AgentHandle::new(instance.id);
                self.instantiated.lock().unwrap().push(instance);
                Ok(handle)
            })
        }

        fn start(&self, handle: AgentHandle) -> BoxFuture<'_, Result<(), ContainerError>> {
            Box::pin(async move {
                self.started.lock().unwrap().push(handle.id());
                Ok(())
            })
        }
    }

    struct Broken;

    impl PermissionStore for Broken {
        fn lookup<'a>(
            &'a self,
            _identity: &'a PermissionIdentity,
        ) -> BoxFuture<'a, Result<Option<Permission>, StoreError>> {
            Box::pin(async { Err(StoreError::Unavailable("registry down".into())) })
        }
    }

    const HASH: &str = "a3f9c2d1e8b7a6f5c4d3";

    fn request() -> TransferRequest {
        let mut instance = Instance::new(
            11,
            AgentIdentity::new("greeter", HASH),
            Endpoint::new("127.0.0.1", 1099),
            "default",
            "greeter.pkg",
            vec!["127.0.0.1".into(), "1100".into(), "lab".into()],
        );
        instance.status = Status::AtRemote;
        TransferRequest {
            instance,
            agent_bytes: b"{}".to_vec(),
            package_name: "greeter.pkg".into(),
            place_name: "lab".into(),
            package_data: b"package".to_vec(),
        }
    }

    struct Fixture {
        endpoint: TransferEndpoint,
        packages: MemoryPackageStore,
        container: Arc<Recorder>,
        events: broadcast::Receiver<StationEvent>,
    }

    fn fixture(permissions: Arc<dyn PermissionStore>, container: Recorder) -> Fixture {
        let packages = MemoryPackageStore::new();
        let container = Arc::new(container);
        let (tx, events) = broadcast::channel(16);
        let endpoint = TransferEndpoint::new(
            Arc::new(packages.clone()),
            permissions,
            container.clone(),
            tx,
        );
        Fixture {
            endpoint,
            packages,
            container,
            events,
        }
    }

    fn granted(permission: Permission) -> Arc<dyn PermissionStore> {
        let store = MemoryPermissionStore::new();
        store.grant("greeter", HASH, "lab", permission);
        Arc::new(store)
    }

    #[tokio::test]
    async fn allowed_and_auto_started() {
        let mut f = fixture(granted(Permission::allow().with_auto_start()), Recorder::default());

        let ack = f.endpoint.transfer_agent(request()).await.unwrap();
        assert_eq!(ack.place_name, "lab");
        assert_eq!(ack.status, Status::AtRemote);

        assert_eq!(f.packages.read("greeter.pkg").unwrap().unwrap(), b"package");
        assert_eq!(f.container.instantiated.lock().unwrap()[0].place_name, "lab");
        assert_eq!(*f.container.started.lock().unwrap(), vec![11]);
        assert!(matches!(
            f.events.try_recv().unwrap(),
            StationEvent::Admitted { started: true, .. }
        ));
    }

    #[tokio::test]
    async fn allowed_without_auto_start_is_only_instantiated() {
        let f = fixture(granted(Permission::allow()), Recorder::default());
        f.endpoint.transfer_agent(request()).await.unwrap();
        assert_eq!(f.container.instantiated.lock().unwrap().len(), 1);
        assert!(f.container.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn denied_and_absent_are_acknowledged_silently() {
        for store in [granted(Permission::deny()), Arc::new(MemoryPermissionStore::new()) as Arc<dyn PermissionStore>] {
            let mut f = fixture(store, Recorder::default());
            let ack = f.endpoint.transfer_agent(request()).await.unwrap();
            assert_eq!(ack.id, 11);
            assert!(f.container.instantiated.lock().unwrap().is_empty());
            // The package was still recorded.
            assert!(f.packages.read("greeter.pkg").unwrap().is_some());
            assert!(matches!(f.events.try_recv().unwrap(), StationEvent::Denied { .. }));
        }
    }

    #[tokio::test]
    async fn store_failure_leaves_no_trace() {
        let f = fixture(Arc::new(Broken), Recorder::default());
        let err = f.endpoint.transfer_agent(request()).await.unwrap_err();
        assert!(matches!(err, TransferError::Store(StoreError::Unavailable(_))));
        assert_eq!(err.code(), ErrorCode::StoreFailure);
        assert!(f.packages.keys().is_empty());
        assert!(f.container.instantiated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn instantiation_failure_stays_local() {
        let recorder = Recorder {
            fail_instantiate: true,
            ..Recorder::default()
        };
        let mut f = fixture(granted(Permission::allow().with_auto_start()), recorder);
        let ack = f.endpoint.transfer_agent(request()).await.unwrap();
        assert_eq!(ack.id, 11);
        assert!(f.container.started.lock().unwrap().is_empty());
        assert!(matches!(
            f.events.try_recv().unwrap(),
            StationEvent::InstantiationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn bad_package_key_is_a_store_failure() {
        let f = fixture(granted(Permission::allow()), Recorder::default());
        let mut req = request();
        req.package_name = "../escape".into();
        assert!(matches!(
            f.endpoint.transfer_agent(req).await,
            Err(TransferError::Store(StoreError::InvalidKey(_)))
        ));
    }

    #[tokio::test]
    async fn an_id_in_use_fails_the_transfer() {
        let recorder = Recorder {
            occupied: true,
            ..Recorder::default()
        };
        let mut f = fixture(granted(Permission::allow().with_auto_start()), recorder);
        let err = f.endpoint.transfer_agent(request()).await.unwrap_err();
        assert!(matches!(err, TransferError::Busy(ContainerError::Occupied(11))));
        assert_eq!(err.code(), ErrorCode::ResidentBusy);
        assert!(f.container.started.lock().unwrap().is_empty());
        assert!(f.events.try_recv().is_err());
    }
}
