// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::agent::{AgentCatalog, MobileAgent, StaticAgent, StaticContext};
use crate::config::StationConfig;
use crate::container::{ExecutionContainer, LocalContainer};
use crate::courier::{Courier, SynapseCourier};
use crate::endpoint::{StationHandler, TransferEndpoint};
use crate::error::ContainerError;
use crate::events::StationEvent;
use crate::fingerprint;
use crate::lifecycle::StationContext;
use crate::package::{FilePackageStore, PackageStore};
use crate::permission::{MemoryPermissionStore, PermissionStore, RemotePermissionStore};
use anyhow::{bail, Context, Result};
use spore_model::{AgentIdentity, Endpoint, Instance, Package, ResidentInfo};
use spore_transport::Membrane;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

const EVENT_CAPACITY: usize = 256;

/// What to launch with [`Station::dispatch`].
#[derive(Debug, Clone)]
pub struct DispatchSpec {
    /// Catalog name the agent is rebuilt under at every hop.
    pub agent: String,
    pub package: Package,
    /// Version hash. Defaults to the package fingerprint.
    pub hash: Option<String>,
    pub parameters: Vec<String>,
}

impl DispatchSpec {
    pub fn new(agent: &str, package: Package) -> Self {
        Self {
            agent: agent.to_string(),
            package,
            hash: None,
            parameters: Vec::new(),
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn hash(&self) -> String {
        self.hash
            .clone()
            .unwrap_or_else(|| fingerprint(&self.package.data))
    }
}

pub struct StationBuilder {
    config: StationConfig,
    catalog: AgentCatalog,
    permissions: Option<Arc<dyn PermissionStore>>,
    packages: Option<Arc<dyn PackageStore>>,
    courier: Option<Arc<dyn Courier>>,
}

impl StationBuilder {
    pub fn catalog(mut self, catalog: AgentCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn permissions(mut self, store: Arc<dyn PermissionStore>) -> Self {
        self.permissions = Some(store);
        self
    }

    pub fn packages(mut self, store: Arc<dyn PackageStore>) -> Self {
        self.packages = Some(store);
        self
    }

    pub fn courier(mut self, courier: Arc<dyn Courier>) -> Self {
        self.courier = Some(courier);
        self
    }

    /// Binds the membrane and starts serving.
    pub async fn spawn(self) -> Result<StationHandle> {
        let StationBuilder {
            config,
            catalog,
            permissions,
            packages,
            courier,
        } = self;

        let membrane = Membrane::bind(&config.name, &config.bind_addr()).await?;
        let endpoint = config.endpoint(membrane.local_addr()?.port());

        let permissions = match permissions {
            Some(store) => store,
            None => default_permissions(&config)?,
        };
        let packages = match packages {
            Some(store) => store,
            None => Arc::new(
                FilePackageStore::open_dir(config.package_dir())
                    .with_context(|| format!("package store at {}", config.package_dir().display()))?,
            ),
        };
        let courier = courier
            .unwrap_or_else(|| Arc::new(SynapseCourier::new(config.retry_policy(), config.deadline())));

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let context = Arc::new(StationContext {
            name: config.name.clone(),
            endpoint: endpoint.clone(),
            place: config.place.clone(),
            courier,
            packages: packages.clone(),
            events: events.clone(),
        });

        let container = LocalContainer::new(catalog, context.clone());
        let transfers = TransferEndpoint::new(
            packages,
            permissions.clone(),
            Arc::new(container.clone()),
            events,
        );
        let handler = Arc::new(StationHandler::new(
            &config.name,
            transfers,
            permissions,
            container.clone(),
        ));
        let server = tokio::spawn(membrane.serve(handler));

        info!(station = %config.name, endpoint = %endpoint, place = %config.place, "Station up");

        Ok(StationHandle {
            station: Station { context, container },
            server,
        })
    }
}

fn default_permissions(config: &StationConfig) -> Result<Arc<dyn PermissionStore>> {
    if let Some(registry) = &config.registry {
        let registry: Endpoint = registry
            .parse()
            .with_context(|| format!("bad permission registry '{}'", registry))?;
        info!(%registry, "Using remote permission registry");
        return Ok(Arc::new(RemotePermissionStore::new(
            registry,
            config.retry_policy(),
            config.deadline(),
        )));
    }
    Ok(Arc::new(MemoryPermissionStore::from_records(&config.permissions)))
}

/// Local control surface of a running station.
#[derive(Clone)]
pub struct Station {
    context: Arc<StationContext>,
    container: LocalContainer,
}

impl Station {
    pub fn builder(config: StationConfig) -> StationBuilder {
        StationBuilder {
            config,
            catalog: AgentCatalog::new(),
            permissions: None,
            packages: None,
            courier: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.context.endpoint
    }

    pub fn place(&self) -> &str {
        &self.context.place
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.context.events.subscribe()
    }

    /// Creates an instance at home, records its package and starts it.
    pub async fn dispatch(&self, agent: Box<dyn MobileAgent>, spec: DispatchSpec) -> Result<Instance> {
        if !self.container.catalog().contains(&spec.agent) {
            bail!(
                "agent '{}' must be registered in the catalog to be rebuilt on its way back",
                spec.agent
            );
        }

        let hash = spec.hash();
        let package_name = spec.package.name.clone();
        self.context
            .packages
            .write(&package_name, &spec.package.data)
            .with_context(|| format!("failed to store package '{}'", package_name))?;

        let instance = Instance::new(
            rand::random::<u64>(),
            AgentIdentity::new(spec.agent, hash),
            self.context.endpoint.clone(),
            self.context.place.clone(),
            package_name,
            spec.parameters,
        );

        info!(instance = %instance, params = ?instance.parameters, "Dispatching agent");
        let handle = self.container.admit(instance.clone(), agent).await?;
        self.context.emit(StationEvent::Dispatched {
            id: instance.id,
            agent: instance.agent.clone(),
        });
        self.container.start(handle).await?;
        Ok(instance)
    }

    /// Runs a static agent's home hook on its own task.
    pub fn run_static(
        &self,
        mut agent: Box<dyn StaticAgent>,
        parameters: Vec<String>,
    ) -> JoinHandle<anyhow::Result<()>> {
        let ctx = StaticContext {
            station: self.context.name.clone(),
            endpoint: self.context.endpoint.clone(),
            parameters,
        };
        tokio::spawn(async move { agent.at_home_station(&ctx).await })
    }

    pub async fn residents(&self) -> Vec<ResidentInfo> {
        self.container.residents().await
    }

    pub async fn start(&self, id: u64) -> Result<(), ContainerError> {
        self.container.start(crate::container::AgentHandle::new(id)).await
    }

    pub async fn stop(&self, id: u64) -> Result<(), ContainerError> {
        self.container.stop(id).await
    }
}

/// Running station. Dropping the handle stops the membrane.
pub struct StationHandle {
    station: Station,
    server: JoinHandle<Result<()>>,
}

impl StationHandle {
    pub fn station(&self) -> &Station {
        &self.station
    }

    pub fn is_serving(&self) -> bool {
        !self.server.is_finished()
    }

    /// Serves until the membrane exits.
    pub async fn join(mut self) -> Result<()> {
        (&mut self.server).await.context("membrane task panicked")?
    }
}

impl Deref for StationHandle {
    type Target = Station;

    fn deref(&self) -> &Station {
        &self.station
    }
}

impl Drop for StationHandle {
    fn drop(&mut self) {
        self.server.abort();
    }
}
