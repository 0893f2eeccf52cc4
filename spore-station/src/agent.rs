// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::error::{ContainerError, MigrationError};
use crate::lifecycle::Voyage;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use spore_core::BoxFuture;
use spore_model::Endpoint;
use std::collections::HashMap;
use std::sync::Arc;

/// Code that travels between stations.
///
/// The station picks the hook from the instance status: `at_home_station`
/// for a freshly dispatched instance, `at_remote_station` after arrival at
/// a destination, `back_at_home_station` after the return trip.
pub trait MobileAgent: Send {
    /// Default behaviour departs to the destination named by the first
    /// instance parameters, see [`Destination::from_parameters`].
    fn at_home_station<'a>(&'a mut self, voyage: &'a mut Voyage) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let destination = Destination::from_parameters(&voyage.instance().parameters)?;
            let bytes = self.snapshot()?;
            voyage.depart(bytes, destination).await?;
            Ok(())
        })
    }

    fn at_remote_station<'a>(&'a mut self, voyage: &'a mut Voyage) -> BoxFuture<'a, anyhow::Result<()>>;

    fn back_at_home_station<'a>(&'a mut self, voyage: &'a mut Voyage) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Serialized agent state, rebuilt on the far side by the catalog.
    fn snapshot(&self) -> anyhow::Result<Vec<u8>>;
}

/// Variant that only ever runs at home.
pub trait StaticAgent: Send {
    fn at_home_station<'a>(&'a mut self, ctx: &'a StaticContext) -> BoxFuture<'a, anyhow::Result<()>>;
}

#[derive(Debug, Clone)]
pub struct StaticContext {
    pub station: String,
    pub endpoint: Endpoint,
    pub parameters: Vec<String>,
}

/// Where `depart` sends an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub endpoint: Endpoint,
    pub place: String,
}

impl Destination {
    pub const DEFAULT_PLACE: &'static str = "default";

    pub fn new(endpoint: Endpoint, place: impl Into<String>) -> Self {
        Self {
            endpoint,
            place: place.into(),
        }
    }

    /// Reads `[server, port, place?]`. A missing place, or a third entry in
    /// `key=value` form, selects the default place.
    pub fn from_parameters(parameters: &[String]) -> Result<Self, MigrationError> {
        let positional = |i: usize| {
            parameters
                .get(i)
                .map(|p| p.trim())
                .filter(|p| !p.is_empty() && !p.contains('='))
        };

        let server = positional(0)
            .ok_or_else(|| MigrationError::Parameters("missing destination server".into()))?;
        let port = positional(1)
            .ok_or_else(|| MigrationError::Parameters("missing destination port".into()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| MigrationError::Parameters(format!("bad destination port '{}'", port)))?;
        let place = positional(2).unwrap_or(Self::DEFAULT_PLACE);

        Ok(Self::new(Endpoint::new(server, port), place))
    }
}

pub type AgentFactory =
    Arc<dyn Fn(&[u8]) -> anyhow::Result<Box<dyn MobileAgent>> + Send + Sync>;

/// Agent name → factory rebuilding an agent from its snapshot.
#[derive(Clone, Default)]
pub struct AgentCatalog {
    factories: HashMap<String, AgentFactory>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&[u8]) -> anyhow::Result<Box<dyn MobileAgent>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Registers an agent whose snapshot is its JSON encoding.
    pub fn register_json<A>(&mut self, name: &str)
    where
        A: MobileAgent + DeserializeOwned + 'static,
    {
        self.register(name, |bytes| {
            let agent: A = serde_json::from_slice(bytes).context("agent snapshot is not valid JSON")?;
            Ok(Box::new(agent))
        });
    }

    pub fn with_json<A>(mut self, name: &str) -> Self
    where
        A: MobileAgent + DeserializeOwned + 'static,
    {
        self.register_json::<A>(name);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn rebuild(&self, name: &str, bytes: &[u8]) -> Result<Box<dyn MobileAgent>, ContainerError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ContainerError::UnknownAgent(name.to_string()))?;
        factory(bytes).map_err(|e| ContainerError::Rebuild {
            agent: name.to_string(),
            reason: format!("{:#}", e),
        })
    }
}

/// JSON snapshot helper for agents registered with [`AgentCatalog::register_json`].
pub fn json_snapshot<A: Serialize>(agent: &A) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec(agent).context("failed to snapshot agent")
}
