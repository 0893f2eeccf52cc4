// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use spore_station::agent::json_snapshot;
use spore_station::{BoxFuture, Destination, Instance, MobileAgent, Voyage};
use tracing::info;

/// Greets `name=<who>` from the remote station.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Greeter {
    pub greeting: Option<String>,
}

impl Greeter {
    pub const NAME: &'static str = "greeter";

    fn name_of(instance: &Instance) -> anyhow::Result<String> {
        instance
            .named_parameter("name")
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("greeter requires a name=<who> parameter"))
    }
}

impl MobileAgent for Greeter {
    fn at_home_station<'a>(&'a mut self, voyage: &'a mut Voyage) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            // Refuse to travel without someone to greet.
            Self::name_of(voyage.instance())?;
            let destination = Destination::from_parameters(&voyage.instance().parameters)?;
            let bytes = self.snapshot()?;
            voyage.depart(bytes, destination).await?;
            Ok(())
        })
    }

    fn at_remote_station<'a>(&'a mut self, voyage: &'a mut Voyage) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let name = Self::name_of(voyage.instance())?;
            let greeting = format!(
                "Hello {}, from {} ({})",
                name,
                voyage.station_name(),
                voyage.instance().place_name
            );
            info!(instance = %voyage.instance(), %greeting, "Greeting");
            self.greeting = Some(greeting);

            let bytes = self.snapshot()?;
            voyage.return_home(bytes).await?;
            Ok(())
        })
    }

    fn back_at_home_station<'a>(&'a mut self, voyage: &'a mut Voyage) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let greeting = self
                .greeting
                .as_deref()
                .ok_or_else(|| anyhow!("greeter came home without a greeting"))?;
            info!(instance = %voyage.instance(), "Greeter is home");
            println!("{}", greeting);
            Ok(())
        })
    }

    fn snapshot(&self) -> anyhow::Result<Vec<u8>> {
        json_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spore_station::{AgentIdentity, Endpoint};

    fn instance(parameters: &[&str]) -> Instance {
        Instance::new(
            1,
            AgentIdentity::new(Greeter::NAME, "0011223344556677"),
            Endpoint::new("127.0.0.1", 1099),
            "default",
            "greeter.pkg",
            parameters.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn name_parameter_is_required() {
        assert_eq!(
            Greeter::name_of(&instance(&["host", "1100", "name=Ada"])).unwrap(),
            "Ada"
        );
        assert!(Greeter::name_of(&instance(&["host", "1100"])).is_err());
        assert!(Greeter::name_of(&instance(&["host", "1100", "name="])).is_err());
    }
}
