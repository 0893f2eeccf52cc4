// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::error::Error;
use crate::permission::PermissionIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of hash characters that make up a short id.
pub const SHORT_ID_LEN: usize = 12;

pub fn short_id_of(hash: &str) -> String {
    hash.chars().take(SHORT_ID_LEN).collect()
}

/// Agent name plus the content hash that tells its versions apart.
#[derive(
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
)]
#[archive(check_bytes)]
pub struct AgentIdentity {
    pub name: String,
    pub hash: String,
}

impl AgentIdentity {
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
        }
    }

    pub fn short_id(&self) -> String {
        short_id_of(&self.hash)
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.short_id())
    }
}

#[derive(
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
)]
#[archive(check_bytes)]
pub struct Endpoint {
    pub server: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (server, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidEndpoint(s.to_string()))?;
        if server.is_empty() {
            return Err(Error::InvalidEndpoint(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::InvalidPort(port.to_string()))?;
        Ok(Self::new(server, port))
    }
}

/// Where an instance is in its home → remote → home journey.
#[derive(
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[archive(check_bytes)]
pub enum Status {
    AtHome,
    AtRemote,
    BackAtHome,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::AtHome => write!(f, "AT_HOME"),
            Status::AtRemote => write!(f, "AT_REMOTE"),
            Status::BackAtHome => write!(f, "BACK_AT_HOME"),
        }
    }
}

/// Runtime descriptor of one agent execution.
///
/// Crosses the network by value: every station that hosts the instance owns
/// its own copy and mutates it locally.
#[derive(
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Debug,
    Clone,
    PartialEq,
    Eq,
)]
#[archive(check_bytes)]
pub struct Instance {
    pub id: u64,
    pub agent: AgentIdentity,
    pub short_id: String,
    pub home: Endpoint,
    pub home_place: String,
    pub last_remote: Option<Endpoint>,
    pub place_name: String,
    pub package_name: String,
    pub parameters: Vec<String>,
    pub status: Status,
}

impl Instance {
    pub fn new(
        id: u64,
        agent: AgentIdentity,
        home: Endpoint,
        home_place: impl Into<String>,
        package_name: impl Into<String>,
        parameters: Vec<String>,
    ) -> Self {
        let home_place = home_place.into();
        Self {
            id,
            short_id: agent.short_id(),
            agent,
            home,
            place_name: home_place.clone(),
            home_place,
            last_remote: None,
            package_name: package_name.into(),
            parameters,
            status: Status::AtHome,
        }
    }

    /// Key used to authorize this instance at its current place.
    pub fn permission_identity(&self) -> PermissionIdentity {
        PermissionIdentity::new(&self.agent.name, &self.short_id, &self.place_name)
    }

    /// Positional parameter, `None` when absent or blank.
    pub fn parameter(&self, index: usize) -> Option<&str> {
        self.parameters
            .get(index)
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
    }

    /// `key=value` style parameter lookup.
    pub fn named_parameter(&self, key: &str) -> Option<&str> {
        self.parameters.iter().find_map(|p| {
            let (k, v) = p.split_once('=')?;
            (k.trim() == key).then(|| v.trim())
        })
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:016x}", self.agent, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Instance {
        Instance::new(
            7,
            AgentIdentity::new("disk-report", "a3f9c2d1e8b7a6f5c4d3"),
            Endpoint::new("station-a", 1099),
            "default",
            "disk-report.pkg",
            vec!["station-b".into(), "1100".into(), "name=Ada".into()],
        )
    }

    #[test]
    fn short_id_truncates_long_hashes() {
        let agent = AgentIdentity::new("disk-report", "a3f9c2d1e8b7a6f5c4d3");
        assert_eq!(agent.short_id(), "a3f9c2d1e8b7");
        assert_eq!(AgentIdentity::new("x", "h1").short_id(), "h1");
    }

    #[test]
    fn new_instance_starts_at_home_in_its_home_place() {
        let instance = sample();
        assert_eq!(instance.status, Status::AtHome);
        assert_eq!(instance.place_name, "default");
        assert_eq!(instance.last_remote, None);
        assert_eq!(instance.short_id, "a3f9c2d1e8b7");
    }

    #[test]
    fn endpoint_parses_server_and_port() {
        let ep: Endpoint = "10.0.0.4:1099".parse().unwrap();
        assert_eq!(ep, Endpoint::new("10.0.0.4", 1099));
        assert_eq!(ep.to_string(), "10.0.0.4:1099");

        assert!("no-port".parse::<Endpoint>().is_err());
        assert!(":1099".parse::<Endpoint>().is_err());
        assert!(matches!(
            "host:99999".parse::<Endpoint>(),
            Err(Error::InvalidPort(_))
        ));
    }

    #[test]
    fn parameters_are_positional_and_named() {
        let instance = sample();
        assert_eq!(instance.parameter(0), Some("station-b"));
        assert_eq!(instance.parameter(5), None);
        assert_eq!(instance.named_parameter("name"), Some("Ada"));
        assert_eq!(instance.named_parameter("missing"), None);
    }

    #[test]
    fn status_serializes_for_config_and_logs() {
        let json = serde_json::to_string(&Status::BackAtHome).unwrap();
        assert_eq!(json, "\"BackAtHome\"");
        assert_eq!(Status::AtRemote.to_string(), "AT_REMOTE");
    }
}
