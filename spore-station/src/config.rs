// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::resolve_data_dir;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spore_core::DEFAULT_PORT;
use spore_model::{Endpoint, Permission};
use spore_transport::{Deadline, RetryPolicy};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub name: String,
    /// Interface the membrane listens on.
    pub bind: String,
    /// Server name written into the home endpoint of dispatched instances.
    pub advertise: String,
    pub port: u16,
    /// Place the station's own agents live in.
    pub place: String,
    pub data_dir: PathBuf,
    pub transfer_timeout_ms: u64,
    pub connect_retry: ConnectRetry,
    /// Remote permission endpoint. Local records are ignored when set.
    pub registry: Option<String>,
    #[serde(rename = "permission")]
    pub permissions: Vec<PermissionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectRetry {
    pub attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 100,
        }
    }
}

/// One `[[permission]]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionRecord {
    pub agent: String,
    pub hash: String,
    pub place: String,
    #[serde(default = "default_allowed")]
    pub allowed: bool,
    #[serde(default)]
    pub auto_start: bool,
}

fn default_allowed() -> bool {
    true
}

impl PermissionRecord {
    pub fn permission(&self) -> Permission {
        Permission {
            allowed: self.allowed,
            auto_start: self.auto_start,
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: "station".to_string(),
            bind: "0.0.0.0".to_string(),
            advertise: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            place: "default".to_string(),
            data_dir: resolve_data_dir(),
            transfer_timeout_ms: 30_000,
            connect_retry: ConnectRetry::default(),
            registry: None,
            permissions: Vec::new(),
        }
    }
}

impl StationConfig {
    /// Reads a TOML file, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: StationConfig =
            toml::from_str(&txt).with_context(|| format!("bad station config {}", path.display()))?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let mut config = StationConfig::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Loopback station on an ephemeral port. Used by tests and `spore run`.
    pub fn local(name: &str, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            bind: "127.0.0.1".to_string(),
            advertise: "127.0.0.1".to_string(),
            port: 0,
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(name) = env::var("SPORE_STATION") {
            self.name = name;
        }
        if let Ok(bind) = env::var("SPORE_BIND") {
            self.bind = bind;
        }
        if let Ok(port) = env::var("SPORE_PORT") {
            self.port = port
                .parse::<u16>()
                .context("SPORE_PORT must be a u16 integer")?;
        }
        if let Ok(dir) = env::var("SPORE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(registry) = env::var("SPORE_PERMISSION_REGISTRY") {
            let registry = registry.trim().to_string();
            self.registry = (!registry.is_empty()).then_some(registry);
        }
        Ok(())
    }

    pub fn with_permission(mut self, record: PermissionRecord) -> Self {
        self.permissions.push(record);
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Endpoint peers use to reach this station once bound to `port`.
    pub fn endpoint(&self, port: u16) -> Endpoint {
        Endpoint::new(self.advertise.clone(), port)
    }

    pub fn package_dir(&self) -> PathBuf {
        self.data_dir.join("packages")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_retry.attempts.max(1),
            base_delay: Duration::from_millis(self.connect_retry.base_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::new(Duration::from_millis(self.transfer_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
        name = "station-b"
        port = 1100
        place = "lab"

        [connect_retry]
        attempts = 5

        [[permission]]
        agent = "greeter"
        hash = "a3f9c2d1e8b7"
        place = "lab"
        auto_start = true

        [[permission]]
        agent = "disk-report"
        hash = "77aa00112233"
        place = "lab"
        allowed = false
    "#;

    fn clear_env() {
        for key in [
            "SPORE_STATION",
            "SPORE_BIND",
            "SPORE_PORT",
            "SPORE_DATA_DIR",
            "SPORE_PERMISSION_REGISTRY",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn toml_file_fills_in_defaults() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = StationConfig::load(&path).unwrap();
        assert_eq!(config.name, "station-b");
        assert_eq!(config.port, 1100);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.transfer_timeout_ms, 30_000);
        assert_eq!(config.connect_retry.attempts, 5);
        assert_eq!(config.connect_retry.base_delay_ms, 100);
        assert!(config.registry.is_none());

        assert_eq!(config.permissions.len(), 2);
        assert_eq!(config.permissions[0].permission(), Permission::allow().with_auto_start());
        assert_eq!(config.permissions[1].permission(), Permission::deny());
    }

    #[test]
    #[serial]
    fn environment_overrides_the_file() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        env::set_var("SPORE_PORT", "2201");
        env::set_var("SPORE_PERMISSION_REGISTRY", "registry.local:1099");
        env::set_var("SPORE_DATA_DIR", dir.path());
        let config = StationConfig::load(&path).unwrap();
        clear_env();

        assert_eq!(config.port, 2201);
        assert_eq!(config.registry.as_deref(), Some("registry.local:1099"));
        assert_eq!(config.package_dir(), dir.path().join("packages"));
    }

    #[test]
    #[serial]
    fn bad_port_is_reported() {
        clear_env();
        env::set_var("SPORE_PORT", "not-a-port");
        let res = StationConfig::from_env();
        clear_env();
        assert!(res.is_err());
    }

    #[test]
    fn retry_policy_never_drops_below_one_attempt() {
        let mut config = StationConfig::local("a", "/tmp/spore-test");
        config.connect_retry.attempts = 0;
        assert_eq!(config.retry_policy().max_attempts, 1);
        assert_eq!(config.bind_addr(), "127.0.0.1:0");
        assert_eq!(config.endpoint(4000).to_string(), "127.0.0.1:4000");
    }
}
