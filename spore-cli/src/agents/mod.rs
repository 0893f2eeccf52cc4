// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

pub mod disk_report;
pub mod greeter;
pub mod uptime;

pub use disk_report::DiskReport;
pub use greeter::Greeter;
pub use uptime::Uptime;

use spore_station::{AgentCatalog, MobileAgent, Package, StaticAgent};

/// Every mobile sample agent, keyed by the name it travels under.
pub fn catalog() -> AgentCatalog {
    AgentCatalog::new()
        .with_json::<DiskReport>(DiskReport::NAME)
        .with_json::<Greeter>(Greeter::NAME)
}

pub fn mobile(name: &str) -> Option<Box<dyn MobileAgent>> {
    match name {
        DiskReport::NAME => Some(Box::new(DiskReport::default())),
        Greeter::NAME => Some(Box::new(Greeter::default())),
        _ => None,
    }
}

pub fn fixed(name: &str) -> Option<Box<dyn StaticAgent>> {
    match name {
        Uptime::NAME => Some(Box::new(Uptime)),
        _ => None,
    }
}

/// The package shipped with a sample agent. Its fingerprint is the
/// agent's version hash.
pub fn package(name: &str) -> Package {
    Package::new(
        format!("{}.pkg", name),
        format!("spore sample agent {} {}", name, env!("CARGO_PKG_VERSION")).into_bytes(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mobile_sample_can_be_rebuilt() {
        let catalog = catalog();
        for name in [DiskReport::NAME, Greeter::NAME] {
            let agent = mobile(name).unwrap();
            let bytes = agent.snapshot().unwrap();
            assert!(catalog.rebuild(name, &bytes).is_ok(), "{} not rebuilt", name);
        }
        assert!(mobile(Uptime::NAME).is_none());
        assert!(fixed(Uptime::NAME).is_some());
    }

    #[test]
    fn packages_are_versioned_by_content() {
        let a = package(Greeter::NAME);
        assert_eq!(a.name, "greeter.pkg");
        assert_ne!(
            spore_station::fingerprint(&a.data),
            spore_station::fingerprint(&package(DiskReport::NAME).data)
        );
    }
}
