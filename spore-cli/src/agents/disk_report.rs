// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use anyhow::Context;
use serde::{Deserialize, Serialize};
use spore_station::agent::json_snapshot;
use spore_station::{BoxFuture, MobileAgent, Voyage};
use sysinfo::Disks;
use tracing::info;

/// Collects disk usage at the remote station and prints it at home.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DiskReport {
    pub station: Option<String>,
    pub collected_at: Option<String>,
    pub disks: Vec<DiskUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskUsage {
    pub name: String,
    pub mount_point: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskUsage {
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 * 100.0 / self.total_bytes as f64
    }
}

impl DiskReport {
    pub const NAME: &'static str = "disk-report";

    fn collect() -> Vec<DiskUsage> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .map(|d| DiskUsage {
                name: d.name().to_string_lossy().into_owned(),
                mount_point: d.mount_point().display().to_string(),
                total_bytes: d.total_space(),
                available_bytes: d.available_space(),
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "Disk report from {} at {}\n",
            self.station.as_deref().unwrap_or("?"),
            self.collected_at.as_deref().unwrap_or("?"),
        );
        if self.disks.is_empty() {
            out.push_str("  (no disks reported)\n");
        }
        for d in &self.disks {
            out.push_str(&format!(
                "  {:<20} {:<24} {:>6.1}% used of {} MiB\n",
                d.name,
                d.mount_point,
                d.used_percent(),
                d.total_bytes / (1024 * 1024)
            ));
        }
        out
    }
}

impl MobileAgent for DiskReport {
    fn at_remote_station<'a>(&'a mut self, voyage: &'a mut Voyage) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.disks = tokio::task::spawn_blocking(Self::collect)
                .await
                .context("disk collection panicked")?;
            self.station = Some(voyage.station_name().to_string());
            self.collected_at = Some(crate::timestamp());
            info!(instance = %voyage.instance(), disks = self.disks.len(), "Disk usage collected");

            let bytes = self.snapshot()?;
            voyage.return_home(bytes).await?;
            Ok(())
        })
    }

    fn back_at_home_station<'a>(&'a mut self, voyage: &'a mut Voyage) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!(instance = %voyage.instance(), "Disk report is home");
            print!("{}", self.render());
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

    #[test]
    fn usage_handles_empty_and_full_disks() {
        let mut d = DiskUsage {
            name: "sda1".into(),
            mount_point: "/".into(),
            total_bytes: 0,
            available_bytes: 0,
        };
        assert_eq!(d.used_percent(), 0.0);
        d.total_bytes = 200;
        d.available_bytes = 50;
        assert_eq!(d.used_percent(), 75.0);
    }

    #[test]
    fn render_names_the_reporting_station() {
        let report = DiskReport {
            station: Some("station-b".into()),
            collected_at: Some("2025-01-01T00:00:00Z".into()),
            disks: Vec::new(),
        };
        let text = report.render();
        assert!(text.contains("station-b"));
        assert!(text.contains("no disks reported"));
    }
}
