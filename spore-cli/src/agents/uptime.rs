// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use spore_station::{BoxFuture, StaticAgent, StaticContext};
use std::time::Duration;
use sysinfo::System;

/// Stays home and reports how long the host has been up.
pub struct Uptime;

impl Uptime {
    pub const NAME: &'static str = "uptime";
}

impl StaticAgent for Uptime {
    fn at_home_station<'a>(&'a mut self, ctx: &'a StaticContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let host = System::host_name().unwrap_or_else(|| "unknown host".to_string());
            let up = humantime::format_duration(Duration::from_secs(System::uptime()));
            println!("{} on {} has been up for {}", ctx.station, host, up);
            Ok(())
        })
    }
}
