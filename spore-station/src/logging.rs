// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `json` switches to one JSON object per
/// line; otherwise output is the human readable format.
pub fn init_logging(station_name: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    if installed.is_ok() {
        info!(
            station = station_name,
            version = env!("CARGO_PKG_VERSION"),
            "Station initialized"
        );
    }
}

#[macro_export]
macro_rules! log_operation {
    ($op:expr, $result:expr) => {
        match $result {
            Ok(val) => {
                tracing::info!(operation = $op, status = "success");
                Ok(val)
            }
            Err(e) => {
                tracing::error!(operation = $op, error = %e, status = "failed");
                Err(e)
            }
        }
    };
}
