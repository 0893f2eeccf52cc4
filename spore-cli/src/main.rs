// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use spore_cli::agents;
use spore_station::logging::init_logging;
use spore_station::{
    wait_for, DispatchSpec, Endpoint, MemoryPermissionStore, Permission, PermissionIdentity,
    PermissionStore, RemotePermissionStore, Station, StationClient, StationConfig, StationEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "spore")]
#[command(about = "Mobile agent stations")]
struct Cli {
    /// One JSON object per log line
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a station until interrupted
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Launch a sample agent from a temporary home station and wait for it
    Run {
        agent: String,
        /// Destination station (host:port)
        #[arg(long)]
        to: Option<Endpoint>,
        #[arg(long, default_value = "default")]
        place: String,
        /// Extra parameters, e.g. --param name=Ada
        #[arg(long = "param")]
        params: Vec<String>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
        timeout: Duration,
    },
    /// Ask a station's permission endpoint for a record
    Permission {
        #[arg(long)]
        at: Endpoint,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        hash: String,
        #[arg(long, default_value = "default")]
        place: String,
    },
    /// List the instances a station hosts
    Residents {
        #[arg(long)]
        at: Endpoint,
    },
    /// Start a dormant resident
    Start {
        #[arg(long)]
        at: Endpoint,
        #[arg(long)]
        id: String,
    },
    /// Remove a resident
    Stop {
        #[arg(long)]
        at: Endpoint,
        #[arg(long)]
        id: String,
    },
    Ping {
        #[arg(long)]
        at: Endpoint,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config } => cmd_serve(config, cli.json_logs).await,
        Commands::Run {
            agent,
            to,
            place,
            params,
            config,
            timeout,
        } => cmd_run(&agent, to, &place, params, config, timeout, cli.json_logs).await,
        Commands::Permission {
            at,
            agent,
            hash,
            place,
        } => cmd_permission(&at, &agent, &hash, &place).await,
        Commands::Residents { at } => cmd_residents(&at).await,
        Commands::Start { at, id } => {
            remote(&at).await?.start(parse_id(&id)?).await?;
            println!("✓ Started {}", id);
            Ok(())
        }
        Commands::Stop { at, id } => {
            remote(&at).await?.stop(parse_id(&id)?).await?;
            println!("✓ Stopped {}", id);
            Ok(())
        }
        Commands::Ping { at } => {
            let started = Instant::now();
            let station = remote(&at).await?.ping().await?;
            println!("✓ {} answered in {:?}", station, started.elapsed());
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<StationConfig> {
    match path {
        Some(p) => StationConfig::load(&p),
        None => StationConfig::from_env(),
    }
}

async fn remote(at: &Endpoint) -> Result<StationClient> {
    let config = StationConfig::from_env()?;
    StationClient::connect(at, &config.retry_policy(), config.deadline())
        .await
        .with_context(|| format!("station {} unreachable", at))
}

fn parse_id(id: &str) -> Result<u64> {
    u64::from_str_radix(id.trim().trim_start_matches("0x"), 16)
        .with_context(|| format!("bad instance id '{}', expected hex", id))
}

async fn cmd_serve(config: Option<PathBuf>, json_logs: bool) -> Result<()> {
    let config = load_config(config)?;
    init_logging(&config.name, json_logs);

    let handle = Station::builder(config)
        .catalog(agents::catalog())
        .spawn()
        .await?;
    println!("✓ Station {} serving at {}", handle.name(), handle.endpoint());

    tokio::select! {
        res = handle.join() => res,
        _ = tokio::signal::ctrl_c() => {
            println!("Shutting down");
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    agent: &str,
    to: Option<Endpoint>,
    place: &str,
    params: Vec<String>,
    config: Option<PathBuf>,
    timeout: Duration,
    json_logs: bool,
) -> Result<()> {
    let mut config = load_config(config)?;
    if config.name == StationConfig::default().name {
        config.name = "spore-run".to_string();
    }
    init_logging(&config.name, json_logs);

    if let Some(mut fixed) = agents::fixed(agent) {
        let ctx = spore_station::StaticContext {
            station: config.name.clone(),
            endpoint: config.endpoint(config.port),
            parameters: params,
        };
        return fixed.at_home_station(&ctx).await;
    }

    let mobile = agents::mobile(agent).ok_or_else(|| {
        anyhow!(
            "unknown agent '{}', try one of: {}, {}",
            agent,
            agents::catalog().names().join(", "),
            agents::Uptime::NAME
        )
    })?;
    let Some(to) = to else {
        bail!("'{}' travels: pass --to host:port", agent);
    };

    let mut parameters = vec![to.server.clone(), to.port.to_string(), place.to_string()];
    parameters.extend(params);
    let spec = DispatchSpec::new(agent, agents::package(agent)).with_parameters(parameters);

    // The run station must let its own agent back in.
    let permissions: Arc<dyn PermissionStore> = match &config.registry {
        Some(registry) => Arc::new(RemotePermissionStore::new(
            registry.parse()?,
            config.retry_policy(),
            config.deadline(),
        )),
        None => {
            let store = MemoryPermissionStore::from_records(&config.permissions);
            store.grant(agent, &spec.hash(), &config.place, Permission::allow().with_auto_start());
            Arc::new(store)
        }
    };

    let handle = Station::builder(config)
        .catalog(agents::catalog())
        .permissions(permissions)
        .spawn()
        .await?;
    let mut events = handle.subscribe();

    let started = Instant::now();
    let instance = handle.dispatch(mobile, spec).await?;
    println!("→ {} dispatched from {} to {}", instance, handle.endpoint(), to);

    let id = instance.id;
    let outcome = wait_for(&mut events, timeout, |e| {
        e.id() == id
            && matches!(
                e,
                StationEvent::Returned { .. }
                    | StationEvent::HookFailed { .. }
                    | StationEvent::Denied { .. }
                    | StationEvent::InstantiationFailed { .. }
            )
    })
    .await?;

    match outcome {
        StationEvent::Returned { .. } => {
            println!(
                "✓ {} home after {}",
                instance,
                humantime::format_duration(Duration::from_millis(started.elapsed().as_millis() as u64))
            );
            Ok(())
        }
        StationEvent::HookFailed { status, reason, .. } => bail!("{} failed while {}: {}", instance, status, reason),
        other => bail!("{} did not make it home: {:?}", instance, other),
    }
}

async fn cmd_permission(at: &Endpoint, agent: &str, hash: &str, place: &str) -> Result<()> {
    let identity = PermissionIdentity::new(agent, hash, place);
    let client = remote(at).await?;
    match client.lookup_permission(&identity).await? {
        Some(p) => println!(
            "{} at {}: allowed={} auto_start={}",
            identity, at, p.allowed, p.auto_start
        ),
        None => println!("{} at {}: no record (denied)", identity, at),
    }
    Ok(())
}

async fn cmd_residents(at: &Endpoint) -> Result<()> {
    let residents = remote(at).await?.residents().await?;
    if residents.is_empty() {
        println!("(no residents)");
    }
    for r in residents {
        println!(
            "{:016x}  {:<24} {:<12} {:<14} {:?}",
            r.id,
            r.agent.to_string(),
            r.place_name,
            r.status.to_string(),
            r.phase
        );
    }
    Ok(())
}
