// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::transport::{read_frame, write_frame};
use anyhow::{Context, Result};
use spore_codec::RkyvCodec;
use spore_core::{BoxFuture, ErrorCode, TransportError};
use spore_model::{StationRequest, StationResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Server-side request handler.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: StationRequest) -> BoxFuture<'_, StationResponse>;
}

pub struct Membrane {
    name: String,
    listener: TcpListener,
}

impl Membrane {
    pub async fn bind(name: &str, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind membrane at {}", addr))?;
        info!("[{}] Membrane Active at {}", name, listener.local_addr()?);
        Ok(Self {
            name: name.to_string(),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Connection tasks live in a `JoinSet`, so aborting the
    /// task running `serve` closes every open connection with it.
    pub async fn serve<H: Handler>(self, handler: Arc<H>) -> Result<()> {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!("[{}] Accept error: {}", self.name, e);
                            continue;
                        }
                    };
                    let _ = stream.set_nodelay(true);
                    let h = handler.clone();
                    let name = self.name.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, h).await {
                            warn!("[{}] Connection from {} failed: {}", name, peer, e);
                        }
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
    }
}

async fn handle_connection<H: Handler>(mut stream: TcpStream, handler: Arc<H>) -> Result<(), TransportError> {
    // Closed cleanly by the peer once it has what it needs.
    while let Some(buf) = read_frame(&mut stream).await? {
        let response = match RkyvCodec::decode::<StationRequest>(&buf) {
            Ok(request) => {
                debug!(kind = request.kind(), "Request received");
                handler.handle(request).await
            }
            Err(e) => StationResponse::Failed {
                code: ErrorCode::Malformed.as_u16(),
                message: e.to_string(),
            },
        };

        let resp_bytes = RkyvCodec::encode(&response)?;
        write_frame(&mut stream, &resp_bytes).await?;
    }
    Ok(())
}
