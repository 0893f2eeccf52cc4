// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use crate::deadline::Deadline;
use crate::retry::RetryPolicy;
use crate::transport::{io_error, TcpTransport};
use rkyv::de::deserializers::SharedDeserializeMap;
use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Serialize};
use spore_codec::RkyvCodec;
use spore_core::{Transport, TransportError};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Client side of a station connection. One request is in flight at a time;
/// every call is bounded by the synapse's deadline.
pub struct Synapse {
    endpoint: String,
    transport: Box<dyn Transport>,
    deadline: Deadline,
}

impl Synapse {
    pub async fn grow(
        endpoint: &str,
        retry: &RetryPolicy,
        deadline: Deadline,
    ) -> Result<Self, TransportError> {
        debug!("[Synapse] Connecting to '{}'...", endpoint);

        let stream = retry
            .execute(move || async move {
                deadline
                    .execute(async { TcpStream::connect(endpoint).await.map_err(io_error) })
                    .await
            })
            .await?;
        stream.set_nodelay(true).map_err(io_error)?;

        info!("[Synapse] ✓ Connected to '{}'", endpoint);
        Ok(Self::with_transport(endpoint, Box::new(TcpTransport::new(stream)), deadline))
    }

    /// Wraps an already established transport.
    pub fn with_transport(endpoint: &str, transport: Box<dyn Transport>, deadline: Deadline) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            transport,
            deadline,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn fire<Req, Resp>(&self, request: &Req) -> Result<Resp, TransportError>
    where
        Req: Serialize<AllocSerializer<1024>>,
        Resp: Archive,
        Resp::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<Resp, SharedDeserializeMap>,
    {
        let frame = RkyvCodec::encode(request)?;
        let resp_bytes = self.deadline.execute(self.transport.call(&frame)).await?;
        RkyvCodec::decode::<Resp>(&resp_bytes)
    }
}
