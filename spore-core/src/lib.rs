// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod error;

pub use error::ErrorCode;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::future::Future;
use core::pin::Pin;

/// Upper bound for a single frame payload (256 MiB).
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Default station port.
pub const DEFAULT_PORT: u16 = 1099;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint unreachable or the socket failed mid-call.
    Io(String),
    Timeout,
    ConnectionClosed,
    FrameTooLarge(usize),
    Codec(String),
}

impl TransportError {
    /// Every transport failure leaves the outcome of the remote call unknown,
    /// except a local encoding failure which never left the process.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Codec(_) | TransportError::FrameTooLarge(_))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "I/O failure: {}", e),
            TransportError::Timeout => write!(f, "Timeout"),
            TransportError::ConnectionClosed => write!(f, "Connection closed"),
            TransportError::FrameTooLarge(len) => write!(f, "Frame too large ({} bytes)", len),
            TransportError::Codec(e) => write!(f, "Codec failure: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}

/// Client-side: Request/Response pattern.
pub trait Transport: Send + Sync {
    fn call(&self, data: &[u8]) -> BoxFuture<'_, Result<Vec<u8>, TransportError>>;
}
