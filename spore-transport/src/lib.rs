// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

pub mod deadline;
pub mod membrane;
pub mod retry;
pub mod synapse;
pub mod transport;

pub use deadline::Deadline;
pub use membrane::Membrane;
pub use retry::RetryPolicy;
pub use synapse::Synapse;
pub use transport::TcpTransport;
