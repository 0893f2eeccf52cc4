// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/cell

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidEndpoint(String),
    InvalidPort(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidEndpoint(s) => write!(f, "Invalid endpoint '{}': expected server:port", s),
            Error::InvalidPort(s) => write!(f, "Invalid port '{}'", s),
        }
    }
}

impl std::error::Error for Error {}
