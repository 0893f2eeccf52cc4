// SPDX-License-Identifier: MIT
// spore-core/src/error.rs

use core::fmt;

/// Failure codes carried in `Failed` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Malformed = 200,

    StoreFailure = 300,
    InstantiationFailure = 301,
    UnknownResident = 302,
    ResidentBusy = 303,

    Internal = 500,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            200 => ErrorCode::Malformed,
            300 => ErrorCode::StoreFailure,
            301 => ErrorCode::InstantiationFailure,
            302 => ErrorCode::UnknownResident,
            303 => ErrorCode::ResidentBusy,
            _ => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Malformed => write!(f, "Malformed Request"),
            ErrorCode::StoreFailure => write!(f, "Store Failure"),
            ErrorCode::InstantiationFailure => write!(f, "Instantiation Failure"),
            ErrorCode::UnknownResident => write!(f, "Unknown Resident"),
            ErrorCode::ResidentBusy => write!(f, "Resident Busy"),
            ErrorCode::Internal => write!(f, "Internal Error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ErrorCode {}
