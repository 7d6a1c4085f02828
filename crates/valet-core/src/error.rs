//! Error types for Valet Core

use std::fmt;

use thiserror::Error;

use crate::car::CarStatus;
use crate::lifecycle::Event;

/// Unique key of the active data set that a car-in request collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    CarNo,
    ValetId,
    UserId,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::CarNo => write!(f, "Car No"),
            KeyKind::ValetId => write!(f, "Valet ID"),
            KeyKind::UserId => write!(f, "User ID"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    // Tenant resolution errors
    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    /// A resolved data-set name failed the identifier check. Configuration
    /// fault; retrying cannot succeed.
    #[error("Unsafe identifier for site {site_no}: {name:?}")]
    UnsafeIdentifier { site_no: String, name: String },

    // Lifecycle errors
    #[error("Car {car_no} cannot {event} while {current}")]
    InvalidTransition {
        car_no: String,
        current: CarStatus,
        event: Event,
    },

    #[error("Car {car_no} is {current}, expected {expected}")]
    PreconditionFailed {
        car_no: String,
        current: CarStatus,
        expected: CarStatus,
    },

    #[error("Driver {0} not found or not a driver")]
    UnknownDriver(String),

    #[error("{key} {value} already exists")]
    DuplicateKey { key: KeyKind, value: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Site user administration errors
    #[error("User limit reached for site {site_no} ({max_users} users)")]
    UserLimitReached { site_no: String, max_users: u32 },

    #[error("User {0} is an admin and cannot be removed")]
    ProtectedUser(String),

    // Storage and configuration errors
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a caller may reasonably retry the operation.
    ///
    /// Only transaction-level storage failures qualify. The engine never
    /// retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageFailure(_))
    }

    /// Stable machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidTenant(_) => "invalid_tenant",
            Error::UnsafeIdentifier { .. } => "unsafe_identifier",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::PreconditionFailed { .. } => "precondition_failed",
            Error::UnknownDriver(_) => "unknown_driver",
            Error::DuplicateKey { .. } => "duplicate_key",
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::UserLimitReached { .. } => "user_limit_reached",
            Error::ProtectedUser(_) => "protected_user",
            Error::StorageFailure(_) => "storage_failure",
            Error::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
