//! Error types for the controller.

use sr_orch_common::ExecutorError;
use sr_types::{ConnectPoint, IpPrefix, ParseError};
use thiserror::Error;

/// Failure reported by the external device configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to add subnet {prefix} at {connect_point}: {reason}")]
    AddSubnet {
        connect_point: ConnectPoint,
        prefix: IpPrefix,
        reason: String,
    },

    #[error("failed to remove subnet {prefix} at {connect_point}: {reason}")]
    RemoveSubnet {
        connect_point: ConnectPoint,
        prefix: IpPrefix,
        reason: String,
    },
}

/// Error type for controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A location was given that the host does not occupy.
    #[error("host {host} is not located at {location}")]
    InvalidLocation { host: String, location: ConnectPoint },

    /// Subnet bookkeeping failed in the device configuration store.
    #[error("device configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The event executor no longer accepts work.
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Invalid controller configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
