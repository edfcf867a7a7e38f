//! Common types for the segment-routing fabric control plane.
//!
//! This crate provides type-safe representations of the network primitives
//! shared by the controller crates:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpAddress`]: IPv4 and IPv6 addresses
//! - [`IpPrefix`]: IP network prefixes (CIDR notation) with containment checks
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`DeviceId`], [`PortNumber`], [`ConnectPoint`]: switch and port addressing
//! - [`NodeId`]: controller cluster member identifiers

mod device;
mod ip;
mod mac;
mod vlan;

pub use device::{ConnectPoint, DeviceId, NodeId, PortNumber};
pub use ip::{IpAddress, IpPrefix, Ipv4Address, Ipv6Address};
pub use mac::MacAddress;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid device ID: {0:?}")]
    InvalidDeviceId(String),

    #[error("invalid port number: {0}")]
    InvalidPortNumber(String),

    #[error("invalid connect point (expected <device>/<port>): {0}")]
    InvalidConnectPoint(String),
}
