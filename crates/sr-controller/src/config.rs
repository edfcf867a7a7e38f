//! Controller configuration file.
//!
//! Loads the controller configuration from TOML. A missing file yields the
//! defaults; a malformed one is an error.
//!
//! ```toml
//! [controller]
//! local_node = "192.168.1.1"
//! workers = 4
//!
//! [[devices]]
//! id = "of:0000000000000001"
//! pair_device = "of:0000000000000002"
//! pair_local_port = 9
//!
//! [[interfaces]]
//! connect_point = "of:0000000000000001/1"
//! vlan_untagged = 10
//! ips = ["10.0.1.254/24"]
//!
//! [mastership]
//! "of:0000000000000001" = "192.168.1.1"
//! ```

use crate::error::{ControllerError, Result};
use crate::host::HostHandlerConfig;
use crate::interface::{Interface, VlanPolicy};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sr_types::{ConnectPoint, DeviceId, IpPrefix, NodeId, PortNumber, VlanId};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/srcontroller/srcontroller.toml";

/// `[controller]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSection {
    /// Identifier of this cluster member
    #[serde(default = "default_local_node")]
    pub local_node: NodeId,

    /// Number of event worker shards
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Probe pair devices for hosts seen on one leaf only
    #[serde(default = "default_active_probing")]
    pub active_probing: bool,

    /// Probe only the same port number on the pair device
    #[serde(default)]
    pub symmetric_probing: bool,
}

/// `[[devices]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSection {
    pub id: DeviceId,
    #[serde(default)]
    pub pair_device: Option<DeviceId>,
    #[serde(default)]
    pub pair_local_port: Option<PortNumber>,
}

/// `[[interfaces]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSection {
    #[serde(default)]
    pub name: String,
    pub connect_point: ConnectPoint,
    #[serde(default)]
    pub vlan_untagged: Option<VlanId>,
    #[serde(default)]
    pub vlan_tagged: BTreeSet<VlanId>,
    #[serde(default)]
    pub vlan_native: Option<VlanId>,
    #[serde(default)]
    pub ips: Vec<IpPrefix>,
}

impl InterfaceSection {
    /// Builds the interface; an untagged VLAN cannot be combined with
    /// tagged or native VLANs.
    pub fn to_interface(&self) -> Result<Interface> {
        let tagged = !self.vlan_tagged.is_empty() || self.vlan_native.is_some();
        let vlan = match self.vlan_untagged {
            Some(_) if tagged => {
                return Err(ControllerError::Configuration(format!(
                    "interface {} mixes untagged with tagged/native VLANs",
                    self.connect_point
                )))
            }
            Some(untagged) => VlanPolicy::Untagged(untagged),
            None if tagged => VlanPolicy::Tagged {
                tagged: self.vlan_tagged.clone(),
                native: self.vlan_native,
            },
            None => VlanPolicy::Unconfigured,
        };
        Ok(Interface {
            name: self.name.clone(),
            connect_point: self.connect_point.clone(),
            vlan,
            subnets: self.ips.clone(),
        })
    }
}

/// Complete controller configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub controller: ControllerSection,
    #[serde(default)]
    pub devices: Vec<DeviceSection>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceSection>,
    /// Initial mastership, device id to node id
    #[serde(default)]
    pub mastership: BTreeMap<DeviceId, NodeId>,
}

fn default_local_node() -> NodeId {
    NodeId::from("127.0.0.1")
}

fn default_workers() -> usize {
    4
}

fn default_active_probing() -> bool {
    true
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            local_node: default_local_node(),
            workers: default_workers(),
            active_probing: default_active_probing(),
            symmetric_probing: false,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content).map_err(|e| {
                ControllerError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "srcontrollerd: config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(ControllerError::Io(e)),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ControllerError::Configuration(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            ControllerError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn host_handler_config(&self) -> HostHandlerConfig {
        HostHandlerConfig {
            active_probing: self.controller.active_probing,
            symmetric_probing: self.controller.symmetric_probing,
        }
    }

    /// All configured interfaces.
    pub fn interfaces(&self) -> Result<Vec<Interface>> {
        self.interfaces
            .iter()
            .map(InterfaceSection::to_interface)
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.controller.workers == 0 {
            return Err(ControllerError::Configuration(
                "workers must be > 0".to_string(),
            ));
        }

        if self.controller.local_node.as_str().is_empty() {
            return Err(ControllerError::Configuration(
                "local_node must not be empty".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for device in &self.devices {
            if !seen.insert(&device.id) {
                return Err(ControllerError::Configuration(format!(
                    "device {} configured twice",
                    device.id
                )));
            }
            if device.pair_device.as_ref() == Some(&device.id) {
                return Err(ControllerError::Configuration(format!(
                    "device {} is paired with itself",
                    device.id
                )));
            }
        }

        // Asymmetric pairing degrades to single-homed behaviour.
        for device in &self.devices {
            let Some(pair) = &device.pair_device else {
                if device.pair_local_port.is_some() {
                    warn!("srcontrollerd: {} has a pair port but no pair device", device.id);
                }
                continue;
            };
            let back = self
                .devices
                .iter()
                .find(|other| other.id == *pair)
                .and_then(|other| other.pair_device.as_ref());
            if back != Some(&device.id) {
                warn!(
                    "srcontrollerd: {} is paired with {} but not the other way round",
                    device.id, pair
                );
            }
            if device.pair_local_port.is_none() {
                warn!("srcontrollerd: {} has no pair_local_port, no redirects", device.id);
            }
        }

        self.interfaces()?;
        Ok(())
    }
}
