//! Event dispatch and lifecycle.
//!
//! [`SrController`] owns the handlers and a keyed executor; [`MemoryFabric`]
//! backs it with in-memory collaborators and keeps them in step with an
//! event feed.

mod controller;
mod device;
mod events;
mod fabric;
mod replay;

pub use controller::{ControllerStats, SrController, SrControllerConfig};
pub use device::DeviceHandler;
pub use events::{DeviceEvent, FabricEvent, InterfaceEvent, MastershipEvent};
pub use fabric::MemoryFabric;
pub use replay::{replay, ReplaySummary};
