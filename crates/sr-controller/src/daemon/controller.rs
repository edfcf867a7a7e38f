//! The controller: handlers wired to a keyed executor.

use super::device::DeviceHandler;
use super::events::{DeviceEvent, FabricEvent, MastershipEvent};
use crate::arbiter::{ArbiterStatsSnapshot, OwnershipArbiter};
use crate::error::Result;
use crate::host::{HostHandler, HostHandlerConfig, HostHandlerStatsSnapshot};
use crate::populator::{PopulatorStatsSnapshot, RulePopulator, TableSnapshot};
use crate::route::{RouteHandler, RouteHandlerStatsSnapshot};
use crate::services::{DeviceConfiguration, FabricServices, FlowProgrammer};
use log::{debug, info};
use serde::Serialize;
use sr_orch_common::{dispatch, KeyedExecutor, KeyedExecutorConfig, TaskStats, TaskStatsSnapshot};
use sr_types::DeviceId;
use std::sync::Arc;

/// Configuration for [`SrController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrControllerConfig {
    /// Number of executor shards
    pub workers: usize,
    pub host: HostHandlerConfig,
}

impl Default for SrControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            host: HostHandlerConfig::default(),
        }
    }
}

/// Counters of every component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    pub host_events: TaskStatsSnapshot,
    pub route_events: TaskStatsSnapshot,
    pub device_events: TaskStatsSnapshot,
    pub interface_events: TaskStatsSnapshot,
    pub arbiter: ArbiterStatsSnapshot,
    pub populator: PopulatorStatsSnapshot,
    pub hosts: HostHandlerStatsSnapshot,
    pub routes: RouteHandlerStatsSnapshot,
}

/// Segment routing controller instance.
///
/// Events are queued on a [`KeyedExecutor`]: host events by host id, route
/// events by prefix, device events by device id and interface events by
/// connect point. A host event runs through the host handler and then the
/// route handler on the same shard.
///
/// Mastership changes are applied synchronously in [`SrController::submit`]
/// so no later event can see a stale ownership decision.
///
/// Must be created inside a tokio runtime.
pub struct SrController {
    executor: KeyedExecutor,
    device_config: Arc<dyn DeviceConfiguration>,
    arbiter: Arc<OwnershipArbiter>,
    populator: Arc<RulePopulator>,
    host_handler: Arc<HostHandler>,
    route_handler: Arc<RouteHandler>,
    device_handler: Arc<DeviceHandler>,
    host_stats: Arc<TaskStats>,
    route_stats: Arc<TaskStats>,
    device_stats: Arc<TaskStats>,
    interface_stats: Arc<TaskStats>,
}

impl SrController {
    pub fn new(
        config: SrControllerConfig,
        services: FabricServices,
        programmer: Option<Arc<dyn FlowProgrammer>>,
    ) -> Self {
        let arbiter = Arc::new(OwnershipArbiter::new(
            Arc::clone(&services.mastership),
            Arc::clone(&services.cluster),
            Arc::clone(&services.device_config),
        ));
        let mut populator =
            RulePopulator::new(Arc::clone(&arbiter), Arc::clone(&services.device_config));
        if let Some(programmer) = programmer {
            populator = populator.with_programmer(programmer);
        }
        let populator = Arc::new(populator);

        let host_handler = Arc::new(HostHandler::new(
            config.host,
            &services,
            Arc::clone(&populator),
        ));
        let route_handler = Arc::new(RouteHandler::new(&services, Arc::clone(&populator)));
        let device_handler = Arc::new(DeviceHandler::new(
            Arc::clone(&host_handler),
            Arc::clone(&route_handler),
            Arc::clone(&populator),
            Arc::clone(&services.devices),
        ));

        info!(
            "SrController: starting with {} workers, local node {}",
            config.workers,
            services.cluster.local_node_id()
        );

        Self {
            executor: KeyedExecutor::new(
                KeyedExecutorConfig::new("SrController").with_workers(config.workers),
            ),
            device_config: services.device_config,
            arbiter,
            populator,
            host_handler,
            route_handler,
            device_handler,
            host_stats: Arc::new(TaskStats::default()),
            route_stats: Arc::new(TaskStats::default()),
            device_stats: Arc::new(TaskStats::default()),
            interface_stats: Arc::new(TaskStats::default()),
        }
    }

    pub fn arbiter(&self) -> &Arc<OwnershipArbiter> {
        &self.arbiter
    }

    pub fn populator(&self) -> &Arc<RulePopulator> {
        &self.populator
    }

    pub fn host_handler(&self) -> &Arc<HostHandler> {
        &self.host_handler
    }

    pub fn route_handler(&self) -> &Arc<RouteHandler> {
        &self.route_handler
    }

    /// Queues `event` for processing.
    ///
    /// # Errors
    ///
    /// Fails only once the controller has been shut down.
    pub fn submit(&self, event: FabricEvent) -> Result<()> {
        match event {
            FabricEvent::Host(event) => {
                dispatch(&self.executor, &self.host_handler, event.clone(), &self.host_stats)?;
                dispatch(&self.executor, &self.route_handler, event, &self.host_stats)?;
            }
            FabricEvent::Route(event) => {
                dispatch(&self.executor, &self.route_handler, event, &self.route_stats)?;
            }
            FabricEvent::Mastership(event) => self.process_mastership(&event)?,
            FabricEvent::Device(event) => {
                dispatch(&self.executor, &self.device_handler, event, &self.device_stats)?;
            }
            FabricEvent::Interface(event) => {
                dispatch(&self.executor, &self.host_handler, event, &self.interface_stats)?;
            }
        }
        Ok(())
    }

    /// Drops cached ownership for the device and its pair, then reinstalls
    /// whichever of the two the local node now programs.
    fn process_mastership(&self, event: &MastershipEvent) -> Result<()> {
        let device_id = event.device_id();
        self.arbiter.on_mastership_changed(device_id);

        let pair = self.device_config.pair_device_id(device_id);
        for device in std::iter::once(device_id.clone()).chain(pair) {
            if self.arbiter.should_program(&device) {
                debug!("SrController: local node now programs {}", device);
                self.dispatch_device(DeviceEvent::Available { device_id: device })?;
            }
        }
        Ok(())
    }

    fn dispatch_device(&self, event: DeviceEvent) -> Result<()> {
        dispatch(&self.executor, &self.device_handler, event, &self.device_stats)?;
        Ok(())
    }

    /// Waits until every queued event has been processed.
    pub async fn flush(&self) {
        self.executor.flush().await;
    }

    /// Processes what is queued and stops the workers.
    pub async fn shutdown(&self) {
        info!("SrController: shutting down");
        self.executor.shutdown().await;
    }

    /// Queues a full reinstall of `device_id`.
    pub fn reinstall(&self, device_id: &DeviceId) -> Result<()> {
        self.dispatch_device(DeviceEvent::Available {
            device_id: device_id.clone(),
        })
    }

    pub fn snapshot(&self) -> TableSnapshot {
        self.populator.snapshot()
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            host_events: self.host_stats.snapshot(),
            route_events: self.route_stats.snapshot(),
            device_events: self.device_stats.snapshot(),
            interface_events: self.interface_stats.snapshot(),
            arbiter: self.arbiter.stats(),
            populator: self.populator.stats(),
            hosts: self.host_handler.stats(),
            routes: self.route_handler.stats(),
        }
    }
}
