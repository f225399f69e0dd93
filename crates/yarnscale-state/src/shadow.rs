//! Shadow control plane backed by the state store.
//!
//! Stands in for the remote control plane: policy and fleet targets are
//! kept in the `control_plane` table, and fleets are treated as fully
//! provisioned at their targets. Lets the controller run end to end and
//! record its decisions without touching a real cluster.

use tracing::info;

use yarnscale_core::{BoxFuture, CapacityController, ComputeLimits, FleetRole, InstanceFleet};

use crate::error::StateResult;
use crate::store::StateStore;
use crate::types::ControlPlaneSnapshot;

pub struct ShadowController {
    state: StateStore,
    cluster: String,
}

impl ShadowController {
    pub fn new(state: StateStore, cluster: impl Into<String>) -> Self {
        Self {
            state,
            cluster: cluster.into(),
        }
    }

    /// Create the initial snapshot if none exists.
    ///
    /// The cluster starts at its floor: the ceiling equals `minimum_units`,
    /// all of it core capacity, with an empty task fleet.
    pub fn ensure_initialized(
        &self,
        minimum_units: u32,
        maximum_on_demand_units: u32,
    ) -> StateResult<ControlPlaneSnapshot> {
        if let Some(existing) = self.state.get_control_plane(&self.cluster)? {
            return Ok(existing);
        }
        let snapshot = ControlPlaneSnapshot {
            policy: ComputeLimits {
                minimum_units,
                maximum_units: minimum_units,
                maximum_on_demand_units: maximum_on_demand_units.min(minimum_units),
                maximum_core_units: minimum_units,
            },
            fleets: vec![
                InstanceFleet {
                    id: "shadow-core".to_string(),
                    role: FleetRole::Core,
                    target_on_demand_units: minimum_units,
                    target_spot_units: 0,
                    provisioned_on_demand_units: minimum_units,
                    provisioned_spot_units: 0,
                },
                InstanceFleet {
                    id: "shadow-task".to_string(),
                    role: FleetRole::Task,
                    target_on_demand_units: 0,
                    target_spot_units: 0,
                    provisioned_on_demand_units: 0,
                    provisioned_spot_units: 0,
                },
            ],
        };
        self.state.put_control_plane(&self.cluster, &snapshot)?;
        info!(cluster = %self.cluster, minimum_units, "shadow control plane initialized");
        Ok(snapshot)
    }

    fn load(&self) -> anyhow::Result<ControlPlaneSnapshot> {
        self.state
            .get_control_plane(&self.cluster)?
            .ok_or_else(|| anyhow::anyhow!("no shadow control plane for cluster {}", self.cluster))
    }
}

impl CapacityController for ShadowController {
    fn get_policy(&self) -> BoxFuture<'_, ComputeLimits> {
        Box::pin(async move { Ok(self.load()?.policy) })
    }

    fn put_policy<'a>(&'a self, policy: &'a ComputeLimits) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut snapshot = self.load()?;
            snapshot.policy = *policy;
            self.state.put_control_plane(&self.cluster, &snapshot)?;
            info!(
                cluster = %self.cluster,
                maximum_units = policy.maximum_units,
                maximum_on_demand_units = policy.maximum_on_demand_units,
                "shadow policy updated"
            );
            Ok(())
        })
    }

    fn list_fleets(&self) -> BoxFuture<'_, Vec<InstanceFleet>> {
        Box::pin(async move { Ok(self.load()?.fleets) })
    }

    fn modify_fleet<'a>(
        &'a self,
        fleet_id: &'a str,
        on_demand_target: u32,
        spot_target: u32,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut snapshot = self.load()?;
            let fleet = snapshot
                .fleets
                .iter_mut()
                .find(|f| f.id == fleet_id)
                .ok_or_else(|| anyhow::anyhow!("unknown fleet {fleet_id}"))?;
            fleet.target_on_demand_units = on_demand_target;
            fleet.target_spot_units = spot_target;
            fleet.provisioned_on_demand_units = on_demand_target;
            fleet.provisioned_spot_units = spot_target;
            self.state.put_control_plane(&self.cluster, &snapshot)?;
            info!(
                cluster = %self.cluster,
                fleet = %fleet_id,
                on_demand_target,
                spot_target,
                "shadow fleet modified"
            );
            Ok(())
        })
    }
}
