//! Background watcher driving the post-boot handoff.
//!
//! Each pass pairs managed spot requests with their freshly running,
//! still-untagged instances and runs setup on them. An instance that
//! keeps failing gets five minutes from its first failure, then is
//! terminated. The watcher exits once the reconciler has signalled
//! that no further requests are coming, nothing is pending, and no
//! deadline is outstanding.
//!
//! Deadlines use the runtime clock (`tokio::time::Instant`) so the
//! timeout path is testable under virtual time; registry garbage
//! collection compares cloud-reported creation times and stays on the
//! wall clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use cloud::api::SpotCloud;
use cloud::status;
use cloud::types::{InstanceDescription, SpotRequest, name_tag};
use fleet::inventory::FleetInventory;
use fleet::manager::InstanceManager;
use fleet::registry::RequestRegistry;

use crate::config::ControllerConfig;
use crate::signal::{DoneSignal, StopSignal};

/// Wall-clock allowance from first setup failure to forced termination.
const TIME_FROM_RUNNING_TO_LOGIN: Duration = Duration::from_secs(5 * 60);

/// A request snapshot older than this is refreshed before the pending
/// evaluation.
const SNAPSHOT_STALE_AFTER: Duration = Duration::from_secs(5);

const PASS_INTERVAL: Duration = Duration::from_secs(10);

/// Slack added to `run_interval` before a registry entry that never
/// reached the cloud listing is declared lost.
const REGISTRY_GC_SLACK_SECS: i64 = 120;

enum PassOutcome {
    Continue,
    Quiesced,
}

pub struct LifeCycleWatcher<C, M> {
    cfg: Arc<ControllerConfig>,
    cloud: Arc<C>,
    inventory: Arc<FleetInventory<C>>,
    registry: Arc<RequestRegistry>,
    instance_manager: Arc<M>,
    done: DoneSignal,
    stop: Arc<StopSignal>,
}

impl<C: SpotCloud, M: InstanceManager> LifeCycleWatcher<C, M> {
    pub fn new(
        cfg: Arc<ControllerConfig>,
        cloud: Arc<C>,
        inventory: Arc<FleetInventory<C>>,
        registry: Arc<RequestRegistry>,
        instance_manager: Arc<M>,
        done: DoneSignal,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            cfg,
            cloud,
            inventory,
            registry,
            instance_manager,
            done,
            stop,
        }
    }

    pub async fn run(self) {
        info!("life cycle watcher started");

        let mut deadlines: HashMap<String, Instant> = HashMap::new();

        while !self.stop.is_signalled() {
            match self.pass(&mut deadlines).await {
                Ok(PassOutcome::Quiesced) => {
                    self.stop.signal();
                    break;
                }
                Ok(PassOutcome::Continue) => {}
                Err(e) => {
                    // A failed listing or tag call only costs one pass.
                    warn!(error = ?e, "life cycle pass failed");
                }
            }

            self.stop.sleep(PASS_INTERVAL).await;
        }

        info!("life cycle watcher has stopped");
    }

    async fn pass(&self, deadlines: &mut HashMap<String, Instant>) -> anyhow::Result<PassOutcome> {
        let mut spot_requests = self.inventory.managed_spot_requests().await?;
        let last_get = Instant::now();

        let instances: HashMap<String, InstanceDescription> = self
            .cloud
            .list_instances()
            .await?
            .into_iter()
            .map(|i| (i.id.clone(), i))
            .collect();

        // Requests whose instance is up but not yet handed over: the
        // instance runs and still has no Name tag.
        let please_setup: Vec<(InstanceDescription, SpotRequest)> = spot_requests
            .iter()
            .filter_map(|request| {
                let instance = instances.get(request.instance_id.as_ref()?)?;
                (instance.is_running() && name_tag(&instance.tags).is_none())
                    .then(|| (instance.clone(), request.clone()))
            })
            .collect();

        // Deadlines for instances that no longer need setup (they were
        // handed over, died, or were cleaned up externally) are void.
        deadlines.retain(|id, _| please_setup.iter().any(|(i, _)| &i.id == id));

        for (instance, request) in &please_setup {
            let Some(spec) = self
                .cfg
                .utility
                .iter()
                .find(|u| u.instance_type == instance.instance_type)
            else {
                error!(
                    instance_id = %instance.id,
                    instance_type = %instance.instance_type,
                    "no utility configured for instance type; cannot set up"
                );
                continue;
            };

            match self.setup_and_tag(instance, spec.utility).await {
                Ok(()) => {
                    self.registry.remove(&request.id);
                    deadlines.remove(&instance.id);
                    info!(instance_id = %instance.id, "instance setup complete");
                }
                Err(e) => {
                    let deadline = *deadlines
                        .entry(instance.id.clone())
                        .or_insert_with(|| Instant::now() + TIME_FROM_RUNNING_TO_LOGIN);

                    if Instant::now() > deadline {
                        if let Err(te) = self
                            .cloud
                            .terminate_instances(std::slice::from_ref(&instance.id))
                            .await
                        {
                            warn!(instance_id = %instance.id, error = %te, "terminate failed");
                        }
                        self.registry.remove(&request.id);
                        deadlines.remove(&instance.id);
                        warn!(
                            instance_id = %instance.id,
                            error = ?e,
                            "setup kept failing past the deadline; instance terminated"
                        );
                    } else {
                        warn!(instance_id = %instance.id, error = ?e, "setup failed; will retry");
                    }
                }
            }
        }

        // Setup calls can be slow; refresh before judging what is pending.
        if last_get.elapsed() > SNAPSHOT_STALE_AFTER {
            spot_requests = self.inventory.managed_spot_requests().await?;
        }

        let mut pending: HashMap<String, SpotRequest> = spot_requests
            .into_iter()
            .filter(|r| status::is_pending(&r.status.code))
            .map(|r| (r.id.clone(), r))
            .collect();

        if self.done.is_set() {
            // Only after the reconciler stopped issuing requests is it
            // safe to conclude a registry entry will never appear in
            // the listing.
            let cutoff = Utc::now()
                - chrono::Duration::seconds(self.cfg.run_interval as i64 + REGISTRY_GC_SLACK_SECS);
            let dropped = self.registry.evict_older_than(cutoff);
            if !dropped.is_empty() {
                info!(
                    dropped = ?dropped.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
                    "requests never reached the cloud listing; dropped"
                );
            }

            for request in self.registry.snapshot() {
                pending.entry(request.id.clone()).or_insert(request);
            }
        }

        if pending.is_empty() && deadlines.is_empty() && self.done.is_set() {
            info!("no more pending spot requests");
            return Ok(PassOutcome::Quiesced);
        }

        if !pending.is_empty() {
            info!(
                pending = ?pending.keys().collect::<Vec<_>>(),
                "waiting for spot requests"
            );
        }

        Ok(PassOutcome::Continue)
    }

    /// The handoff is only durable once the instance carries its fleet
    /// tag; a failed tag is retried like a failed setup.
    async fn setup_and_tag(
        &self,
        instance: &InstanceDescription,
        utility: f64,
    ) -> anyhow::Result<()> {
        self.instance_manager.setup(instance, utility).await?;
        let name = format!("{} (running)", self.cfg.ec2.instance.name);
        self.cloud.add_tag(&instance.id, "Name", &name).await?;
        Ok(())
    }
}
