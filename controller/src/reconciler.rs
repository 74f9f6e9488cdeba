//! The budget-aware control step.
//!
//! One invocation per run:
//!   1. Snapshot managed spot requests and price the active ones.
//!   2. Compare committed budget and utility against the targets.
//!   3. Over budget: cancel everything and shed instances until the
//!      books balance (`save_money`).
//!   4. Surplus utility: shed the smallest covering set of instances
//!      (`remove_instances`).
//!   5. Deficit utility: bid for more, best value first
//!      (`add_instances`).
//!
//! Failures in any single submission, teardown, or termination are
//! isolated; the step always runs to completion and raises the done
//! signal so the watcher knows no further requests are coming.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use cloud::api::SpotCloud;
use cloud::ephemeral::EphemeralStorage;
use cloud::launch::build_launch_spec;
use cloud::status;
use cloud::types::SpotPlacement;
use fleet::inventory::{FleetInventory, ManagedInstance};
use fleet::manager::InstanceManager;
use fleet::registry::RequestRegistry;
use pricing::engine::PricingEngine;
use pricing::types::PriceTable;

use crate::config::ControllerConfig;
use crate::planner::{BidPlan, plan_bids};
use crate::signal::DoneSignal;

pub struct Reconciler<C, M> {
    cfg: Arc<ControllerConfig>,
    cloud: Arc<C>,
    pricing: Arc<PricingEngine<C>>,
    inventory: Arc<FleetInventory<C>>,
    registry: Arc<RequestRegistry>,
    instance_manager: Arc<M>,
    disks: EphemeralStorage,
    done: DoneSignal,
}

impl<C: SpotCloud, M: InstanceManager> Reconciler<C, M> {
    pub fn new(
        cfg: Arc<ControllerConfig>,
        cloud: Arc<C>,
        pricing: Arc<PricingEngine<C>>,
        inventory: Arc<FleetInventory<C>>,
        registry: Arc<RequestRegistry>,
        instance_manager: Arc<M>,
        done: DoneSignal,
    ) -> Self {
        Self {
            cfg,
            cloud,
            pricing,
            inventory,
            registry,
            instance_manager,
            disks: EphemeralStorage::default(),
            done,
        }
    }

    /// Drive the fleet toward `utility_required` within the budget.
    #[instrument(skip(self), target = "reconciler")]
    pub async fn update_spot_requests(&self, utility_required: f64) -> anyhow::Result<()> {
        let prices = self
            .pricing
            .pricing()
            .await
            .context("pricing table unavailable")?;

        let requests = self
            .inventory
            .managed_spot_requests()
            .await
            .context("cannot list managed spot requests")?;

        let mut used_budget = 0.0;
        let mut current_spending = 0.0;
        let mut current_utility = 0.0;

        for request in requests
            .iter()
            .filter(|r| status::is_active(&r.status.code))
        {
            let instance_type = &request.launch_specification.instance_type;
            let Some(candidate) = prices.lookup(instance_type) else {
                error!(
                    request_id = %request.id,
                    instance_type = %instance_type,
                    "active request references an unconfigured instance type; not counted"
                );
                continue;
            };

            let discount = candidate.type_spec.discount;
            info!(
                request_id = %request.id,
                instance_type = %instance_type,
                price = request.price - discount,
                "active spot request"
            );

            used_budget += request.price - discount;
            current_spending += candidate.current_price.unwrap_or(candidate.price_80) - discount;
            current_utility += candidate.type_spec.utility;
        }

        info!(
            committed = used_budget,
            current = current_spending,
            budget = self.cfg.budget,
            "hourly spend"
        );

        let mut remaining_budget = self.cfg.budget - used_budget;
        let mut net_new_utility = utility_required - current_utility;

        if remaining_budget < 0.0 {
            (remaining_budget, net_new_utility) = self
                .save_money(remaining_budget, net_new_utility, &prices)
                .await?;
        }

        if net_new_utility <= 0.0 {
            net_new_utility = self.remove_instances(net_new_utility, &prices).await?;
        }

        if net_new_utility > 0.0 {
            net_new_utility = net_new_utility.min(self.cfg.max_new_utility);
            (net_new_utility, remaining_budget) = self
                .add_instances(net_new_utility, remaining_budget, &prices)
                .await?;
        }

        if net_new_utility > 0.0 {
            warn!(
                target: "alert",
                residual_utility = net_new_utility,
                max_utility_price = self.cfg.max_utility_price,
                remaining_budget,
                "cannot fund additional utility at the configured price cap"
            );
        }

        info!("all requests for new utility have been made");
        self.done.set();
        Ok(())
    }

    /// Restore a blown budget: mark every managed request for
    /// cancellation, then shed running instances (largest first) until
    /// projected spending fits again.
    async fn save_money(
        &self,
        mut remaining_budget: f64,
        mut net_new_utility: f64,
        prices: &PriceTable,
    ) -> anyhow::Result<(f64, f64)> {
        let mut cancel_ids: Vec<String> = Vec::new();

        if remaining_budget < 0.0 {
            let requests = self.inventory.managed_spot_requests().await?;
            cancel_ids.extend(requests.iter().map(|r| r.id.clone()));
        }

        let instances = self.inventory.running_instances_for_removal(prices).await?;

        let mut remove_list = Vec::new();
        for instance in instances {
            if remaining_budget >= 0.0 {
                break;
            }
            net_new_utility += instance.markup.type_spec.utility;
            remaining_budget += recovered_price(&instance);
            remove_list.push(instance);
        }

        info!(
            cancelled = cancel_ids.len(),
            shed = remove_list.len(),
            remaining_budget,
            "saving money"
        );

        self.shutdown_instances(&remove_list, cancel_ids).await?;
        Ok((remaining_budget, net_new_utility))
    }

    /// Shed the smallest set of instances covering the utility surplus.
    ///
    /// `net_new_utility` is non-positive here. The sweep tolerates a
    /// growing overshoot so a fleet of large instances can still cover
    /// a small surplus; the lowest tolerance that covers wins.
    async fn remove_instances(
        &self,
        mut net_new_utility: f64,
        prices: &PriceTable,
    ) -> anyhow::Result<f64> {
        let instances = self.inventory.running_instances_for_removal(prices).await?;

        let mut remove_list: Vec<&ManagedInstance> = Vec::new();
        for acceptable_error in 0..8 {
            let mut remaining = -net_new_utility;
            remove_list.clear();

            for instance in &instances {
                let utility = instance.markup.type_spec.utility;
                if utility <= remaining + f64::from(acceptable_error) {
                    remove_list.push(instance);
                    remaining -= utility;
                }
            }

            if remaining <= 0.0 {
                net_new_utility = -remaining;
                break;
            }
        }

        if remove_list.is_empty() {
            return Ok(net_new_utility);
        }

        let remove_list: Vec<ManagedInstance> = remove_list.into_iter().cloned().collect();
        self.shutdown_instances(&remove_list, Vec::new()).await?;
        Ok(net_new_utility)
    }

    /// Bid for missing utility, best estimated value first.
    async fn add_instances(
        &self,
        mut net_new_utility: f64,
        mut remaining_budget: f64,
        prices: &PriceTable,
    ) -> anyhow::Result<(f64, f64)> {
        for candidate in prices.candidates() {
            if net_new_utility <= 0.0 {
                break;
            }

            let instance_type = &candidate.type_spec.instance_type;

            let plan = plan_bids(candidate, net_new_utility, self.cfg.max_utility_price);
            let num = match &plan {
                BidPlan::NoCurrentPrice => {
                    info!(instance_type = %instance_type, "no current price; skipping");
                    continue;
                }
                BidPlan::OverCap { min_bid, cap } => {
                    info!(
                        instance_type = %instance_type,
                        price = min_bid,
                        limit = cap,
                        "over the utility price cap; skipping"
                    );
                    continue;
                }
                BidPlan::Ladder { num, .. } => *num,
            };
            if num == 0 {
                continue;
            }

            let Some(current_price) = candidate.current_price else {
                continue;
            };

            // Zone-specific launch details are shared by every rung.
            let launch = match build_launch_spec(
                self.cloud.as_ref(),
                &self.cfg.ec2.request,
                &candidate.availability_zone,
                instance_type,
                &self.disks,
                Utc::now(),
            )
            .await
            {
                Ok(launch) => launch,
                Err(e) => {
                    warn!(
                        zone = %candidate.availability_zone,
                        instance_type = %instance_type,
                        error = %e,
                        "cannot build launch specification; skipping candidate"
                    );
                    continue;
                }
            };

            for i in 0..num {
                let Some(bid) = plan.bid_at(i) else { break };
                if bid < current_price || bid > remaining_budget {
                    continue;
                }

                let placement = SpotPlacement {
                    bid,
                    availability_zone_group: candidate.availability_zone.clone(),
                    instance_type: instance_type.clone(),
                    launch: launch.clone(),
                };

                match self.cloud.request_spot(placement).await {
                    Ok(new_requests) => {
                        info!(
                            num = new_requests.len(),
                            instance_type = %instance_type,
                            utility = candidate.type_spec.utility,
                            price = bid,
                            "requested spot instances"
                        );
                        net_new_utility -=
                            candidate.type_spec.utility * new_requests.len() as f64;
                        remaining_budget -= bid * new_requests.len() as f64;
                        for request in new_requests {
                            self.registry.insert(request);
                        }
                    }
                    Err(e) => {
                        info!(
                            instance_type = %instance_type,
                            price = bid,
                            error = %e,
                            "spot request failed"
                        );
                    }
                }
            }
        }

        Ok((net_new_utility, remaining_budget))
    }

    /// Teardown, terminate, cancel. Per-resource failures are logged
    /// and never abort the batch.
    async fn shutdown_instances(
        &self,
        remove_list: &[ManagedInstance],
        mut cancel_ids: Vec<String>,
    ) -> anyhow::Result<()> {
        if remove_list.is_empty() && cancel_ids.is_empty() {
            return Ok(());
        }

        let instance_ids: Vec<String> = remove_list.iter().map(|i| i.id().to_string()).collect();
        info!(instances = ?instance_ids, "shutting down");

        for instance in remove_list {
            if let Err(e) = self.instance_manager.teardown(&instance.description).await {
                warn!(instance_id = %instance.id(), error = ?e, "teardown failed");
            }
        }

        cancel_ids.extend(
            remove_list
                .iter()
                .filter_map(|i| i.spot_request_id().map(String::from)),
        );

        if !instance_ids.is_empty() {
            if let Err(e) = self.cloud.terminate_instances(&instance_ids).await {
                warn!(error = %e, "terminate_instances failed");
            }
        }
        if !cancel_ids.is_empty() {
            if let Err(e) = self.cloud.cancel_spot_requests(&cancel_ids).await {
                warn!(error = %e, "cancel_spot_requests failed");
            }
        }
        Ok(())
    }
}

/// Budget recovered by shutting one instance down: its percentile
/// price, or the live price when the percentile is unusable.
fn recovered_price(instance: &ManagedInstance) -> f64 {
    if instance.markup.price_80 > 0.0 {
        instance.markup.price_80
    } else {
        instance.markup.current_price.unwrap_or(0.0)
    }
}
