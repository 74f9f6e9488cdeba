//! Wires the controller together for one run.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use cloud::api::SpotCloud;
use fleet::inventory::FleetInventory;
use fleet::manager::InstanceManager;
use fleet::registry::RequestRegistry;
use pricing::engine::PricingEngine;
use pricing::store::PriceStore;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::signal::{DoneSignal, StopSignal};
use crate::watcher::LifeCycleWatcher;

pub struct SpotManager<C, M> {
    reconciler: Reconciler<C, M>,
    watcher_handle: Option<JoinHandle<()>>,
    stop: Arc<StopSignal>,
}

impl<C: SpotCloud, M: InstanceManager> SpotManager<C, M> {
    /// Build the engine, inventory, and registry; start the watcher if
    /// the instance manager needs a handoff; warm the pricing table.
    pub async fn start(
        cfg: Arc<ControllerConfig>,
        cloud: Arc<C>,
        instance_manager: Arc<M>,
    ) -> Result<Self, ControllerError> {
        cfg.validate()?;

        let pricing = Arc::new(PricingEngine::new(
            Arc::clone(&cloud),
            PriceStore::new(&cfg.price_file),
            cfg.utility.clone(),
            cfg.bid_percentile,
            cfg.availability_zone.clone(),
        ));
        let inventory = Arc::new(FleetInventory::new(
            Arc::clone(&cloud),
            cfg.ec2.instance.name.clone(),
        ));
        let registry = Arc::new(RequestRegistry::new());
        let done = DoneSignal::new();
        let stop = Arc::new(StopSignal::new());

        let watcher_handle = if instance_manager.setup_required() {
            let watcher = LifeCycleWatcher::new(
                Arc::clone(&cfg),
                Arc::clone(&cloud),
                Arc::clone(&inventory),
                Arc::clone(&registry),
                Arc::clone(&instance_manager),
                done.clone(),
                Arc::clone(&stop),
            );
            Some(tokio::spawn(watcher.run()))
        } else {
            None
        };

        // Fail fast on unusable pricing before any budget decision.
        pricing.pricing().await?;

        let reconciler = Reconciler::new(
            cfg,
            cloud,
            pricing,
            inventory,
            registry,
            instance_manager,
            done,
        );

        Ok(Self {
            reconciler,
            watcher_handle,
            stop,
        })
    }

    pub async fn update_spot_requests(&self, utility_required: f64) -> anyhow::Result<()> {
        self.reconciler.update_spot_requests(utility_required).await
    }

    /// Ask the watcher to wind down regardless of pending work.
    pub fn request_stop(&self) {
        self.stop.signal();
    }

    /// Wait for the watcher to finish its drain, if one is running.
    pub async fn join(mut self) {
        if let Some(handle) = self.watcher_handle.take() {
            if handle.await.is_err() {
                info!("watcher task aborted");
            }
        }
    }
}
