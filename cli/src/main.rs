mod lock;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing::{Instrument, info, warn};

use cloud::api::SpotCloud;
use cloud::error::CloudError;
use cloud::types::{
    InstanceDescription, PriceHistoryPage, PriceHistoryQuery, SpotPlacement, SpotRequest, Subnet,
};
use common::logger::{RunId, init_tracing, run_span};
use controller::config::ControllerConfig;
use controller::manager::SpotManager;
use fleet::manager::InstanceManager;

use crate::lock::RunLock;

/// Spot-capacity controller: drive the fleet to the required utility
/// without exceeding the hourly budget.
#[derive(Debug, Parser)]
#[command(name = "spot-controller")]
struct Args {
    /// Path to the controller configuration file (JSON).
    config: PathBuf,
}

// TODO: replace with the deployment's EC2-backed SpotCloud built from
// `config.aws`. Until then the controller runs end to end against an
// empty cloud and exits with nothing to do.
struct OfflineCloud;

#[async_trait]
impl SpotCloud for OfflineCloud {
    async fn spot_price_history(
        &self,
        _query: PriceHistoryQuery,
    ) -> Result<PriceHistoryPage, CloudError> {
        Ok(PriceHistoryPage::default())
    }

    async fn request_spot(&self, _: SpotPlacement) -> Result<Vec<SpotRequest>, CloudError> {
        Err(CloudError::Api("cloud bindings are not wired".into()))
    }

    async fn cancel_spot_requests(&self, _: &[String]) -> Result<(), CloudError> {
        Ok(())
    }

    async fn list_spot_requests(&self) -> Result<Vec<SpotRequest>, CloudError> {
        Ok(Vec::new())
    }

    async fn list_instances(&self) -> Result<Vec<InstanceDescription>, CloudError> {
        Ok(Vec::new())
    }

    async fn terminate_instances(&self, _: &[String]) -> Result<(), CloudError> {
        Ok(())
    }

    async fn add_tag(&self, _: &str, _: &str, _: &str) -> Result<(), CloudError> {
        Ok(())
    }

    async fn subnet(&self, _: &str) -> Result<Option<Subnet>, CloudError> {
        Ok(None)
    }
}

/// Stand-in instance manager: no post-boot handoff, utility target from
/// the `instance.required_utility` config key.
struct StaticInstanceManager {
    required_utility: f64,
}

impl StaticInstanceManager {
    fn from_config(cfg: &ControllerConfig) -> Self {
        let required_utility = cfg
            .instance
            .get("required_utility")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        Self { required_utility }
    }
}

#[async_trait]
impl InstanceManager for StaticInstanceManager {
    fn setup_required(&self) -> bool {
        false
    }

    fn required_utility(&self) -> f64 {
        self.required_utility
    }

    async fn setup(&self, _: &InstanceDescription, _: f64) -> anyhow::Result<()> {
        Ok(())
    }

    async fn teardown(&self, _: &InstanceDescription) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Startup failures (bad config, second instance) exit non-zero;
    // anything after this point is logged and exits clean.
    let cfg = ControllerConfig::from_file(&args.config)?;
    init_tracing("spot-controller", cfg.debug.json);
    let _lock = RunLock::acquire(&args.config)?;

    let run_id = RunId::default();
    let span = run_span(&run_id);

    if let Err(e) = run(Arc::new(cfg)).instrument(span).await {
        warn!(error = ?e, "problem with spot controller run");
    }
    Ok(())
}

async fn run(cfg: Arc<ControllerConfig>) -> anyhow::Result<()> {
    let cloud = Arc::new(OfflineCloud);
    let instance_manager = Arc::new(StaticInstanceManager::from_config(&cfg));
    let utility_required = instance_manager.required_utility();

    let manager = SpotManager::start(cfg, cloud, instance_manager).await?;

    manager.update_spot_requests(utility_required).await?;

    // The watcher drains itself once nothing is pending; joining is a
    // no-op when no handoff was required.
    manager.join().await;
    info!("spot controller run complete");
    Ok(())
}
