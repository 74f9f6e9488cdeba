//! Seam to the per-instance software installer.
//!
//! The concrete implementation is supplied by the deployment; the
//! controller only drives setup/teardown and reads the utility target.

use async_trait::async_trait;

use cloud::types::InstanceDescription;

#[async_trait]
pub trait InstanceManager: Send + Sync + 'static {
    /// Whether freshly fulfilled instances need a post-boot handoff.
    /// Gates the life-cycle watcher.
    fn setup_required(&self) -> bool;

    /// The utility target for this run.
    fn required_utility(&self) -> f64;

    /// Install and start the workload on a newly running instance.
    async fn setup(&self, instance: &InstanceDescription, utility: f64) -> anyhow::Result<()>;

    /// Drain an instance ahead of termination. Failures are logged by
    /// the caller and never block the termination itself.
    async fn teardown(&self, instance: &InstanceDescription) -> anyhow::Result<()>;
}
