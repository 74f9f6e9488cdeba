//! Fleet projections over the raw cloud listings.
//!
//! A spot request is ours when its `Name` tag is empty or carries the
//! fleet prefix (freshly submitted requests have no tag for a moment,
//! so an empty tag must count). An instance is ours only once it is
//! running *and* tagged with the prefix; untagged running instances are
//! the watcher's problem, not inventory.

use std::sync::Arc;

use tracing::{error, instrument};

use cloud::api::SpotCloud;
use cloud::error::CloudError;
use cloud::types::{InstanceDescription, SpotRequest, name_tag};
use pricing::types::{Candidate, PriceTable};

/// A running fleet instance joined with its pricing candidate.
#[derive(Debug, Clone)]
pub struct ManagedInstance {
    pub description: InstanceDescription,
    pub markup: Candidate,
}

impl ManagedInstance {
    pub fn id(&self) -> &str {
        &self.description.id
    }

    pub fn spot_request_id(&self) -> Option<&str> {
        self.description.spot_instance_request_id.as_deref()
    }
}

pub struct FleetInventory<C> {
    cloud: Arc<C>,
    name_prefix: String,
}

impl<C: SpotCloud> FleetInventory<C> {
    pub fn new(cloud: Arc<C>, name_prefix: impl Into<String>) -> Self {
        Self {
            cloud,
            name_prefix: name_prefix.into(),
        }
    }

    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    /// Every spot request belonging to this fleet.
    #[instrument(skip(self), target = "fleet")]
    pub async fn managed_spot_requests(&self) -> Result<Vec<SpotRequest>, CloudError> {
        let requests = self.cloud.list_spot_requests().await?;
        Ok(requests
            .into_iter()
            .filter(|r| r.is_managed(&self.name_prefix))
            .collect())
    }

    /// Running fleet instances joined with their candidate by instance
    /// type. A running instance whose type has no candidate points at a
    /// configuration mismatch; it is reported and skipped so one stray
    /// machine cannot take down the reconciliation.
    #[instrument(skip(self, prices), target = "fleet")]
    pub async fn managed_instances(
        &self,
        prices: &PriceTable,
    ) -> Result<Vec<ManagedInstance>, CloudError> {
        let instances = self.cloud.list_instances().await?;

        let mut out = Vec::new();
        for description in instances {
            if !description.is_running() {
                continue;
            }
            let Some(name) = name_tag(&description.tags) else {
                continue;
            };
            if !name.starts_with(&self.name_prefix) {
                continue;
            }

            match prices.lookup(&description.instance_type) {
                Some(candidate) => out.push(ManagedInstance {
                    markup: candidate.clone(),
                    description,
                }),
                None => {
                    error!(
                        instance_id = %description.id,
                        instance_type = %description.instance_type,
                        "running instance has no configured pricing candidate; skipping"
                    );
                }
            }
        }
        Ok(out)
    }

    /// Managed instances in shutdown order: biggest utility first, and
    /// among equals the worst value first.
    pub async fn running_instances_for_removal(
        &self,
        prices: &PriceTable,
    ) -> Result<Vec<ManagedInstance>, CloudError> {
        let mut instances = self.managed_instances(prices).await?;
        instances.sort_by(|a, b| {
            b.markup
                .type_spec
                .utility
                .total_cmp(&a.markup.type_spec.utility)
                .then(a.markup.estimated_value.total_cmp(&b.markup.estimated_value))
        });
        Ok(instances)
    }
}
