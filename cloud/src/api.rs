//! Abstraction over the spot-market surface of the cloud provider.
//!
//! This trait intentionally hides:
//!   - credentials and signing
//!   - SDK types and pagination plumbing
//!   - retry policy of the underlying transport
//!
//! Implementations must tag every request returned by `request_spot`
//! with the fleet name before returning, so a crash between submission
//! and tagging can never leave an unidentifiable request behind.

use async_trait::async_trait;

use crate::error::CloudError;
use crate::types::{
    InstanceDescription, PriceHistoryPage, PriceHistoryQuery, SpotPlacement, SpotRequest, Subnet,
};

/// Product line used for every price-history probe.
pub const LINUX_VPC_PRODUCT: &str = "Linux/UNIX (Amazon VPC)";

#[async_trait]
pub trait SpotCloud: Send + Sync + 'static {
    /// One page of spot-price history. Callers loop on `next_token`.
    async fn spot_price_history(
        &self,
        query: PriceHistoryQuery,
    ) -> Result<PriceHistoryPage, CloudError>;

    /// Submit a spot request. Returned requests are already tagged with
    /// the fleet name.
    async fn request_spot(&self, placement: SpotPlacement) -> Result<Vec<SpotRequest>, CloudError>;

    async fn cancel_spot_requests(&self, request_ids: &[String]) -> Result<(), CloudError>;

    async fn list_spot_requests(&self) -> Result<Vec<SpotRequest>, CloudError>;

    async fn list_instances(&self) -> Result<Vec<InstanceDescription>, CloudError>;

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<(), CloudError>;

    async fn add_tag(&self, resource_id: &str, key: &str, value: &str) -> Result<(), CloudError>;

    /// Look up a subnet by id; `None` when the subnet does not exist.
    async fn subnet(&self, subnet_id: &str) -> Result<Option<Subnet>, CloudError>;
}
