//! Wire-level records exchanged with the spot market.
//!
//! These are deliberately plain: one struct per cloud object, no
//! behavior beyond small accessors. Optional fields stay `Option` so
//! every consumer has to decide what absence means at the use site.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed spot-price sample, as returned by the price-history API
/// and as persisted in the price file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSample {
    pub availability_zone: String,
    pub instance_type: String,
    pub price: f64,
    pub product_description: String,
    pub region: String,
    pub timestamp: DateTime<Utc>,
}

// Samples are value-equal over every field so the price store can hold
// them in a set and silently drop duplicate fetches. Price is compared
// bitwise; the cloud hands us decimal strings, so two equal prices are
// bit-equal after parsing.
impl PartialEq for PriceSample {
    fn eq(&self, other: &Self) -> bool {
        self.availability_zone == other.availability_zone
            && self.instance_type == other.instance_type
            && self.price.to_bits() == other.price.to_bits()
            && self.product_description == other.product_description
            && self.region == other.region
            && self.timestamp == other.timestamp
    }
}

impl Eq for PriceSample {}

impl Hash for PriceSample {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.availability_zone.hash(state);
        self.instance_type.hash(state);
        self.price.to_bits().hash(state);
        self.product_description.hash(state);
        self.region.hash(state);
        self.timestamp.hash(state);
    }
}

/// Resource tags. The `Name` tag doubles as the fleet-membership marker.
pub type Tags = HashMap<String, String>;

/// Returns the `Name` tag if present and non-empty.
pub fn name_tag(tags: &Tags) -> Option<&str> {
    tags.get("Name").map(String::as_str).filter(|v| !v.is_empty())
}

/// Request status as reported by the cloud. The code vocabulary is
/// partitioned in [`crate::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub code: String,
}

/// The slice of a spot request's launch specification the controller
/// reads back from listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSummary {
    pub instance_type: String,
}

/// A standing spot request as returned by the cloud listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotRequest {
    pub id: String,
    pub price: f64,
    pub launch_specification: LaunchSummary,
    pub status: RequestStatus,
    pub instance_id: Option<String>,
    pub create_time: DateTime<Utc>,
    #[serde(default)]
    pub tags: Tags,
}

impl SpotRequest {
    /// A request belongs to this fleet when its `Name` tag is absent,
    /// empty, or starts with the configured instance-name prefix.
    pub fn is_managed(&self, name_prefix: &str) -> bool {
        match name_tag(&self.tags) {
            None => true,
            Some(name) => name.starts_with(name_prefix),
        }
    }
}

/// A compute instance as returned by the cloud listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDescription {
    pub id: String,
    pub instance_type: String,
    pub state: String,
    pub spot_instance_request_id: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

impl InstanceDescription {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// VPC subnet lookup result, used to match network interfaces to the
/// requested availability-zone group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub subnet_id: String,
    pub availability_zone: String,
}

/// Parameters for one page of the spot-price-history fetch.
#[derive(Debug, Clone)]
pub struct PriceHistoryQuery {
    pub product_description: String,
    pub instance_type: String,
    pub availability_zone: Option<String>,
    pub start_time: DateTime<Utc>,
    pub next_token: Option<String>,
}

/// One page of price history; `next_token` continues the scan.
#[derive(Debug, Clone, Default)]
pub struct PriceHistoryPage {
    pub samples: Vec<PriceSample>,
    pub next_token: Option<String>,
}

/// A fully resolved launch specification, ready to submit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchSpec {
    pub image_id: String,
    pub key_name: Option<String>,
    pub instance_type: String,
    pub network_interfaces: Vec<NetworkInterfaceSpec>,
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterfaceSpec {
    pub subnet_id: String,
    pub device_index: u32,
    pub groups: Vec<String>,
    pub associate_public_ip: bool,
}

/// Ephemeral volume attachment. `delete_on_termination` is always set;
/// spot capacity never outlives its instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDeviceMapping {
    pub device_name: String,
    pub virtual_name: String,
    pub delete_on_termination: bool,
}

/// A spot submission: the bid plus where and what to launch.
#[derive(Debug, Clone)]
pub struct SpotPlacement {
    pub bid: f64,
    pub availability_zone_group: String,
    pub instance_type: String,
    pub launch: LaunchSpec,
}

/// Operator-supplied launch template. The zone-specific parts (which
/// interfaces apply, ephemeral disks, expiry) are resolved per request
/// by [`crate::launch::build_launch_spec`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestTemplate {
    pub image_id: String,
    #[serde(default)]
    pub key_name: Option<String>,
    pub network_interfaces: Vec<NetworkInterfaceTemplate>,
    /// Seconds the request stays valid; absent means no expiry.
    #[serde(default)]
    pub expiration: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkInterfaceTemplate {
    pub subnet_id: String,
    #[serde(default)]
    pub device_index: u32,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub associate_public_ip: bool,
}
