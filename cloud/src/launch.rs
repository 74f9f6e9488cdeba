//! Resolves the operator's launch template into a concrete spec for one
//! (zone group, instance type) submission.
//!
//! Responsibilities:
//!   - keep only network interfaces whose subnet lies in the zone group
//!   - attach every ephemeral volume the instance type offers
//!   - convert a relative `expiration` into an absolute `valid_until`

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::api::SpotCloud;
use crate::ephemeral::EphemeralStorage;
use crate::error::CloudError;
use crate::types::{BlockDeviceMapping, LaunchSpec, NetworkInterfaceSpec, RequestTemplate};

/// Build the launch spec for `instance_type` in `zone_group`.
///
/// A subnet that cannot be found is skipped with a warning; ending up
/// with zero interfaces for the zone is an error the caller reports and
/// recovers from (the candidate is skipped, not the run).
pub async fn build_launch_spec<C: SpotCloud>(
    cloud: &C,
    template: &RequestTemplate,
    zone_group: &str,
    instance_type: &str,
    disks: &EphemeralStorage,
    now: DateTime<Utc>,
) -> Result<LaunchSpec, CloudError> {
    let mut network_interfaces = Vec::new();

    for iface in &template.network_interfaces {
        match cloud.subnet(&iface.subnet_id).await? {
            Some(subnet) if subnet.availability_zone == zone_group => {
                network_interfaces.push(NetworkInterfaceSpec {
                    subnet_id: iface.subnet_id.clone(),
                    device_index: iface.device_index,
                    groups: iface.groups.clone(),
                    associate_public_ip: iface.associate_public_ip,
                });
            }
            Some(_) => {}
            None => {
                warn!(subnet_id = %iface.subnet_id, "subnet not found; skipping interface");
            }
        }
    }

    if network_interfaces.is_empty() {
        return Err(CloudError::NoInterfacesForZone {
            zone: zone_group.to_string(),
        });
    }

    let block_device_mappings = ephemeral_mappings(disks.disks(instance_type));

    let valid_until = template
        .expiration
        .map(|seconds| now + Duration::seconds(seconds as i64));

    Ok(LaunchSpec {
        image_id: template.image_id.clone(),
        key_name: template.key_name.clone(),
        instance_type: instance_type.to_string(),
        network_interfaces,
        block_device_mappings,
        valid_until,
    })
}

/// Ephemeral volumes mount at `/dev/sdb`, `/dev/sdc`, … in order.
fn ephemeral_mappings(num: u32) -> Vec<BlockDeviceMapping> {
    (0..num)
        .map(|i| BlockDeviceMapping {
            device_name: format!("/dev/sd{}", (b'b' + i as u8) as char),
            virtual_name: format!("ephemeral{i}"),
            delete_on_termination: true,
        })
        .collect()
}
