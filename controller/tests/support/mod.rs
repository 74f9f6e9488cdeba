//! Shared scripted doubles for controller integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use cloud::api::SpotCloud;
use cloud::error::CloudError;
use cloud::types::{
    InstanceDescription, LaunchSummary, PriceHistoryPage, PriceHistoryQuery, PriceSample,
    RequestStatus, SpotPlacement, SpotRequest, Subnet, Tags,
};
use controller::config::{
    AwsConfig, ControllerConfig, DebugConfig, Ec2Config, InstanceNaming,
};
use cloud::types::{NetworkInterfaceTemplate, RequestTemplate};
use fleet::manager::InstanceManager;
use pricing::types::InstanceTypeSpec;

#[derive(Default)]
pub struct CloudState {
    pub history: Vec<PriceSample>,
    pub requests: Vec<SpotRequest>,
    pub instances: Vec<InstanceDescription>,
    pub subnets: HashMap<String, Subnet>,

    pub placements: Vec<SpotPlacement>,
    pub cancelled: Vec<String>,
    pub terminated: Vec<String>,
    pub tags: Vec<(String, String, String)>,

    pub fleet_name: String,
    pub fail_spot_requests: bool,
    pub next_id: usize,
}

pub struct MockCloud {
    state: Mutex<CloudState>,
}

impl MockCloud {
    pub fn new(state: CloudState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut CloudState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn placements(&self) -> Vec<SpotPlacement> {
        self.with(|s| s.placements.clone())
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.with(|s| s.cancelled.clone())
    }

    pub fn terminated(&self) -> Vec<String> {
        self.with(|s| s.terminated.clone())
    }

    pub fn tags(&self) -> Vec<(String, String, String)> {
        self.with(|s| s.tags.clone())
    }
}

#[async_trait]
impl SpotCloud for MockCloud {
    async fn spot_price_history(
        &self,
        query: PriceHistoryQuery,
    ) -> Result<PriceHistoryPage, CloudError> {
        self.with(|s| {
            Ok(PriceHistoryPage {
                samples: s
                    .history
                    .iter()
                    .filter(|p| p.instance_type == query.instance_type)
                    .cloned()
                    .collect(),
                next_token: None,
            })
        })
    }

    async fn request_spot(&self, placement: SpotPlacement) -> Result<Vec<SpotRequest>, CloudError> {
        self.with(|s| {
            if s.fail_spot_requests {
                return Err(CloudError::Api("request rejected".into()));
            }
            s.next_id += 1;
            let mut tags = Tags::new();
            tags.insert("Name".into(), s.fleet_name.clone());
            let request = SpotRequest {
                id: format!("sir-new-{}", s.next_id),
                price: placement.bid,
                launch_specification: LaunchSummary {
                    instance_type: placement.instance_type.clone(),
                },
                status: RequestStatus {
                    code: "pending-evaluation".into(),
                },
                instance_id: None,
                create_time: Utc::now(),
                tags,
            };
            s.requests.push(request.clone());
            s.placements.push(placement);
            Ok(vec![request])
        })
    }

    async fn cancel_spot_requests(&self, request_ids: &[String]) -> Result<(), CloudError> {
        self.with(|s| {
            s.cancelled.extend(request_ids.iter().cloned());
            Ok(())
        })
    }

    async fn list_spot_requests(&self) -> Result<Vec<SpotRequest>, CloudError> {
        self.with(|s| Ok(s.requests.clone()))
    }

    async fn list_instances(&self) -> Result<Vec<InstanceDescription>, CloudError> {
        self.with(|s| Ok(s.instances.clone()))
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<(), CloudError> {
        self.with(|s| {
            s.terminated.extend(instance_ids.iter().cloned());
            s.instances.retain(|i| !instance_ids.contains(&i.id));
            Ok(())
        })
    }

    async fn add_tag(&self, resource_id: &str, key: &str, value: &str) -> Result<(), CloudError> {
        self.with(|s| {
            s.tags
                .push((resource_id.to_string(), key.to_string(), value.to_string()));
            if let Some(instance) = s.instances.iter_mut().find(|i| i.id == resource_id) {
                instance.tags.insert(key.to_string(), value.to_string());
            }
            Ok(())
        })
    }

    async fn subnet(&self, subnet_id: &str) -> Result<Option<Subnet>, CloudError> {
        self.with(|s| Ok(s.subnets.get(subnet_id).cloned()))
    }
}

pub struct MockManager {
    pub setup_required: bool,
    pub required_utility: f64,
    pub fail_setup: bool,
    pub setup_calls: Mutex<Vec<String>>,
    pub teardown_calls: Mutex<Vec<String>>,
}

impl MockManager {
    pub fn new(setup_required: bool, required_utility: f64) -> Arc<Self> {
        Arc::new(Self {
            setup_required,
            required_utility,
            fail_setup: false,
            setup_calls: Mutex::new(Vec::new()),
            teardown_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(setup_required: bool, required_utility: f64) -> Arc<Self> {
        Arc::new(Self {
            fail_setup: true,
            ..Self::unwrapped(setup_required, required_utility)
        })
    }

    fn unwrapped(setup_required: bool, required_utility: f64) -> Self {
        Self {
            setup_required,
            required_utility,
            fail_setup: false,
            setup_calls: Mutex::new(Vec::new()),
            teardown_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn setup_count(&self) -> usize {
        self.setup_calls.lock().unwrap().len()
    }

    pub fn teardowns(&self) -> Vec<String> {
        self.teardown_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstanceManager for MockManager {
    fn setup_required(&self) -> bool {
        self.setup_required
    }

    fn required_utility(&self) -> f64 {
        self.required_utility
    }

    async fn setup(&self, instance: &InstanceDescription, _utility: f64) -> anyhow::Result<()> {
        self.setup_calls.lock().unwrap().push(instance.id.clone());
        if self.fail_setup {
            anyhow::bail!("ssh connection refused");
        }
        Ok(())
    }

    async fn teardown(&self, instance: &InstanceDescription) -> anyhow::Result<()> {
        self.teardown_calls.lock().unwrap().push(instance.id.clone());
        Ok(())
    }
}

/// Baseline config: $1/hour budget, one m3.large utility unit, one
/// subnet in us-west-2c.
pub fn test_config(price_file: PathBuf) -> ControllerConfig {
    ControllerConfig {
        aws: AwsConfig {
            region: "us-west-2".into(),
            aws_access_key_id: "test-key".into(),
            aws_secret_access_key: "test-secret".into(),
        },
        availability_zone: Some("us-west-2c".into()),
        budget: 1.0,
        max_new_utility: 10.0,
        max_utility_price: 0.5,
        bid_percentile: 80.0,
        price_file,
        run_interval: 600,
        utility: vec![InstanceTypeSpec {
            instance_type: "m3.large".into(),
            utility: 1.0,
            discount: 0.0,
        }],
        ec2: Ec2Config {
            instance: InstanceNaming {
                name: "fleet".into(),
            },
            request: RequestTemplate {
                image_id: "ami-1234".into(),
                key_name: None,
                network_interfaces: vec![NetworkInterfaceTemplate {
                    subnet_id: "subnet-c".into(),
                    device_index: 0,
                    groups: vec![],
                    associate_public_ip: false,
                }],
                expiration: None,
            },
        },
        instance: serde_json::Value::Null,
        debug: DebugConfig::default(),
    }
}

pub fn floor_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let t = ts.timestamp() - ts.timestamp().rem_euclid(3_600);
    Utc.timestamp_opt(t, 0).single().expect("valid timestamp")
}

/// 24 hourly samples at a flat price, covering the aggregation window.
pub fn flat_history(zone: &str, instance_type: &str, price: f64) -> Vec<PriceSample> {
    let window_start = floor_hour(Utc::now()) - Duration::days(1);
    (0..24)
        .map(|i| PriceSample {
            availability_zone: zone.into(),
            instance_type: instance_type.into(),
            price,
            product_description: "Linux/UNIX (Amazon VPC)".into(),
            region: "us-west-2".into(),
            timestamp: window_start + Duration::hours(i) + Duration::minutes(30),
        })
        .collect()
}

pub fn subnet_map(entries: &[(&str, &str)]) -> HashMap<String, Subnet> {
    entries
        .iter()
        .map(|&(id, zone)| {
            (
                id.to_string(),
                Subnet {
                    subnet_id: id.to_string(),
                    availability_zone: zone.to_string(),
                },
            )
        })
        .collect()
}

pub fn active_request(id: &str, price: f64, instance_id: Option<&str>, name: Option<&str>) -> SpotRequest {
    let mut tags = Tags::new();
    if let Some(name) = name {
        tags.insert("Name".into(), name.into());
    }
    SpotRequest {
        id: id.into(),
        price,
        launch_specification: LaunchSummary {
            instance_type: "m3.large".into(),
        },
        status: RequestStatus {
            code: "fulfilled".into(),
        },
        instance_id: instance_id.map(String::from),
        create_time: Utc::now(),
        tags,
    }
}

pub fn pending_request(id: &str, price: f64) -> SpotRequest {
    SpotRequest {
        status: RequestStatus {
            code: "pending-fulfillment".into(),
        },
        ..active_request(id, price, None, Some("fleet"))
    }
}

pub fn running_instance(id: &str, request_id: &str, name: Option<&str>) -> InstanceDescription {
    let mut tags = Tags::new();
    if let Some(name) = name {
        tags.insert("Name".into(), name.into());
    }
    InstanceDescription {
        id: id.into(),
        instance_type: "m3.large".into(),
        state: "running".into(),
        spot_instance_request_id: Some(request_id.into()),
        tags,
    }
}
