//! Strongly-typed controller configuration.
//!
//! One JSON document, one struct tree. Unknown keys are a startup
//! error; a typo in a budget knob must never silently fall back to a
//! default.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use cloud::types::RequestTemplate;
use pricing::types::InstanceTypeSpec;

use crate::error::ControllerError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    pub aws: AwsConfig,

    /// Restricts price-history probes to one zone when set.
    #[serde(default)]
    pub availability_zone: Option<String>,

    /// Hourly dollar cap across all active spot requests.
    pub budget: f64,

    /// Upper bound on utility added in a single reconciliation cycle.
    ///
    /// Spot fulfilment is slow relative to the run cadence; without
    /// this cap a cold start would bid for the whole target at once
    /// and then over-shoot as earlier requests fill.
    pub max_new_utility: f64,

    /// Dollars per utility unit above which a candidate is never bid.
    pub max_utility_price: f64,

    /// Percentile (0-100) of the hourly maxima used as the bid floor.
    pub bid_percentile: f64,

    /// Path of the persisted price-sample file.
    pub price_file: PathBuf,

    /// Seconds between reconciliations. Also bounds how long a
    /// just-submitted request is trusted to eventually appear in the
    /// cloud listing.
    pub run_interval: u64,

    /// The closed set of instance types this fleet may run.
    pub utility: Vec<InstanceTypeSpec>,

    pub ec2: Ec2Config,

    /// Opaque payload for the deployment's InstanceManager factory.
    #[serde(default)]
    pub instance: serde_json::Value,

    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsConfig {
    pub region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ec2Config {
    pub instance: InstanceNaming,
    pub request: RequestTemplate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceNaming {
    /// Prefix used to tag and recognize fleet resources.
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebugConfig {
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub level: Option<String>,
}

impl ControllerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&content)
            .with_context(|| format!("cannot parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.budget < 0.0 {
            return Err(ControllerError::Config("budget must be non-negative".into()));
        }
        if !(0.0..=100.0).contains(&self.bid_percentile) {
            return Err(ControllerError::Config(
                "bid_percentile must be between 0 and 100".into(),
            ));
        }
        if self.max_utility_price <= 0.0 {
            return Err(ControllerError::Config(
                "max_utility_price must be positive".into(),
            ));
        }
        if self.run_interval == 0 {
            return Err(ControllerError::Config("run_interval must be positive".into()));
        }
        if self.utility.is_empty() {
            return Err(ControllerError::Config(
                "at least one utility entry is required".into(),
            ));
        }
        for u in &self.utility {
            if u.utility <= 0.0 {
                return Err(ControllerError::Config(format!(
                    "utility for {} must be positive",
                    u.instance_type
                )));
            }
            if u.discount < 0.0 {
                return Err(ControllerError::Config(format!(
                    "discount for {} must be non-negative",
                    u.instance_type
                )));
            }
        }
        if self.ec2.instance.name.is_empty() {
            return Err(ControllerError::Config(
                "ec2.instance.name must not be empty".into(),
            ));
        }
        Ok(())
    }
}
