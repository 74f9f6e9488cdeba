//! Pricing engine: freshness probe, persistence, aggregation, memo.
//!
//! `pricing()` is called from both the reconciler and the bid planner;
//! the ranked table is computed once per run and handed out as an Arc
//! until `invalidate()` clears the memo.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use cloud::api::{LINUX_VPC_PRODUCT, SpotCloud};
use cloud::types::{PriceHistoryQuery, PriceSample};

use crate::aggregate::{aggregate, floor_to};
use crate::error::PricingError;
use crate::store::PriceStore;
use crate::types::{InstanceTypeSpec, PriceTable};

const COLD_START_LOOKBACK_DAYS: i64 = 7;

pub struct PricingEngine<C> {
    cloud: Arc<C>,
    store: PriceStore,
    types: Vec<InstanceTypeSpec>,
    bid_percentile: f64,
    availability_zone: Option<String>,
    memo: Mutex<Option<Arc<PriceTable>>>,
}

impl<C: SpotCloud> PricingEngine<C> {
    pub fn new(
        cloud: Arc<C>,
        store: PriceStore,
        types: Vec<InstanceTypeSpec>,
        bid_percentile: f64,
        availability_zone: Option<String>,
    ) -> Self {
        Self {
            cloud,
            store,
            types,
            bid_percentile,
            availability_zone,
            memo: Mutex::new(None),
        }
    }

    /// The ranked candidate table, memoized for the rest of the run.
    #[instrument(skip(self), target = "pricing")]
    pub async fn pricing(&self) -> Result<Arc<PriceTable>, PricingError> {
        let mut memo = self.memo.lock().await;
        if let Some(table) = memo.as_ref() {
            return Ok(Arc::clone(table));
        }

        let samples = self.refresh_samples().await?;
        let table = Arc::new(aggregate(
            &samples,
            &self.types,
            self.bid_percentile,
            Utc::now(),
        ));

        info!(
            candidates = table.candidates().len(),
            samples = samples.len(),
            "pricing table computed"
        );

        *memo = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Drop the memoized table; the next `pricing()` re-probes.
    pub async fn invalidate(&self) {
        *self.memo.lock().await = None;
    }

    /// Probe the cloud for samples newer than what the store holds, per
    /// configured type, then persist the merged set.
    async fn refresh_samples(&self) -> Result<HashSet<PriceSample>, PricingError> {
        let mut samples = self.store.load();

        let cold_start = floor_to(Utc::now(), 86_400) - Duration::days(COLD_START_LOOKBACK_DAYS);

        for spec in &self.types {
            let newest: Option<DateTime<Utc>> = samples
                .iter()
                .filter(|s| s.instance_type == spec.instance_type)
                .map(|s| s.timestamp)
                .max();
            let start_time = newest.map_or(cold_start, |t| t.max(cold_start));

            debug!(
                instance_type = %spec.instance_type,
                start_time = %start_time,
                "fetching spot price history"
            );

            let mut next_token: Option<String> = None;
            loop {
                let page = self
                    .cloud
                    .spot_price_history(PriceHistoryQuery {
                        product_description: LINUX_VPC_PRODUCT.to_string(),
                        instance_type: spec.instance_type.clone(),
                        availability_zone: self.availability_zone.clone(),
                        start_time,
                        next_token: next_token.take(),
                    })
                    .await?;

                samples.extend(page.samples);

                next_token = page.next_token;
                if next_token.is_none() {
                    break;
                }
            }
        }

        self.store.save(&samples)?;
        Ok(samples)
    }
}
