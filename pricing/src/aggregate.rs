//! Turns the raw sample set into ranked bidding candidates.
//!
//! The cloud only reports price *changes*, so each sample is active
//! from its own timestamp until the next sample in the same
//! (zone, type) series, the last one running to end of day. The window
//! is the 24 hours up to the current hour boundary; each hour bucket
//! takes the maximum price active anywhere inside it.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::warn;

use cloud::types::PriceSample;

use crate::types::{Candidate, HourlyPricePoint, InstanceTypeSpec, PriceTable};

const HOUR_SECS: i64 = 3_600;
const DAY_SECS: i64 = 86_400;

/// Truncate a timestamp to a whole multiple of `secs` since the epoch.
pub(crate) fn floor_to(ts: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    let t = ts.timestamp() - ts.timestamp().rem_euclid(secs);
    Utc.timestamp_opt(t, 0).single().unwrap_or(ts)
}

/// Hourly maxima for every (zone, configured type) series with samples
/// inside the 24-hour window. Output order is deterministic: series
/// sorted by (zone, type), buckets oldest first.
pub fn hourly_points(
    samples: &HashSet<PriceSample>,
    types: &[InstanceTypeSpec],
    now: DateTime<Utc>,
) -> Vec<HourlyPricePoint> {
    let window_start = floor_to(now, HOUR_SECS) - Duration::days(1);
    let end_of_day = floor_to(now, DAY_SECS) + Duration::days(1);

    let configured: HashSet<&str> = types.iter().map(|t| t.instance_type.as_str()).collect();

    let mut series: BTreeMap<(&str, &str), Vec<&PriceSample>> = BTreeMap::new();
    for s in samples {
        if s.timestamp > window_start && configured.contains(s.instance_type.as_str()) {
            series
                .entry((s.availability_zone.as_str(), s.instance_type.as_str()))
                .or_default()
                .push(s);
        }
    }

    let mut out = Vec::new();
    for ((zone, instance_type), mut rows) in series {
        rows.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.price.total_cmp(&b.price))
        });

        let current_price = match rows.last() {
            Some(last) => last.price,
            None => continue,
        };

        // Sample i is active over [timestamp_i, timestamp_{i+1}), the
        // last one until end of day.
        let expiries: Vec<DateTime<Utc>> = (0..rows.len())
            .map(|i| rows.get(i + 1).map(|n| n.timestamp).unwrap_or(end_of_day))
            .collect();

        for h in 0..24 {
            let bucket_start = window_start + Duration::hours(h);
            let bucket_end = bucket_start + Duration::hours(1);

            let mut max_price = f64::NEG_INFINITY;
            let mut count = 0usize;
            for (row, expiry) in rows.iter().zip(&expiries) {
                if row.timestamp < bucket_end && *expiry > bucket_start {
                    count += 1;
                    if row.price > max_price {
                        max_price = row.price;
                    }
                }
            }

            if count > 0 {
                out.push(HourlyPricePoint {
                    availability_zone: zone.to_string(),
                    instance_type: instance_type.to_string(),
                    hour: bucket_start,
                    max_price,
                    count,
                    current_price,
                });
            }
        }
    }
    out
}

/// Rank-based percentile over ascending values. `pct <= 0` selects the
/// minimum, `pct >= 100` the maximum.
pub fn percentile(sorted_asc: &[f64], pct: f64) -> f64 {
    if sorted_asc.is_empty() {
        return f64::NAN;
    }
    let n = sorted_asc.len();
    let rank = ((pct / 100.0) * n as f64).ceil() as isize - 1;
    let idx = rank.clamp(0, n as isize - 1) as usize;
    sorted_asc[idx]
}

/// Roll hourly points up into the ranked candidate table.
pub fn aggregate(
    samples: &HashSet<PriceSample>,
    types: &[InstanceTypeSpec],
    bid_percentile: f64,
    now: DateTime<Utc>,
) -> PriceTable {
    let points = hourly_points(samples, types, now);

    let mut candidates = Vec::new();
    let mut idx = 0;
    while idx < points.len() {
        let zone = points[idx].availability_zone.clone();
        let instance_type = points[idx].instance_type.clone();
        let current_price = points[idx].current_price;

        let mut maxima = Vec::new();
        while idx < points.len()
            && points[idx].availability_zone == zone
            && points[idx].instance_type == instance_type
        {
            maxima.push(points[idx].max_price);
            idx += 1;
        }

        let Some(spec) = types.iter().find(|t| t.instance_type == instance_type) else {
            continue;
        };

        let mut all_price = maxima;
        all_price.sort_by(f64::total_cmp);

        let price_80 = percentile(&all_price, bid_percentile);
        if !(price_80 > 0.0) {
            warn!(
                zone = %zone,
                instance_type = %instance_type,
                price_80,
                "non-positive percentile price; dropping candidate"
            );
            continue;
        }

        let max_price = all_price.last().copied().unwrap_or(price_80);
        let higher_price = all_price.iter().copied().find(|p| *p > price_80);
        let estimated_value = spec.utility / price_80;

        candidates.push(Candidate {
            availability_zone: zone,
            type_spec: spec.clone(),
            price_80,
            max_price,
            current_price: Some(current_price),
            all_price,
            estimated_value,
            higher_price,
        });
    }

    for spec in types {
        if !candidates
            .iter()
            .any(|c| c.type_spec.instance_type == spec.instance_type)
        {
            warn!(instance_type = %spec.instance_type, "no recent price observations");
        }
    }

    candidates.sort_by(|a, b| {
        b.estimated_value
            .total_cmp(&a.estimated_value)
            .then_with(|| a.availability_zone.cmp(&b.availability_zone))
            .then_with(|| a.type_spec.instance_type.cmp(&b.type_spec.instance_type))
    });

    PriceTable::new(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(ty: &str, utility: f64) -> InstanceTypeSpec {
        InstanceTypeSpec {
            instance_type: ty.into(),
            utility,
            discount: 0.0,
        }
    }

    fn sample(zone: &str, ty: &str, price: f64, ts: DateTime<Utc>) -> PriceSample {
        PriceSample {
            availability_zone: zone.into(),
            instance_type: ty.into(),
            price,
            product_description: "Linux/UNIX (Amazon VPC)".into(),
            region: "us-west-2".into(),
            timestamp: ts,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 6, 2, 12, 0, 0).unwrap()
    }

    fn window_start() -> DateTime<Utc> {
        floor_to(now(), HOUR_SECS) - Duration::days(1)
    }

    /// One sample per hour, offset 30 minutes into each bucket.
    fn hourly_samples(zone: &str, ty: &str, prices: &[f64]) -> HashSet<PriceSample> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                sample(
                    zone,
                    ty,
                    p,
                    window_start() + Duration::hours(i as i64) + Duration::minutes(30),
                )
            })
            .collect()
    }

    #[test]
    fn flat_series_yields_flat_candidate() {
        let samples = hourly_samples("us-west-2c", "m3.large", &[0.10; 24]);
        let table = aggregate(&samples, &[spec("m3.large", 1.0)], 80.0, now());

        let c = table.lookup("m3.large").unwrap();
        assert_eq!(c.all_price.len(), 24);
        assert_eq!(c.price_80, 0.10);
        assert_eq!(c.max_price, 0.10);
        assert_eq!(c.current_price, Some(0.10));
        assert_eq!(c.higher_price, None);
        assert_eq!(c.estimated_value, 10.0);
    }

    #[test]
    fn higher_price_is_smallest_value_above_the_percentile() {
        let prices: Vec<f64> = (1..=24).map(|i| i as f64 * 0.01).collect();
        let samples = hourly_samples("us-west-2c", "m3.large", &prices);
        let table = aggregate(&samples, &[spec("m3.large", 1.0)], 80.0, now());

        let c = table.lookup("m3.large").unwrap();
        // ceil(0.8 * 24) = 20th ascending value
        assert!((c.price_80 - 0.20).abs() < 1e-12);
        assert!((c.higher_price.unwrap() - 0.21).abs() < 1e-12);
        assert!((c.max_price - 0.24).abs() < 1e-12);
    }

    #[test]
    fn percentile_boundaries_select_min_and_max() {
        let prices: Vec<f64> = (1..=24).map(|i| i as f64 * 0.01).collect();
        let samples = hourly_samples("us-west-2c", "m3.large", &prices);

        let top = aggregate(&samples, &[spec("m3.large", 1.0)], 100.0, now());
        let c = top.lookup("m3.large").unwrap();
        assert_eq!(c.price_80, c.max_price);

        let bottom = aggregate(&samples, &[spec("m3.large", 1.0)], 0.0, now());
        let c = bottom.lookup("m3.large").unwrap();
        assert!((c.price_80 - 0.01).abs() < 1e-12);
    }

    #[test]
    fn a_single_change_covers_every_later_hour() {
        let samples: HashSet<_> = [sample(
            "us-west-2c",
            "m3.large",
            0.07,
            window_start() + Duration::minutes(30),
        )]
        .into_iter()
        .collect();

        let points = hourly_points(&samples, &[spec("m3.large", 1.0)], now());
        assert_eq!(points.len(), 24);
        assert!(points.iter().all(|p| p.max_price == 0.07));
        assert!(points.iter().all(|p| p.current_price == 0.07));
        assert!(points.iter().all(|p| p.count == 1));
    }

    #[test]
    fn samples_outside_the_window_are_ignored() {
        let mut samples = hourly_samples("us-west-2c", "m3.large", &[0.10; 4]);
        samples.insert(sample(
            "us-west-2c",
            "m3.large",
            9.99,
            window_start() - Duration::days(3),
        ));

        let table = aggregate(&samples, &[spec("m3.large", 1.0)], 80.0, now());
        let c = table.lookup("m3.large").unwrap();
        assert_eq!(c.max_price, 0.10);
    }

    #[test]
    fn current_price_is_the_newest_sample_on_every_bucket() {
        let samples = hourly_samples("us-west-2c", "m3.large", &[0.30, 0.20, 0.05]);
        let points = hourly_points(&samples, &[spec("m3.large", 1.0)], now());

        assert!(points.iter().all(|p| p.current_price == 0.05));
        // The first bucket still reports the old maximum.
        assert_eq!(points[0].max_price, 0.30);
    }

    #[test]
    fn candidates_rank_by_estimated_value_descending() {
        let mut samples = hourly_samples("us-west-2c", "m3.large", &[0.10; 24]);
        samples.extend(hourly_samples("us-west-2c", "c3.xlarge", &[0.20; 24]));

        // m3.large: 1.0 / 0.10 = 10; c3.xlarge: 4.0 / 0.20 = 20
        let table = aggregate(
            &samples,
            &[spec("m3.large", 1.0), spec("c3.xlarge", 4.0)],
            80.0,
            now(),
        );

        let values: Vec<f64> = table.candidates().iter().map(|c| c.estimated_value).collect();
        assert_eq!(values, vec![20.0, 10.0]);
        assert!(values.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn unconfigured_types_are_dropped() {
        let mut samples = hourly_samples("us-west-2c", "m3.large", &[0.10; 24]);
        samples.extend(hourly_samples("us-west-2c", "p9.mystery", &[0.01; 24]));

        let table = aggregate(&samples, &[spec("m3.large", 1.0)], 80.0, now());
        assert_eq!(table.candidates().len(), 1);
        assert!(table.lookup("p9.mystery").is_none());
    }

    #[test]
    fn aggregation_is_idempotent() {
        let mut samples = hourly_samples("us-west-2c", "m3.large", &[0.10, 0.14, 0.09, 0.22]);
        samples.extend(hourly_samples("us-west-2a", "m3.large", &[0.11; 24]));
        samples.extend(hourly_samples("us-west-2c", "c3.xlarge", &[0.31, 0.18]));

        let types = [spec("m3.large", 1.0), spec("c3.xlarge", 4.0)];
        let first = aggregate(&samples, &types, 80.0, now());
        let second = aggregate(&samples, &types, 80.0, now());

        assert_eq!(first.candidates(), second.candidates());
    }

    #[test]
    fn percentile_rank_selection() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert_eq!(percentile(&values, 80.0), 4.0);
        assert!(percentile(&[], 80.0).is_nan());
    }
}
