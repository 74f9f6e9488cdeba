//! Bid sizing for one candidate.
//!
//! Given how much utility is still missing, decide how many requests to
//! place for a candidate and at which prices. Bids ladder up from the
//! percentile floor so a partial price spike only evicts the cheapest
//! rungs instead of the whole batch.

use pricing::types::Candidate;

/// What to bid on one candidate, or why not to.
#[derive(Debug, Clone, PartialEq)]
pub enum BidPlan {
    /// The candidate has no observed current price.
    NoCurrentPrice,

    /// The percentile floor already exceeds what this type is worth.
    OverCap { min_bid: f64, cap: f64 },

    /// Place `num` bids starting at `min_bid`, stepped by
    /// `price_interval`.
    Ladder {
        num: u32,
        min_bid: f64,
        price_interval: f64,
    },
}

impl BidPlan {
    /// The bid for rung `i`, valid for `i < num`.
    pub fn bid_at(&self, i: u32) -> Option<f64> {
        match self {
            BidPlan::Ladder {
                num,
                min_bid,
                price_interval,
            } if i < *num => Some(min_bid + f64::from(i) * price_interval),
            _ => None,
        }
    }
}

/// Size the ladder for `candidate` against the remaining utility gap.
///
/// The ceiling is the smaller of the next observed price above the
/// floor (outbidding it buys nothing) and the candidate's worth,
/// `utility * max_utility_price`. A single bid is instead lifted to
/// 10% over the current price so it does not sit exactly on the margin.
pub fn plan_bids(candidate: &Candidate, net_new_utility: f64, max_utility_price: f64) -> BidPlan {
    let Some(current_price) = candidate.current_price else {
        return BidPlan::NoCurrentPrice;
    };

    let utility_cap = candidate.type_spec.utility * max_utility_price;
    let max_bid = candidate
        .higher_price
        .map_or(utility_cap, |h| h.min(utility_cap));
    let mut min_bid = candidate.price_80;

    if min_bid > max_bid {
        return BidPlan::OverCap {
            min_bid,
            cap: utility_cap,
        };
    }

    let num = (net_new_utility / candidate.type_spec.utility).round().max(0.0) as u32;

    let price_interval = if num == 1 {
        min_bid = (current_price * 1.10)
            .max(min_bid.min(max_bid))
            .min(max_bid);
        0.0
    } else if num > 1 {
        (min_bid / 10.0).min((max_bid - min_bid) / f64::from(num - 1))
    } else {
        0.0
    };

    BidPlan::Ladder {
        num,
        min_bid,
        price_interval,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use pricing::types::InstanceTypeSpec;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]
        #[test]
        fn ladder_invariants(
            utility in 0.25..=32.0f64,
            price_80 in 0.01..=2.0f64,
            current_over_floor in 0.0..=1.0f64,
            higher_step in prop::option::of(0.001..=1.0f64),
            max_utility_price in 0.01..=1.0f64,
            net_new_utility in 0.0..=64.0f64,
        ) {
            let higher_price = higher_step.map(|s| price_80 + s);
            let candidate = Candidate {
                availability_zone: "us-west-2c".into(),
                type_spec: InstanceTypeSpec {
                    instance_type: "m3.large".into(),
                    utility,
                    discount: 0.0,
                },
                price_80,
                max_price: higher_price.unwrap_or(price_80),
                current_price: Some(price_80 + current_over_floor),
                all_price: vec![price_80],
                estimated_value: utility / price_80,
                higher_price,
            };

            let utility_cap = utility * max_utility_price;
            let max_bid = higher_price.map_or(utility_cap, |h| h.min(utility_cap));

            match plan_bids(&candidate, net_new_utility, max_utility_price) {
                BidPlan::NoCurrentPrice => unreachable!("current price is always set here"),
                BidPlan::OverCap { min_bid, .. } => {
                    // Only reachable when the floor truly clears the ceiling.
                    prop_assert!(min_bid > max_bid);
                }
                BidPlan::Ladder { num, min_bid, price_interval } => {
                    prop_assert!(price_interval >= 0.0);
                    prop_assert_eq!(num, (net_new_utility / utility).round() as u32);

                    if num == 1 {
                        // A lone bid, raised or not, stays under the
                        // same ceiling as every ladder rung.
                        prop_assert!(min_bid <= max_bid + 1e-9);
                    } else if num > 1 {
                        // Every rung stays inside [floor, ceiling].
                        let last = min_bid + f64::from(num - 1) * price_interval;
                        prop_assert!(min_bid >= price_80 - 1e-9);
                        prop_assert!(last <= max_bid + 1e-9);
                    }
                }
            }
        }
    }
}
