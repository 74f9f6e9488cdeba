//! Persistence for observed spot-price samples.
//!
//! One JSON file, the full deduplicated history up to the configured
//! horizon. A missing or corrupt file is recovered as the empty set so
//! a damaged cache can never block a run; the next save rewrites it.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use cloud::types::PriceSample;

use crate::error::PricingError;

pub struct PriceStore {
    path: PathBuf,
}

impl PriceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the sample set. Never fails visibly: absence or a parse
    /// error yields the empty set and a warning.
    pub fn load(&self) -> HashSet<PriceSample> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "price file unreadable; starting empty");
                return HashSet::new();
            }
        };

        match serde_json::from_str::<Vec<PriceSample>>(&content) {
            Ok(samples) => {
                let set: HashSet<_> = samples.into_iter().collect();
                debug!(count = set.len(), "price file loaded");
                set
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "price file corrupt; starting empty");
                HashSet::new()
            }
        }
    }

    /// Total rewrite of the file, pretty-printed. Samples are sorted so
    /// successive saves of the same set produce the same bytes.
    pub fn save(&self, samples: &HashSet<PriceSample>) -> Result<(), PricingError> {
        let mut ordered: Vec<&PriceSample> = samples.iter().collect();
        ordered.sort_by(|a, b| {
            (&a.availability_zone, &a.instance_type, a.timestamp).cmp(&(
                &b.availability_zone,
                &b.instance_type,
                b.timestamp,
            ))
        });

        let body = serde_json::to_string_pretty(&ordered)?;
        fs::write(&self.path, body)?;
        debug!(count = ordered.len(), path = %self.path.display(), "price file saved");
        Ok(())
    }
}
