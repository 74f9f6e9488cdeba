//! Ephemeral-disk counts per instance type.
//!
//! The launch spec attaches every instance-store volume the hardware
//! offers; types absent from the table get none.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EphemeralDisks {
    pub num: u32,
    pub size_gb: u32,
}

#[derive(Debug, Clone)]
pub struct EphemeralStorage {
    table: HashMap<String, EphemeralDisks>,
}

impl EphemeralStorage {
    pub fn new(table: HashMap<String, EphemeralDisks>) -> Self {
        Self { table }
    }

    pub fn disks(&self, instance_type: &str) -> u32 {
        self.table.get(instance_type).map(|d| d.num).unwrap_or(0)
    }

    pub fn get(&self, instance_type: &str) -> Option<EphemeralDisks> {
        self.table.get(instance_type).copied()
    }
}

impl Default for EphemeralStorage {
    fn default() -> Self {
        let entries: &[(&str, u32, u32)] = &[
            ("c1.medium", 1, 350),
            ("c1.xlarge", 4, 420),
            ("c3.2xlarge", 2, 80),
            ("c3.4xlarge", 2, 160),
            ("c3.8xlarge", 2, 320),
            ("c3.large", 2, 16),
            ("c3.xlarge", 2, 40),
            ("c4.2xlarge", 0, 0),
            ("c4.4xlarge", 0, 0),
            ("c4.8xlarge", 0, 0),
            ("c4.large", 0, 0),
            ("c4.xlarge", 0, 0),
            ("cc2.8xlarge", 4, 840),
            ("cg1.4xlarge", 2, 840),
            ("cr1.8xlarge", 2, 120),
            ("d2.2xlarge", 6, 2000),
            ("d2.4xlarge", 12, 2000),
            ("d2.8xlarge", 24, 2000),
            ("d2.xlarge", 3, 2000),
            ("g2.2xlarge", 1, 60),
            ("hi1.4xlarge", 2, 1024),
            ("hs1.8xlarge", 24, 2000),
            ("i2.2xlarge", 2, 800),
            ("i2.4xlarge", 4, 800),
            ("i2.8xlarge", 8, 800),
            ("i2.xlarge", 1, 800),
            ("m1.large", 2, 420),
            ("m1.medium", 1, 410),
            ("m1.small", 1, 160),
            ("m1.xlarge", 4, 420),
            ("m2.2xlarge", 1, 850),
            ("m2.4xlarge", 2, 840),
            ("m2.xlarge", 1, 420),
            ("m3.2xlarge", 2, 80),
            ("m3.large", 1, 32),
            ("m3.medium", 1, 4),
            ("m3.xlarge", 2, 40),
            ("r3.2xlarge", 1, 160),
            ("r3.4xlarge", 1, 320),
            ("r3.8xlarge", 2, 320),
            ("r3.large", 1, 32),
            ("r3.xlarge", 1, 80),
            ("t1.micro", 0, 0),
            ("t2.medium", 0, 0),
            ("t2.micro", 0, 0),
            ("t2.small", 0, 0),
        ];

        let table = entries
            .iter()
            .map(|&(ty, num, size_gb)| (ty.to_string(), EphemeralDisks { num, size_gb }))
            .collect();

        Self { table }
    }
}
