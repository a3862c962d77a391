use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::contract::ConfigurationError;

pub const DEFAULT_MIN_KEY: u64 = 0;
/// Record keys are signed 64-bit integers on the backend; only the
/// non-negative half is ever assigned.
pub const DEFAULT_MAX_KEY: u64 = i64::MAX as u64;

/// Inclusive bounds of the enumerable key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDomain {
    pub min: u64,
    pub max: u64,
}

impl KeyDomain {
    pub fn new(min: u64, max: u64) -> Result<Self, ConfigurationError> {
        if min > max {
            return Err(ConfigurationError::new(format!(
                "key domain minimum {min} exceeds maximum {max}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn size(&self) -> u128 {
        u128::from(self.max) - u128::from(self.min) + 1
    }
}

impl Default for KeyDomain {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_KEY,
            max: DEFAULT_MAX_KEY,
        }
    }
}

/// Inclusive key range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct KeyRange {
    pub start: u64,
    pub end: u64,
}

impl KeyRange {
    pub fn contains(&self, key: u64) -> bool {
        self.start <= key && key <= self.end
    }
}

impl std::fmt::Display for KeyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// One partition of the key space. `range` is `None` when the domain has
/// fewer keys than there are partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub index: usize,
    pub range: Option<KeyRange>,
}

pub fn compute_partition_plan(
    domain: &KeyDomain,
    partition_count: usize,
) -> Result<Vec<PartitionDescriptor>, ConfigurationError> {
    if partition_count == 0 {
        return Err(ConfigurationError::new("partitions must be at least 1, got 0"));
    }

    let total_keys = domain.size();
    let count = partition_count as u128;
    let base_width = total_keys / count;
    let remainder = total_keys % count;

    let mut plan = Vec::with_capacity(partition_count);
    let mut cursor = u128::from(domain.min);

    for index in 0..partition_count {
        let width = base_width + u128::from((index as u128) < remainder);
        let range = if width == 0 {
            None
        } else {
            // Both bounds lie within [domain.min, domain.max], so they fit in u64.
            Some(KeyRange {
                start: cursor as u64,
                end: (cursor + width - 1) as u64,
            })
        };
        plan.push(PartitionDescriptor { index, range });
        cursor += width;
    }

    validate_plan(domain, &plan)?;
    Ok(plan)
}

fn validate_plan(domain: &KeyDomain, plan: &[PartitionDescriptor]) -> Result<(), ConfigurationError> {
    let ranges: Vec<KeyRange> = plan.iter().filter_map(|descriptor| descriptor.range).collect();

    let (Some(first), Some(last)) = (ranges.first(), ranges.last()) else {
        return Err(ConfigurationError::new("No partitions to scan"));
    };

    if first.start != domain.min || last.end != domain.max {
        return Err(ConfigurationError::new(
            "Partition boundaries do not cover the full key domain",
        ));
    }

    for pair in ranges.windows(2) {
        if u128::from(pair[0].end) + 1 != u128::from(pair[1].start) {
            return Err(ConfigurationError::new(
                "Partition boundaries overlap or leave gaps",
            ));
        }
    }

    Ok(())
}

/// Stable digest of a partition plan. Two runs with the same fingerprint
/// scanned identical ranges, so a single failed partition can be re-run.
pub fn plan_fingerprint(domain: &KeyDomain, plan: &[PartitionDescriptor]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.min.to_be_bytes());
    hasher.update(domain.max.to_be_bytes());
    for descriptor in plan {
        hasher.update((descriptor.index as u64).to_be_bytes());
        match descriptor.range {
            Some(range) => {
                hasher.update([1u8]);
                hasher.update(range.start.to_be_bytes());
                hasher.update(range.end.to_be_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    format!("{:x}", hasher.finalize())
}
