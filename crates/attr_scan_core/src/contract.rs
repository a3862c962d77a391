use std::collections::BTreeSet;
use std::path::PathBuf;

use serde_json::Value;

use crate::export::{resolve_output_format, OutputFormat, OutputTarget};
use crate::matching::MatchCriteria;
use crate::record::{kind_name, KEY_FIELD};

pub const MIN_PAGE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_PARTITIONS: usize = 10;

/// Raw, unvalidated scan parameters as collected from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequestInput {
    pub name: String,
    /// JSON text of the value to match, e.g. `"\"US\""` or `42`.
    pub value: String,
    pub product: Option<String>,
    pub partitions: i64,
    pub count: i64,
    pub attribute_names: Option<Vec<String>>,
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub only_partitions: Option<Vec<usize>>,
}

impl Default for ScanRequestInput {
    fn default() -> Self {
        Self {
            name: String::new(),
            value: String::new(),
            product: None,
            partitions: DEFAULT_PARTITIONS as i64,
            count: DEFAULT_PAGE_SIZE as i64,
            attribute_names: None,
            output: None,
            format: None,
            only_partitions: None,
        }
    }
}

/// A validated scan request. Only obtainable through [`normalize_request`]
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    criteria: MatchCriteria,
    partition_count: usize,
    page_size: usize,
    attribute_names: Option<Vec<String>>,
    output: OutputTarget,
    only_partitions: Option<BTreeSet<usize>>,
}

impl ScanRequest {
    pub fn criteria(&self) -> &MatchCriteria {
        &self.criteria
    }

    pub fn attribute_name(&self) -> &str {
        &self.criteria.name
    }

    pub fn attribute_value(&self) -> &Value {
        &self.criteria.value
    }

    pub fn product(&self) -> Option<&str> {
        self.criteria.product.as_deref()
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Output column filter. Never consulted by the matcher.
    pub fn attribute_names(&self) -> Option<&[String]> {
        self.attribute_names.as_deref()
    }

    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    pub fn only_partitions(&self) -> Option<&BTreeSet<usize>> {
        self.only_partitions.as_ref()
    }

    /// Whether the partition with `index` takes part in this run.
    pub fn selects(&self, index: usize) -> bool {
        self.only_partitions
            .as_ref()
            .map_or(true, |selected| selected.contains(&index))
    }

    /// Human-readable kind of the target value ("string", "number", ...).
    pub fn value_kind(&self) -> &'static str {
        kind_name(&self.criteria.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ConfigurationError {
    message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub fn normalize_request(input: ScanRequestInput) -> Result<ScanRequest, ConfigurationError> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(ConfigurationError::new("name cannot be empty"));
    }

    let value: Value = serde_json::from_str(&input.value).map_err(|_| {
        ConfigurationError::new(format!(
            "The value '{}' is not valid JSON. For strings, use quotes like: '\"example\"'",
            input.value
        ))
    })?;

    if input.partitions < 1 {
        return Err(ConfigurationError::new(format!(
            "partitions must be at least 1, got {}",
            input.partitions
        )));
    }
    let partition_count = usize::try_from(input.partitions)
        .map_err(|_| ConfigurationError::new("partitions is too large for this platform"))?;

    if input.count < MIN_PAGE_SIZE as i64 || input.count > MAX_PAGE_SIZE as i64 {
        return Err(ConfigurationError::new(format!(
            "Count must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}, got {}",
            input.count
        )));
    }
    let page_size = input.count as usize;

    let attribute_names = input
        .attribute_names
        .map(normalize_attribute_names)
        .transpose()?;

    let only_partitions = input
        .only_partitions
        .map(|indices| normalize_partition_selection(indices, partition_count))
        .transpose()?;

    let product = input
        .product
        .map(|product| product.trim().to_string())
        .filter(|product| !product.is_empty());

    let output = match input.output {
        Some(path) => OutputTarget::File {
            format: resolve_output_format(input.format, Some(&path)),
            path,
        },
        None => OutputTarget::Stdout(resolve_output_format(input.format, None)),
    };

    Ok(ScanRequest {
        criteria: MatchCriteria {
            name,
            value,
            product,
        },
        partition_count,
        page_size,
        attribute_names,
        output,
        only_partitions,
    })
}

fn normalize_attribute_names(names: Vec<String>) -> Result<Vec<String>, ConfigurationError> {
    let mut seen = BTreeSet::new();
    let normalized: Vec<String> = names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty() && name != KEY_FIELD)
        .filter(|name| seen.insert(name.clone()))
        .collect();

    if normalized.is_empty() {
        return Err(ConfigurationError::new(
            "attribute names must list at least one attribute column",
        ));
    }

    Ok(normalized)
}

fn normalize_partition_selection(
    indices: Vec<usize>,
    partition_count: usize,
) -> Result<BTreeSet<usize>, ConfigurationError> {
    if indices.is_empty() {
        return Err(ConfigurationError::new(
            "only_partitions must name at least one partition",
        ));
    }

    if let Some(index) = indices.iter().find(|index| **index >= partition_count) {
        return Err(ConfigurationError::new(format!(
            "partition index {index} is out of range for {partition_count} partitions"
        )));
    }

    Ok(indices.into_iter().collect())
}
