use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use crate::record::Record;

pub(crate) fn create_output_file(path: impl AsRef<Path>) -> std::io::Result<File> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)
}

/// Output columns after `key`: the filter as given, or every observed
/// attribute name in sorted order.
pub(crate) fn attribute_columns(records: &[Record], filter: Option<&[String]>) -> Vec<String> {
    match filter {
        Some(columns) => columns.to_vec(),
        None => records
            .iter()
            .flat_map(|record| record.attributes.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    }
}
