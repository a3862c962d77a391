use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use super::ExportError;
use crate::record::Record;

#[derive(Serialize)]
struct JsonRecord<'a> {
    key: u64,
    attributes: BTreeMap<&'a str, &'a Value>,
}

pub(crate) fn write_json<W: Write>(
    records: &[Record],
    columns: Option<&[String]>,
    mut writer: W,
) -> Result<(), ExportError> {
    let rows: Vec<JsonRecord<'_>> = records
        .iter()
        .map(|record| JsonRecord {
            key: record.key,
            attributes: record
                .attributes
                .iter()
                .filter(|(name, _)| columns.map_or(true, |columns| columns.contains(*name)))
                .map(|(name, value)| (name.as_str(), value))
                .collect(),
        })
        .collect();

    serde_json::to_writer_pretty(&mut writer, &rows)?;
    writer.write_all(b"\n")?;
    Ok(())
}
