use std::io::Write;

use serde_json::Value;

use super::writer_utils::attribute_columns;
use super::ExportError;
use crate::record::{Record, KEY_FIELD};

pub(crate) fn write_csv<W: Write>(
    records: &[Record],
    columns: Option<&[String]>,
    writer: W,
) -> Result<(), ExportError> {
    let columns = attribute_columns(records, columns);
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(std::iter::once(KEY_FIELD).chain(columns.iter().map(String::as_str)))?;

    for record in records {
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(record.key.to_string());
        row.extend(
            columns
                .iter()
                .map(|column| cell_text(record.attribute(column))),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Strings are written raw; arrays and objects are JSON-stringified.
fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}
