use std::io::Read;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::error::Result;

/// One dataset record: column name to text value, in header order. Rows
/// parsed from the same dataset share one header allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<String>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    #[cfg(test)]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|name| name == column)
            .map(|idx| self.values[idx].as_str())
    }

    #[cfg(test)]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Parses CSV text into rows keyed by the header line. Values stay text.
///
/// This is the only CSV reader in the crate: ingestion counts with it and the
/// row cache builds with it, so `count` and the cached length always agree.
/// Blank lines are skipped, short records are padded with empty values and
/// surplus fields are dropped. A repeated header name keeps its first position
/// and takes the last value.
pub fn parse_rows<R: Read>(reader: R) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let mut columns: Vec<String> = Vec::with_capacity(headers.len());
    let mut slots = Vec::with_capacity(headers.len());
    for name in headers.iter() {
        let slot = match columns.iter().position(|existing| existing == name) {
            Some(idx) => idx,
            None => {
                columns.push(name.to_string());
                columns.len() - 1
            }
        };
        slots.push(slot);
    }
    let columns: Arc<[String]> = columns.into();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut values = vec![String::new(); columns.len()];
        for (field, slot) in record.iter().zip(&slots) {
            values[*slot] = field.to_string();
        }
        rows.push(Row::new(Arc::clone(&columns), values));
    }

    Ok(rows)
}

/// Keeps only the requested columns, in dataset order. Names the dataset does
/// not have are ignored.
pub fn project_rows(rows: &[Row], requested: &[String]) -> Vec<Row> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    let keep: Vec<usize> = first
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| requested.iter().any(|wanted| wanted == *name))
        .map(|(idx, _)| idx)
        .collect();
    let columns: Arc<[String]> = keep
        .iter()
        .map(|idx| first.columns[*idx].clone())
        .collect::<Vec<_>>()
        .into();

    rows.iter()
        .map(|row| {
            let values = keep.iter().map(|idx| row.values[*idx].clone()).collect();
            Row::new(Arc::clone(&columns), values)
        })
        .collect()
}
