//! Column-oriented table of raw values

use crate::error::{Result, StudioError};
use super::value::RawValue;
use ndarray::Array1;
use polars::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A named column of raw values
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<RawValue>,
}

/// Raw tabular data, columns kept in first-appearance order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Build a table from columns of equal length
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.values.len() != n_rows) {
            return Err(StudioError::ShapeError {
                expected: format!("{} rows", n_rows),
                actual: format!("{} rows in column '{}'", bad.values.len(), bad.name),
            });
        }
        Ok(Self { columns, n_rows })
    }

    /// Build a table from a JSON array of row objects
    pub fn from_json_rows(rows: &[Value]) -> Result<Self> {
        let mut order: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut objects: Vec<&Map<String, Value>> = Vec::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            let obj = row.as_object().ok_or_else(|| {
                StudioError::InvalidInput(format!("Row {} is not a JSON object", i))
            })?;
            for key in obj.keys() {
                if !index.contains_key(key) {
                    index.insert(key.clone(), order.len());
                    order.push(key.clone());
                }
            }
            objects.push(obj);
        }

        let columns = order
            .into_iter()
            .map(|name| {
                let values = objects
                    .iter()
                    .map(|obj| obj.get(&name).map(RawValue::from_json).unwrap_or(RawValue::Null))
                    .collect();
                Column { name, values }
            })
            .collect();

        Self::from_columns(columns)
    }

    /// Build a one-row table over `columns` from a sparse record.
    ///
    /// Keys absent from the record become `Null`; keys not listed in `columns` are ignored.
    pub fn from_record(columns: &[String], record: &Map<String, Value>) -> Self {
        let columns = columns
            .iter()
            .map(|name| Column {
                name: name.clone(),
                values: vec![record.get(name).map(RawValue::from_json).unwrap_or(RawValue::Null)],
            })
            .collect();
        Self { columns, n_rows: 1 }
    }

    /// Build a table from a polars DataFrame
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let mut columns = Vec::with_capacity(df.width());
        for col in df.get_columns() {
            let series = col.as_materialized_series();
            let mut values = Vec::with_capacity(series.len());
            for i in 0..series.len() {
                let av = series.get(i)?;
                values.push(any_value_to_raw(&av));
            }
            columns.push(Column {
                name: series.name().to_string(),
                values,
            });
        }
        Self::from_columns(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column by name, failing with `FeatureNotFound`
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| StudioError::FeatureNotFound(name.to_string()))
    }

    /// Project onto the named columns, in the given order
    pub fn select(&self, names: &[String]) -> Result<Table> {
        let columns = names
            .iter()
            .map(|name| self.require(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Table { columns, n_rows: self.n_rows })
    }

    /// Keep only rows whose mask entry is true
    pub fn filter_rows(&self, mask: &[bool]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: c
                    .values
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(v, _)| v.clone())
                    .collect(),
            })
            .collect();
        Table {
            columns,
            n_rows: mask.iter().filter(|k| **k).count(),
        }
    }

    /// Numeric reading of a column; non-numeric cells become NaN
    pub fn numeric_column(&self, name: &str) -> Result<Array1<f64>> {
        let col = self.require(name)?;
        Ok(col
            .values
            .iter()
            .map(|v| v.as_number().unwrap_or(f64::NAN))
            .collect())
    }
}

fn any_value_to_raw(av: &AnyValue) -> RawValue {
    match av {
        AnyValue::Null => RawValue::Null,
        AnyValue::Boolean(b) => RawValue::Bool(*b),
        AnyValue::Float64(v) => RawValue::Number(*v),
        AnyValue::Float32(v) => RawValue::Number(*v as f64),
        AnyValue::Int64(v) => RawValue::Number(*v as f64),
        AnyValue::Int32(v) => RawValue::Number(*v as f64),
        AnyValue::Int16(v) => RawValue::Number(*v as f64),
        AnyValue::Int8(v) => RawValue::Number(*v as f64),
        AnyValue::UInt64(v) => RawValue::Number(*v as f64),
        AnyValue::UInt32(v) => RawValue::Number(*v as f64),
        AnyValue::UInt16(v) => RawValue::Number(*v as f64),
        AnyValue::UInt8(v) => RawValue::Number(*v as f64),
        AnyValue::String(s) => RawValue::Text(s.to_string()),
        AnyValue::StringOwned(s) => RawValue::Text(s.to_string()),
        AnyValue::Date(days) => RawValue::DateTime(*days as i64 * 86_400_000_000_000),
        AnyValue::Datetime(v, unit, _) => RawValue::DateTime(match unit {
            TimeUnit::Nanoseconds => *v,
            TimeUnit::Microseconds => v * 1_000,
            TimeUnit::Milliseconds => v * 1_000_000,
        }),
        other => RawValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_rows_column_order() {
        let rows = vec![json!({"a": 1, "b": "x"}), json!({"b": "y", "c": true})];
        let table = Table::from_json_rows(&rows).unwrap();

        assert_eq!(table.column_names(), vec!["a", "b", "c"]);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column("a").unwrap().values[1], RawValue::Null);
        assert_eq!(table.column("c").unwrap().values[0], RawValue::Null);
    }

    #[test]
    fn test_rejects_non_object_rows() {
        let rows = vec![json!({"a": 1}), json!([1, 2])];
        assert!(matches!(
            Table::from_json_rows(&rows),
            Err(StudioError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_from_record_ignores_unknown_keys() {
        let spec = vec!["fever".to_string(), "cough".to_string()];
        let record = json!({"fever": true, "rash": true});
        let table = Table::from_record(&spec, record.as_object().unwrap());

        assert_eq!(table.n_rows(), 1);
        assert_eq!(table.column_names(), spec);
        assert_eq!(table.column("cough").unwrap().values[0], RawValue::Null);
        assert!(table.column("rash").is_none());
    }

    #[test]
    fn test_select_and_filter() {
        let rows = vec![json!({"a": 1, "b": 2}), json!({"a": 3, "b": null})];
        let table = Table::from_json_rows(&rows).unwrap();

        let selected = table.select(&["b".to_string()]).unwrap();
        assert_eq!(selected.n_cols(), 1);
        assert!(table.select(&["z".to_string()]).is_err());

        let filtered = table.filter_rows(&[false, true]);
        assert_eq!(filtered.n_rows(), 1);
        assert_eq!(filtered.numeric_column("a").unwrap()[0], 3.0);
    }

    #[test]
    fn test_from_dataframe() {
        let df = DataFrame::new(vec![
            Series::new("x".into(), vec![1.0f64, 2.0]).into(),
            Series::new("flag".into(), vec![true, false]).into(),
            Series::new("name".into(), vec!["a", "b"]).into(),
        ])
        .unwrap();
        let table = Table::from_dataframe(&df).unwrap();

        assert_eq!(table.column_names(), vec!["x", "flag", "name"]);
        assert_eq!(table.column("flag").unwrap().values[0], RawValue::Bool(true));
        assert_eq!(table.column("name").unwrap().values[1], RawValue::Text("b".into()));
    }
}
