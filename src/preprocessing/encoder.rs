//! Feature encoder shared by training and inference
//!
//! The encoder is fitted once on the training table. Fitting freezes:
//! - the [`RawFeatureSpec`]: raw column names callers supply at inference time
//! - the [`ColumnKind`] of each raw column and its missing-value fill
//! - the [`FeatureSchema`]: encoded column names, in vector order
//!
//! Every later transform, batch or single row, runs the same stages and is then
//! reindexed onto the frozen schema. Encoded columns missing from the input are
//! zero; encoded columns the schema does not know (unseen categories) are dropped.

use crate::error::{Result, StudioError};
use super::stages::{self, ColumnKind, EncodedColumn, Stage};
use super::table::{Column, Table};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Ordered encoded column names; the only authority for vector layout
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Ordered raw column names callers are expected to supply
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawFeatureSpec {
    columns: Vec<String>,
}

impl RawFeatureSpec {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Frozen encoding decision for one raw column
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnPlan {
    name: String,
    kind: ColumnKind,
    /// Value used by the mean-fill stage
    fill: f64,
    /// Fitted one-hot categories; empty unless the column is categorical
    #[serde(default)]
    categories: Vec<String>,
}

/// Encoder from raw tables to fixed-width numeric matrices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureEncoder {
    raw_spec: RawFeatureSpec,
    schema: FeatureSchema,
    plans: Vec<ColumnPlan>,
    is_fitted: bool,
}

impl FeatureEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit on a table that holds exactly the feature columns
    pub fn fit(&mut self, table: &Table) -> Result<&mut Self> {
        if table.n_cols() == 0 {
            return Err(StudioError::InvalidInput(
                "At least one feature column is required".to_string(),
            ));
        }
        if table.is_empty() {
            return Err(StudioError::DataError("Cannot fit encoder on an empty table".to_string()));
        }

        let plans: Vec<ColumnPlan> = table
            .columns()
            .iter()
            .map(|col| {
                let kind = stages::classify(&col.values);
                let fill = match kind {
                    ColumnKind::Boolean | ColumnKind::Categorical => 0.0,
                    ColumnKind::Temporal => {
                        stages::column_mean(&stages::temporal_to_int(&col.values)).unwrap_or(0.0)
                    }
                    ColumnKind::Numeric => {
                        stages::column_mean(&stages::numeric_coerce(&col.values)).unwrap_or(0.0)
                    }
                };
                let categories = match kind {
                    ColumnKind::Categorical => stages::categories(&col.values),
                    _ => Vec::new(),
                };
                debug!(column = %col.name, kind = ?kind, fill, "Column classified");
                ColumnPlan {
                    name: col.name.clone(),
                    kind,
                    fill,
                    categories,
                }
            })
            .collect();

        self.plans = plans;
        let encoded = self.encode_columns(table.columns());

        let mut seen = HashSet::new();
        for col in &encoded {
            if !seen.insert(col.name.as_str()) {
                return Err(StudioError::DataError(format!(
                    "Encoded column name '{}' is produced twice; rename the raw columns",
                    col.name
                )));
            }
        }

        self.raw_spec = RawFeatureSpec::new(table.column_names());
        self.schema = FeatureSchema::new(encoded.into_iter().map(|c| c.name).collect());
        self.is_fitted = true;

        debug!(
            raw_columns = self.raw_spec.len(),
            encoded_columns = self.schema.len(),
            stages = ?Stage::PIPELINE.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Feature encoder fitted"
        );
        Ok(self)
    }

    /// Encode a table holding every raw feature column
    pub fn transform(&self, table: &Table) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        let selected = table.select(self.raw_spec.columns())?;
        let encoded = self.encode_columns(selected.columns());
        self.reindex(encoded, selected.n_rows())
    }

    /// Fit and encode the training table in one step
    pub fn fit_transform(&mut self, table: &Table) -> Result<Array2<f64>> {
        self.fit(table)?;
        self.transform(table)
    }

    /// Encode one sparse inference record.
    ///
    /// Raw features missing from the record are treated as missing values;
    /// keys outside the raw feature spec are ignored.
    pub fn transform_record(&self, record: &Map<String, Value>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(StudioError::ModelNotFitted);
        }
        // An absent numeric key takes the training mean, not 0. Callers that
        // mean 0 must send it explicitly.
        let table = Table::from_record(self.raw_spec.columns(), record);
        let matrix = self.reindex(self.encode_columns(table.columns()), 1)?;
        Ok(matrix.row(0).to_owned())
    }

    /// Number of raw features in the record carrying a non-default value
    pub fn count_non_default(&self, record: &Map<String, Value>) -> usize {
        self.raw_spec
            .columns()
            .iter()
            .filter_map(|name| record.get(name))
            .filter(|v| !super::value::RawValue::from_json(v).is_default())
            .count()
    }

    pub fn raw_feature_spec(&self) -> &RawFeatureSpec {
        &self.raw_spec
    }

    pub fn feature_schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Run every stage after classification over the given columns.
    ///
    /// One-hot columns are laid out against the categories frozen at fit, so
    /// an unseen value encodes as all zeros and never yields a new column name.
    fn encode_columns(&self, columns: &[Column]) -> Vec<EncodedColumn> {
        let mut out = Vec::with_capacity(self.schema.len().max(columns.len()));
        for (plan, col) in self.plans.iter().zip(columns) {
            let partial = match plan.kind {
                ColumnKind::Boolean => stages::boolean_to_int(&col.values),
                ColumnKind::Temporal => stages::temporal_to_int(&col.values),
                ColumnKind::Numeric => stages::numeric_coerce(&col.values),
                ColumnKind::Categorical => {
                    out.extend(stages::one_hot(&plan.name, &col.values, &plan.categories));
                    continue;
                }
            };
            let filled = stages::mean_fill(&partial, plan.fill);
            out.push(EncodedColumn {
                name: plan.name.clone(),
                values: filled.into_iter().map(Some).collect(),
            });
        }
        out
    }

    /// Lay encoded columns out in schema order, zero-filling absent columns
    fn reindex(&self, encoded: Vec<EncodedColumn>, n_rows: usize) -> Result<Array2<f64>> {
        let by_name: HashMap<&str, &EncodedColumn> =
            encoded.iter().map(|c| (c.name.as_str(), c)).collect();

        let mut matrix = Array2::<f64>::zeros((n_rows, self.schema.len()));
        for (j, name) in self.schema.columns().iter().enumerate() {
            if let Some(col) = by_name.get(name.as_str()) {
                if col.values.len() != n_rows {
                    return Err(StudioError::EncodingShapeMismatch {
                        expected: n_rows,
                        actual: col.values.len(),
                    });
                }
                for (i, v) in col.values.iter().enumerate() {
                    matrix[[i, j]] = v.unwrap_or(0.0);
                }
            }
        }

        if matrix.ncols() != self.schema.len() {
            return Err(StudioError::EncodingShapeMismatch {
                expected: self.schema.len(),
                actual: matrix.ncols(),
            });
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn training_table() -> Table {
        let rows = vec![
            json!({"fever": true, "age": 30, "color": "red", "visit": "2024-01-01"}),
            json!({"fever": false, "age": null, "color": "blue", "visit": "2024-01-03"}),
            json!({"fever": true, "age": 50, "color": null, "visit": null}),
        ];
        Table::from_json_rows(&rows).unwrap()
    }

    #[test]
    fn test_schema_layout() {
        let mut encoder = FeatureEncoder::new();
        let x = encoder.fit_transform(&training_table()).unwrap();

        assert_eq!(
            encoder.feature_schema().columns(),
            &["fever", "age", "color_blue", "color_red", "color_nan", "visit"]
        );
        assert_eq!(encoder.raw_feature_spec().columns(), &["fever", "age", "color", "visit"]);
        assert_eq!(x.dim(), (3, 6));
    }

    #[test]
    fn test_mean_fill_uses_training_mean() {
        let mut encoder = FeatureEncoder::new();
        let x = encoder.fit_transform(&training_table()).unwrap();
        assert_eq!(x[[1, 1]], 40.0);

        let row = encoder.transform_record(json!({"fever": true}).as_object().unwrap()).unwrap();
        assert_eq!(row[1], 40.0);
        // missing categorical sets the reserved column
        assert_eq!(row[4], 1.0);
    }

    #[test]
    fn test_record_reindex() {
        let mut encoder = FeatureEncoder::new();
        encoder.fit(&training_table()).unwrap();

        let row = encoder
            .transform_record(json!({"color": "green", "extra": 1, "fever": true}).as_object().unwrap())
            .unwrap();
        assert_eq!(row.len(), 6);
        assert_eq!(row[0], 1.0);
        assert_eq!(row[2] + row[3] + row[4], 0.0);
    }

    #[test]
    fn test_unfitted_encoder_fails() {
        let encoder = FeatureEncoder::new();
        assert!(matches!(
            encoder.transform(&training_table()),
            Err(StudioError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_name_collision_is_rejected() {
        let rows = vec![json!({"c": "x", "c_x": 1.0}), json!({"c": "y", "c_x": 2.0})];
        let table = Table::from_json_rows(&rows).unwrap();
        assert!(FeatureEncoder::new().fit(&table).is_err());
    }

    #[test]
    fn test_unseen_category_cannot_shadow_numeric_column() {
        let rows = vec![
            json!({"c_z": 1.0, "c": "x"}),
            json!({"c_z": 2.0, "c": "y"}),
            json!({"c_z": 3.0, "c": "x"}),
        ];
        let table = Table::from_json_rows(&rows).unwrap();
        let mut encoder = FeatureEncoder::new();
        encoder.fit(&table).unwrap();
        assert_eq!(encoder.feature_schema().columns(), &["c_z", "c_x", "c_y", "c_nan"]);

        let row = encoder
            .transform_record(json!({"c": "z", "c_z": 5}).as_object().unwrap())
            .unwrap();
        assert_eq!(row.to_vec(), vec![5.0, 0.0, 0.0, 0.0]);

        let batch = Table::from_json_rows(&[json!({"c_z": 7.0, "c": "z"})]).unwrap();
        let x = encoder.transform(&batch).unwrap();
        assert_eq!(x[[0, 0]], 7.0);
    }

    #[test]
    fn test_count_non_default() {
        let mut encoder = FeatureEncoder::new();
        encoder.fit(&training_table()).unwrap();

        let record = json!({"fever": true, "age": 0, "color": "", "visit": null, "other": 5});
        assert_eq!(encoder.count_non_default(record.as_object().unwrap()), 1);
    }
}
