//! Analysis families
//!
//! Every supervised family encodes its features, evaluates the requested
//! methods on a seeded train/test split, then refits the best method on the
//! full dataset. That refit is what gets stored and served, and results say
//! so through `served_model_fit`.

pub mod config;
mod classification;
mod clustering;
mod discriminant;
mod neural_networks;
mod regression;
mod symptom_matching;
mod time_series;

use crate::error::{Result, StudioError};
use crate::preprocessing::{RawValue, Table};
use crate::registry::TrainedModelEntry;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};

/// How the served model was fitted, reported in every stored result
pub const SERVED_MODEL_FIT: &str = "full_dataset";

/// Analysis family addressed by `/analyze/{family}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisFamily {
    Regression,
    Classification,
    Discriminant,
    SymptomMatching,
    TimeSeries,
    Clustering,
    NeuralNetworks,
}

impl AnalysisFamily {
    pub const ALL: [AnalysisFamily; 7] = [
        AnalysisFamily::Regression,
        AnalysisFamily::Classification,
        AnalysisFamily::Discriminant,
        AnalysisFamily::SymptomMatching,
        AnalysisFamily::TimeSeries,
        AnalysisFamily::Clustering,
        AnalysisFamily::NeuralNetworks,
    ];

    /// Route segment
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisFamily::Regression => "regression",
            AnalysisFamily::Classification => "classification",
            AnalysisFamily::Discriminant => "discriminant",
            AnalysisFamily::SymptomMatching => "symptom-matching",
            AnalysisFamily::TimeSeries => "time-series",
            AnalysisFamily::Clustering => "clustering-advanced",
            AnalysisFamily::NeuralNetworks => "neural-networks",
        }
    }

    /// Whether a successful run stores a model in the registry
    pub fn stores_model(&self) -> bool {
        !matches!(self, AnalysisFamily::Clustering)
    }
}

impl fmt::Display for AnalysisFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisFamily {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "clustering" => Ok(AnalysisFamily::Clustering),
            other => AnalysisFamily::ALL
                .into_iter()
                .find(|f| f.as_str() == other)
                .ok_or_else(|| StudioError::InvalidInput(format!("Unknown analysis family '{}'", s))),
        }
    }
}

/// Result payload plus, for storing families, the entry to register
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub results: Value,
    pub entry: Option<TrainedModelEntry>,
}

/// Run one analysis over a raw table with the request's config object
pub fn run_analysis(family: AnalysisFamily, table: &Table, config: &Value) -> Result<AnalysisOutcome> {
    if table.is_empty() {
        return Err(StudioError::DataError("The data array is empty".to_string()));
    }

    let start = Instant::now();
    info!(family = %family, rows = table.n_rows(), columns = table.n_cols(), "Analysis started");

    let (results, entry) = match family {
        AnalysisFamily::Regression => regression::run(table, &config::parse_config(config)?)?,
        AnalysisFamily::Classification => classification::run(table, &config::parse_config(config)?)?,
        AnalysisFamily::Discriminant => discriminant::run(table, &config::parse_config(config)?)?,
        AnalysisFamily::SymptomMatching => symptom_matching::run(table, &config::parse_config(config)?)?,
        AnalysisFamily::TimeSeries => time_series::run(table, &config::parse_config(config)?)?,
        AnalysisFamily::Clustering => (clustering::run(table, &config::parse_config(config)?)?, None),
        AnalysisFamily::NeuralNetworks => neural_networks::run(table, &config::parse_config(config)?)?,
    };

    let entry = entry.map(|e| e.with_training_config(config.clone()).with_results(results.clone()));
    info!(
        family = %family,
        method = entry.as_ref().map(|e| e.method.as_str()).unwrap_or("-"),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Analysis finished"
    );
    Ok(AnalysisOutcome { results, entry })
}

/// Feature table and target values for a supervised analysis.
///
/// An empty feature list selects every column except the target. Rows whose
/// target is missing are dropped.
pub(crate) fn supervised_data(table: &Table, target: &str, features: &[String]) -> Result<(Table, Vec<RawValue>)> {
    table.require(target)?;
    let features: Vec<String> = if features.is_empty() {
        table.column_names().into_iter().filter(|c| c != target).collect()
    } else {
        features.to_vec()
    };
    if features.iter().any(|f| f == target) {
        return Err(StudioError::InvalidInput(format!(
            "Target column '{}' cannot also be a feature",
            target
        )));
    }
    if features.is_empty() {
        return Err(StudioError::InvalidInput("No feature columns to train on".to_string()));
    }

    let mask: Vec<bool> = table.require(target)?.values.iter().map(|v| !v.is_null()).collect();
    let dropped = mask.iter().filter(|keep| !**keep).count();
    let kept = if dropped > 0 {
        warn!(target, dropped, "Dropping rows with a missing target");
        table.filter_rows(&mask)
    } else {
        table.clone()
    };
    if kept.is_empty() {
        return Err(StudioError::DataError(format!("Target column '{}' has no values", target)));
    }

    let target_values = kept.require(target)?.values.clone();
    Ok((kept.select(&features)?, target_values))
}

/// Round for display payloads
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Whether a method score replaces the current best.
///
/// Non-finite scores only win an empty slot, and any finite score replaces a
/// non-finite best.
pub(crate) fn improves(candidate: f64, current: Option<f64>) -> bool {
    match current {
        None => true,
        Some(_) if !candidate.is_finite() => false,
        Some(best) if !best.is_finite() => true,
        Some(best) => candidate > best,
    }
}

/// At most `n` leading values
pub(crate) fn head(values: impl IntoIterator<Item = f64>, n: usize) -> Vec<f64> {
    values.into_iter().take(n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_family_parsing() {
        assert_eq!("symptom-matching".parse::<AnalysisFamily>().unwrap(), AnalysisFamily::SymptomMatching);
        assert_eq!("time_series".parse::<AnalysisFamily>().unwrap(), AnalysisFamily::TimeSeries);
        assert_eq!("clustering".parse::<AnalysisFamily>().unwrap(), AnalysisFamily::Clustering);
        assert_eq!("neural_networks".parse::<AnalysisFamily>().unwrap(), AnalysisFamily::NeuralNetworks);
        assert!("neural".parse::<AnalysisFamily>().is_err());
        assert!(AnalysisFamily::NeuralNetworks.stores_model());
        assert!(!AnalysisFamily::Clustering.stores_model());
    }

    #[test]
    fn test_supervised_data_drops_missing_targets() {
        let table = Table::from_json_rows(&[
            json!({"a": 1, "b": "x", "y": "yes"}),
            json!({"a": 2, "b": "z", "y": null}),
            json!({"a": 3, "b": "x", "y": "no"}),
        ])
        .unwrap();

        let (features, target) = supervised_data(&table, "y", &[]).unwrap();
        assert_eq!(features.column_names(), vec!["a", "b"]);
        assert_eq!(features.n_rows(), 2);
        assert_eq!(target.len(), 2);

        assert!(supervised_data(&table, "y", &["y".to_string()]).is_err());
        assert!(matches!(
            supervised_data(&table, "missing", &[]),
            Err(StudioError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_improves_skips_non_finite_scores() {
        assert!(improves(f64::NAN, None));
        assert!(improves(0.1, Some(f64::NAN)));
        assert!(improves(-5.0, Some(f64::NEG_INFINITY)));
        assert!(!improves(f64::NAN, Some(0.1)));
        assert!(!improves(f64::INFINITY, Some(0.1)));
        assert!(improves(0.9, Some(0.5)));
        assert!(!improves(0.5, Some(0.5)));
    }

    #[test]
    fn test_empty_table_rejected() {
        let err = run_analysis(AnalysisFamily::Regression, &Table::default(), &json!({})).unwrap_err();
        assert!(matches!(err, StudioError::DataError(_)));
    }
}
