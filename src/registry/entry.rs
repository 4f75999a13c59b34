//! Trained model entries

use super::ModelDescription;
use crate::error::{Result, StudioError};
use crate::preprocessing::{FeatureEncoder, FeatureSchema, LabelCodec, RawFeatureSpec, StandardScaler};
use crate::timeseries::Forecaster;
use crate::training::{Classifier, Regressor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Family of a stored model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Regression,
    Classification,
    SymptomMatching,
    TimeSeries,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Regression => "regression",
            ModelType::Classification => "classification",
            ModelType::SymptomMatching => "symptom_matching",
            ModelType::TimeSeries => "time_series",
        }
    }

    /// Whether `/predict` can serve this family
    pub fn is_servable(&self) -> bool {
        !matches!(self, ModelType::TimeSeries)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = StudioError;

    /// Accepts both `symptom_matching` and the route spelling `symptom-matching`
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "regression" => Ok(ModelType::Regression),
            "classification" | "discriminant" => Ok(ModelType::Classification),
            "symptom_matching" => Ok(ModelType::SymptomMatching),
            "time_series" => Ok(ModelType::TimeSeries),
            other => Err(StudioError::InvalidInput(format!("Unknown model type '{}'", other))),
        }
    }
}

/// The fitted capability object of an entry
#[derive(Debug)]
pub enum FittedModel {
    Regressor(Box<dyn Regressor>),
    Classifier(Box<dyn Classifier>),
    Forecaster(Box<dyn Forecaster>),
}

impl FittedModel {
    pub fn kind(&self) -> &'static str {
        match self {
            FittedModel::Regressor(_) => "regressor",
            FittedModel::Classifier(_) => "classifier",
            FittedModel::Forecaster(_) => "forecaster",
        }
    }
}

/// Everything needed to serve one dataset: encoder, optional scaler and
/// label codec, the fitted model, and the training record
#[derive(Debug)]
pub struct TrainedModelEntry {
    pub model_type: ModelType,
    pub encoder: FeatureEncoder,
    /// Applied after encoding for models trained on standardized features
    pub scaler: Option<StandardScaler>,
    /// Installed when the target was not numeric
    pub label_codec: Option<LabelCodec>,
    pub model: FittedModel,
    /// Method key of the served model, e.g. `random_forest`
    pub method: String,
    /// The request's config object, verbatim
    pub training_config: Value,
    /// Analysis results returned to the caller at training time
    pub results: Value,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModelEntry {
    pub fn new(
        model_type: ModelType,
        encoder: FeatureEncoder,
        model: FittedModel,
        method: impl Into<String>,
    ) -> Self {
        Self {
            model_type,
            encoder,
            scaler: None,
            label_codec: None,
            model,
            method: method.into(),
            training_config: Value::Null,
            results: Value::Null,
            trained_at: Utc::now(),
        }
    }

    pub fn with_scaler(mut self, scaler: Option<StandardScaler>) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn with_label_codec(mut self, codec: Option<LabelCodec>) -> Self {
        self.label_codec = codec;
        self
    }

    pub fn with_training_config(mut self, config: Value) -> Self {
        self.training_config = config;
        self
    }

    pub fn with_results(mut self, results: Value) -> Self {
        self.results = results;
        self
    }

    pub fn raw_feature_spec(&self) -> &RawFeatureSpec {
        self.encoder.raw_feature_spec()
    }

    pub fn feature_schema(&self) -> &FeatureSchema {
        self.encoder.feature_schema()
    }

    /// Fail with `ModelTypeMismatch` unless the entry is of the expected family
    pub fn expect_type(&self, expected: ModelType) -> Result<()> {
        if self.model_type != expected {
            return Err(StudioError::ModelTypeMismatch {
                expected: expected.to_string(),
                actual: self.model_type.to_string(),
            });
        }
        Ok(())
    }

    pub fn n_classes(&self) -> Option<usize> {
        match &self.model {
            FittedModel::Classifier(model) => Some(model.classes().len()),
            _ => None,
        }
    }

    pub(super) fn describe(&self, dataset_id: &str) -> ModelDescription {
        ModelDescription {
            dataset_id: dataset_id.to_string(),
            model_type: self.model_type,
            method: self.method.clone(),
            n_raw_features: self.raw_feature_spec().len(),
            n_encoded_features: self.feature_schema().len(),
            n_classes: self.n_classes(),
            trained_at: self.trained_at,
        }
    }
}
