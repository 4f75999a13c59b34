//! Typed analysis configurations
//!
//! Each family reads the request's `config` object into one of these structs.
//! Missing keys take their defaults; unknown keys are ignored here and kept
//! verbatim in the stored training config.

use crate::error::{Result, StudioError};
use crate::training::{Activation, Linkage, WeightScheme};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Deserialize a request config, treating `null` as an empty object
pub fn parse_config<T: DeserializeOwned>(config: &Value) -> Result<T> {
    let value = match config {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| StudioError::ConfigError(e.to_string()))
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| StudioError::InvalidInput(format!("config.{} is required", key)))
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_state() -> u64 {
    42
}

fn default_cv_folds() -> usize {
    5
}

// ═══════════════════════════════════════════════════════════════════════════
//  Regression
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionMethod {
    Linear,
    Ridge,
    Lasso,
    Polynomial,
    #[serde(alias = "elasticnet", alias = "elastic_net")]
    Elastic,
}

impl RegressionMethod {
    pub fn key(&self) -> &'static str {
        match self {
            RegressionMethod::Linear => "linear",
            RegressionMethod::Ridge => "ridge",
            RegressionMethod::Lasso => "lasso",
            RegressionMethod::Polynomial => "polynomial",
            RegressionMethod::Elastic => "elastic",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    pub target: Option<String>,
    /// Empty means every column except the target
    pub features: Vec<String>,
    pub methods: Vec<RegressionMethod>,
    pub test_size: f64,
    pub random_state: u64,
    /// K-fold R² on the training rows; below 2 disables it
    pub cv_folds: usize,
    pub polynomial_degree: usize,
    pub ridge_alpha: f64,
    pub lasso_alpha: f64,
    pub elastic_alpha: f64,
    pub elastic_l1_ratio: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            target: None,
            features: Vec::new(),
            methods: vec![RegressionMethod::Linear],
            test_size: default_test_size(),
            random_state: default_random_state(),
            cv_folds: default_cv_folds(),
            polynomial_degree: 2,
            ridge_alpha: 1.0,
            lasso_alpha: 1.0,
            elastic_alpha: 1.0,
            elastic_l1_ratio: 0.5,
        }
    }
}

impl RegressionConfig {
    pub fn target(&self) -> Result<&str> {
        required(&self.target, "target")
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Classification and discriminant analysis
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Knn,
    NaiveBayes,
    DecisionTree,
    RandomForest,
    GradientBoosting,
    Logistic,
    Svm,
}

impl ClassificationMethod {
    pub fn key(&self) -> &'static str {
        match self {
            ClassificationMethod::Knn => "knn",
            ClassificationMethod::NaiveBayes => "naive_bayes",
            ClassificationMethod::DecisionTree => "decision_tree",
            ClassificationMethod::RandomForest => "random_forest",
            ClassificationMethod::GradientBoosting => "gradient_boosting",
            ClassificationMethod::Logistic => "logistic",
            ClassificationMethod::Svm => "svm",
        }
    }

    /// Distance- and gradient-based methods train on standardized features
    pub fn needs_scaling(&self) -> bool {
        matches!(
            self,
            ClassificationMethod::Knn
                | ClassificationMethod::Svm
                | ClassificationMethod::NaiveBayes
                | ClassificationMethod::Logistic
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub target: Option<String>,
    pub features: Vec<String>,
    pub methods: Vec<ClassificationMethod>,
    pub test_size: f64,
    pub random_state: u64,
    pub cv_folds: usize,
    pub knn_neighbors: usize,
    /// `uniform` or `distance`
    pub knn_weights: WeightScheme,
    #[serde(rename = "svm_C", alias = "svm_c")]
    pub svm_c: f64,
    pub rf_n_estimators: usize,
    pub rf_max_depth: Option<usize>,
    pub dt_max_depth: Option<usize>,
    pub gb_n_estimators: usize,
    pub gb_learning_rate: f64,
    pub gb_max_depth: usize,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            target: None,
            features: Vec::new(),
            methods: vec![ClassificationMethod::Knn, ClassificationMethod::RandomForest],
            test_size: default_test_size(),
            random_state: default_random_state(),
            cv_folds: default_cv_folds(),
            knn_neighbors: 5,
            knn_weights: WeightScheme::Uniform,
            svm_c: 1.0,
            rf_n_estimators: 100,
            rf_max_depth: None,
            dt_max_depth: None,
            gb_n_estimators: 100,
            gb_learning_rate: 0.1,
            gb_max_depth: 3,
        }
    }
}

impl ClassificationConfig {
    pub fn target(&self) -> Result<&str> {
        required(&self.target, "target")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminantMethod {
    Lda,
    Qda,
}

impl DiscriminantMethod {
    pub fn key(&self) -> &'static str {
        match self {
            DiscriminantMethod::Lda => "lda",
            DiscriminantMethod::Qda => "qda",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscriminantConfig {
    pub target: Option<String>,
    pub features: Vec<String>,
    pub methods: Vec<DiscriminantMethod>,
    pub test_size: f64,
    pub random_state: u64,
    pub cv_folds: usize,
    /// Covariance regularization for QDA, relative to the mean variance
    pub qda_reg_param: f64,
}

impl Default for DiscriminantConfig {
    fn default() -> Self {
        Self {
            target: None,
            features: Vec::new(),
            methods: vec![DiscriminantMethod::Lda, DiscriminantMethod::Qda],
            test_size: default_test_size(),
            random_state: default_random_state(),
            cv_folds: default_cv_folds(),
            qda_reg_param: 1e-4,
        }
    }
}

impl DiscriminantConfig {
    pub fn target(&self) -> Result<&str> {
        required(&self.target, "target")
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Symptom matching
// ═══════════════════════════════════════════════════════════════════════════

/// `"auto"` or an explicit column list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymptomColumns {
    List(Vec<String>),
    Keyword(String),
}

impl Default for SymptomColumns {
    fn default() -> Self {
        SymptomColumns::Keyword("auto".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymptomModel {
    Bernoulli,
    Multinomial,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymptomMatchingConfig {
    pub disease_column: String,
    /// Identifier column excluded from the symptoms
    pub id_column: Option<String>,
    pub symptom_columns: SymptomColumns,
    pub model: SymptomModel,
    pub test_size: f64,
    pub random_state: u64,
    /// Naive Bayes additive smoothing
    pub alpha: f64,
    pub similarity_threshold: f64,
    pub top_predictions: usize,
}

impl Default for SymptomMatchingConfig {
    fn default() -> Self {
        Self {
            disease_column: "name".to_string(),
            id_column: Some("id".to_string()),
            symptom_columns: SymptomColumns::default(),
            model: SymptomModel::Bernoulli,
            test_size: default_test_size(),
            random_state: default_random_state(),
            alpha: 1.0,
            similarity_threshold: 0.3,
            top_predictions: 5,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Time series
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    Arima,
    Sarima,
    Holt,
}

impl ForecastMethod {
    pub fn key(&self) -> &'static str {
        match self {
            ForecastMethod::Arima => "arima",
            ForecastMethod::Sarima => "sarima",
            ForecastMethod::Holt => "holt",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesConfig {
    pub date_column: Option<String>,
    pub target_column: Option<String>,
    pub methods: Vec<ForecastMethod>,
    pub forecast_periods: usize,
    /// (p, d, q); the moving-average order q is not modelled
    pub arima_order: Vec<usize>,
    /// (p, d, q) of the non-seasonal part
    pub sarima_order: Vec<usize>,
    /// (P, D, Q, s); Q is not modelled
    pub sarima_seasonal_order: Vec<usize>,
    pub test_size: f64,
    pub holt_alpha: Option<f64>,
    pub holt_beta: Option<f64>,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            date_column: None,
            target_column: None,
            methods: vec![ForecastMethod::Arima],
            forecast_periods: 30,
            arima_order: vec![1, 1, 0],
            sarima_order: vec![1, 1, 1],
            sarima_seasonal_order: vec![1, 1, 1, 12],
            test_size: default_test_size(),
            holt_alpha: None,
            holt_beta: None,
        }
    }
}

impl TimeSeriesConfig {
    pub fn date_column(&self) -> Result<&str> {
        required(&self.date_column, "date_column")
    }

    pub fn target_column(&self) -> Result<&str> {
        required(&self.target_column, "target_column")
    }

    /// AR order and differencing order
    pub fn ar_order(&self) -> Result<(usize, usize)> {
        order_pd(&self.arima_order, "arima_order")
    }

    /// Non-seasonal (p, d) and seasonal (P, D, s)
    pub fn seasonal_order(&self) -> Result<((usize, usize), (usize, usize, usize))> {
        let pd = order_pd(&self.sarima_order, "sarima_order")?;
        match self.sarima_seasonal_order.as_slice() {
            [sp, sd, _, s] if *s >= 2 => Ok((pd, (*sp, *sd, *s))),
            other => Err(StudioError::ConfigError(format!(
                "sarima_seasonal_order must be [P, D, Q, s] with s >= 2, got {:?}",
                other
            ))),
        }
    }
}

fn order_pd(order: &[usize], key: &str) -> Result<(usize, usize)> {
    match order {
        [p, d] | [p, d, _] => Ok((*p, *d)),
        other => Err(StudioError::ConfigError(format!(
            "{} must be [p, d] or [p, d, q], got {:?}",
            key, other
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Clustering
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringMethod {
    Kmeans,
    Dbscan,
    Hierarchical,
    Gmm,
}

impl ClusteringMethod {
    pub fn key(&self) -> &'static str {
        match self {
            ClusteringMethod::Kmeans => "kmeans",
            ClusteringMethod::Dbscan => "dbscan",
            ClusteringMethod::Hierarchical => "hierarchical",
            ClusteringMethod::Gmm => "gmm",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Empty means every column
    pub features: Vec<String>,
    pub methods: Vec<ClusteringMethod>,
    /// Clusters for K-Means and hierarchical, components for GMM
    pub n_clusters: usize,
    pub max_iter: usize,
    pub random_state: u64,
    /// Standardize features before clustering
    pub scale: bool,
    /// Report inertia and silhouette for k = 2..=10
    pub find_optimal_k: bool,
    /// DBSCAN neighborhood radius
    pub eps: f64,
    pub min_samples: usize,
    pub linkage: Linkage,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            features: Vec::new(),
            methods: vec![ClusteringMethod::Kmeans],
            n_clusters: 3,
            max_iter: 300,
            random_state: default_random_state(),
            scale: true,
            find_optimal_k: false,
            eps: 0.5,
            min_samples: 5,
            linkage: Linkage::Ward,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Neural networks
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeuralTask {
    #[default]
    Classification,
    Regression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeuralMethod {
    #[serde(alias = "mlp_sklearn")]
    Mlp,
}

impl NeuralMethod {
    pub fn key(&self) -> &'static str {
        match self {
            NeuralMethod::Mlp => "mlp",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralNetworkConfig {
    pub target: Option<String>,
    pub features: Vec<String>,
    pub task: NeuralTask,
    pub methods: Vec<NeuralMethod>,
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// L2 penalty
    pub alpha: f64,
    pub test_size: f64,
    pub random_state: u64,
}

impl Default for NeuralNetworkConfig {
    fn default() -> Self {
        Self {
            target: None,
            features: Vec::new(),
            task: NeuralTask::Classification,
            methods: vec![NeuralMethod::Mlp],
            hidden_layers: vec![100, 50],
            activation: Activation::Relu,
            epochs: 200,
            learning_rate: 0.001,
            batch_size: 32,
            alpha: 0.0001,
            test_size: default_test_size(),
            random_state: default_random_state(),
        }
    }
}

impl NeuralNetworkConfig {
    pub fn target(&self) -> Result<&str> {
        required(&self.target, "target")
    }
}
