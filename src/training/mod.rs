//! Model training module
//!
//! Estimators behind the analysis families:
//! - Linear models (OLS, Ridge, Lasso, ElasticNet, Polynomial, Logistic)
//! - Decision trees, Random Forests and Gradient Boosting
//! - K-Nearest Neighbors
//! - Naive Bayes (Gaussian, Bernoulli, Multinomial)
//! - Linear Support Vector Machines
//! - Linear and Quadratic Discriminant Analysis
//! - Multi-layer perceptrons
//! - K-Means, DBSCAN, agglomerative clustering and Gaussian mixtures
//!
//! Supervised estimators implement [`Regressor`] or [`Classifier`]; a
//! classifier that can produce class probabilities also exposes
//! [`ProbabilisticClassifier`] through [`Classifier::as_probabilistic`].

mod models;
pub mod cross_validation;
pub mod linear_models;
pub mod decision_tree;
pub mod random_forest;
pub mod gradient_boosting;
pub mod knn;
pub mod naive_bayes;
pub mod svm;
pub mod discriminant;
pub mod neural_network;
pub mod clustering;

pub use models::{
    unique_classes, Classifier, ConfusionMatrix, ModelMetrics, ProbabilisticClassifier, Regressor,
};
pub use cross_validation::{
    cross_val_accuracy, cross_val_r2, train_test_split, CVResults, CVSplit, CVStrategy, CrossValidator,
};
pub use linear_models::{ElasticNet, LinearRegression, LogisticRegression, PolynomialRegression};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use random_forest::RandomForest;
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use knn::{KNNClassifier, WeightScheme};
pub use naive_bayes::{BernoulliNaiveBayes, GaussianNaiveBayes, MultinomialNaiveBayes};
pub use svm::{LinearSVC, SVMConfig};
pub use discriminant::{LinearDiscriminant, QuadraticDiscriminant};
pub use neural_network::{Activation, MLPClassifier, MLPConfig, MLPRegressor};
pub use clustering::{
    calinski_harabasz_score, davies_bouldin_score, silhouette_score, AgglomerativeClustering,
    GaussianMixture, KMeans, Linkage, DBSCAN,
};
