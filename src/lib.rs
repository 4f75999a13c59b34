//! Stat Studio - statistical analysis and model serving
//!
//! Trains models over uploaded rows and serves predictions from the model
//! most recently trained for each dataset id. Training and serving share a
//! frozen feature encoding so a single sparse record is reconstructed into
//! exactly the vector the model was fitted on.
//!
//! # Modules
//!
//! ## Core
//! - [`preprocessing`] - Raw tables, the staged feature encoder, label codec, scaling
//! - [`training`] - Regressors, classifiers, clustering, metrics and cross-validation
//! - [`timeseries`] - Differencing, AR and Holt forecasters
//! - [`analysis`] - Analysis families: evaluate methods, refit the best, build the entry
//!
//! ## Serving
//! - [`registry`] - Dataset id to trained model map
//! - [`inference`] - Single-record predictions with ranked, decoded classes
//!
//! ## Services
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core ML modules
pub mod preprocessing;
pub mod training;
pub mod timeseries;
pub mod analysis;

// Serving
pub mod registry;
pub mod inference;

// Services
pub mod server;
pub mod cli;

pub use error::{Result, StudioError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Result, StudioError};

    pub use crate::preprocessing::{FeatureEncoder, FeatureSchema, LabelCodec, RawFeatureSpec, RawValue, Table};

    pub use crate::analysis::{run_analysis, AnalysisFamily, AnalysisOutcome};

    pub use crate::registry::{ModelRegistry, ModelType, TrainedModelEntry};
    pub use crate::inference::{InferenceEngine, Prediction, TOP_K};

    pub use crate::server::{create_router, AppState, ServerConfig};
}
