//! Inference engine module
//!
//! Real-time predictions against the model registry:
//! - Single-row reconstruction on the frozen feature schema
//! - Class probabilities, with a uniform distribution for models without them
//! - Decoded labels ranked and bounded to [`TOP_K`]
//! - Scalar predictions for regression entries

mod engine;

pub use engine::{
    predict_entry, ClassPrediction, InferenceEngine, InferenceStats, Prediction, RankedClass,
    ValuePrediction, TOP_K,
};
