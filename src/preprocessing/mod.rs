//! Data preprocessing module
//!
//! Turns raw tabular rows into the numeric matrices models consume:
//! - Raw cell model and row tables (JSON rows, polars DataFrames)
//! - Named encoding stages (boolean, temporal, one-hot, numeric coercion, mean fill)
//! - The feature encoder that freezes the column layout at training time
//! - Label codec for non-numeric classification targets
//! - Standard scaling

mod encoder;
mod label_codec;
mod scaler;
pub mod stages;
pub mod table;
pub mod value;

pub use encoder::{FeatureEncoder, FeatureSchema, RawFeatureSpec};
pub use label_codec::{EncodedTarget, LabelCodec};
pub use scaler::StandardScaler;
pub use stages::{ColumnKind, Stage};
pub use table::{Column, Table};
pub use value::RawValue;
