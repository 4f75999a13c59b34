//! Encoding pipeline stages
//!
//! Raw columns go through a fixed sequence of stages, each with a narrow contract:
//!
//! | Stage           | Input                     | Output                                   |
//! |-----------------|---------------------------|------------------------------------------|
//! | `Classify`      | raw column (fit only)     | frozen [`ColumnKind`]                    |
//! | `BooleanToInt`  | boolean column            | 0/1, missing treated as 0                |
//! | `TemporalToInt` | date/time column          | nanoseconds since epoch or missing       |
//! | `OneHot`        | categorical column        | one 0/1 column per value plus `<col>_nan`|
//! | `NumericCoerce` | numeric column            | number or missing                        |
//! | `MeanFill`      | numbers with gaps         | dense numbers (training mean, else 0)    |

use super::value::RawValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Name of each pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Classify,
    BooleanToInt,
    TemporalToInt,
    OneHot,
    NumericCoerce,
    MeanFill,
}

impl Stage {
    pub const PIPELINE: [Stage; 6] = [
        Stage::Classify,
        Stage::BooleanToInt,
        Stage::TemporalToInt,
        Stage::OneHot,
        Stage::NumericCoerce,
        Stage::MeanFill,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::BooleanToInt => "boolean_to_int",
            Stage::TemporalToInt => "temporal_to_int",
            Stage::OneHot => "one_hot",
            Stage::NumericCoerce => "numeric_coerce",
            Stage::MeanFill => "mean_fill",
        }
    }
}

/// Kind assigned to a raw column when the encoder is fitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Boolean,
    Temporal,
    Numeric,
    Categorical,
}

/// An encoded output column; `None` marks a missing value still to be filled
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Suffix of the one-hot column reserved for missing values
pub const MISSING_CATEGORY: &str = "nan";

/// Name of the one-hot column for `category` of `column`
pub fn one_hot_name(column: &str, category: &str) -> String {
    format!("{}_{}", column, category)
}

/// Classify: decide how a training column is encoded.
///
/// Columns with no observed values are numeric so that they survive as a single
/// zero-filled column.
pub fn classify(values: &[RawValue]) -> ColumnKind {
    let present: Vec<&RawValue> = values.iter().filter(|v| !v.is_null()).collect();
    if present.is_empty() {
        return ColumnKind::Numeric;
    }

    if present.iter().all(|v| matches!(v, RawValue::Bool(_))) {
        return ColumnKind::Boolean;
    }

    if present.iter().all(|v| match v {
        RawValue::Number(_) => true,
        RawValue::Text(s) => super::value::parse_number(s).is_some(),
        _ => false,
    }) {
        return ColumnKind::Numeric;
    }

    if present.iter().all(|v| match v {
        RawValue::DateTime(_) => true,
        RawValue::Text(s) => super::value::parse_datetime(s).is_some(),
        _ => false,
    }) {
        return ColumnKind::Temporal;
    }

    ColumnKind::Categorical
}

/// BooleanToInt: `true` → 1, `false` or missing → 0.
///
/// Numbers and the usual boolean spellings are accepted so that clients may send
/// `1`/`0` or `"yes"`/`"no"` for a boolean column.
pub fn boolean_to_int(values: &[RawValue]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| match v {
            RawValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            RawValue::Null => Some(0.0),
            RawValue::Number(x) if x.is_nan() => Some(0.0),
            RawValue::Number(x) => Some(*x),
            RawValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "t" | "1" => Some(1.0),
                "false" | "no" | "n" | "f" | "0" | "" => Some(0.0),
                _ => None,
            },
            RawValue::DateTime(_) => None,
        })
        .collect()
}

/// TemporalToInt: dates become nanoseconds since the epoch, anything else missing
pub fn temporal_to_int(values: &[RawValue]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| match v {
            RawValue::Number(x) if !x.is_nan() => Some(*x),
            other => other.as_datetime().map(|ns| ns as f64),
        })
        .collect()
}

/// Sorted distinct labels observed in a categorical column
pub fn categories(values: &[RawValue]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.label())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// OneHot: expand a categorical column into indicator columns.
///
/// One column per category in `categories` (sorted), then the missing-value
/// column. A value outside `categories` sets none of the indicators.
pub fn one_hot(column: &str, values: &[RawValue], categories: &[String]) -> Vec<EncodedColumn> {
    let labels: Vec<Option<String>> = values.iter().map(|v| v.label()).collect();

    let mut out: Vec<EncodedColumn> = categories
        .iter()
        .map(|category| EncodedColumn {
            name: one_hot_name(column, category),
            values: labels
                .iter()
                .map(|l| Some(if l.as_deref() == Some(category.as_str()) { 1.0 } else { 0.0 }))
                .collect(),
        })
        .collect();

    out.push(EncodedColumn {
        name: one_hot_name(column, MISSING_CATEGORY),
        values: labels
            .iter()
            .map(|l| Some(if l.is_none() { 1.0 } else { 0.0 }))
            .collect(),
    });

    out
}

/// NumericCoerce: anything that does not read as a number becomes missing
pub fn numeric_coerce(values: &[RawValue]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| match v {
            RawValue::Number(x) if x.is_nan() => None,
            RawValue::Number(x) => Some(*x),
            RawValue::Text(s) => super::value::parse_number(s),
            RawValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        })
        .collect()
}

/// Mean of the present values; `None` when nothing is present
pub fn column_mean(values: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// MeanFill: replace missing values with the fitted fill value
pub fn mean_fill(values: &[Option<f64>], fill: f64) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(fill)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    #[test]
    fn test_pipeline_order() {
        let names: Vec<&str> = Stage::PIPELINE.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["classify", "boolean_to_int", "temporal_to_int", "one_hot", "numeric_coerce", "mean_fill"]
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&[RawValue::Bool(true), RawValue::Null]), ColumnKind::Boolean);
        assert_eq!(classify(&[RawValue::Number(1.0), text("2.5")]), ColumnKind::Numeric);
        assert_eq!(classify(&[text("2024-01-01"), RawValue::DateTime(0)]), ColumnKind::Temporal);
        assert_eq!(classify(&[text("red"), text("blue")]), ColumnKind::Categorical);
        assert_eq!(classify(&[RawValue::Null, RawValue::Null]), ColumnKind::Numeric);
        assert_eq!(classify(&[RawValue::Bool(true), RawValue::Number(3.0)]), ColumnKind::Categorical);
    }

    #[test]
    fn test_boolean_to_int() {
        let out = boolean_to_int(&[RawValue::Bool(true), RawValue::Bool(false), RawValue::Null, text("yes"), text("maybe")]);
        assert_eq!(out, vec![Some(1.0), Some(0.0), Some(0.0), Some(1.0), None]);
    }

    #[test]
    fn test_temporal_to_int() {
        let out = temporal_to_int(&[text("1970-01-02"), RawValue::Null, text("soon")]);
        assert_eq!(out, vec![Some(86_400_000_000_000.0), None, None]);
    }

    #[test]
    fn test_one_hot_reserves_missing_column() {
        let values = vec![text("red"), RawValue::Null, text("green"), text("purple")];
        let cats = vec!["green".to_string(), "red".to_string()];
        let cols = one_hot("color", &values, &cats);

        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["color_green", "color_red", "color_nan"]);
        assert_eq!(cols[1].values, vec![Some(1.0), Some(0.0), Some(0.0), Some(0.0)]);
        assert_eq!(cols[2].values, vec![Some(0.0), Some(1.0), Some(0.0), Some(0.0)]);
        // unseen "purple" contributes nothing
        assert!(cols.iter().all(|c| c.values[3] == Some(0.0)));
    }

    #[test]
    fn test_categories_sorted_distinct() {
        let cats = categories(&[text("b"), text("a"), RawValue::Null, text("b"), RawValue::Number(2.0)]);
        assert_eq!(cats, vec!["2", "a", "b"]);
    }

    #[test]
    fn test_numeric_coerce_and_fill() {
        let coerced = numeric_coerce(&[RawValue::Number(2.0), text("x"), text("4"), RawValue::Null]);
        assert_eq!(coerced, vec![Some(2.0), None, Some(4.0), None]);

        let mean = column_mean(&coerced).unwrap();
        assert_eq!(mean, 3.0);
        assert_eq!(mean_fill(&coerced, mean), vec![2.0, 3.0, 4.0, 3.0]);
        assert_eq!(column_mean(&[None, None]), None);
    }
}
