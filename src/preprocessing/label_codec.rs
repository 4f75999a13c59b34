//! Label codec for classification targets

use crate::error::{Result, StudioError};
use super::value::{format_number, RawValue};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Bijection between the distinct training labels and dense integer codes.
///
/// Codes follow the sorted order of the labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelCodec {
    classes: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl LabelCodec {
    /// Fit on the training labels
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let classes: Vec<String> = labels
            .iter()
            .map(|l| l.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if classes.is_empty() {
            return Err(StudioError::DataError("Cannot fit a label codec on no labels".to_string()));
        }

        let index = classes.iter().enumerate().map(|(i, c)| (c.clone(), i)).collect();
        Ok(Self { classes, index })
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Code for a label seen during fit
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.lookup(label)
            .ok_or_else(|| StudioError::DataError(format!("Label '{}' was not seen during fit", label)))
    }

    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Array1<f64>> {
        labels
            .iter()
            .map(|l| self.encode(l.as_ref()).map(|c| c as f64))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from)
    }

    /// Label for a code; codes outside the fitted range fail
    pub fn decode(&self, code: i64) -> Result<&str> {
        if code < 0 || code as usize >= self.classes.len() {
            return Err(StudioError::UnknownLabelCode {
                code,
                n_classes: self.classes.len(),
            });
        }
        Ok(&self.classes[code as usize])
    }

    /// Label → code mapping for reporting
    pub fn mapping(&self) -> BTreeMap<String, usize> {
        self.classes.iter().enumerate().map(|(i, c)| (c.clone(), i)).collect()
    }

    fn lookup(&self, label: &str) -> Option<usize> {
        if self.index.is_empty() {
            // index is not serialized; fall back to the sorted class list
            return self.classes.binary_search_by(|c| c.as_str().cmp(label)).ok();
        }
        self.index.get(label).copied()
    }
}

// The lookup index is derived from `classes` and absent after deserialization.
impl PartialEq for LabelCodec {
    fn eq(&self, other: &Self) -> bool {
        self.classes == other.classes
    }
}

impl Eq for LabelCodec {}

/// A classification target ready for training
#[derive(Debug, Clone)]
pub struct EncodedTarget {
    /// Class identifiers: codec codes, or the raw numeric values
    pub y: Array1<f64>,
    /// Installed only when the raw target was not numeric
    pub codec: Option<LabelCodec>,
}

impl EncodedTarget {
    /// Encode target values; all cells must be present.
    ///
    /// A fully numeric target keeps its values and installs no codec.
    pub fn from_values(values: &[RawValue]) -> Result<Self> {
        if let Some(pos) = values.iter().position(|v| v.is_null()) {
            return Err(StudioError::DataError(format!("Target value missing at row {}", pos)));
        }

        let numeric: Option<Vec<f64>> = values
            .iter()
            .map(|v| match v {
                RawValue::Number(x) => Some(*x),
                _ => None,
            })
            .collect();

        if let Some(y) = numeric {
            return Ok(Self { y: Array1::from(y), codec: None });
        }

        let labels: Vec<String> = values.iter().filter_map(|v| v.label()).collect();
        let codec = LabelCodec::fit(&labels)?;
        let y = codec.encode_all(&labels)?;
        Ok(Self { y, codec: Some(codec) })
    }

    /// Transport label for a class identifier
    pub fn decode_class(codec: Option<&LabelCodec>, class_id: f64) -> Result<String> {
        match codec {
            Some(codec) => codec.decode(class_id.round() as i64).map(str::to_string),
            None => Ok(format_number(class_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_sorted_codes() {
        let codec = LabelCodec::fit(&["flu", "cold", "flu", "allergy"]).unwrap();
        assert_eq!(codec.classes(), &["allergy", "cold", "flu"]);
        assert_eq!(codec.encode("cold").unwrap(), 1);
        assert!(codec.encode("measles").is_err());
    }

    #[test]
    fn test_round_trip() {
        let labels = ["b", "a", "c", "a"];
        let codec = LabelCodec::fit(&labels).unwrap();
        for label in labels {
            let code = codec.encode(label).unwrap() as i64;
            assert_eq!(codec.decode(code).unwrap(), label);
        }
    }

    #[test]
    fn test_decode_out_of_range() {
        let codec = LabelCodec::fit(&["x", "y"]).unwrap();
        assert!(matches!(
            codec.decode(2),
            Err(StudioError::UnknownLabelCode { code: 2, n_classes: 2 })
        ));
        assert!(codec.decode(-1).is_err());
    }

    #[test]
    fn test_numeric_target_has_no_codec() {
        let target = EncodedTarget::from_values(&[RawValue::Number(1.0), RawValue::Number(0.0)]).unwrap();
        assert!(target.codec.is_none());
        assert_eq!(EncodedTarget::decode_class(None, 1.0).unwrap(), "1");
    }

    #[test]
    fn test_text_target_installs_codec() {
        let values = vec![RawValue::Text("yes".into()), RawValue::Text("no".into())];
        let target = EncodedTarget::from_values(&values).unwrap();
        let codec = target.codec.as_ref().unwrap();
        assert_eq!(target.y.to_vec(), vec![1.0, 0.0]);
        assert_eq!(EncodedTarget::decode_class(Some(codec), 0.0).unwrap(), "no");
    }

    #[test]
    fn test_missing_target_rejected() {
        assert!(EncodedTarget::from_values(&[RawValue::Null]).is_err());
    }

    #[test]
    fn test_codec_survives_serialization() {
        let codec = LabelCodec::fit(&["a", "b"]).unwrap();
        let json = serde_json::to_string(&codec).unwrap();
        let restored: LabelCodec = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.encode("b").unwrap(), 1);
        assert_eq!(restored, codec);
        assert_ne!(restored, LabelCodec::fit(&["a", "c"]).unwrap());
    }
}
