//! Integration test: training/serving encoding contract

use stat_studio::inference::{predict_entry, Prediction, TOP_K};
use stat_studio::preprocessing::{EncodedTarget, FeatureEncoder, LabelCodec, RawValue, Table};
use stat_studio::registry::{FittedModel, ModelType, TrainedModelEntry};
use stat_studio::training::{BernoulliNaiveBayes, Classifier};
use serde_json::{json, Map, Value};

fn training_table() -> Table {
    let rows: Vec<Value> = (0..12)
        .map(|i| {
            json!({
                "cough": i % 2 == 0,
                "fever": i % 3 == 0,
                "age": 20 + i * 3,
                "city": (["paris", "lima", "oslo"][i % 3]),
                "seen": format!("2024-02-{:02}", i + 1),
            })
        })
        .collect();
    Table::from_json_rows(&rows).unwrap()
}

fn fitted_encoder() -> FeatureEncoder {
    let mut encoder = FeatureEncoder::new();
    encoder.fit(&training_table()).unwrap();
    encoder
}

fn record(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_schema_is_stable_across_calls() {
    let encoder = fitted_encoder();
    let schema = encoder.feature_schema().columns().to_vec();
    assert_eq!(
        schema,
        vec!["cough", "fever", "age", "city_lima", "city_oslo", "city_paris", "city_nan", "seen"]
    );

    let features = record(json!({"fever": true, "city": "oslo"}));
    let first = encoder.transform_record(&features).unwrap();
    let second = encoder.transform_record(&features).unwrap();
    assert_eq!(first.len(), schema.len());
    assert_eq!(first, second);
    assert_eq!(encoder.feature_schema().columns(), schema.as_slice());
}

#[test]
fn test_training_rows_match_single_record_encoding() {
    let table = training_table();
    let mut encoder = FeatureEncoder::new();
    let batch = encoder.fit_transform(&table).unwrap();

    let row = encoder
        .transform_record(&record(json!({
            "cough": true,
            "fever": true,
            "age": 20,
            "city": "paris",
            "seen": "2024-02-01",
        })))
        .unwrap();
    assert_eq!(row, batch.row(0).to_owned());
}

#[test]
fn test_missing_keys_match_explicit_defaults() {
    let encoder = fitted_encoder();

    let sparse = encoder.transform_record(&record(json!({"cough": true}))).unwrap();
    let explicit = encoder
        .transform_record(&record(json!({
            "cough": true,
            "fever": false,
            "age": null,
            "city": null,
            "seen": null,
        })))
        .unwrap();
    assert_eq!(sparse, explicit);
}

#[test]
fn test_absent_numeric_key_takes_training_mean_but_zero_stays_zero() {
    let encoder = fitted_encoder();
    let age = encoder.feature_schema().position("age").unwrap();

    let absent = encoder.transform_record(&record(json!({}))).unwrap();
    let zero = encoder.transform_record(&record(json!({"age": 0}))).unwrap();

    // ages are 20, 23, ..., 53
    assert_eq!(absent[age], 36.5);
    assert_eq!(zero[age], 0.0);
    assert_ne!(absent, zero);
}

#[test]
fn test_unseen_category_is_dropped() {
    let encoder = fitted_encoder();
    let row = encoder
        .transform_record(&record(json!({"city": "atlantis", "cough": true})))
        .unwrap();
    assert_eq!(row.len(), encoder.feature_schema().len());

    let one_hot: f64 = encoder
        .feature_schema()
        .columns()
        .iter()
        .zip(row.iter())
        .filter(|(name, _)| name.starts_with("city_"))
        .map(|(_, v)| *v)
        .sum();
    assert_eq!(one_hot, 0.0);
}

#[test]
fn test_unknown_raw_keys_are_ignored() {
    let encoder = fitted_encoder();
    let with_extra = encoder
        .transform_record(&record(json!({"cough": true, "height": 180, "notes": "x"})))
        .unwrap();
    let without = encoder.transform_record(&record(json!({"cough": true}))).unwrap();
    assert_eq!(with_extra, without);
    assert_eq!(encoder.count_non_default(&record(json!({"cough": true, "height": 180}))), 1);
}

#[test]
fn test_label_round_trip() {
    let labels = ["flu", "cold", "measles", "cold", "Flu", "chickenpox"];
    let codec = LabelCodec::fit(&labels).unwrap();
    assert_eq!(codec.n_classes(), 5);
    for label in labels {
        let code = codec.encode(label).unwrap();
        assert_eq!(codec.decode(code as i64).unwrap(), label);
    }
    assert!(codec.decode(5).is_err());
    assert!(codec.decode(-1).is_err());

    let values: Vec<RawValue> = labels.iter().map(|l| RawValue::Text(l.to_string())).collect();
    let target = EncodedTarget::from_values(&values).unwrap();
    for (label, code) in labels.iter().zip(target.y.iter()) {
        assert_eq!(EncodedTarget::decode_class(target.codec.as_ref(), *code).unwrap(), *label);
    }
}

#[test]
fn test_numeric_target_has_no_codec() {
    let values = vec![RawValue::Number(1.0), RawValue::Number(3.0), RawValue::Number(1.0)];
    let target = EncodedTarget::from_values(&values).unwrap();
    assert!(target.codec.is_none());
    assert_eq!(EncodedTarget::decode_class(None, 3.0).unwrap(), "3");
}

#[test]
fn test_top_k_bound_with_many_classes() {
    let n_classes = 500;
    let rows: Vec<Value> = (0..n_classes)
        .map(|i| {
            let mut row = Map::new();
            for bit in 0..9 {
                row.insert(format!("s{}", bit), json!((i >> bit) & 1 == 1));
            }
            row.insert("label".to_string(), json!(format!("class_{:03}", i)));
            Value::Object(row)
        })
        .collect();
    let table = Table::from_json_rows(&rows).unwrap();
    let features: Vec<String> = (0..9).map(|b| format!("s{}", b)).collect();

    let mut encoder = FeatureEncoder::new();
    let x = encoder.fit_transform(&table.select(&features).unwrap()).unwrap();
    let target = EncodedTarget::from_values(&table.require("label").unwrap().values).unwrap();

    let mut model = BernoulliNaiveBayes::new(1.0);
    model.fit(&x, &target.y).unwrap();

    let entry = TrainedModelEntry::new(
        ModelType::SymptomMatching,
        encoder,
        FittedModel::Classifier(Box::new(model)),
        "bernoulli",
    )
    .with_label_codec(target.codec);

    let prediction = predict_entry(&entry, &record(json!({"s0": true, "s4": true}))).unwrap();
    match prediction {
        Prediction::Classes(classes) => {
            assert_eq!(classes.predictions.len(), TOP_K);
            assert_eq!(classes.n_features_used, 2);
            assert_eq!(classes.total_features, 9);
            // s0 + s4 only is class 17
            assert_eq!(classes.top_prediction.unwrap().class, "class_017");
        }
        other => panic!("expected ranked classes, got {:?}", other),
    }
}
