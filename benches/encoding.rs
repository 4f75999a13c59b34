use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Map, Value};
use stat_studio::inference::predict_entry;
use stat_studio::preprocessing::{EncodedTarget, FeatureEncoder, Table};
use stat_studio::registry::{FittedModel, ModelType, TrainedModelEntry};
use stat_studio::training::{BernoulliNaiveBayes, Classifier};

const CITIES: [&str; 6] = ["paris", "lima", "oslo", "cairo", "quito", "hanoi"];

fn create_rows(n_rows: usize, n_symptoms: usize) -> Vec<Value> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    (0..n_rows)
        .map(|i| {
            let mut row = Map::new();
            for s in 0..n_symptoms {
                row.insert(format!("symptom_{}", s), json!(rng.gen_bool(0.3)));
            }
            row.insert("age".to_string(), json!(rng.gen_range(1..90)));
            row.insert("city".to_string(), json!(CITIES[rng.gen_range(0..CITIES.len())]));
            row.insert("disease".to_string(), json!(format!("d{}", i % 40)));
            Value::Object(row)
        })
        .collect()
}

fn bench_encoder_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoder_fit");
    group.sample_size(20);

    for n_rows in [1_000, 10_000].iter() {
        let table = Table::from_json_rows(&create_rows(*n_rows, 20)).unwrap();

        group.bench_with_input(BenchmarkId::new("fit_transform", n_rows), &table, |b, table| {
            b.iter(|| {
                let mut encoder = FeatureEncoder::new();
                encoder.fit_transform(black_box(table)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_single_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_record");

    let rows = create_rows(2_000, 20);
    let table = Table::from_json_rows(&rows).unwrap();
    let features: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|c| c != "disease")
        .collect();

    let mut encoder = FeatureEncoder::new();
    let x = encoder.fit_transform(&table.select(&features).unwrap()).unwrap();
    let target = EncodedTarget::from_values(&table.require("disease").unwrap().values).unwrap();
    let mut model = BernoulliNaiveBayes::new(1.0);
    model.fit(&x, &target.y).unwrap();

    let record: Map<String, Value> = [
        ("symptom_1".to_string(), json!(true)),
        ("symptom_7".to_string(), json!(true)),
        ("city".to_string(), json!("lima")),
    ]
    .into_iter()
    .collect();

    group.bench_function("transform_record", |b| {
        b.iter(|| encoder.transform_record(black_box(&record)).unwrap())
    });

    let entry = TrainedModelEntry::new(
        ModelType::SymptomMatching,
        encoder,
        FittedModel::Classifier(Box::new(model)),
        "bernoulli",
    )
    .with_label_codec(target.codec);

    group.bench_function("predict_entry", |b| {
        b.iter(|| predict_entry(black_box(&entry), black_box(&record)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_encoder_fit, bench_single_record);
criterion_main!(benches);
