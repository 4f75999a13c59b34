//! Clustering analysis over K-Means, DBSCAN, hierarchical and Gaussian mixtures;
//! results only, nothing is stored

use super::config::{ClusteringConfig, ClusteringMethod};
use super::{improves, round4};
use crate::error::{Result, StudioError};
use crate::preprocessing::{FeatureEncoder, StandardScaler, Table};
use crate::training::{
    calinski_harabasz_score, davies_bouldin_score, silhouette_score, AgglomerativeClustering,
    GaussianMixture, KMeans, DBSCAN,
};
use ndarray::{Array2, Axis};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

const MAX_ELBOW_K: usize = 10;
const SAMPLE_SIZE: usize = 100;

fn fit_kmeans(x: &Array2<f64>, k: usize, cfg: &ClusteringConfig) -> Result<KMeans> {
    let mut model = KMeans::new(k)
        .with_max_iter(cfg.max_iter)
        .with_random_state(cfg.random_state);
    model.fit(x)?;
    Ok(model)
}

/// Inertia and silhouette for every k in 2..=min(10, n - 1)
fn elbow(x: &Array2<f64>, cfg: &ClusteringConfig) -> Result<Value> {
    let max_k = MAX_ELBOW_K.min(x.nrows().saturating_sub(1));
    let mut ks = Vec::new();
    let mut inertias = Vec::new();
    let mut silhouettes = Vec::new();
    let mut best: Option<(usize, f64)> = None;

    for k in 2..=max_k {
        let model = fit_kmeans(x, k, cfg)?;
        let silhouette = model.labels().and_then(|labels| silhouette_score(x, labels));
        if let Some(s) = silhouette {
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((k, s));
            }
        }
        ks.push(k);
        inertias.push(model.inertia().map(round4));
        silhouettes.push(silhouette.map(round4));
    }

    Ok(json!({
        "k_values": ks,
        "inertias": inertias,
        "silhouette_scores": silhouettes,
        "suggested_k": best.map(|(k, _)| k),
    }))
}

/// One named object per row of `centers`
fn named_rows(centers: &Array2<f64>, names: &[String]) -> Vec<Value> {
    centers
        .rows()
        .into_iter()
        .map(|row| {
            let named: Map<String, Value> = names
                .iter()
                .zip(row.iter())
                .map(|(name, v)| (name.clone(), json!(round4(*v))))
                .collect();
            Value::Object(named)
        })
        .collect()
}

/// Silhouette plus the two centroid-based indices
fn quality(x: &Array2<f64>, labels: &[usize]) -> Value {
    json!({
        "silhouette_score": silhouette_score(x, labels).map(round4),
        "davies_bouldin_score": davies_bouldin_score(x, labels).map(round4),
        "calinski_harabasz_score": calinski_harabasz_score(x, labels).map(round4),
    })
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

fn run_kmeans(x: &Array2<f64>, names: &[String], cfg: &ClusteringConfig) -> Result<Value> {
    let model = fit_kmeans(x, cfg.n_clusters, cfg)?;
    let labels = model.labels().ok_or(StudioError::ModelNotFitted)?;
    let elbow = if cfg.find_optimal_k { Some(elbow(x, cfg)?) } else { None };
    let base = json!({
        "method": "K-Means",
        "n_clusters": cfg.n_clusters,
        "labels": labels,
        "cluster_sizes": model.cluster_sizes(),
        "centroids": model.centroids().map(|c| named_rows(c, names)).unwrap_or_default(),
        "inertia": model.inertia().map(round4),
        "optimal_k": elbow,
    });
    Ok(merge(base, quality(x, labels)))
}

fn run_dbscan(x: &Array2<f64>, cfg: &ClusteringConfig) -> Result<Value> {
    let mut model = DBSCAN::new(cfg.eps, cfg.min_samples);
    model.fit(x)?;
    let labels = model.labels().ok_or(StudioError::ModelNotFitted)?;

    // noise is reported as -1; scores only cover clustered rows
    let reported: Vec<i64> = labels.iter().map(|l| l.map_or(-1, |c| c as i64)).collect();
    let clustered: Vec<usize> = (0..labels.len()).filter(|&i| labels[i].is_some()).collect();
    let clustered_labels: Vec<usize> = labels.iter().filter_map(|l| *l).collect();
    let scores = if model.n_clusters() >= 2 {
        quality(&x.select(Axis(0), &clustered), &clustered_labels)
    } else {
        json!({"silhouette_score": null, "davies_bouldin_score": null, "calinski_harabasz_score": null})
    };

    let n = labels.len().max(1) as f64;
    let base = json!({
        "method": "DBSCAN",
        "eps": cfg.eps,
        "min_samples": cfg.min_samples,
        "n_clusters": model.n_clusters(),
        "n_noise_points": model.n_noise(),
        "noise_percentage": round4(100.0 * model.n_noise() as f64 / n),
        "labels": reported,
        "cluster_sizes": model.cluster_sizes(),
    });
    Ok(merge(base, scores))
}

fn run_hierarchical(x: &Array2<f64>, cfg: &ClusteringConfig) -> Result<Value> {
    let mut model = AgglomerativeClustering::new(cfg.n_clusters, cfg.linkage);
    model.fit(x)?;
    let labels = model.labels().ok_or(StudioError::ModelNotFitted)?;
    let base = json!({
        "method": "Hierarchical",
        "linkage": cfg.linkage,
        "n_clusters": cfg.n_clusters,
        "labels": labels,
        "cluster_sizes": model.cluster_sizes(),
    });
    Ok(merge(base, quality(x, labels)))
}

fn run_gmm(x: &Array2<f64>, names: &[String], cfg: &ClusteringConfig) -> Result<Value> {
    let mut model = GaussianMixture::new(cfg.n_clusters)
        .with_max_iter(cfg.max_iter)
        .with_random_state(cfg.random_state);
    model.fit(x)?;
    let labels = model.predict(x)?;
    let proba = model.predict_proba(x)?;
    let probabilities_sample: Vec<Vec<f64>> = proba
        .rows()
        .into_iter()
        .take(SAMPLE_SIZE)
        .map(|row| row.iter().map(|p| round4(*p)).collect())
        .collect();
    let mut sizes = vec![0usize; cfg.n_clusters];
    for &l in &labels {
        sizes[l] += 1;
    }

    let base = json!({
        "method": "Gaussian Mixture",
        "n_components": cfg.n_clusters,
        "labels": labels,
        "cluster_sizes": sizes,
        "cluster_means": model.means().map(|m| named_rows(m, names)).unwrap_or_default(),
        "weights": model.weights().map(|w| w.iter().map(|v| round4(*v)).collect::<Vec<_>>()),
        "probabilities_sample": probabilities_sample,
        "log_likelihood": model.log_likelihood().map(round4),
        "aic": model.aic().map(round4),
        "bic": model.bic(x.nrows()).map(round4),
        "n_iterations": model.n_iter(),
    });
    Ok(merge(base, quality(x, &labels)))
}

pub(super) fn run(table: &Table, cfg: &ClusteringConfig) -> Result<Value> {
    if cfg.methods.is_empty() {
        return Err(StudioError::ConfigError(
            "methods must name at least one clustering method".to_string(),
        ));
    }
    let features = if cfg.features.is_empty() {
        table.clone()
    } else {
        table.select(&cfg.features)?
    };
    let n = features.n_rows();
    let needs_k = cfg.methods.iter().any(|m| *m != ClusteringMethod::Dbscan);
    if needs_k && (cfg.n_clusters < 2 || cfg.n_clusters > n) {
        return Err(StudioError::InvalidParameter {
            name: "n_clusters".to_string(),
            value: cfg.n_clusters.to_string(),
            reason: format!("must be between 2 and the number of rows ({})", n),
        });
    }

    let mut encoder = FeatureEncoder::new();
    let encoded = encoder.fit_transform(&features)?;
    let x = if cfg.scale {
        StandardScaler::new().fit_transform(&encoded)?
    } else {
        encoded
    };
    let names = encoder.feature_schema().columns();

    let mut results = Map::new();
    let mut comparison = Vec::new();
    let mut best: Option<(ClusteringMethod, f64)> = None;
    for &method in &cfg.methods {
        let outcome = match method {
            ClusteringMethod::Kmeans => run_kmeans(&x, names, cfg),
            ClusteringMethod::Dbscan => run_dbscan(&x, cfg),
            ClusteringMethod::Hierarchical => run_hierarchical(&x, cfg),
            ClusteringMethod::Gmm => run_gmm(&x, names, cfg),
        };
        match outcome {
            Ok(result) => {
                let silhouette = result["silhouette_score"].as_f64();
                debug!(method = method.key(), ?silhouette, "Clustering method fitted");
                comparison.push(json!({
                    "method": result["method"],
                    "key": method.key(),
                    "n_clusters": result["n_clusters"].as_u64().or(result["n_components"].as_u64()),
                    "silhouette_score": silhouette,
                }));
                if let Some(s) = silhouette {
                    if improves(s, best.map(|(_, b)| b)) {
                        best = Some((method, s));
                    }
                }
                results.insert(method.key().to_string(), result);
            }
            Err(e) => {
                warn!(method = method.key(), error = %e, "Clustering method failed");
                results.insert(method.key().to_string(), json!({"error": e.to_string()}));
            }
        }
    }
    if comparison.is_empty() {
        return Err(StudioError::TrainingError("No clustering method could be fitted".to_string()));
    }

    Ok(json!({
        "success": true,
        "n_samples": n,
        "features": encoder.raw_feature_spec().columns(),
        "encoded_features": names,
        "scaled": cfg.scale,
        "results": results,
        "summary": {
            "best_model_key": best.map(|(m, _)| m.key()),
            "comparison": comparison,
        },
    }))
}
