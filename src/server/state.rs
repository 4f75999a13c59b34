//! Application state management

use std::sync::Arc;
use std::time::Instant;

use crate::inference::InferenceEngine;
use crate::registry::ModelRegistry;

use super::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<ModelRegistry>,
    pub engine: InferenceEngine,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(match config.registry_capacity {
            Some(capacity) => ModelRegistry::with_capacity(capacity),
            None => ModelRegistry::new(),
        });
        Self::with_registry(config, registry)
    }

    /// State over an existing registry
    pub fn with_registry(config: ServerConfig, registry: Arc<ModelRegistry>) -> Self {
        Self {
            config,
            engine: InferenceEngine::new(Arc::clone(&registry)),
            registry,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Get system information
    pub fn get_system_info(&self) -> serde_json::Value {
        use sysinfo::System;

        let mut sys = System::new_all();
        sys.refresh_all();

        let cpus = sys.cpus().len().max(1);
        let cpu_usage: f32 = sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus as f32;
        let total = sys.total_memory().max(1) as f64;

        serde_json::json!({
            "cpu_count": sys.cpus().len(),
            "cpu_usage": cpu_usage,
            "total_memory_gb": sys.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
            "used_memory_gb": sys.used_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
            "memory_usage_percent": sys.used_memory() as f64 / total * 100.0,
        })
    }
}
