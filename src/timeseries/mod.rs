//! Time series module
//!
//! Provides forecasting over a single dated series:
//! - Differencing with forecast integration
//! - AR(p) on a differenced series ("ARIMA(p, d, 0)")
//! - Seasonal AR with seasonal differencing ("SARIMA(p, d, 0)x(P, D, 0, s)")
//! - Holt's linear trend smoothing
//! - Hold-out forecast metrics
//! - Autocorrelations and the augmented Dickey-Fuller test

mod diagnostics;
mod forecast;
mod transforms;

pub use diagnostics::{acf, adf_p_value, adf_test, pacf, AdfResult, Correlogram};
pub use forecast::{ArimaModel, Forecast, ForecastMetrics, Forecaster, HoltSmoother, SarimaModel};
pub use transforms::{Differencer, SeasonalDifferencer};
