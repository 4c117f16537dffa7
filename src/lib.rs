//! ShopSight: customer analytics over retail transaction logs.
//!
//! The pipeline loads a CSV of transactions, cleans it, derives per-customer
//! and per-day aggregates, segments customers with K-Means, and forecasts
//! daily revenue with a seasonal time-series model. Every stage is a pure
//! function over typed record collections so each can be tested in isolation.

pub mod cli;
pub mod cluster;
pub mod data;
pub mod features;
pub mod forecast;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use cluster::{compare_cluster_counts, segment, KMeansOptions, Segmentation};
pub use data::{load_transactions, Transaction};
pub use features::{build_daily_sales, build_user_features, DailySales, UserFeatures};
pub use forecast::{run_forecast, ForecastMetrics, ForecastOutput, ForecastRow};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
