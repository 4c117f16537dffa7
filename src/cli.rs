//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

use crate::cluster::KMeansOptions;

/// Customer segmentation and daily revenue forecasting over transaction logs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input transactions CSV file
    #[arg(short, long, default_value = "transactions.csv")]
    pub input: PathBuf,

    /// Directory for the generated plot images
    #[arg(short, long, default_value = "outputs")]
    pub output_dir: PathBuf,

    /// Number of customer segments for K-Means
    #[arg(short = 'k', long, default_value_t = 4)]
    pub clusters: usize,

    /// Seed shared by the K-Means restarts and the t-SNE projection
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// First day of the forecast evaluation period (YYYY-MM-DD)
    #[arg(long, default_value = "2024-04-01", value_parser = parse_cutoff)]
    pub cutoff: NaiveDate,

    /// Also report the label distribution for each candidate cluster count
    #[arg(long)]
    pub compare_k: bool,

    /// Maximum iterations for the K-Means algorithm
    #[arg(long, default_value_t = 300)]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value_t = 1e-4)]
    pub tolerance: f64,

    /// Independent K-Means initializations; the best run is kept
    #[arg(long, default_value_t = 10)]
    pub restarts: usize,

    /// Skip writing plot images
    #[arg(long)]
    pub skip_plots: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Check argument combinations clap cannot express.
    pub fn validate(&self) -> crate::Result<()> {
        if !(2..=8).contains(&self.clusters) {
            anyhow::bail!(
                "cluster count must be between 2 and 8 for meaningful segments, got {}",
                self.clusters
            );
        }
        if self.restarts == 0 {
            anyhow::bail!("at least one K-Means restart is required");
        }
        if self.tolerance <= 0.0 {
            anyhow::bail!("tolerance must be positive, got {}", self.tolerance);
        }
        Ok(())
    }

    pub fn kmeans_options(&self) -> KMeansOptions {
        KMeansOptions {
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            restarts: self.restarts,
            seed: self.seed,
        }
    }
}

fn parse_cutoff(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("invalid cutoff date '{value}' (expected YYYY-MM-DD): {e}"))
}
