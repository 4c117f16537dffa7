//! ShopSight: customer segmentation and daily revenue forecasting CLI.
//!
//! This is the main entrypoint that runs the full analysis in sequence:
//! load and clean the transaction log, build per-customer and per-day
//! features, segment customers with K-Means, forecast daily revenue, and
//! write the two report plots.

use std::time::Instant;

use clap::Parser;
use shopsight::cluster::{K_CANDIDATES, TSNE_PERPLEXITY};
use shopsight::features::FEATURE_COLUMNS;
use shopsight::{
    build_daily_sales, build_user_features, compare_cluster_counts, load_transactions,
    run_forecast, segment, viz, Args, ForecastOutput, Segmentation,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    args.validate()?;
    run_pipeline(&args)
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();
}

fn run_pipeline(args: &Args) -> anyhow::Result<()> {
    let total_start = Instant::now();
    println!("{:=<78}", "");
    println!("ShopSight - customer segmentation & daily revenue forecast");
    println!("{:=<78}", "");

    // Step 1: load and clean
    info!(input = %args.input.display(), "loading transactions");
    let start = Instant::now();
    let transactions = load_transactions(&args.input)?;
    anyhow::ensure!(
        !transactions.is_empty(),
        "no usable transactions after cleaning: {}",
        args.input.display()
    );
    info!(elapsed = ?start.elapsed(), "cleaning finished");
    println!("\n[1/4] Cleaned transactions: {} rows", transactions.len());

    // Step 2: feature engineering
    let user_features = build_user_features(&transactions);
    let daily_sales = build_daily_sales(&transactions);
    println!(
        "[2/4] Features built: {} customers, {} sales days",
        user_features.len(),
        daily_sales.len()
    );

    // Step 3: segmentation
    let opts = args.kmeans_options();
    if args.compare_k {
        let comparisons = compare_cluster_counts(&user_features, &K_CANDIDATES, &opts)?;
        println!("\n[Cluster count comparison]");
        for comparison in &comparisons {
            println!(
                "  k = {}: sizes {:?}, inertia {:.1}",
                comparison.k, comparison.sizes, comparison.inertia
            );
        }
    }

    let start = Instant::now();
    let segmentation = segment(user_features, args.clusters, &opts)?;
    info!(elapsed = ?start.elapsed(), k = args.clusters, "k-means fitted");
    println!("[3/4] Customers segmented into {} clusters", args.clusters);
    print_segment_report(&segmentation);

    std::fs::create_dir_all(&args.output_dir)?;
    if !args.skip_plots {
        if let Some(embedding) = segmentation.embed_2d(TSNE_PERPLEXITY, args.seed)? {
            let path = args.output_dir.join("customer_segments.png");
            viz::plot_segments(&embedding, &segmentation, &path)?;
        }
    }

    // Step 4: forecasting
    let start = Instant::now();
    let forecast = run_forecast(&daily_sales, args.cutoff)?;
    info!(
        elapsed = ?start.elapsed(),
        horizon = forecast.horizon,
        yearly = forecast.used_yearly_seasonality,
        "forecast complete"
    );
    println!("\n[4/4] Revenue forecast evaluated from {}", args.cutoff);
    print_forecast_report(&forecast);

    if !args.skip_plots {
        let path = args.output_dir.join("daily_sales_forecast.png");
        viz::plot_forecast(&forecast.rows, args.cutoff, &path)?;
    }

    println!("\n{:=<78}", "");
    println!(
        "Pipeline complete in {:.2}s",
        total_start.elapsed().as_secs_f64()
    );
    println!("{:=<78}", "");
    Ok(())
}

fn print_segment_report(segmentation: &Segmentation) {
    let total = segmentation.users.len();
    println!("\n[Cluster sizes]");
    for (label, &size) in segmentation.cluster_sizes().iter().enumerate() {
        let percentage = size as f64 / total as f64 * 100.0;
        println!("  cluster {label}: {size} customers ({percentage:.1}%)");
    }

    println!("\n[Cluster means]");
    print!("  {:>7}", "cluster");
    for column in FEATURE_COLUMNS {
        print!(" {column:>19}");
    }
    println!();
    for (label, means) in segmentation.cluster_feature_means() {
        print!("  {label:>7}");
        for value in means {
            print!(" {value:>19.2}");
        }
        println!();
    }

    println!(
        "\n  Within-cluster sum of squares: {:.2}",
        segmentation.inertia
    );
    println!(
        "  Silhouette score (sample): {:.3}",
        segmentation.silhouette_sample(100)
    );
}

fn print_forecast_report(forecast: &ForecastOutput) {
    println!("  Evaluation days with actuals: {}", forecast.eval_rows.len());
    println!("\n[Forecast accuracy]");
    println!("  - MAE:  {:.0}", forecast.metrics.mae);
    println!("  - RMSE: {:.0}", forecast.metrics.rmse);
    println!("  - MAPE: {:.2}%", forecast.metrics.mape);
}
