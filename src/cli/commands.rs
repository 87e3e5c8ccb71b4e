use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::analyzers::SummaryAnalyzer;
use crate::cli::args::{Cli, Commands, InputSource};
use crate::models::Metric;
use crate::processors::{AggregationPipeline, IntegrityChecker};
use crate::settings::Settings;
use crate::simulation::{DefaultTransportFactory, SimulationSupervisor};
use crate::store::{BlobStore, DirectoryStore, ZipStore};
use crate::utils::filename::{generate_default_aggregate_filename, generate_default_summary_filename};
use crate::utils::logging::init_logging;
use crate::utils::progress::ProgressReporter;
use crate::writers::{read_aggregates, AggregateWriter, SummaryCsvWriter};

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Commands::Simulate {
            duration_secs,
            stations,
            seed,
            cadence_secs,
        } => {
            let parameters = Arc::new(settings.parameter_model()?);
            let stations = settings.select_stations(&stations)?;
            let cadence = cadence_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.simulation.cadence());
            if cadence.is_zero() {
                anyhow::bail!("cadence must be at least one second");
            }

            println!("Simulating {} stations...", stations.len());
            for station in &stations {
                println!("  {} -> {:?}", station.id, station.transport);
            }
            println!("Cadence: {}s", cadence.as_secs());

            let mut supervisor =
                SimulationSupervisor::new(parameters, Arc::new(DefaultTransportFactory))
                    .with_cadence(cadence)
                    .with_policy(settings.simulation.publish_policy())
                    .with_seed(seed.or(settings.simulation.seed));
            supervisor.start(stations);

            let progress = ProgressReporter::new_spinner("Emitting telemetry (Ctrl-C to stop)...", false);
            match duration_secs {
                Some(secs) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                        _ = tokio::signal::ctrl_c() => {}
                    }
                }
                None => tokio::signal::ctrl_c()
                    .await
                    .context("failed to listen for Ctrl-C")?,
            }

            progress.set_message("Disconnecting stations...");
            let reports = supervisor.shutdown_all().await;
            progress.finish_with_message("Simulation stopped");

            println!("\nStation Reports:");
            for report in &reports {
                println!(
                    "  {}: {} ticks, {} sent, {} failed, {}{}",
                    report.station_id,
                    report.ticks,
                    report.acks,
                    report.publish_failures,
                    report.final_state,
                    report
                        .error
                        .as_ref()
                        .map(|e| format!(" ({})", e))
                        .unwrap_or_default()
                );
            }

            let failures = supervisor.failures();
            if failures.is_empty() {
                println!("✅ All stations disconnected cleanly");
            } else {
                println!("⚠️  {} stations failed", failures.len());
            }
        }

        Commands::Aggregate {
            input,
            output_file,
            summary_file,
            window_secs,
            max_blobs,
            max_workers,
            validate_only,
        } => {
            let store = open_store(&input)?;
            let window_secs = window_secs.unwrap_or(settings.aggregation.window_secs);
            let window = chrono::Duration::seconds(
                i64::try_from(window_secs).context("window size is too large")?,
            );
            let max_workers = max_workers.unwrap_or_else(|| settings.aggregation.max_workers());

            println!("Aggregating telemetry...");
            println!("Input: {}", store.describe());
            println!("Window: {}s, Workers: {}", window_secs, max_workers);

            let pipeline = AggregationPipeline::new(Arc::new(settings.parameter_model()?))
                .with_window(window)
                .with_max_blobs(blob_limit(max_blobs, &settings))
                .with_suffix(settings.aggregation.blob_suffix.clone())
                .with_max_workers(max_workers);

            let progress = ProgressReporter::new_spinner("Reading telemetry...", false);
            let output = pipeline.run(store.as_ref(), Some(&progress))?;

            let checker = IntegrityChecker::new(window);
            println!("\n{}", checker.generate_summary(&output.report));
            println!(
                "Read {} records from {} blobs",
                output.records_read, output.blobs_read
            );

            if validate_only {
                println!("Validation complete - no output file written");
                return Ok(());
            }

            if output.aggregates.is_empty() {
                println!("No aggregates to write");
                return Ok(());
            }

            let output_file = output_file.unwrap_or_else(generate_default_aggregate_filename);
            let writer = AggregateWriter::new();
            writer
                .write_records(&output.aggregates, &output_file)
                .with_context(|| format!("failed to write {}", output_file.display()))?;

            let file_info = writer.file_info(&output.aggregates, &output_file)?;
            println!("\n{}", file_info.summary());
            println!("Aggregates written to {}", output_file.display());

            if let Some(summary_file) = summary_file {
                let summary_file = summary_file.unwrap_or_else(generate_default_summary_filename);
                let stats = SummaryAnalyzer::new().analyze(&output.aggregates)?;
                SummaryCsvWriter::new().write_summary(&stats.stations, &summary_file)?;
                println!("Summary written to {}", summary_file.display());
            }

            println!("Processing complete!");
        }

        Commands::Validate { input, max_blobs } => {
            let store = open_store(&input)?;
            println!("Validating telemetry in {}...", store.describe());

            let pipeline = AggregationPipeline::new(Arc::new(settings.parameter_model()?))
                .with_max_blobs(blob_limit(max_blobs, &settings))
                .with_suffix(settings.aggregation.blob_suffix.clone());

            let progress = ProgressReporter::new_spinner("Validating telemetry...", false);
            let outcome = pipeline.read(store.as_ref(), Some(&progress))?;
            progress.finish_with_message("Validation complete");

            println!(
                "\nBlobs: {} read of {} available{}",
                outcome.blobs_read,
                outcome.blobs_available,
                if outcome.truncated { " (truncated)" } else { "" }
            );
            println!("Lines: {} ({} valid records)", outcome.lines_seen, outcome.records.len());

            if outcome.diagnostics.is_empty() {
                println!("✅ All data passed validation checks");
            } else {
                println!("⚠️  Found {} validation issues", outcome.diagnostics.len());
                for diagnostic in outcome.diagnostics.iter().take(20) {
                    println!("  {}", diagnostic);
                }
            }
        }

        Commands::Summarize { file, sample, csv } => {
            println!("Analyzing aggregates file: {}", file.display());

            let aggregates = read_aggregates(&file)?;
            let file_info = AggregateWriter::new().file_info(&aggregates, &file)?;
            let stats = SummaryAnalyzer::new().analyze(&aggregates)?;

            println!("\n{}", stats.summary());
            println!("{}", stats.station_table());

            println!("File Details:");
            println!("{}", file_info.summary());

            if sample > 0 {
                println!("\nSample Windows (showing {} windows):", sample.min(aggregates.len()));
                for (i, aggregate) in aggregates.iter().take(sample).enumerate() {
                    println!(
                        "{}. {} ending {}: ice avg={}, snow max={}, count={}{}",
                        i + 1,
                        aggregate.station_id,
                        aggregate.window_end.to_rfc3339(),
                        fmt_stat(aggregate.avg(Metric::IceThickness)),
                        fmt_stat(aggregate.max(Metric::SnowAccumulation)),
                        aggregate.count,
                        if aggregate.is_suspect() { " [suspect]" } else { "" }
                    );
                }
            }

            if let Some(csv) = csv {
                SummaryCsvWriter::new().write_summary(&stats.stations, &csv)?;
                println!("\nSummary written to {}", csv.display());
            }
        }
    }

    Ok(())
}

fn open_store(input: &InputSource) -> Result<Box<dyn BlobStore>> {
    match (&input.input_dir, &input.input_archive) {
        (Some(dir), _) => Ok(Box::new(DirectoryStore::new(dir).with_mmap(true))),
        (None, Some(archive)) => Ok(Box::new(ZipStore::new(archive))),
        (None, None) => anyhow::bail!("either --input-dir or --input-archive is required"),
    }
}

fn blob_limit(cli_value: Option<usize>, settings: &Settings) -> Option<usize> {
    match cli_value {
        Some(0) => None,
        Some(n) => Some(n),
        None => settings.aggregation.max_blobs(),
    }
}

fn fmt_stat(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}
