// ADS-B log enrichment - Main Entry Point
// Licensed under AGPL v3

use adsb_enrich::backfill::{BackfillCache, OpenSkyClient, StateSource};
use adsb_enrich::config::Config;
use adsb_enrich::logfile::read_log_file;
use adsb_enrich::modes::MessageClass;
use adsb_enrich::output::{
    self, CsvOutput, JsonOutput, OutputHandler, CSV_FILE_NAME, JSON_FILE_NAME,
};
use adsb_enrich::pipeline::{EnrichmentPipeline, IdentitySource};
use clap::Parser;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    let pipeline_config = config.pipeline_config()?;
    info!("Starting ADS-B log enrichment");
    info!(
        "Receiver at {:.6}, {:.6}, {:.1} m",
        pipeline_config.receiver.lat, pipeline_config.receiver.lon, pipeline_config.receiver.alt_m
    );

    let log = read_log_file(&config.input, config.signal_col.as_deref())?;
    info!("Read {} rows from {}", log.records.len(), config.input.display());
    if log.records.is_empty() {
        warn!("Input log has no data rows");
    }

    let backfill = if config.use_opensky {
        let client = OpenSkyClient::new(config.credentials())?;
        let mode = if client.is_authenticated() {
            "authenticated"
        } else {
            "anonymous"
        };
        info!(
            "OpenSky backfill enabled ({}), budget {} calls",
            mode, config.max_api_calls
        );
        Some(BackfillCache::new(client, config.max_api_calls))
    } else {
        None
    };

    let mut pipeline = EnrichmentPipeline::new(pipeline_config, backfill)?;
    let records = pipeline.run(&log.records).await?;

    // Diagnostics
    let short: Vec<_> = records
        .iter()
        .filter(|r| r.squitter_type == MessageClass::Short)
        .collect();
    let short_no_icao = short
        .iter()
        .filter(|r| r.icao24_source != Some(IdentitySource::Logged))
        .count();
    let short_decoded = short
        .iter()
        .filter(|r| r.icao24_source == Some(IdentitySource::Decoded))
        .count();
    info!(
        "Short squitters: {} total, {} without logged ICAO24, {} recovered from DF11",
        short.len(),
        short_no_icao,
        short_decoded
    );
    let with_geometry = records.iter().filter(|r| r.dist_slant_m.is_some()).count();
    info!("Rows with full geometry: {}/{}", with_geometry, records.len());
    let stats = pipeline.stats();
    info!(
        "Rows needing fill: {}, backfilled: {}, malformed: {}",
        stats.needs_fill, stats.backfilled_rows, stats.malformed_rows
    );

    // Outputs
    std::fs::create_dir_all(&config.out_dir)?;
    let csv_path = config.out_dir.join(CSV_FILE_NAME);
    let mut handlers: Vec<Box<dyn OutputHandler>> = vec![Box::new(CsvOutput::create(&csv_path)?)];
    info!("Writing CSV results to {}", csv_path.display());
    if config.json {
        let json_path = config.out_dir.join(JSON_FILE_NAME);
        info!("Writing JSON lines to {}", json_path.display());
        handlers.push(Box::new(JsonOutput::create(&json_path)?));
    }
    output::write_all(&mut handlers, &records)?;

    info!("Done");
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    if verbose {
        subscriber
            .with_max_level(tracing::Level::DEBUG)
            .init();
        info!("Verbose logging enabled (DEBUG level)");
    } else {
        subscriber
            .with_max_level(tracing::Level::INFO)
            .init();
    }
}
