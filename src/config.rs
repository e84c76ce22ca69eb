use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};
use clap::Parser;

use crate::backfill::OpenSkyCredentials;
use crate::constants::DEFAULT_CALL_BUDGET;
use crate::geodesy::ReceiverLocation;
use crate::timemap::AnchorPair;

/// ADS-B log enrichment configuration
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Receiver log (CSV-like text with a header row).
    #[arg(value_name = "LOG")]
    pub input: PathBuf,

    /// Output directory for enriched records.
    #[arg(long = "out-dir", value_name = "DIR", default_value = "adsb_out")]
    pub out_dir: PathBuf,

    /// Receiver latitude in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub rx_lat: f64,

    /// Receiver longitude in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub rx_lon: f64,

    /// Receiver altitude above sea level in metres.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub rx_alt: f64,

    /// Clock anchor RAW=TRUE as HH:MM:SS, given exactly twice.
    #[arg(long = "anchor", value_name = "RAW=TRUE", required = true, num_args = 1)]
    pub anchors: Vec<AnchorPair>,

    /// UTC offset of the corrected timestamps, used for lookup times.
    #[arg(long, value_name = "+HH:MM", default_value = "+00:00")]
    pub utc_offset: FixedOffset,

    /// Backfill missing position/altitude/speed from OpenSky.
    #[arg(long, default_value_t = false)]
    pub use_opensky: bool,

    /// Ceiling on OpenSky lookups, cached ones included.
    #[arg(long, default_value_t = DEFAULT_CALL_BUDGET)]
    pub max_api_calls: usize,

    /// OpenSky username.
    #[arg(long, env = "OPENSKY_USER")]
    pub opensky_user: Option<String>,

    /// OpenSky password.
    #[arg(long, env = "OPENSKY_PASS", hide_env_values = true)]
    pub opensky_pass: Option<String>,

    /// OpenSky OAuth client id.
    #[arg(long, env = "OPENSKY_CLIENT_ID")]
    pub opensky_client_id: Option<String>,

    /// OpenSky OAuth client secret.
    #[arg(long, env = "OPENSKY_CLIENT_SECRET", hide_env_values = true)]
    pub opensky_client_secret: Option<String>,

    /// Signal metric column (SNR/RSS). Auto-detected when omitted.
    #[arg(long, value_name = "NAME")]
    pub signal_col: Option<String>,

    /// Also write enriched records as JSON lines.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Core configuration, or a message naming the bad option
    pub fn pipeline_config(&self) -> Result<PipelineConfig, String> {
        let anchors: [AnchorPair; 2] = self
            .anchors
            .clone()
            .try_into()
            .map_err(|v: Vec<AnchorPair>| {
                format!("expected exactly 2 --anchor values, got {}", v.len())
            })?;
        Ok(PipelineConfig {
            receiver: ReceiverLocation::new(self.rx_lat, self.rx_lon, self.rx_alt),
            anchors,
            utc_offset: self.utc_offset,
        })
    }

    pub fn credentials(&self) -> OpenSkyCredentials {
        OpenSkyCredentials {
            username: self.opensky_user.clone(),
            password: self.opensky_pass.clone(),
            client_id: self.opensky_client_id.clone(),
            client_secret: self.opensky_client_secret.clone(),
        }
    }
}

/// Immutable per-run configuration of the enrichment core
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub receiver: ReceiverLocation,
    pub anchors: [AnchorPair; 2],
    /// Offset of corrected local time from UTC
    pub utc_offset: FixedOffset,
}

impl PipelineConfig {
    pub fn new(receiver: ReceiverLocation, anchors: [AnchorPair; 2]) -> Self {
        PipelineConfig {
            receiver,
            anchors,
            utc_offset: Utc.fix(),
        }
    }

    pub fn with_utc_offset(mut self, utc_offset: FixedOffset) -> Self {
        self.utc_offset = utc_offset;
        self
    }
}
