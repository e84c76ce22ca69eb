// Enrichment pipeline
//
// Raw log rows in, enriched rows out, one for one and in input order.
// Per row: normalise numeric fields, resolve identity, correct the clock,
// backfill missing kinematics, compute receiver-relative geometry.

use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

use crate::backfill::{BackfillCache, KinematicSnapshot, StateSource};
use crate::config::PipelineConfig;
use crate::constants::{MS_TO_KTS, M_TO_FT};
use crate::error::EnrichError;
use crate::geodesy::{self, is_no_fix};
use crate::logfile::RawRecord;
use crate::modes::{self, MessageClass, TypeCodeCategory};
use crate::timemap::{parse_raw_timestamp, LinearTimeMap, TimeCorrector};

/// Where a record's ICAO24 came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    /// The log's ICAO24 column
    Logged,
    /// Decoded from a DF11 all-call reply
    Decoded,
}

/// One raw row with every derived field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    #[serde(skip)]
    pub raw: RawRecord,

    pub row: usize,
    pub time_raw: String,
    pub time_corrected: Option<NaiveDateTime>,
    /// Corrected time as UTC epoch seconds, the backfill query time
    pub query_epoch: Option<i64>,
    pub message: String,
    pub squitter_type: MessageClass,
    pub crc: Option<f64>,
    pub df: Option<f64>,
    pub tc: Option<f64>,
    pub tc_category: TypeCodeCategory,
    pub icao24: Option<String>,
    pub icao24_source: Option<IdentitySource>,

    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt_ft: Option<f64>,
    pub speed_kts: Option<f64>,
    pub heading_deg: Option<f64>,
    /// At least one field above came from the lookup service
    pub backfilled: bool,

    pub dist_horiz_m: Option<f64>,
    pub dist_slant_m: Option<f64>,
    pub elev_deg: Option<f64>,
    pub alt_m: Option<f64>,
    pub height_above_rx_m: Option<f64>,

    /// SNR/RSS value when the log has a signal column
    pub signal: Option<f64>,
}

/// Diagnostic counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub rows: usize,
    /// Rows with an unparseable timestamp or numeric field
    pub malformed_rows: usize,
    pub bad_timestamps: usize,
    pub decoded_identities: usize,
    pub needs_fill: usize,
    /// Lookups charged against the call budget
    pub resolve_attempts: usize,
    pub backfilled_rows: usize,
    pub live_calls: usize,
    /// Rows left unfilled because the budget was spent
    pub skipped_lookups: usize,
}

/// Parse a logged numeric field. Blank, `nan` and `none` are absent;
/// anything else that fails to parse is absent and flags the row.
fn parse_number(raw: &str, malformed: &mut bool) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("none") {
        return None;
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            *malformed = true;
            None
        }
    }
}

fn missing_or_zero(v: Option<f64>) -> bool {
    matches!(v, None | Some(0.0))
}

/// Rows are enriched against one receiver and one pair of clock anchors.
///
/// The backfill cache is owned by the pipeline, so a single writer decides
/// every lookup and the call budget stays exact.
pub struct EnrichmentPipeline<S> {
    config: PipelineConfig,
    backfill: Option<BackfillCache<S>>,
    stats: PipelineStats,
}

impl<S: StateSource> EnrichmentPipeline<S> {
    /// Fails with [`EnrichError::DegenerateAnchor`] when both anchors share
    /// one raw time.
    pub fn new(
        config: PipelineConfig,
        backfill: Option<BackfillCache<S>>,
    ) -> Result<Self, EnrichError> {
        LinearTimeMap::from_anchors(
            DateTime::UNIX_EPOCH.date_naive(),
            config.anchors[0],
            config.anchors[1],
        )?;
        Ok(EnrichmentPipeline {
            config,
            backfill,
            stats: PipelineStats::default(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn backfill(&self) -> Option<&BackfillCache<S>> {
        self.backfill.as_ref()
    }

    /// Enrich `records`, returning one output per input in the same order
    pub async fn run(
        &mut self,
        records: &[RawRecord],
    ) -> Result<Vec<EnrichedRecord>, EnrichError> {
        let timestamps: Vec<Option<NaiveDateTime>> =
            records.iter().map(|r| parse_raw_timestamp(&r.time)).collect();
        let corrector = TimeCorrector::for_dates(
            self.config.anchors,
            timestamps.iter().flatten().map(|t| t.date()),
        )?;
        info!(
            "Enriching {} rows across {} date(s)",
            records.len(),
            corrector.num_dates()
        );

        let mut out = Vec::with_capacity(records.len());
        for (raw, ts) in records.iter().zip(timestamps) {
            let record = self.enrich(raw, ts, &corrector).await;
            out.push(record);
        }

        if let Some(cache) = &self.backfill {
            self.stats.resolve_attempts = cache.lookups();
            self.stats.live_calls = cache.live_calls();
            self.stats.skipped_lookups = cache.refused();
        }
        info!(
            "Enriched {} rows: {} malformed, {} backfilled, {} lookups ({} live, {} over budget)",
            self.stats.rows,
            self.stats.malformed_rows,
            self.stats.backfilled_rows,
            self.stats.resolve_attempts,
            self.stats.live_calls,
            self.stats.skipped_lookups
        );
        Ok(out)
    }

    async fn enrich(
        &mut self,
        raw: &RawRecord,
        raw_time: Option<NaiveDateTime>,
        corrector: &TimeCorrector,
    ) -> EnrichedRecord {
        self.stats.rows += 1;
        let mut malformed = false;

        let crc = parse_number(&raw.crc, &mut malformed);
        let df = parse_number(&raw.df, &mut malformed);
        let tc = parse_number(&raw.tc, &mut malformed);
        let lat_log = parse_number(&raw.latitude, &mut malformed);
        let lon_log = parse_number(&raw.longitude, &mut malformed);
        let alt_log = parse_number(&raw.altitude, &mut malformed);
        let spd_log = parse_number(&raw.speed, &mut malformed);
        let heading_log = raw
            .heading
            .as_deref()
            .and_then(|h| parse_number(h, &mut malformed));
        let signal = raw
            .signal
            .as_deref()
            .and_then(|s| parse_number(s, &mut false));

        let (icao24, icao24_source) = match modes::normalize_identity(&raw.icao24) {
            Some(id) => (Some(id), Some(IdentitySource::Logged)),
            None => match modes::extract_identity(&raw.message) {
                Some(id) => {
                    self.stats.decoded_identities += 1;
                    (Some(id), Some(IdentitySource::Decoded))
                }
                None => (None, None),
            },
        };

        if raw_time.is_none() {
            self.stats.bad_timestamps += 1;
            malformed = true;
            debug!("Row {}: unparseable timestamp '{}'", raw.row, raw.time);
        }
        let time_corrected = raw_time.and_then(|t| corrector.correct(&t));
        let query_epoch = time_corrected.map(|t| {
            t.and_utc().timestamp() - self.config.utc_offset.local_minus_utc() as i64
        });

        let mut lat = lat_log;
        let mut lon = lon_log;
        let mut alt_ft = alt_log;
        let mut speed_kts = spd_log;
        let mut heading_deg = heading_log;
        let mut backfilled = false;

        let needs_fill = icao24.is_some()
            && (is_no_fix(lat, lon) || missing_or_zero(alt_ft) || missing_or_zero(speed_kts));
        if needs_fill {
            self.stats.needs_fill += 1;
        }

        if let (true, Some(id), Some(epoch), Some(cache)) =
            (needs_fill, icao24.as_deref(), query_epoch, self.backfill.as_mut())
        {
            if let Some(state) = cache.resolve(id, epoch).await {
                backfilled = fill_missing(
                    &state,
                    raw.heading.is_some(),
                    &mut lat,
                    &mut lon,
                    &mut alt_ft,
                    &mut speed_kts,
                    &mut heading_deg,
                );
            }
        }
        if backfilled {
            self.stats.backfilled_rows += 1;
        }

        let geometry = geodesy::geometry(&self.config.receiver, lat, lon, alt_ft);

        if malformed {
            self.stats.malformed_rows += 1;
        }

        EnrichedRecord {
            raw: raw.clone(),
            row: raw.row,
            time_raw: raw.time.clone(),
            time_corrected,
            query_epoch,
            message: raw.message.clone(),
            squitter_type: modes::classify(&raw.message),
            crc,
            df,
            tc,
            tc_category: modes::categorize(tc),
            icao24,
            icao24_source,
            lat,
            lon,
            alt_ft,
            speed_kts,
            heading_deg,
            backfilled,
            dist_horiz_m: geometry.horizontal_m,
            dist_slant_m: geometry.slant_m,
            elev_deg: geometry.elevation_deg,
            alt_m: geometry.altitude_m,
            height_above_rx_m: geometry.height_above(&self.config.receiver),
            signal,
        }
    }
}

/// Copy looked-up values into the fields the log left empty. Logged values
/// are never replaced. Returns whether anything was filled.
fn fill_missing(
    state: &KinematicSnapshot,
    has_heading_column: bool,
    lat: &mut Option<f64>,
    lon: &mut Option<f64>,
    alt_ft: &mut Option<f64>,
    speed_kts: &mut Option<f64>,
    heading_deg: &mut Option<f64>,
) -> bool {
    let mut filled = false;

    if is_no_fix(*lat, *lon) {
        if let (Some(s_lat), Some(s_lon)) = (state.lat, state.lon) {
            *lat = Some(s_lat);
            *lon = Some(s_lon);
            filled = true;
        }
    }

    if missing_or_zero(*alt_ft) {
        if let Some(alt_m) = state.baro_alt_m.or(state.geo_alt_m) {
            *alt_ft = Some(alt_m * M_TO_FT);
            filled = true;
        }
    }

    if missing_or_zero(*speed_kts) {
        if let Some(v) = state.velocity_mps {
            *speed_kts = Some(v * MS_TO_KTS);
            filled = true;
        }
    }

    if has_heading_column && missing_or_zero(*heading_deg) {
        if let Some(track) = state.true_track_deg {
            *heading_deg = Some(track);
            filled = true;
        }
    }

    filled
}
