// Recorder clock correction
//
// The recorder clock runs at the wrong rate and offset. Two (raw, true)
// anchor observations define an affine map raw -> true, built per calendar
// date because anchors are given as times of day.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::constants::{ANCHOR_MIN_SEPARATION_S, ANCHOR_TIME_FORMAT, RAW_TIME_FORMAT};
use crate::error::EnrichError;

/// One (recorded time-of-day, true time-of-day) correspondence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorPair {
    pub raw: NaiveTime,
    pub truth: NaiveTime,
}

impl AnchorPair {
    pub fn new(raw: NaiveTime, truth: NaiveTime) -> Self {
        AnchorPair { raw, truth }
    }
}

impl FromStr for AnchorPair {
    type Err = EnrichError;

    /// Parses `RAW=TRUE`, e.g. `17:48:55=17:56:30`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EnrichError::InvalidAnchor(s.to_string());
        let (raw, truth) = s.split_once('=').ok_or_else(invalid)?;
        let raw = NaiveTime::parse_from_str(raw.trim(), ANCHOR_TIME_FORMAT).map_err(|_| invalid())?;
        let truth =
            NaiveTime::parse_from_str(truth.trim(), ANCHOR_TIME_FORMAT).map_err(|_| invalid())?;
        Ok(AnchorPair { raw, truth })
    }
}

/// Parse a recorder timestamp such as `15-Dec-2025 17:06:09`
pub fn parse_raw_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), RAW_TIME_FORMAT).ok()
}

/// Seconds since the Unix epoch, treating the naive time as UTC
fn epoch_seconds(dt: &NaiveDateTime) -> f64 {
    let utc = dt.and_utc();
    utc.timestamp() as f64 + utc.timestamp_subsec_nanos() as f64 * 1e-9
}

/// `true_seconds = scale * raw_seconds + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTimeMap {
    pub scale: f64,
    pub offset: f64,
}

impl LinearTimeMap {
    /// Solve the map through two anchors placed on `date`.
    ///
    /// Fails with [`EnrichError::DegenerateAnchor`] when both anchors share
    /// the same raw time.
    pub fn from_anchors(
        date: NaiveDate,
        first: AnchorPair,
        second: AnchorPair,
    ) -> Result<Self, EnrichError> {
        let r1 = epoch_seconds(&date.and_time(first.raw));
        let t1 = epoch_seconds(&date.and_time(first.truth));
        let r2 = epoch_seconds(&date.and_time(second.raw));
        let t2 = epoch_seconds(&date.and_time(second.truth));

        if (r2 - r1).abs() < ANCHOR_MIN_SEPARATION_S {
            return Err(EnrichError::DegenerateAnchor(date.and_time(first.raw)));
        }

        let scale = (t2 - t1) / (r2 - r1);
        let offset = t1 - scale * r1;
        Ok(LinearTimeMap { scale, offset })
    }

    /// Corrected time in epoch seconds
    pub fn apply(&self, raw_seconds: f64) -> f64 {
        self.scale * raw_seconds + self.offset
    }

    /// Map a recorded timestamp to true time, rounded to the millisecond.
    ///
    /// Returns `None` only if the result falls outside chrono's range.
    pub fn map(&self, raw: &NaiveDateTime) -> Option<NaiveDateTime> {
        let millis = (self.apply(epoch_seconds(raw)) * 1e3).round();
        if !millis.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis(millis as i64).map(|dt| dt.naive_utc())
    }
}

/// Per-date collection of linear maps sharing one pair of anchors
#[derive(Debug, Clone)]
pub struct TimeCorrector {
    anchors: [AnchorPair; 2],
    maps: HashMap<NaiveDate, LinearTimeMap>,
}

impl TimeCorrector {
    /// Build one map for every date in `dates`.
    pub fn for_dates<I>(anchors: [AnchorPair; 2], dates: I) -> Result<Self, EnrichError>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut maps = HashMap::new();
        for date in dates {
            if maps.contains_key(&date) {
                continue;
            }
            let map = LinearTimeMap::from_anchors(date, anchors[0], anchors[1])?;
            tracing::debug!(
                "time map for {}: scale={:.9} offset={:.3}",
                date,
                map.scale,
                map.offset
            );
            maps.insert(date, map);
        }
        Ok(TimeCorrector { anchors, maps })
    }

    pub fn anchors(&self) -> &[AnchorPair; 2] {
        &self.anchors
    }

    /// Map registered for `date`, if any
    pub fn map_for(&self, date: NaiveDate) -> Option<&LinearTimeMap> {
        self.maps.get(&date)
    }

    pub fn num_dates(&self) -> usize {
        self.maps.len()
    }

    /// Correct a raw timestamp using the map of its own calendar date
    pub fn correct(&self, raw: &NaiveDateTime) -> Option<NaiveDateTime> {
        self.maps.get(&raw.date())?.map(raw)
    }
}
