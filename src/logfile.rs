// Receiver log reader
//
// The recorder writes a comma separated file with a header row and padded
// fields ("...,  1, 7,       , ..."). Values are kept as trimmed strings;
// numeric interpretation happens in the pipeline.

use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::EnrichError;

/// Column names as written by the recorder
pub mod columns {
    pub const TIME: &str = "Time";
    pub const MESSAGE: &str = "Message";
    pub const CRC: &str = "CRC";
    pub const DF: &str = "DF";
    pub const TC: &str = "TC";
    pub const ICAO24: &str = "ICAO24";
    pub const LATITUDE: &str = "Latitude";
    pub const LONGITUDE: &str = "Longitude";
    pub const ALTITUDE: &str = "Altitude";
    pub const SPEED: &str = "Speed";
    pub const HEADING: &[&str] = &["Heading(°)", "Heading"];
}

/// Signal metric columns recognised without an explicit name, in priority order
const SIGNAL_CANDIDATES: &[&str] = &[
    "SNR(dB)",
    "SNR",
    "RSS",
    "RSS(dB)",
    "RSS(dBm)",
    "RSSI",
    "RSSI(dB)",
    "RSSI(dBm)",
    "Received Signal Strength",
    "ReceivedSignalStrength",
    "SignalStrength",
    "Signal Strength",
    "RxPower",
    "Rx Power",
    "RcvdSignalStrength",
    "Rcvd Signal Strength",
];

/// One logged message, fields as recorded (trimmed)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based data row number
    pub row: usize,
    pub time: String,
    pub message: String,
    pub crc: String,
    pub df: String,
    pub tc: String,
    pub icao24: String,
    pub latitude: String,
    pub longitude: String,
    /// Feet
    pub altitude: String,
    /// Knots
    pub speed: String,
    /// Degrees, only when the log has a heading column
    pub heading: Option<String>,
    /// SNR/RSS value, only when a signal column was selected
    pub signal: Option<String>,
}

/// A parsed log: records in file order plus what was found in the header
#[derive(Debug, Clone, Default)]
pub struct LogFile {
    pub records: Vec<RawRecord>,
    pub signal_column: Option<String>,
    pub has_heading: bool,
}

/// Pick the signal metric column.
///
/// An explicit `preferred` name must exist. Otherwise try the known names
/// exactly, then case-insensitively, then any header mentioning rssi, rss
/// or snr.
pub fn detect_signal_column(
    headers: &[String],
    preferred: Option<&str>,
) -> Result<Option<String>, EnrichError> {
    if let Some(name) = preferred {
        return match headers.iter().find(|h| h.as_str() == name) {
            Some(h) => Ok(Some(h.clone())),
            None => Err(EnrichError::SignalColumnNotFound {
                name: name.to_string(),
                available: headers.to_vec(),
            }),
        };
    }

    for candidate in SIGNAL_CANDIDATES {
        if let Some(h) = headers.iter().find(|h| h.as_str() == *candidate) {
            return Ok(Some(h.clone()));
        }
    }

    for candidate in SIGNAL_CANDIDATES {
        let lower = candidate.to_lowercase();
        if let Some(h) = headers.iter().find(|h| h.to_lowercase() == lower) {
            return Ok(Some(h.clone()));
        }
    }

    Ok(headers
        .iter()
        .find(|h| {
            let l = h.to_lowercase();
            l.contains("rssi") || l.contains("rss") || l.contains("snr")
        })
        .cloned())
}

fn find_column(headers: &[String], name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .or_else(|| headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
}

/// Read a log from any reader
pub fn read_log<R: Read>(reader: R, signal_column: Option<&str>) -> Result<LogFile, EnrichError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

    let time_idx = find_column(&headers, columns::TIME)
        .ok_or(EnrichError::MissingColumn(columns::TIME))?;
    let message_idx = find_column(&headers, columns::MESSAGE)
        .ok_or(EnrichError::MissingColumn(columns::MESSAGE))?;

    let optional = |name: &str| {
        let idx = find_column(&headers, name);
        if idx.is_none() {
            warn!("Log has no '{}' column, treating it as blank", name);
        }
        idx
    };
    let crc_idx = optional(columns::CRC);
    let df_idx = optional(columns::DF);
    let tc_idx = optional(columns::TC);
    let icao_idx = optional(columns::ICAO24);
    let lat_idx = optional(columns::LATITUDE);
    let lon_idx = optional(columns::LONGITUDE);
    let alt_idx = optional(columns::ALTITUDE);
    let spd_idx = optional(columns::SPEED);
    let heading_idx = columns::HEADING
        .iter()
        .find_map(|name| find_column(&headers, name));

    let signal_name = detect_signal_column(&headers, signal_column)?;
    let signal_idx = signal_name.as_deref().and_then(|name| find_column(&headers, name));
    match &signal_name {
        Some(name) => debug!("Using '{}' as signal column", name),
        None => debug!("No signal column in log"),
    }

    let mut records = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let rec = result?;
        let field = |idx: Option<usize>| -> String {
            idx.and_then(|i| rec.get(i)).unwrap_or("").to_string()
        };
        records.push(RawRecord {
            row: i + 1,
            time: field(Some(time_idx)),
            message: field(Some(message_idx)),
            crc: field(crc_idx),
            df: field(df_idx),
            tc: field(tc_idx),
            icao24: field(icao_idx),
            latitude: field(lat_idx),
            longitude: field(lon_idx),
            altitude: field(alt_idx),
            speed: field(spd_idx),
            heading: heading_idx.map(|idx| field(Some(idx))),
            signal: signal_idx.map(|idx| field(Some(idx))),
        });
    }

    Ok(LogFile {
        records,
        signal_column: signal_name,
        has_heading: heading_idx.is_some(),
    })
}

/// Read a log file from disk
pub fn read_log_file<P: AsRef<Path>>(
    path: P,
    signal_column: Option<&str>,
) -> Result<LogFile, EnrichError> {
    let file = std::fs::File::open(path)?;
    read_log(std::io::BufReader::new(file), signal_column)
}
