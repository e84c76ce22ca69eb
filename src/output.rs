use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::EnrichError;
use crate::pipeline::EnrichedRecord;

/// File name of the CSV output inside the output directory
pub const CSV_FILE_NAME: &str = "enriched.csv";

/// File name of the JSON lines output inside the output directory
pub const JSON_FILE_NAME: &str = "enriched.jsonl";

/// Trait for output handlers
pub trait OutputHandler {
    /// Handle one enriched record
    fn handle_record(&mut self, record: &EnrichedRecord) -> Result<(), EnrichError>;

    /// Flush buffered output
    fn flush(&mut self) -> Result<(), EnrichError>;
}

/// CSV output with a header row taken from the record field names
pub struct CsvOutput<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvOutput<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, EnrichError> {
        let file = File::create(path)?;
        Ok(CsvOutput::new(BufWriter::new(file)))
    }
}

impl<W: Write> CsvOutput<W> {
    pub fn new(writer: W) -> Self {
        CsvOutput {
            writer: csv::Writer::from_writer(writer),
        }
    }

    pub fn into_inner(self) -> Result<W, EnrichError> {
        self.writer
            .into_inner()
            .map_err(|e| EnrichError::Io(e.into_error()))
    }
}

impl<W: Write> OutputHandler for CsvOutput<W> {
    fn handle_record(&mut self, record: &EnrichedRecord) -> Result<(), EnrichError> {
        self.writer.serialize(record)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EnrichError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// One JSON object per line
pub struct JsonOutput<W: Write> {
    writer: W,
}

impl JsonOutput<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, EnrichError> {
        let file = File::create(path)?;
        Ok(JsonOutput::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonOutput<W> {
    pub fn new(writer: W) -> Self {
        JsonOutput { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputHandler for JsonOutput<W> {
    fn handle_record(&mut self, record: &EnrichedRecord) -> Result<(), EnrichError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EnrichError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Send every record to every handler, then flush them all
pub fn write_all(
    handlers: &mut [Box<dyn OutputHandler>],
    records: &[EnrichedRecord],
) -> Result<(), EnrichError> {
    for record in records {
        for handler in handlers.iter_mut() {
            handler.handle_record(record)?;
        }
    }
    for handler in handlers.iter_mut() {
        handler.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::RawRecord;
    use crate::modes::{MessageClass, TypeCodeCategory};
    use crate::pipeline::IdentitySource;
    use chrono::NaiveDate;

    fn sample() -> EnrichedRecord {
        EnrichedRecord {
            raw: RawRecord::default(),
            row: 3,
            time_raw: "15-Dec-2025 17:48:55".to_string(),
            time_corrected: NaiveDate::from_ymd_opt(2025, 12, 15)
                .and_then(|d| d.and_hms_opt(17, 56, 30)),
            query_epoch: Some(1_765_821_390),
            message: "5d4840d6000000".to_string(),
            squitter_type: MessageClass::Short,
            crc: Some(0.0),
            df: Some(11.0),
            tc: None,
            tc_category: TypeCodeCategory::Unknown,
            icao24: Some("4840d6".to_string()),
            icao24_source: Some(IdentitySource::Decoded),
            lat: None,
            lon: None,
            alt_ft: None,
            speed_kts: None,
            heading_deg: None,
            backfilled: false,
            dist_horiz_m: None,
            dist_slant_m: None,
            elev_deg: None,
            alt_m: None,
            height_above_rx_m: None,
            signal: Some(7.25),
        }
    }

    #[test]
    fn test_csv_output() {
        let mut out = CsvOutput::new(Vec::new());
        out.handle_record(&sample()).unwrap();
        out.flush().unwrap();
        let text = String::from_utf8(out.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(
            header.starts_with("row,time_raw,time_corrected,query_epoch,message,squitter_type")
        );
        assert!(header.ends_with("height_above_rx_m,signal"));
        assert!(!header.split(',').any(|h| h == "raw"));

        let row = lines.next().unwrap();
        assert!(row.starts_with(
            "3,15-Dec-2025 17:48:55,2025-12-15T17:56:30,1765821390,5d4840d6000000,short,"
        ));
        assert!(row.contains(",TC_unknown,4840d6,decoded,"));
        assert!(row.ends_with(",7.25"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_json_output() {
        let mut out = JsonOutput::new(Vec::new());
        out.handle_record(&sample()).unwrap();
        out.handle_record(&sample()).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["icao24"], "4840d6");
        assert_eq!(v["icao24_source"], "decoded");
        assert_eq!(v["squitter_type"], "short");
        assert_eq!(v["tc_category"], "TC_unknown");
        assert_eq!(v["time_corrected"], "2025-12-15T17:56:30");
        assert!(v["lat"].is_null());
        assert!(v.get("raw").is_none());
    }
}
