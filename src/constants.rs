// Shared constants for log enrichment

/// Mean Earth radius for the spherical model (m)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Metres to feet
pub const M_TO_FT: f64 = 3.280839895;

/// Feet to metres. Defined as the inverse of `M_TO_FT` so conversions round-trip.
pub const FT_TO_M: f64 = 1.0 / M_TO_FT;

/// m/s to knots
pub const MS_TO_KTS: f64 = 1.9438444924406;

/// Below this magnitude a coordinate is treated as zero (the "no fix" sentinel)
pub const ZERO_COORD_EPS: f64 = 1e-9;

/// Hex length of a 56-bit Mode S message
pub const SHORT_HEX_LEN: usize = 14;

/// Hex length of a 112-bit Mode S message
pub const EXTENDED_HEX_LEN: usize = 28;

/// Downlink format of an all-call reply
pub const DF_ALL_CALL: u8 = 11;

/// Lookup time grid with credentials (s)
pub const QUERY_GRID_AUTH_S: i64 = 5;

/// Lookup time grid without credentials (s)
pub const QUERY_GRID_ANON_S: i64 = 10;

/// Delay after each live lookup (ms)
pub const LOOKUP_PACING_MS: u64 = 50;

/// Default ceiling on live lookups per run
pub const DEFAULT_CALL_BUDGET: usize = 5000;

/// Raw anchor times closer than this are degenerate (s)
pub const ANCHOR_MIN_SEPARATION_S: f64 = 1e-6;

/// Recorder timestamp format, e.g. `15-Dec-2025 17:06:09`
pub const RAW_TIME_FORMAT: &str = "%d-%b-%Y %H:%M:%S";

/// Anchor time-of-day format
pub const ANCHOR_TIME_FORMAT: &str = "%H:%M:%S";
