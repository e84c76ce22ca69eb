// ADS-B log enrichment: clock correction, identity recovery, backfill and
// receiver geometry for recorded receiver logs

pub mod constants;
pub mod error;

// Core, leaf first
pub mod geodesy;
pub mod timemap;
pub mod modes;
pub mod backfill;
pub mod pipeline;

// I/O and configuration
pub mod logfile;
pub mod output;
pub mod config;
