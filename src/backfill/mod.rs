// Backfill of missing kinematics from a remote flight-state service
//
// Every lookup goes through BackfillCache, which quantizes the query time,
// caches results (including "no data") per (icao24, time) and enforces a
// ceiling on lookups, cache hits included.

pub mod opensky;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{LOOKUP_PACING_MS, QUERY_GRID_ANON_S, QUERY_GRID_AUTH_S};
use crate::error::BackfillError;

pub use opensky::{OpenSkyClient, OpenSkyCredentials};

/// Aircraft state as reported by the lookup service (SI units)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicSnapshot {
    pub callsign: Option<String>,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    pub baro_alt_m: Option<f64>,
    pub velocity_mps: Option<f64>,
    pub true_track_deg: Option<f64>,
    pub vertical_rate_mps: Option<f64>,
    pub geo_alt_m: Option<f64>,
}

/// A remote source of aircraft state vectors
pub trait StateSource {
    /// Query the state of `icao24` at epoch second `time`.
    ///
    /// `Ok(None)` means the service answered but had nothing for this key.
    fn fetch_state(
        &self,
        icao24: &str,
        time: i64,
    ) -> impl Future<Output = Result<Option<KinematicSnapshot>, BackfillError>> + Send;

    /// Whether requests carry credentials (finer time resolution)
    fn is_authenticated(&self) -> bool;
}

/// Floor `epoch` to the service's query grid: 5 s with credentials, 10 s without
pub fn quantize_time(epoch: i64, authenticated: bool) -> i64 {
    let grid = if authenticated {
        QUERY_GRID_AUTH_S
    } else {
        QUERY_GRID_ANON_S
    };
    epoch - epoch.rem_euclid(grid)
}

/// Cache key: (icao24, quantized epoch)
pub type CacheKey = (String, i64);

/// Budgeted, caching front of a [`StateSource`]
pub struct BackfillCache<S> {
    source: S,
    /// `None` marks a negative result: queried, nothing usable
    cache: HashMap<CacheKey, Option<KinematicSnapshot>>,
    /// Lookups charged against the budget, cache hits included
    lookups: usize,
    live_calls: usize,
    /// Lookups turned away after the budget ran out
    refused: usize,
    budget: usize,
    pacing: Duration,
}

impl<S: StateSource> BackfillCache<S> {
    pub fn new(source: S, budget: usize) -> Self {
        BackfillCache {
            source,
            cache: HashMap::new(),
            lookups: 0,
            live_calls: 0,
            refused: 0,
            budget,
            pacing: Duration::from_millis(LOOKUP_PACING_MS),
        }
    }

    /// Override the delay inserted after each live call
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of lookups accepted so far, cache hits included
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Number of remote queries issued so far
    pub fn live_calls(&self) -> usize {
        self.live_calls
    }

    /// Number of lookups refused because the budget was spent
    pub fn refused(&self) -> usize {
        self.refused
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// True once `budget` lookups have been made
    pub fn is_exhausted(&self) -> bool {
        self.lookups >= self.budget
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Cache key a lookup of (`icao24`, `epoch`) would use
    pub fn key_for(&self, icao24: &str, epoch: i64) -> CacheKey {
        (
            icao24.to_string(),
            quantize_time(epoch, self.source.is_authenticated()),
        )
    }

    /// Cached entry for a key: `None` if never queried, `Some(None)` if the
    /// query returned no data
    pub fn cached(&self, key: &CacheKey) -> Option<&Option<KinematicSnapshot>> {
        self.cache.get(key)
    }

    /// Resolve the state of `icao24` around `epoch`.
    ///
    /// Every accepted lookup is charged against the budget. Once it is spent,
    /// lookups return `None` without touching the cache or the network.
    /// Cache hits never touch the network. A miss issues one live call and
    /// records its outcome, failures included, as the key's value.
    pub async fn resolve(&mut self, icao24: &str, epoch: i64) -> Option<KinematicSnapshot> {
        if self.is_exhausted() {
            if self.refused == 0 {
                info!(
                    "Lookup budget of {} calls exhausted, skipping further backfill",
                    self.budget
                );
            }
            self.refused += 1;
            return None;
        }
        self.lookups += 1;

        let key = self.key_for(icao24, epoch);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        self.live_calls += 1;
        let result = match self.source.fetch_state(&key.0, key.1).await {
            Ok(Some(state)) => Some(state),
            Ok(None) => {
                debug!("No state for {} at {}", key.0, key.1);
                None
            }
            Err(e) => {
                warn!("State lookup for {} at {} failed: {}", key.0, key.1, e);
                None
            }
        };
        self.cache.insert(key, result.clone());

        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }

        result
    }
}
