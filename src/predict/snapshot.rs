use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::predict::error::{ElementError, PredictError};
use crate::predict::ground_station::ObserverLocation;
use crate::predict::pass_finder::{PassFinder, DEFAULT_STEP};
use crate::predict::propagation::{Ephemeris, DEFAULT_VALIDITY};
use crate::predict::types::{OrbitalElements, PassEvent, SatelliteId};
use crate::scheduler::Priority;

/// A satellite the station is asked to track.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub elements: Arc<OrbitalElements>,
    pub priority: Priority,
    pub downlink_hz: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct PassSettings {
    pub min_elevation_deg: f64,
    pub step: Duration,
    pub validity: Duration,
}

impl Default for PassSettings {
    fn default() -> Self {
        Self {
            min_elevation_deg: 10.0,
            step: DEFAULT_STEP,
            validity: DEFAULT_VALIDITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Candidate {
    pub pass: PassEvent,
    pub priority: Priority,
    pub downlink_hz: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionCause {
    StaleElements,
    InvalidElements,
    Propagation,
}

impl From<&PredictError> for ExclusionCause {
    fn from(error: &PredictError) -> Self {
        match error {
            PredictError::Elements(ElementError::Stale { .. }) => ExclusionCause::StaleElements,
            PredictError::Elements(_) => ExclusionCause::InvalidElements,
            _ => ExclusionCause::Propagation,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExcludedSatellite {
    pub satellite: SatelliteId,
    pub cause: ExclusionCause,
    pub reason: String,
}

/// Everything the scheduler and the tracking loop read: predicted passes
/// and the propagators that produced them. Never mutated after
/// construction; a refresh builds a new one.
#[derive(Debug)]
pub struct ScheduleSnapshot {
    pub generated_at: DateTime<Utc>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub observer: ObserverLocation,
    /// Sorted by rise time, then satellite.
    pub candidates: Vec<Candidate>,
    pub excluded: Vec<ExcludedSatellite>,
    ephemerides: HashMap<SatelliteId, Arc<Ephemeris>>,
}

impl ScheduleSnapshot {
    pub fn empty(observer: ObserverLocation, at: DateTime<Utc>) -> Self {
        Self {
            generated_at: at,
            from: at,
            to: at,
            observer,
            candidates: Vec::new(),
            excluded: Vec::new(),
            ephemerides: HashMap::new(),
        }
    }

    pub fn ephemeris(&self, satellite: SatelliteId) -> Option<&Arc<Ephemeris>> {
        self.ephemerides.get(&satellite)
    }

    /// Candidates whose pass contains `time`.
    pub fn active_at(&self, time: DateTime<Utc>) -> impl Iterator<Item = &Candidate> {
        self.candidates
            .iter()
            .take_while(move |c| c.pass.rise <= time)
            .filter(move |c| c.pass.contains(time))
    }

    pub fn candidate(&self, satellite: SatelliteId, time: DateTime<Utc>) -> Option<&Candidate> {
        self.active_at(time).find(|c| c.pass.satellite == satellite)
    }

    /// Passes that have not finished by `time`.
    pub fn upcoming(&self, time: DateTime<Utc>) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(move |c| c.pass.set >= time)
    }

    pub fn satellites(&self) -> usize {
        self.ephemerides.len()
    }
}

/// Predicts passes for every catalog entry in parallel and merges them.
///
/// A satellite whose elements cannot be used at `from` is excluded and
/// logged. If the elements go stale inside the window, the passes found
/// before that point are kept.
pub fn build_snapshot(
    catalog: &[CatalogEntry],
    observer: &ObserverLocation,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    settings: &PassSettings,
) -> ScheduleSnapshot {
    let results: Vec<_> = catalog
        .par_iter()
        .map(|entry| (entry, predict_entry(entry, observer, from, to, settings)))
        .collect();

    let mut snapshot = ScheduleSnapshot::empty(*observer, Utc::now());
    snapshot.from = from;
    snapshot.to = to;

    for (entry, result) in results {
        let satellite = entry.elements.norad_id;
        match result {
            Ok((ephemeris, passes)) => {
                snapshot.candidates.extend(passes.into_iter().map(|pass| Candidate {
                    pass,
                    priority: entry.priority,
                    downlink_hz: entry.downlink_hz,
                }));
                snapshot.ephemerides.insert(satellite, ephemeris);
            }
            Err(e) => {
                log::warn!(
                    "Excluding {} ({}) from scheduling: {}",
                    entry.elements.display_name(),
                    satellite,
                    e
                );
                snapshot.excluded.push(ExcludedSatellite {
                    satellite,
                    cause: ExclusionCause::from(&e),
                    reason: e.to_string(),
                });
            }
        }
    }

    snapshot
        .candidates
        .sort_by(|a, b| (a.pass.rise, a.pass.satellite).cmp(&(b.pass.rise, b.pass.satellite)));
    snapshot.excluded.sort_by_key(|e| e.satellite);

    log::info!(
        "Predicted {} passes for {} satellites between {} and {} ({} excluded)",
        snapshot.candidates.len(),
        snapshot.ephemerides.len(),
        from,
        to,
        snapshot.excluded.len()
    );

    snapshot
}

fn predict_entry(
    entry: &CatalogEntry,
    observer: &ObserverLocation,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    settings: &PassSettings,
) -> Result<(Arc<Ephemeris>, Vec<PassEvent>), PredictError> {
    let elements = &entry.elements;
    let ephemeris = Arc::new(Ephemeris::new(elements.as_ref().clone(), settings.validity)?);
    if !ephemeris.is_valid_at(from) {
        return Err(ElementError::Stale {
            norad_id: elements.norad_id,
            age_days: elements.age_at(from).num_seconds() as f64 / 86_400.0,
        }
        .into());
    }

    let mut passes = Vec::new();
    let mut finder = PassFinder::new(
        ephemeris.clone(),
        *observer,
        from,
        to,
        settings.min_elevation_deg,
    )
    .with_step(settings.step);
    while let Some(pass) = finder.next() {
        match pass {
            Ok(pass) => passes.push(pass),
            Err(e) => {
                log::warn!(
                    "Pass search for {} stopped early at {}: {}",
                    elements.display_name(),
                    finder.cursor(),
                    e
                );
                break;
            }
        }
    }

    Ok((ephemeris, passes))
}

/// Holds the current snapshot. Readers take a cheap `Arc` clone; a refresh
/// swaps in a new snapshot without disturbing readers of the old one.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<ScheduleSnapshot>>,
}

impl SnapshotStore {
    pub fn new(snapshot: ScheduleSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn load(&self) -> Arc<ScheduleSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `snapshot` and returns the one it replaced.
    pub fn replace(&self, snapshot: ScheduleSnapshot) -> Arc<ScheduleSnapshot> {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, Arc::new(snapshot))
    }
}
